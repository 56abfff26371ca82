use std::sync::Arc;

use rand_chacha::ChaCha12Rng;

use crate::config::HardwareConfig;
use crate::hardware::{Hardware, HardwareError, HardwareKind};
use crate::inst_set::InstructionSet;
use crate::instruction::InstructionSequence;
use crate::mutation_rates::MutationRates;
use crate::phenotype::Phenotype;
use crate::rng::derive_organism_rng;

/// Organism data the hardware reads and writes through an explicit borrow.
#[derive(Clone, Debug)]
pub struct OrganismState {
    /// Genome the organism was born with; the reversion target.
    pub genome: InstructionSequence,
    /// Offspring genome under construction during a division.
    pub offspring: InstructionSequence,
    pub phenotype: Phenotype,
    pub rates: MutationRates,
}

impl OrganismState {
    pub fn new(genome: InstructionSequence, phenotype: Phenotype, rates: MutationRates) -> Self {
        Self {
            genome,
            offspring: InstructionSequence::new(),
            phenotype,
            rates,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Organism {
    id: u64,
    state: OrganismState,
    hardware: Hardware,
    /// Stream derived from the run seed and `id`.
    rng: ChaCha12Rng,
}

impl Organism {
    pub fn new(
        id: u64,
        genome: InstructionSequence,
        phenotype: Phenotype,
        inst_set: Arc<InstructionSet>,
        kind: HardwareKind,
        config: &HardwareConfig,
    ) -> Result<Self, HardwareError> {
        let hardware = Hardware::new(inst_set, kind, &genome, config)?;
        Ok(Self {
            id,
            state: OrganismState::new(genome, phenotype, config.mutation_rates.clone()),
            hardware,
            rng: derive_organism_rng(config.seed, id),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &OrganismState {
        &self.state
    }

    pub fn genome(&self) -> &InstructionSequence {
        &self.state.genome
    }

    pub fn phenotype(&self) -> &Phenotype {
        &self.state.phenotype
    }

    pub fn phenotype_mut(&mut self) -> &mut Phenotype {
        &mut self.state.phenotype
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    pub fn is_alive(&self) -> bool {
        !self.state.phenotype.to_die
    }

    /// Disjoint borrows of the hardware, the state it operates on and the
    /// organism's random stream.
    pub fn parts_mut(&mut self) -> (&mut Hardware, &mut OrganismState, &mut ChaCha12Rng) {
        (&mut self.hardware, &mut self.state, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::nop_catalog;
    use rand::Rng;

    fn make_organism(id: u64, config: &HardwareConfig) -> Organism {
        let genome = InstructionSequence::from_ops(&[4; 12]);
        Organism::new(
            id,
            genome,
            Phenotype::new(12, 0),
            Arc::new(nop_catalog()),
            HardwareKind::Classic,
            config,
        )
        .unwrap()
    }

    #[test]
    fn each_organism_draws_from_its_own_stream() {
        let config = HardwareConfig::default();
        let mut first = make_organism(1, &config);
        let mut again = make_organism(1, &config);
        let mut other = make_organism(2, &config);
        let draw = |organism: &mut Organism| -> u64 { organism.parts_mut().2.random() };
        let a = draw(&mut first);
        assert_eq!(a, draw(&mut again));
        assert_ne!(a, draw(&mut other));
    }
}
