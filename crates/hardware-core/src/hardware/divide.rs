use rand::seq::index;
use rand::Rng;
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::inst_set::InstructionSet;
use crate::instruction::{Instruction, InstructionSequence};
use crate::mutation_rates::MutationRates;
use crate::organism::OrganismState;
use crate::rng::RandomExt;

use super::fitness::FitnessVerdict;
use super::mutation;
use super::viability::DivideRejection;
use super::{Hardware, HardwareError};

/// What happened to a divide request.
#[derive(Clone, Debug, PartialEq)]
pub enum DivideOutcome {
    Rejected(DivideRejection),
    Born {
        /// Mutations applied to the offspring and the parent.
        mutations: usize,
        verdict: FitnessVerdict,
        fertile: bool,
        /// Whether the population accepted the offspring.
        placed: bool,
    },
}

/// Running total of mutations applied during one division, capped at `max`.
#[derive(Clone, Copy, Debug)]
struct MutationCounter {
    total: usize,
    max: usize,
}

impl MutationCounter {
    fn new(max: usize) -> Self {
        Self { total: 0, max }
    }

    fn has_room(&self) -> bool {
        self.total < self.max
    }

    fn remaining(&self) -> usize {
        self.max.saturating_sub(self.total)
    }

    fn take(&mut self) -> bool {
        if self.has_room() {
            self.total += 1;
            true
        } else {
            false
        }
    }

    fn add(&mut self, count: usize) {
        self.total += count;
    }
}

#[derive(Clone, Copy, Debug)]
enum Structural {
    Slip,
    Translocation,
    Lgt,
}

impl Structural {
    fn divide_test<R: Rng + ?Sized>(self, rates: &MutationRates, rng: &mut R) -> bool {
        match self {
            Structural::Slip => rates.test_divide_slip(rng),
            Structural::Translocation => rates.test_divide_trans(rng),
            Structural::Lgt => rates.test_divide_lgt(rng),
        }
    }

    fn poisson_count<R: Rng + ?Sized>(self, rates: &MutationRates, rng: &mut R) -> usize {
        match self {
            Structural::Slip => rates.num_poisson_slip(rng),
            Structural::Translocation => rates.num_poisson_trans(rng),
            Structural::Lgt => rates.num_poisson_lgt(rng),
        }
    }

    fn site_prob(self, rates: &MutationRates) -> f64 {
        match self {
            Structural::Slip => rates.div_slip_prob,
            Structural::Translocation => rates.div_trans_prob,
            Structural::Lgt => rates.div_lgt_prob,
        }
    }

    fn apply(
        self,
        offspring: &mut InstructionSequence,
        parent: &InstructionSequence,
        inst_set: &InstructionSet,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), HardwareError> {
        match self {
            Structural::Slip => mutation::slip_mutation(offspring, inst_set, ctx),
            Structural::Translocation => mutation::trans_mutation(offspring, inst_set, ctx),
            Structural::Lgt => mutation::lgt_mutation(offspring, parent, inst_set, ctx),
        }
    }
}

fn site_substitutions<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    rng: &mut R,
    prob: f64,
    counter: &mut MutationCounter,
) {
    if !(prob > 0.0) || !counter.has_room() {
        return;
    }
    let hits = rng.binomial(genome.len(), prob);
    for _ in 0..hits {
        if !counter.has_room() || !mutation::point_substitution(genome, inst_set, rng) {
            break;
        }
        counter.add(1);
    }
}

/// Per-site insertions at distinct positions, clamped to the size ceiling.
fn site_insertions<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    rng: &mut R,
    prob: f64,
    max_size: usize,
    counter: &mut MutationCounter,
) {
    if !(prob > 0.0) || !counter.has_room() {
        return;
    }
    let len = genome.len();
    let hits = rng
        .binomial(len, prob)
        .min(max_size.saturating_sub(len))
        .min(counter.remaining());
    if hits == 0 {
        return;
    }
    let positions = index::sample(rng, len + 1, hits).into_vec();
    let insts: Vec<Instruction> = (0..hits).map(|_| inst_set.random_inst(rng)).collect();
    mutation::insert_descending(genome, &positions, &insts);
    counter.add(hits);
}

/// Per-site deletions at distinct positions, clamped to the size floor.
fn site_deletions<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    rng: &mut R,
    prob: f64,
    min_size: usize,
    counter: &mut MutationCounter,
) {
    if !(prob > 0.0) || !counter.has_room() {
        return;
    }
    let len = genome.len();
    let hits = rng
        .binomial(len, prob)
        .min(len.saturating_sub(min_size))
        .min(counter.remaining());
    if hits == 0 {
        return;
    }
    let positions = index::sample(rng, len, hits).into_vec();
    mutation::remove_descending(genome, &positions);
    counter.add(hits);
}

impl Hardware {
    /// Apply every division-time mutation class to the pending offspring,
    /// then the parent-side classes to memory. Returns the number applied.
    ///
    /// Per-site substitution, uniform and structural rates are divided by
    /// `mut_multiplier`; no class is applied once `max_mut` is reached.
    pub fn divide_do_mutations(
        &mut self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
        mut_multiplier: f64,
        max_mut: usize,
    ) -> Result<usize, HardwareError> {
        let min_size = ctx.config.effective_min_genome_size();
        let max_size = ctx.config.effective_max_genome_size();
        let mult = if mut_multiplier > 0.0 { mut_multiplier } else { 1.0 };
        state.phenotype.div_type = mult;

        let inst_set = &self.inst_set;
        let OrganismState {
            genome: parent,
            offspring,
            rates,
            ..
        } = state;
        let mut counter = MutationCounter::new(max_mut);

        for kind in [Structural::Slip, Structural::Translocation, Structural::Lgt] {
            if kind.divide_test(rates, &mut *ctx.rng) && counter.take() {
                kind.apply(offspring, parent, inst_set, ctx)?;
            }
            for _ in 0..kind.poisson_count(rates, &mut *ctx.rng) {
                if !counter.take() {
                    break;
                }
                kind.apply(offspring, parent, inst_set, ctx)?;
            }
            let site_prob = kind.site_prob(rates);
            if site_prob > 0.0 {
                let hits = ctx.rng.binomial(offspring.len(), site_prob / mult);
                for _ in 0..hits {
                    if !counter.take() {
                        break;
                    }
                    kind.apply(offspring, parent, inst_set, ctx)?;
                }
            }
        }

        let rng = &mut *ctx.rng;

        if rates.test_divide_mut(rng)
            && counter.has_room()
            && mutation::point_substitution(offspring, inst_set, rng)
        {
            counter.add(1);
        }
        for _ in 0..rates.num_poisson_mut(rng) {
            if !counter.has_room() || !mutation::point_substitution(offspring, inst_set, rng) {
                break;
            }
            counter.add(1);
        }

        if rates.test_divide_ins(rng)
            && counter.has_room()
            && mutation::insertion(offspring, inst_set, rng, max_size)
        {
            counter.add(1);
        }
        for _ in 0..rates.num_poisson_ins(rng) {
            if !counter.has_room() || !mutation::insertion(offspring, inst_set, rng, max_size) {
                break;
            }
            counter.add(1);
        }

        if rates.test_divide_del(rng)
            && counter.has_room()
            && mutation::deletion(offspring, rng, min_size)
        {
            counter.add(1);
        }
        for _ in 0..rates.num_poisson_del(rng) {
            if !counter.has_room() || !mutation::deletion(offspring, rng, min_size) {
                break;
            }
            counter.add(1);
        }

        if rates.test_divide_uniform(rng)
            && counter.has_room()
            && mutation::uniform_mutation(offspring, inst_set, rng, min_size, max_size)
        {
            counter.add(1);
        }

        site_substitutions(offspring, inst_set, rng, rates.div_mut_prob / mult, &mut counter);
        site_insertions(offspring, inst_set, rng, rates.div_ins_prob, max_size, &mut counter);
        site_deletions(offspring, rng, rates.div_del_prob, min_size, &mut counter);

        if rates.div_uniform_prob > 0.0 && counter.has_room() {
            let hits = rng.binomial(offspring.len(), rates.div_uniform_prob / mult);
            for _ in 0..hits {
                if !counter.has_room() {
                    break;
                }
                if mutation::uniform_mutation(offspring, inst_set, rng, min_size, max_size) {
                    counter.add(1);
                }
            }
        }

        site_substitutions(&mut self.memory, inst_set, rng, rates.parent_mut_prob, &mut counter);
        site_insertions(
            &mut self.memory,
            inst_set,
            rng,
            rates.parent_ins_prob,
            max_size,
            &mut counter,
        );
        site_deletions(&mut self.memory, rng, rates.parent_del_prob, min_size, &mut counter);

        debug!(mutations = counter.total, max_mut, "division mutations applied");
        Ok(counter.total)
    }

    /// Exactly `count` point substitutions on the pending offspring.
    pub fn divide_do_exact_mutations(
        &self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
        mut_multiplier: f64,
        count: usize,
    ) -> usize {
        state.phenotype.div_type = if mut_multiplier > 0.0 { mut_multiplier } else { 1.0 };
        if state.offspring.is_empty() {
            return 0;
        }
        for _ in 0..count {
            mutation::point_substitution(&mut state.offspring, &self.inst_set, &mut *ctx.rng);
        }
        count
    }

    /// Background mutation of the executing memory: per-site substitution at
    /// `override_rate` (or the organism's point rate), then insertions, then
    /// deletions. Returns the number of sites changed.
    pub fn point_mutate(
        &mut self,
        rates: &MutationRates,
        ctx: &mut ExecutionContext<'_>,
        override_rate: Option<f64>,
    ) -> usize {
        let mut counter = MutationCounter::new(usize::MAX);
        let rng = &mut *ctx.rng;
        let mut_prob = override_rate.unwrap_or(rates.point_mut_prob);
        site_substitutions(&mut self.memory, &self.inst_set, rng, mut_prob, &mut counter);
        site_insertions(
            &mut self.memory,
            &self.inst_set,
            rng,
            rates.point_ins_prob,
            ctx.config.effective_max_genome_size(),
            &mut counter,
        );
        site_deletions(
            &mut self.memory,
            rng,
            rates.point_del_prob,
            ctx.config.effective_min_genome_size(),
            &mut counter,
        );
        counter.total
    }

    /// Full division: viability, offspring extraction, mutation, the fitness
    /// gate, hand-off to the population and the parent's reset.
    ///
    /// For a classic split `divide_point` is where the offspring starts in
    /// memory; with `using_repro` the whole memory is copied and
    /// `divide_point` is ignored.
    pub fn divide(
        &mut self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
        divide_point: usize,
        using_repro: bool,
        mut_multiplier: f64,
        max_mut: usize,
    ) -> Result<DivideOutcome, HardwareError> {
        let len = self.memory.len();
        let (parent_size, child_size) = if using_repro {
            (len, len)
        } else {
            let point = divide_point.min(len);
            (point, len - point)
        };
        if let Err(reason) =
            self.divide_check_viable(state, ctx, parent_size, child_size, using_repro)
        {
            return Ok(DivideOutcome::Rejected(reason));
        }

        state.offspring = if using_repro {
            self.memory.slice(0..len)
        } else {
            let child = self.memory.slice(parent_size..len);
            self.memory.truncate(parent_size);
            child
        };

        let mutations = self.divide_do_mutations(state, ctx, mut_multiplier, max_mut)?;
        let verdict = self.divide_test_fitness_measures(state, ctx);
        let fertile = state.phenotype.child_fertile;

        let config = ctx.config;
        let phenotype = &mut state.phenotype;
        phenotype.copied_size = phenotype.lines_copied;
        phenotype.executed_size = phenotype.lines_executed;
        phenotype.divide_reset(parent_size, config.base_merit_method, config.base_const_merit);

        let offspring = std::mem::take(&mut state.offspring);
        let child_phenotype = state.phenotype.offspring(offspring.len());
        info!(
            parent_size,
            child_size = offspring.len(),
            mutations,
            reverted = verdict.revert,
            fertile,
            "offspring born"
        );
        let placed = ctx
            .interface
            .activate_offspring(&mut *ctx.rng, offspring, child_phenotype);

        // Parent-side mutations persist into the parent's genome.
        state.genome = self.memory.slice(0..self.memory.len());
        let genome = state.genome.clone();
        self.reset(&genome);

        Ok(DivideOutcome::Born {
            mutations,
            verdict,
            fertile,
            placed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_refuses_past_the_cap() {
        let mut counter = MutationCounter::new(2);
        assert!(counter.take());
        assert_eq!(counter.remaining(), 1);
        assert!(counter.take());
        assert!(!counter.take());
        assert!(!counter.has_room());
        assert_eq!(counter.total, 2);
    }

    #[test]
    fn unlimited_counter_has_room() {
        let mut counter = MutationCounter::new(usize::MAX);
        counter.add(1_000);
        assert!(counter.has_room());
    }
}
