use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

use crate::instruction::{Instruction, InstructionSequence};
use crate::rng::RandomExt;

const SYMBOLS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Per-instruction cost attributes.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstEntry {
    pub name: String,
    /// Cycles paid before every execution.
    pub cost: u32,
    /// Cycles paid once, the first time the organism executes this opcode.
    pub ft_cost: u32,
    /// Cycles the *next* instruction on the same thread must wait.
    pub post_cost: u32,
    /// Energy per execution, scaled by merit / 100.
    pub energy_cost: f64,
    /// Resource-bin units consumed per execution.
    pub res_cost: f64,
    /// Additional resource-bin units when the organism is female.
    pub fem_res_cost: f64,
    /// Additional cycles when the organism is female.
    pub female_cost: u32,
    /// Additional cycles when the organism is a female with a mate preference.
    pub choosy_female_cost: u32,
    /// Bonus required, and consumed, per execution.
    pub bonus_cost: f64,
    /// Executing this instruction puts the organism to sleep.
    pub sleep: bool,
}

impl InstEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionSetError {
    Empty,
    TooLarge { max: usize, actual: usize },
    DuplicateName(String),
    UnknownInstruction(String),
}

impl fmt::Display for InstructionSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionSetError::Empty => write!(f, "instruction set must contain at least one entry"),
            InstructionSetError::TooLarge { max, actual } => {
                write!(f, "instruction set has {actual} entries, more than the supported {max}")
            }
            InstructionSetError::DuplicateName(name) => {
                write!(f, "instruction '{name}' is defined more than once")
            }
            InstructionSetError::UnknownInstruction(name) => {
                write!(f, "unknown instruction '{name}'")
            }
        }
    }
}

impl Error for InstructionSetError {}

/// Immutable opcode catalog shared by every organism of one configuration.
#[derive(Clone, Debug)]
pub struct InstructionSet {
    entries: Vec<InstEntry>,
    has_costs: bool,
    has_ft_costs: bool,
    has_post_costs: bool,
    has_energy_costs: bool,
    has_res_costs: bool,
    has_fem_res_costs: bool,
    has_female_costs: bool,
    has_choosy_female_costs: bool,
    has_bonus_costs: bool,
}

impl InstructionSet {
    pub const MAX_SIZE: usize = u8::MAX as usize + 1;

    pub fn new(entries: Vec<InstEntry>) -> Result<Self, InstructionSetError> {
        if entries.is_empty() {
            return Err(InstructionSetError::Empty);
        }
        if entries.len() > Self::MAX_SIZE {
            return Err(InstructionSetError::TooLarge {
                max: Self::MAX_SIZE,
                actual: entries.len(),
            });
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(InstructionSetError::DuplicateName(entry.name.clone()));
            }
        }
        let any = |f: fn(&InstEntry) -> bool| entries.iter().any(f);
        Ok(Self {
            has_costs: any(|e| e.cost > 0),
            has_ft_costs: any(|e| e.ft_cost > 0),
            has_post_costs: any(|e| e.post_cost > 0),
            has_energy_costs: any(|e| e.energy_cost > 0.0),
            has_res_costs: any(|e| e.res_cost > 0.0),
            has_fem_res_costs: any(|e| e.fem_res_cost > 0.0),
            has_female_costs: any(|e| e.female_cost > 0),
            has_choosy_female_costs: any(|e| e.choosy_female_cost > 0),
            has_bonus_costs: any(|e| e.bonus_cost > 0.0),
            entries,
        })
    }

    /// Cost-free catalog from plain names.
    pub fn from_names<I, S>(names: I) -> Result<Self, InstructionSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(InstEntry::named).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, inst: Instruction) -> &InstEntry {
        &self.entries[inst.index()]
    }

    pub fn entries(&self) -> &[InstEntry] {
        &self.entries
    }

    pub fn name(&self, inst: Instruction) -> &str {
        &self.entry(inst).name
    }

    pub fn get(&self, name: &str) -> Option<Instruction> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| Instruction::new(i as u8))
    }

    pub fn inst_by_name(&self, name: &str) -> Result<Instruction, InstructionSetError> {
        self.get(name)
            .ok_or_else(|| InstructionSetError::UnknownInstruction(name.to_string()))
    }

    /// Uniformly random opcode from the catalog.
    pub fn random_inst<R: Rng + ?Sized>(&self, rng: &mut R) -> Instruction {
        Instruction::new(rng.index(self.entries.len()) as u8)
    }

    pub fn symbol(&self, inst: Instruction) -> char {
        SYMBOLS.get(inst.index()).map_or('?', |&b| b as char)
    }

    pub fn sequence_string(&self, seq: &InstructionSequence) -> String {
        seq.iter().map(|inst| self.symbol(inst)).collect()
    }

    pub fn parse_symbols(&self, symbols: &str) -> Result<InstructionSequence, InstructionSetError> {
        symbols
            .chars()
            .map(|c| {
                SYMBOLS
                    .iter()
                    .position(|&b| b as char == c)
                    .filter(|&i| i < self.entries.len())
                    .map(|i| Instruction::new(i as u8))
                    .ok_or_else(|| InstructionSetError::UnknownInstruction(c.to_string()))
            })
            .collect()
    }

    pub fn cost(&self, inst: Instruction) -> u32 {
        self.entry(inst).cost
    }

    pub fn ft_cost(&self, inst: Instruction) -> u32 {
        self.entry(inst).ft_cost
    }

    pub fn post_cost(&self, inst: Instruction) -> u32 {
        self.entry(inst).post_cost
    }

    pub fn energy_cost(&self, inst: Instruction) -> f64 {
        self.entry(inst).energy_cost
    }

    pub fn res_cost(&self, inst: Instruction) -> f64 {
        self.entry(inst).res_cost
    }

    pub fn fem_res_cost(&self, inst: Instruction) -> f64 {
        self.entry(inst).fem_res_cost
    }

    pub fn female_cost(&self, inst: Instruction) -> u32 {
        self.entry(inst).female_cost
    }

    pub fn choosy_female_cost(&self, inst: Instruction) -> u32 {
        self.entry(inst).choosy_female_cost
    }

    pub fn bonus_cost(&self, inst: Instruction) -> f64 {
        self.entry(inst).bonus_cost
    }

    pub fn should_sleep(&self, inst: Instruction) -> bool {
        self.entry(inst).sleep
    }

    pub fn has_costs(&self) -> bool {
        self.has_costs
    }

    pub fn has_ft_costs(&self) -> bool {
        self.has_ft_costs
    }

    pub fn has_post_costs(&self) -> bool {
        self.has_post_costs
    }

    pub fn has_energy_costs(&self) -> bool {
        self.has_energy_costs
    }

    pub fn has_res_costs(&self) -> bool {
        self.has_res_costs
    }

    pub fn has_fem_res_costs(&self) -> bool {
        self.has_fem_res_costs
    }

    pub fn has_female_costs(&self) -> bool {
        self.has_female_costs
    }

    pub fn has_choosy_female_costs(&self) -> bool {
        self.has_choosy_female_costs
    }

    pub fn has_bonus_costs(&self) -> bool {
        self.has_bonus_costs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn rejects_empty_and_duplicate_catalogs() {
        assert_eq!(
            InstructionSet::new(Vec::new()).unwrap_err(),
            InstructionSetError::Empty
        );
        assert_eq!(
            InstructionSet::from_names(["nop-A", "nop-A"]).unwrap_err(),
            InstructionSetError::DuplicateName("nop-A".into())
        );
    }

    #[test]
    fn cost_flags_reflect_entries() {
        let set = InstructionSet::new(vec![
            InstEntry::named("nop-A"),
            InstEntry {
                post_cost: 3,
                ..InstEntry::named("divide")
            },
        ])
        .unwrap();
        assert!(set.has_post_costs());
        assert!(!set.has_costs());
        assert!(!set.has_energy_costs());
        assert_eq!(set.post_cost(Instruction::new(1)), 3);
    }

    #[test]
    fn lookup_and_symbols_round_trip() {
        let set = InstructionSet::from_names(["nop-A", "nop-B", "nop-C", "nop-X"]).unwrap();
        let nop_x = set.inst_by_name("nop-X").unwrap();
        assert_eq!(nop_x.op(), 3);
        assert!(set.inst_by_name("h-divide").is_err());
        let seq = set.parse_symbols("abdc").unwrap();
        assert_eq!(set.sequence_string(&seq), "abdc");
        assert!(set.parse_symbols("abz").is_err());
    }

    #[test]
    fn random_inst_is_in_range() {
        let set = InstructionSet::from_names(["a", "b", "c"]).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        assert!((0..200).all(|_| set.random_inst(&mut rng).index() < 3));
    }
}
