pub mod config;
pub mod constants;
pub mod context;
pub mod hardware;
pub mod inst_set;
pub mod instruction;
pub mod interface;
pub mod mutation_rates;
pub mod organism;
pub mod phenotype;
pub mod rng;

#[cfg(test)]
mod testing;

pub use config::{HardwareConfig, HardwareConfigError};
pub use context::ExecutionContext;
pub use hardware::{
    DivideOutcome, DivideRejection, FitnessVerdict, Hardware, HardwareError, HardwareKind,
    StepOutcome,
};
pub use instruction::{Instruction, InstructionSequence};
pub use interface::{OrgInterface, TestCpu, TestResult};
