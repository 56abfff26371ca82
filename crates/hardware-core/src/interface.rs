//! Boundaries to the population layer and the sandboxed test CPU.
//!
//! The hardware never reaches into global state: every collaborator it needs
//! during a cost check or a division is handed to it through these traits.

use rand::RngCore;

use crate::config::LgtSourceRegion;
use crate::hardware::viability::DivideRejection;
use crate::instruction::InstructionSequence;
use crate::phenotype::Phenotype;

/// Population-facing services for one organism.
pub trait OrgInterface {
    /// Current level of resource bin `bin` at the organism's location.
    fn resource_level(&self, bin: usize) -> f64;

    /// Remove `amount` from resource bin `bin`.
    fn consume_resource(&mut self, bin: usize, amount: f64);

    fn has_opinion(&self) -> bool;

    fn set_opinion(&mut self, group: i32);

    /// Fragment of roughly `len` instructions taken from another organism
    /// selected by `region`. `None` when no donor is available.
    fn lgt_fragment(
        &mut self,
        rng: &mut dyn RngCore,
        region: LgtSourceRegion,
        dest: &InstructionSequence,
        len: usize,
    ) -> Option<InstructionSequence>;

    /// One cycle of task-switch penalty was paid.
    fn add_deme_switch_penalty(&mut self) {}

    fn report_fault(&mut self, _reason: &DivideRejection) {}

    /// A task never seen before was performed by an offspring under test.
    fn record_new_task(&mut self, _task: usize) {}

    /// Hand a finished offspring to the population. Returns whether it was placed.
    fn activate_offspring(
        &mut self,
        rng: &mut dyn RngCore,
        offspring: InstructionSequence,
        phenotype: Phenotype,
    ) -> bool;
}

/// Outcome of running a genome in the test CPU.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestResult {
    pub fitness: f64,
    pub task_counts: Vec<u32>,
    /// Deepest nested hardware the run reached; non-zero marks an implicit mutation.
    pub max_depth: u32,
    pub viable: bool,
}

/// Sandboxed evaluator. Implementations must not touch the live organism.
pub trait TestCpu {
    fn test_genome(&mut self, rng: &mut dyn RngCore, genome: &InstructionSequence) -> TestResult;
}
