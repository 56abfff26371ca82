//! Scripted collaborators shared by the unit tests.

use rand::RngCore;
use rand_chacha::ChaCha12Rng;

use crate::config::{HardwareConfig, LgtSourceRegion};
use crate::context::ExecutionContext;
use crate::hardware::DivideRejection;
use crate::inst_set::InstructionSet;
use crate::instruction::InstructionSequence;
use crate::interface::{OrgInterface, TestCpu, TestResult};
use crate::phenotype::Phenotype;
use crate::rng::create_rng;

/// Sixteen plain instructions; `nop-X` sits at op 3.
pub fn nop_catalog() -> InstructionSet {
    InstructionSet::from_names([
        "nop-A", "nop-B", "nop-C", "nop-X", "inc", "dec", "push", "pop", "swap", "add", "sub",
        "nand", "h-alloc", "h-copy", "h-divide", "h-search",
    ])
    .unwrap()
}

#[derive(Debug)]
pub struct ScriptedInterface {
    pub resources: Vec<f64>,
    pub opinion: Option<i32>,
    pub donor: Option<InstructionSequence>,
    pub switch_penalties: u32,
    pub faults: Vec<String>,
    pub new_tasks: Vec<usize>,
    pub born: Vec<(InstructionSequence, Phenotype)>,
    pub accept_offspring: bool,
}

impl Default for ScriptedInterface {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            opinion: None,
            donor: None,
            switch_penalties: 0,
            faults: Vec::new(),
            new_tasks: Vec::new(),
            born: Vec::new(),
            accept_offspring: true,
        }
    }
}

impl OrgInterface for ScriptedInterface {
    fn resource_level(&self, bin: usize) -> f64 {
        self.resources.get(bin).copied().unwrap_or(0.0)
    }

    fn consume_resource(&mut self, bin: usize, amount: f64) {
        if let Some(level) = self.resources.get_mut(bin) {
            *level -= amount;
        }
    }

    fn has_opinion(&self) -> bool {
        self.opinion.is_some()
    }

    fn set_opinion(&mut self, group: i32) {
        self.opinion = Some(group);
    }

    fn lgt_fragment(
        &mut self,
        _rng: &mut dyn RngCore,
        _region: LgtSourceRegion,
        _dest: &InstructionSequence,
        len: usize,
    ) -> Option<InstructionSequence> {
        self.donor
            .as_ref()
            .map(|donor| donor.wrapping_fragment(0, len))
    }

    fn add_deme_switch_penalty(&mut self) {
        self.switch_penalties += 1;
    }

    fn report_fault(&mut self, reason: &DivideRejection) {
        self.faults.push(reason.to_string());
    }

    fn record_new_task(&mut self, task: usize) {
        self.new_tasks.push(task);
    }

    fn activate_offspring(
        &mut self,
        _rng: &mut dyn RngCore,
        offspring: InstructionSequence,
        phenotype: Phenotype,
    ) -> bool {
        self.born.push((offspring, phenotype));
        self.accept_offspring
    }
}

/// Returns `default_result` unless a genome has a scripted result.
#[derive(Debug, Default)]
pub struct ScriptedTestCpu {
    pub default_result: TestResult,
    pub results: Vec<(InstructionSequence, TestResult)>,
    pub calls: usize,
}

impl TestCpu for ScriptedTestCpu {
    fn test_genome(&mut self, _rng: &mut dyn RngCore, genome: &InstructionSequence) -> TestResult {
        self.calls += 1;
        self.results
            .iter()
            .find(|(scripted, _)| scripted == genome)
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| self.default_result.clone())
    }
}

pub struct Harness {
    pub rng: ChaCha12Rng,
    pub interface: ScriptedInterface,
    pub test_cpu: ScriptedTestCpu,
}

impl Harness {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: create_rng(seed),
            interface: ScriptedInterface::default(),
            test_cpu: ScriptedTestCpu::default(),
        }
    }

    pub fn context<'a>(&'a mut self, config: &'a HardwareConfig) -> ExecutionContext<'a> {
        ExecutionContext::new(
            config,
            &mut self.rng,
            &mut self.interface,
            &mut self.test_cpu,
        )
    }
}
