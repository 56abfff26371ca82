//! Per-organism virtual hardware: executing memory, virtual threads, the cost
//! ledger and the divide pipeline.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::config::{HardwareConfig, HardwareConfigError};
use crate::context::ExecutionContext;
use crate::inst_set::{InstructionSet, InstructionSetError};
use crate::instruction::{Instruction, InstructionSequence};
use crate::organism::OrganismState;
use crate::phenotype::Phenotype;
use crate::rng::RandomExt;

pub mod costs;
pub mod divide;
pub mod fitness;
pub mod mutation;
pub mod viability;

pub use costs::CostLedger;
pub use divide::DivideOutcome;
pub use fitness::FitnessVerdict;
pub use viability::DivideRejection;

#[derive(Debug, Clone, PartialEq)]
pub enum HardwareError {
    Config(HardwareConfigError),
    InstructionSet(InstructionSetError),
    UnknownFillMode { operator: &'static str, mode: u8 },
    MissingCollectResource,
    InvalidThread { thread_id: usize, num_threads: usize },
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::Config(e) => write!(f, "{}", e),
            HardwareError::InstructionSet(e) => write!(f, "{}", e),
            HardwareError::UnknownFillMode { operator, mode } => {
                write!(f, "unknown {operator} fill mode {mode}")
            }
            HardwareError::MissingCollectResource => write!(
                f,
                "instruction resource costs require collect_specific_resource"
            ),
            HardwareError::InvalidThread {
                thread_id,
                num_threads,
            } => write!(f, "thread {thread_id} out of range ({num_threads} threads)"),
        }
    }
}

impl From<HardwareConfigError> for HardwareError {
    fn from(err: HardwareConfigError) -> Self {
        HardwareError::Config(err)
    }
}

impl From<InstructionSetError> for HardwareError {
    fn from(err: InstructionSetError) -> Self {
        HardwareError::InstructionSet(err)
    }
}

impl Error for HardwareError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HardwareError::Config(e) => Some(e),
            HardwareError::InstructionSet(e) => Some(e),
            _ => None,
        }
    }
}

/// Concrete CPU flavor, fixed when the hardware is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareKind {
    /// Register machine; the offspring is copied into the tail of the parent memory.
    #[default]
    Classic,
    /// Stack machine with simultaneous threads; the offspring is written to
    /// its own memory space.
    Smt,
}

impl HardwareKind {
    pub fn register_count(self) -> usize {
        match self {
            HardwareKind::Classic => 3,
            HardwareKind::Smt => 4,
        }
    }

    /// Sites of the offspring region flagged as copied.
    pub fn copied_size(
        self,
        memory: &InstructionSequence,
        parent_size: usize,
        child_size: usize,
    ) -> usize {
        match self {
            HardwareKind::Classic => memory.count_copied(parent_size..parent_size + child_size),
            HardwareKind::Smt => memory.count_copied(parent_size..memory.len()),
        }
    }

    fn fresh_thread(self) -> ThreadState {
        ThreadState::new(self.register_count())
    }
}

pub const HEAD_IP: usize = 0;
pub const HEAD_READ: usize = 1;
pub const HEAD_WRITE: usize = 2;
pub const HEAD_FLOW: usize = 3;

/// Register and head state of one virtual thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadState {
    pub registers: Vec<i32>,
    pub heads: [usize; 4],
    /// Cleared by an instruction that moved the IP itself.
    pub advance_ip: bool,
}

impl ThreadState {
    pub fn new(register_count: usize) -> Self {
        Self {
            registers: vec![0; register_count],
            heads: [0; 4],
            advance_ip: true,
        }
    }

    pub fn ip(&self) -> usize {
        self.heads[HEAD_IP]
    }
}

/// Result of one call to [`Hardware::single_process`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Costs are still being amortized; the instruction did not run.
    Paying,
    Executed { inst: Instruction, success: bool },
    /// Energy ran out; the organism is marked to die.
    Dead,
}

#[derive(Clone, Debug)]
pub struct Hardware {
    inst_set: Arc<InstructionSet>,
    kind: HardwareKind,
    memory: InstructionSequence,
    threads: Vec<ThreadState>,
    cur_thread: usize,
    max_threads: usize,
    costs: CostLedger,
    /// Set when the last step executed the final memory line.
    exec_last_inst: bool,
}

impl Hardware {
    pub fn new(
        inst_set: Arc<InstructionSet>,
        kind: HardwareKind,
        genome: &InstructionSequence,
        config: &HardwareConfig,
    ) -> Result<Self, HardwareError> {
        config.validate()?;
        if (inst_set.has_res_costs() || inst_set.has_fem_res_costs())
            && config.collect_specific_resource.is_none()
        {
            return Err(HardwareError::MissingCollectResource);
        }
        let costs = CostLedger::new(&inst_set, config.max_cpu_threads);
        let mut hardware = Self {
            inst_set,
            kind,
            memory: InstructionSequence::new(),
            threads: Vec::new(),
            cur_thread: 0,
            max_threads: config.max_cpu_threads,
            costs,
            exec_last_inst: false,
        };
        hardware.reset(genome);
        Ok(hardware)
    }

    /// Reload memory from `genome` and re-derive every cost table and counter.
    pub fn reset(&mut self, genome: &InstructionSequence) {
        self.memory = genome.clone();
        self.memory.clear_flags();
        self.internal_reset();
        self.costs.reset(&self.inst_set, self.max_threads);
        self.exec_last_inst = false;
    }

    fn internal_reset(&mut self) {
        self.threads.clear();
        self.threads.push(self.kind.fresh_thread());
        self.cur_thread = 0;
    }

    /// Per-flavor cleanup after the organism hook refused a division.
    pub fn reset_on_failed_divide(&mut self) {
        self.internal_reset();
        if self.kind == HardwareKind::Smt {
            self.threads[0].advance_ip = false;
        }
    }

    pub fn inst_set(&self) -> &InstructionSet {
        &self.inst_set
    }

    pub fn kind(&self) -> HardwareKind {
        self.kind
    }

    pub fn memory(&self) -> &InstructionSequence {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut InstructionSequence {
        &mut self.memory
    }

    pub fn threads(&self) -> &[ThreadState] {
        &self.threads
    }

    pub fn thread_mut(&mut self, thread_id: usize) -> Option<&mut ThreadState> {
        self.threads.get_mut(thread_id)
    }

    pub fn cur_thread(&self) -> usize {
        self.cur_thread
    }

    pub fn costs(&self) -> &CostLedger {
        &self.costs
    }

    /// Start a new thread as a copy of the current one. `None` at the thread limit.
    pub fn spawn_thread(&mut self) -> Option<usize> {
        if self.threads.len() >= self.max_threads {
            return None;
        }
        let thread = self.threads[self.cur_thread].clone();
        self.threads.push(thread);
        Some(self.threads.len() - 1)
    }

    pub fn kill_thread(&mut self, thread_id: usize) -> bool {
        if self.threads.len() <= 1 || thread_id >= self.threads.len() {
            return false;
        }
        self.threads.remove(thread_id);
        self.costs.remove_thread(thread_id);
        if thread_id < self.cur_thread {
            self.cur_thread -= 1;
        } else if self.cur_thread >= self.threads.len() {
            self.cur_thread = 0;
        }
        true
    }

    pub fn pay_pre_costs(
        &mut self,
        phenotype: &mut Phenotype,
        ctx: &mut ExecutionContext<'_>,
        inst: Instruction,
        thread_id: usize,
    ) -> Result<bool, HardwareError> {
        self.costs
            .pay_pre_costs(&self.inst_set, inst, thread_id, phenotype, ctx)
    }

    pub fn pay_post_res_costs(
        &self,
        phenotype: &mut Phenotype,
        ctx: &mut ExecutionContext<'_>,
        inst: Instruction,
    ) -> Result<(), HardwareError> {
        self.costs
            .pay_post_res_costs(&self.inst_set, inst, phenotype, ctx)
    }

    pub fn set_post_cpu_costs(
        &mut self,
        inst: Instruction,
        thread_id: usize,
    ) -> Result<(), HardwareError> {
        self.costs.set_post_cpu_costs(&self.inst_set, inst, thread_id)
    }

    pub fn is_paying_active_cost(&self, thread_id: usize) -> bool {
        self.costs.is_paying_active_cost(thread_id)
    }

    /// Arm the configured task-switch penalty.
    pub fn charge_task_switch_penalty(&mut self, config: &HardwareConfig) {
        self.costs.add_task_switch_penalty(config.task_switch_penalty);
    }

    /// Run one cycle of the current thread.
    ///
    /// `execute` supplies the instruction semantics; it returns whether the
    /// instruction succeeded. Costs gate whether it is called at all.
    pub fn single_process<F>(
        &mut self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
        mut execute: F,
    ) -> Result<StepOutcome, HardwareError>
    where
        F: FnMut(Instruction, &mut ThreadState) -> bool,
    {
        let thread_id = self.cur_thread;
        state.phenotype.time_used += 1;
        state.phenotype.cpu_cycles_used += 1;
        self.exec_last_inst = false;
        if self.memory.is_empty() {
            return Ok(StepOutcome::Paying);
        }

        let ip = self.threads[thread_id].ip() % self.memory.len();
        let inst = self.memory.inst(ip);
        if !self.pay_pre_costs(&mut state.phenotype, ctx, inst, thread_id)? {
            if state.phenotype.to_die {
                return Ok(StepOutcome::Dead);
            }
            return Ok(StepOutcome::Paying);
        }

        self.memory.set_executed(ip, true);
        let success = execute(inst, &mut self.threads[thread_id]);
        if success {
            self.set_post_cpu_costs(inst, thread_id)?;
            self.pay_post_res_costs(&mut state.phenotype, ctx, inst)?;
        }

        let thread = &mut self.threads[thread_id];
        if thread.advance_ip {
            self.exec_last_inst = ip + 1 == self.memory.len();
            thread.heads[HEAD_IP] = (ip + 1) % self.memory.len();
        } else {
            thread.advance_ip = true;
        }
        self.cur_thread = (thread_id + 1) % self.threads.len();
        Ok(StepOutcome::Executed { inst, success })
    }

    /// Whether an implicit-reproduction trigger has fired. Never for dead organisms.
    pub fn should_implicit_repro(&self, phenotype: &Phenotype, config: &HardwareConfig) -> bool {
        if phenotype.to_die {
            return false;
        }
        (config.implicit_repro_time > 0 && phenotype.time_used >= config.implicit_repro_time)
            || (config.implicit_repro_cpu_cycles > 0
                && phenotype.cpu_cycles_used >= config.implicit_repro_cpu_cycles)
            || (config.implicit_repro_bonus > 0.0
                && phenotype.cur_bonus >= config.implicit_repro_bonus)
            || (config.implicit_repro_end && self.exec_last_inst)
            || (config.implicit_repro_energy > 0.0
                && phenotype.stored_energy >= config.implicit_repro_energy)
    }

    /// One uniform mutation at `pos` during copying, unless the instruction
    /// there is protected by `no_mut_insts`. Returns whether memory changed.
    pub fn do_uniform_copy_mutation(&mut self, ctx: &mut ExecutionContext<'_>, pos: usize) -> bool {
        let Some(current) = self.memory.get(pos) else {
            return false;
        };
        let symbol = self.inst_set.symbol(current);
        if ctx.config.no_mut_insts.contains(symbol) {
            return false;
        }
        let choice = ctx.rng.index(2 * self.inst_set.len() + 1);
        mutation::apply_uniform_choice(
            &mut self.memory,
            self.inst_set.len(),
            choice,
            pos,
            ctx.config.effective_min_genome_size(),
            ctx.config.effective_max_genome_size(),
        )
    }

    /// `len` instructions downstream of the read head, wrapping around memory.
    pub fn genome_fragment(&self, len: usize) -> InstructionSequence {
        let read = self.threads[self.cur_thread].heads[HEAD_READ];
        self.memory.wrapping_fragment(read, len)
    }

    /// Insert `fragment` at the write head.
    pub fn insert_genome_fragment(&mut self, fragment: &InstructionSequence) {
        let write = self.threads[self.cur_thread].heads[HEAD_WRITE].min(self.memory.len());
        self.memory.insert_fragment(write, fragment);
    }
}
