use serde::{Deserialize, Serialize};

use crate::config::BaseMeritMethod;
use crate::constants::ENERGY_MERIT_SCALE;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatingType {
    #[default]
    Juvenile,
    Female,
    Male,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatePreference {
    #[default]
    Random,
    HighestDisplay,
    HighestMerit,
}

/// How task counts moved between two measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskChange {
    pub lost: bool,
    pub gained: bool,
}

impl TaskChange {
    /// Compare `after` against `before`, task by task. Missing entries count as zero.
    pub fn between(before: &[u32], after: &[u32]) -> Self {
        let len = before.len().max(after.len());
        let mut change = Self::default();
        for i in 0..len {
            let b = before.get(i).copied().unwrap_or(0);
            let a = after.get(i).copied().unwrap_or(0);
            change.lost |= a < b;
            change.gained |= a > b;
        }
        change
    }

    /// Some task was lost and nothing was gained in exchange.
    pub fn lost_without_gain(self) -> bool {
        self.lost && !self.gained
    }
}

/// Fitness, merit and life-history bookkeeping for one organism.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Phenotype {
    pub merit: f64,
    pub stored_energy: f64,
    pub cur_bonus: f64,
    pub mating_type: MatingType,
    pub mate_preference: MatePreference,
    /// Cycles used since birth, including unpaid-cost cycles.
    pub time_used: u64,
    pub cpu_cycles_used: u64,
    pub cur_task_count: Vec<u32>,
    pub last_task_count: Vec<u32>,
    /// Fitness recorded at the previous division.
    pub last_fitness: f64,
    pub genome_length: usize,
    pub copied_size: usize,
    pub executed_size: usize,
    pub lines_executed: usize,
    pub lines_copied: usize,
    /// Divisor applied to per-site division mutation rates.
    pub div_type: f64,
    pub energy_usage_ratio: f64,
    pub num_divides: u32,
    pub generation: u32,
    pub is_fertile: bool,
    pub child_fertile: bool,
    pub copy_true: bool,
    pub is_injected: bool,
    pub to_die: bool,
    pub is_sleeping: bool,
}

impl Phenotype {
    pub fn new(genome_length: usize, num_tasks: usize) -> Self {
        Self {
            merit: genome_length as f64,
            stored_energy: 0.0,
            cur_bonus: 1.0,
            mating_type: MatingType::Juvenile,
            mate_preference: MatePreference::Random,
            time_used: 0,
            cpu_cycles_used: 0,
            cur_task_count: vec![0; num_tasks],
            last_task_count: vec![0; num_tasks],
            last_fitness: 0.0,
            genome_length,
            copied_size: genome_length,
            executed_size: genome_length,
            lines_executed: 0,
            lines_copied: 0,
            div_type: 1.0,
            energy_usage_ratio: 1.0,
            num_divides: 0,
            generation: 0,
            is_fertile: true,
            child_fertile: true,
            copy_true: false,
            is_injected: false,
            to_die: false,
            is_sleeping: false,
        }
    }

    pub fn is_female(&self) -> bool {
        self.mating_type == MatingType::Female
    }

    /// Size component of merit.
    pub fn size_merit(&self, method: BaseMeritMethod, const_merit: u32) -> f64 {
        let least = || {
            self.genome_length
                .min(self.copied_size)
                .min(self.executed_size)
        };
        match method {
            BaseMeritMethod::Constant => f64::from(const_merit),
            BaseMeritMethod::CopiedSize => self.copied_size as f64,
            BaseMeritMethod::ExecutedSize => self.executed_size as f64,
            BaseMeritMethod::FullSize => self.genome_length as f64,
            BaseMeritMethod::LeastSize => least() as f64,
            BaseMeritMethod::SqrtLeastSize => (least() as f64).sqrt().floor(),
        }
    }

    /// Fitness the organism would record if it divided now.
    pub fn current_fitness(&self, method: BaseMeritMethod, const_merit: u32) -> f64 {
        self.size_merit(method, const_merit) * self.cur_bonus / self.time_used.max(1) as f64
    }

    pub fn task_change(&self) -> TaskChange {
        TaskChange::between(&self.last_task_count, &self.cur_task_count)
    }

    pub fn record_task(&mut self, task: usize) {
        if task >= self.cur_task_count.len() {
            self.cur_task_count.resize(task + 1, 0);
        }
        self.cur_task_count[task] += 1;
    }

    pub fn performed_task(&self, task: usize) -> bool {
        self.cur_task_count.get(task).is_some_and(|&n| n > 0)
    }

    pub fn reduce_energy(&mut self, amount: f64) {
        self.stored_energy = (self.stored_energy - amount).max(0.0);
    }

    pub fn double_energy_usage(&mut self) {
        self.energy_usage_ratio *= 2.0;
    }

    pub fn halve_energy_usage(&mut self) {
        self.energy_usage_ratio *= 0.5;
    }

    pub fn default_energy_usage(&mut self) {
        self.energy_usage_ratio = 1.0;
    }

    /// Re-derive merit from stored energy and the current usage ratio.
    pub fn apply_energy_to_merit(&mut self) {
        self.merit = self.stored_energy * self.energy_usage_ratio * ENERGY_MERIT_SCALE;
    }

    /// Lock in the current gestation cycle after a successful division.
    pub fn divide_reset(&mut self, genome_length: usize, method: BaseMeritMethod, const_merit: u32) {
        let size_merit = self.size_merit(method, const_merit);
        self.merit = size_merit * self.cur_bonus;
        self.last_fitness = self.merit / self.time_used.max(1) as f64;
        self.genome_length = genome_length;
        self.last_task_count.clone_from(&self.cur_task_count);
        self.cur_task_count.iter_mut().for_each(|n| *n = 0);
        self.cur_bonus = 1.0;
        self.time_used = 0;
        self.num_divides += 1;
    }

    /// Phenotype for an offspring born from this parent.
    pub fn offspring(&self, genome_length: usize) -> Self {
        let mut child = Self::new(genome_length, self.cur_task_count.len());
        child.merit = self.merit;
        child.last_fitness = self.last_fitness;
        child.last_task_count.clone_from(&self.last_task_count);
        child.generation = self.generation + 1;
        child.is_fertile = self.child_fertile;
        child.div_type = self.div_type;
        child
    }
}
