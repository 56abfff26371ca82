use crate::context::ExecutionContext;
use crate::inst_set::InstructionSet;
use crate::instruction::Instruction;
use crate::phenotype::{MatePreference, Phenotype};

use super::HardwareError;

/// Per-thread amortization of instruction costs.
///
/// Counters hold the cycles still owed. A value of 1 means the last unit is
/// consumed by the current check, so the next check sees zero.
#[derive(Clone, Debug, Default)]
pub struct CostLedger {
    inst_cost: Vec<u32>,
    inst_post_cost: Vec<u32>,
    inst_ft_cost: Vec<u32>,
    inst_energy_cost: Vec<f64>,
    active_thread_costs: Vec<u32>,
    active_thread_post_costs: Vec<u32>,
    task_switch_penalty: u32,
}

impl CostLedger {
    pub fn new(inst_set: &InstructionSet, num_threads: usize) -> Self {
        let mut ledger = Self::default();
        ledger.reset(inst_set, num_threads);
        ledger
    }

    /// Re-derive cached cost tables and clear every counter.
    pub fn reset(&mut self, inst_set: &InstructionSet, num_threads: usize) {
        let entries = inst_set.entries();
        self.inst_cost = entries.iter().map(|e| e.cost).collect();
        self.inst_post_cost = entries.iter().map(|e| e.post_cost).collect();
        self.inst_ft_cost = entries.iter().map(|e| e.ft_cost).collect();
        self.inst_energy_cost = entries.iter().map(|e| e.energy_cost).collect();
        self.active_thread_costs = vec![0; num_threads];
        self.active_thread_post_costs = vec![0; num_threads];
        self.task_switch_penalty = 0;
    }

    pub fn num_threads(&self) -> usize {
        self.active_thread_costs.len()
    }

    pub fn active_cost(&self, thread_id: usize) -> u32 {
        self.active_thread_costs.get(thread_id).copied().unwrap_or(0)
    }

    pub fn active_post_cost(&self, thread_id: usize) -> u32 {
        self.active_thread_post_costs.get(thread_id).copied().unwrap_or(0)
    }

    pub fn remaining_ft_cost(&self, inst: Instruction) -> u32 {
        self.inst_ft_cost.get(inst.index()).copied().unwrap_or(0)
    }

    pub fn task_switch_penalty(&self) -> u32 {
        self.task_switch_penalty
    }

    pub fn add_task_switch_penalty(&mut self, cycles: u32) {
        self.task_switch_penalty = self.task_switch_penalty.saturating_add(cycles);
    }

    fn check_thread(&self, thread_id: usize) -> Result<(), HardwareError> {
        if thread_id >= self.active_thread_costs.len() {
            return Err(HardwareError::InvalidThread {
                thread_id,
                num_threads: self.active_thread_costs.len(),
            });
        }
        Ok(())
    }

    /// Whether `inst` may take effect this cycle on `thread_id`.
    ///
    /// `Ok(false)` is the ordinary "keep paying" answer. Running out of
    /// energy also answers `Ok(false)` but marks the organism to die.
    pub fn pay_pre_costs(
        &mut self,
        inst_set: &InstructionSet,
        inst: Instruction,
        thread_id: usize,
        phenotype: &mut Phenotype,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, HardwareError> {
        self.check_thread(thread_id)?;
        let op = inst.index();

        if ctx.config.energy_enabled {
            let energy_req = self.inst_energy_cost[op] * (phenotype.merit / 100.0);
            if energy_req > 0.0 {
                if phenotype.stored_energy >= energy_req {
                    self.inst_energy_cost[op] = 0.0;
                    phenotype.reduce_energy(energy_req);
                    if inst_set.should_sleep(inst) {
                        phenotype.is_sleeping = true;
                    }
                } else {
                    phenotype.to_die = true;
                    return Ok(false);
                }
            }
        }

        if self.task_switch_penalty > 0 {
            self.task_switch_penalty -= 1;
            ctx.interface.add_deme_switch_penalty();
            return Ok(false);
        }

        if inst_set.has_ft_costs() && self.inst_ft_cost[op] > 0 {
            self.inst_ft_cost[op] -= 1;
            return Ok(false);
        }

        if inst_set.has_res_costs() || inst_set.has_fem_res_costs() {
            let bin = ctx
                .config
                .collect_specific_resource
                .ok_or(HardwareError::MissingCollectResource)?;
            if ctx.interface.resource_level(bin) < resource_requirement(inst_set, inst, phenotype) {
                return Ok(false);
            }
        }

        if inst_set.has_bonus_costs() && phenotype.cur_bonus < inst_set.bonus_cost(inst) {
            return Ok(false);
        }

        let mut per_use_cost = if inst_set.has_costs() {
            self.inst_cost[op]
        } else {
            0
        };
        let female = phenotype.is_female();
        let mut add_female_cost = false;
        if inst_set.has_female_costs() && female && inst_set.female_cost(inst) > 0 {
            add_female_cost = true;
            per_use_cost += inst_set.female_cost(inst);
        }
        let mut add_choosy_cost = false;
        if inst_set.has_choosy_female_costs()
            && female
            && phenotype.mate_preference != MatePreference::Random
            && inst_set.choosy_female_cost(inst) > 0
        {
            add_choosy_cost = true;
            per_use_cost += inst_set.choosy_female_cost(inst);
        }

        if inst_set.has_costs() || add_female_cost || add_choosy_cost || inst_set.has_post_costs() {
            let post = &mut self.active_thread_post_costs[thread_id];
            if *post > 1 {
                *post -= 1;
                return Ok(false);
            }
            *post = 0;

            let active = &mut self.active_thread_costs[thread_id];
            if *active > 1 {
                *active -= 1;
                return Ok(false);
            }
            if *active == 0 && per_use_cost > 1 {
                *active = per_use_cost - 1;
                return Ok(false);
            }
            *active = 0;
        }

        if ctx.config.energy_enabled {
            self.inst_energy_cost[op] = inst_set.energy_cost(inst);
        }
        Ok(true)
    }

    /// Debit resource and bonus costs once `inst` has executed.
    pub fn pay_post_res_costs(
        &self,
        inst_set: &InstructionSet,
        inst: Instruction,
        phenotype: &mut Phenotype,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), HardwareError> {
        if inst_set.has_res_costs() || inst_set.has_fem_res_costs() {
            let bin = ctx
                .config
                .collect_specific_resource
                .ok_or(HardwareError::MissingCollectResource)?;
            ctx.interface
                .consume_resource(bin, resource_requirement(inst_set, inst, phenotype));
        }
        if inst_set.has_bonus_costs() {
            phenotype.cur_bonus -= inst_set.bonus_cost(inst);
        }
        Ok(())
    }

    /// Arm the post-cost counter so the next instruction on `thread_id` waits.
    pub fn set_post_cpu_costs(
        &mut self,
        inst_set: &InstructionSet,
        inst: Instruction,
        thread_id: usize,
    ) -> Result<(), HardwareError> {
        self.check_thread(thread_id)?;
        if inst_set.has_post_costs() {
            let post_cost = self.inst_post_cost[inst.index()];
            let post = &mut self.active_thread_post_costs[thread_id];
            if *post == 0 && post_cost > 1 {
                *post = post_cost;
            }
        }
        Ok(())
    }

    pub fn is_paying_active_cost(&self, thread_id: usize) -> bool {
        self.active_post_cost(thread_id) > 1
    }

    /// Drop the counters of a killed thread. Later threads shift down with
    /// their own counters and a zeroed slot keeps capacity at the thread limit.
    pub fn remove_thread(&mut self, thread_id: usize) {
        if thread_id >= self.active_thread_costs.len() {
            return;
        }
        self.active_thread_costs.remove(thread_id);
        self.active_thread_costs.push(0);
        self.active_thread_post_costs.remove(thread_id);
        self.active_thread_post_costs.push(0);
    }
}

fn resource_requirement(inst_set: &InstructionSet, inst: Instruction, phenotype: &Phenotype) -> f64 {
    let female_cost = if phenotype.is_female() {
        inst_set.fem_res_cost(inst)
    } else {
        0.0
    };
    inst_set.res_cost(inst) + female_cost
}
