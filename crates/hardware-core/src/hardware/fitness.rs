use crate::context::ExecutionContext;
use crate::instruction::InstructionSequence;
use crate::organism::OrganismState;
use crate::phenotype::TaskChange;
use crate::rng::RandomExt;

use super::Hardware;

/// Decision reached by the fitness gate for one offspring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FitnessVerdict {
    /// Replace the offspring with an exact copy of the parent genome.
    pub revert: bool,
    /// Mark the offspring infertile. Independent of `revert`.
    pub sterilize: bool,
}

impl FitnessVerdict {
    /// Only a reversion happened; the offspring stays fertile.
    pub fn reverted_only(self) -> bool {
        self.revert && !self.sterilize
    }
}

/// Test-CPU comparison of `offspring` against `parent`.
///
/// Identical genomes, and every genome when `test_on_divide` is off, pass
/// untouched without drawing from the RNG.
pub fn evaluate_divide(
    parent: &InstructionSequence,
    offspring: &InstructionSequence,
    parent_tasks: &[u32],
    ctx: &mut ExecutionContext<'_>,
) -> FitnessVerdict {
    let config = ctx.config;
    if !config.test_on_divide || offspring == parent {
        return FitnessVerdict::default();
    }

    let parent_fitness = ctx.test_cpu.test_genome(&mut *ctx.rng, parent).fitness;
    let neut_min = parent_fitness * (1.0 - config.neutral_min);
    let neut_max = parent_fitness * (1.0 + config.neutral_max);
    let child = ctx.test_cpu.test_genome(&mut *ctx.rng, offspring);

    let mut verdict = FitnessVerdict::default();

    // A non-zero depth means the offspring mutates itself implicitly.
    if config.sterilize_unstable > 0 && child.max_depth > 0 {
        verdict.sterilize = true;
    }
    if config.sterilize_unstable > 1 && !child.viable {
        verdict.sterilize = true;
    }

    let (revert_prob, sterilize_prob) = if child.fitness == 0.0 {
        (config.revert_fatal, config.sterilize_fatal)
    } else if child.fitness < neut_min {
        (config.revert_neg, config.sterilize_neg)
    } else if child.fitness <= neut_max {
        (config.revert_neut, config.sterilize_neut)
    } else {
        (config.revert_pos, config.sterilize_pos)
    };
    verdict.revert |= ctx.rng.p(revert_prob);
    verdict.sterilize |= ctx.rng.p(sterilize_prob);

    let task_loss_revert = ctx.rng.p(config.revert_task_loss);
    let task_loss_sterilize = !task_loss_revert && ctx.rng.p(config.sterilize_task_loss);
    if task_loss_revert || task_loss_sterilize {
        let lost = TaskChange::between(parent_tasks, &child.task_counts).lost_without_gain();
        if task_loss_revert {
            verdict.revert = lost;
        } else {
            verdict.sterilize = lost;
        }
    }

    if config.revert_equals != 0.0 && ctx.rng.p(config.revert_equals) {
        if let Some(last) = child.task_counts.len().checked_sub(1) {
            if child.task_counts[last] >= 1 {
                verdict.revert = true;
                ctx.interface.record_new_task(last);
            }
        }
    }

    verdict
}

impl Hardware {
    /// Run the fitness gate on the pending offspring and apply its verdict.
    pub fn divide_test_fitness_measures(
        &self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
    ) -> FitnessVerdict {
        state.phenotype.copy_true = state.offspring == state.genome;
        state.phenotype.child_fertile = true;

        let verdict = evaluate_divide(
            &state.genome,
            &state.offspring,
            &state.phenotype.cur_task_count,
            ctx,
        );
        if verdict.revert {
            state.offspring = state.genome.slice(0..state.genome.len());
        }
        if verdict.sterilize {
            state.phenotype.child_fertile = false;
        }
        verdict
    }
}
