use std::fmt;

use tracing::{debug, warn};

use crate::config::HardwareConfig;
use crate::constants::{MAX_GENOME_LENGTH, MIN_GENOME_LENGTH};
use crate::context::ExecutionContext;
use crate::organism::OrganismState;
use crate::phenotype::Phenotype;
use crate::rng::RandomExt;

use super::Hardware;

/// Why a division was refused. An ordinary outcome, not a failure of the simulation.
#[derive(Clone, Debug, PartialEq)]
pub enum DivideRejection {
    Juvenile { age: u64, required: u64 },
    TooYoung { age: u64, required: u64 },
    OffspringSize { size: usize, min: usize, max: usize },
    ParentSize { size: usize, min: usize, max: usize },
    OffspringSizeLimit { size: usize },
    ParentSizeLimit { size: usize },
    TooFewExecuted { executed: usize, required: usize },
    TooFewCopied { copied: usize, required: usize },
    NoGroup,
    MissingRequiredTask { task: usize },
    InsufficientBonus { bonus: f64, required: f64 },
    Sterilized,
}

impl fmt::Display for DivideRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivideRejection::Juvenile { age, required } => {
                write!(f, "organism is juvenile ({age} < {required})")
            }
            DivideRejection::TooYoung { age, required } => {
                write!(f, "organism too young ({age} < {required})")
            }
            DivideRejection::OffspringSize { size, min, max } => {
                write!(f, "invalid offspring length ({size} outside [{min}, {max}])")
            }
            DivideRejection::ParentSize { size, min, max } => {
                write!(f, "invalid post-divide length ({size} outside [{min}, {max}])")
            }
            DivideRejection::OffspringSizeLimit { size } => {
                write!(f, "invalid absolute offspring length ({size})")
            }
            DivideRejection::ParentSizeLimit { size } => {
                write!(f, "invalid absolute post-divide length ({size})")
            }
            DivideRejection::TooFewExecuted { executed, required } => {
                write!(f, "too few executed lines ({executed} < {required})")
            }
            DivideRejection::TooFewCopied { copied, required } => {
                write!(f, "too few copied commands ({copied} < {required})")
            }
            DivideRejection::NoGroup => write!(f, "no group opinion and no default group"),
            DivideRejection::MissingRequiredTask { task } => {
                write!(f, "required task {task} not performed")
            }
            DivideRejection::InsufficientBonus { bonus, required } => {
                write!(f, "current bonus {bonus} below required {required}")
            }
            DivideRejection::Sterilized => write!(f, "organism sterilized by fitness test"),
        }
    }
}

/// Size window an offspring (and the remaining parent) must fall in.
pub fn offspring_size_window(genome_size: usize, size_range: f64) -> (usize, usize) {
    let min = MIN_GENOME_LENGTH.max((genome_size as f64 / size_range) as usize);
    let max = MAX_GENOME_LENGTH.min((genome_size as f64 * size_range) as usize);
    (min, max)
}

fn outside_limits(size: usize, config: &HardwareConfig) -> bool {
    (config.min_genome_size > 0 && size < config.min_genome_size)
        || (config.max_genome_size > 0 && size > config.max_genome_size)
}

/// Organism-level requirements: required task (unless immune) and required bonus.
fn organism_viable(config: &HardwareConfig, phenotype: &Phenotype) -> Result<(), DivideRejection> {
    if let Some(task) = config.required_task {
        let immune = config
            .immunity_task
            .is_some_and(|t| phenotype.performed_task(t));
        if !immune && !phenotype.performed_task(task) {
            return Err(DivideRejection::MissingRequiredTask { task });
        }
    }
    if phenotype.cur_bonus < config.required_bonus {
        return Err(DivideRejection::InsufficientBonus {
            bonus: phenotype.cur_bonus,
            required: config.required_bonus,
        });
    }
    Ok(())
}

impl Hardware {
    /// Whether a division into `parent_size` + `child_size` is permitted now.
    ///
    /// On success the measured executed and copied line counts are stored on
    /// the phenotype. Rejections are forwarded to the fault reporter when
    /// `org_fault_reporting` is set.
    pub fn divide_check_viable(
        &mut self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
        parent_size: usize,
        child_size: usize,
        using_repro: bool,
    ) -> Result<(), DivideRejection> {
        let result = self.check_viable(state, ctx, parent_size, child_size, using_repro);
        if let Err(reason) = &result {
            debug!(%reason, parent_size, child_size, "divide rejected");
            if ctx.config.org_fault_reporting {
                ctx.interface.report_fault(reason);
            }
        }
        result
    }

    fn check_viable(
        &mut self,
        state: &mut OrganismState,
        ctx: &mut ExecutionContext<'_>,
        parent_size: usize,
        child_size: usize,
        using_repro: bool,
    ) -> Result<(), DivideRejection> {
        let config = ctx.config;
        let age = state.phenotype.time_used;
        if age < config.juv_period {
            return Err(DivideRejection::Juvenile {
                age,
                required: config.juv_period,
            });
        }
        if age < config.min_cycles {
            return Err(DivideRejection::TooYoung {
                age,
                required: config.min_cycles,
            });
        }

        let (min, max) = offspring_size_window(state.genome.len(), config.offspring_size_range);
        if !(min..=max).contains(&child_size) {
            return Err(DivideRejection::OffspringSize {
                size: child_size,
                min,
                max,
            });
        }
        if !(min..=max).contains(&parent_size) {
            return Err(DivideRejection::ParentSize {
                size: parent_size,
                min,
                max,
            });
        }
        if outside_limits(child_size, config) {
            return Err(DivideRejection::OffspringSizeLimit { size: child_size });
        }
        if outside_limits(parent_size, config) {
            return Err(DivideRejection::ParentSizeLimit { size: parent_size });
        }

        let executed = self.memory.count_executed(parent_size);
        let required = (parent_size as f64 * config.min_exe_lines) as usize;
        if executed < required {
            return Err(DivideRejection::TooFewExecuted { executed, required });
        }

        let copied = if using_repro {
            parent_size
        } else {
            let copied = self.kind.copied_size(&self.memory, parent_size, child_size);
            let required = (child_size as f64 * config.min_copied_lines) as usize;
            if copied < required {
                return Err(DivideRejection::TooFewCopied { copied, required });
            }
            copied
        };

        if config.use_form_groups && !ctx.interface.has_opinion() {
            match config.default_group {
                Some(group) => ctx.interface.set_opinion(group),
                None => {
                    warn!("divide refused: group membership required but no default group");
                    return Err(DivideRejection::NoGroup);
                }
            }
        }

        if let Err(reason) = organism_viable(config, &state.phenotype) {
            if config.divide_failure_resets {
                self.reset_on_failed_divide();
            }
            return Err(reason);
        }

        state.phenotype.lines_executed = executed;
        state.phenotype.lines_copied = copied;

        if config.test_sterilize() && !state.phenotype.is_injected {
            let phenotype = &state.phenotype;
            let cur_fitness =
                phenotype.current_fitness(config.base_merit_method, config.base_const_merit);
            let ratio = cur_fitness / phenotype.last_fitness;
            let tier_prob = if ratio < 1.0 - config.neutral_min {
                config.sterilize_neg
            } else if ratio <= 1.0 + config.neutral_max {
                config.sterilize_neut
            } else {
                config.sterilize_pos
            };
            let mut sterilize = ctx.rng.p(tier_prob);
            if ctx.rng.p(config.sterilize_task_loss) {
                sterilize |= phenotype.task_change().lost_without_gain();
            }
            if sterilize {
                state.phenotype.is_fertile = false;
                return Err(DivideRejection::Sterilized);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_window_matches_range_and_hard_limits() {
        assert_eq!(offspring_size_window(100, 2.0), (50, 200));
        assert_eq!(offspring_size_window(10, 2.0), (MIN_GENOME_LENGTH, 20));
        assert_eq!(offspring_size_window(1500, 2.0), (750, MAX_GENOME_LENGTH));
        assert_eq!(offspring_size_window(100, 1.5), (66, 150));
    }

    #[test]
    fn organism_hook_honors_immunity_task() {
        let config = HardwareConfig {
            required_task: Some(2),
            immunity_task: Some(0),
            ..HardwareConfig::default()
        };
        let mut phenotype = Phenotype::new(50, 3);
        assert_eq!(
            organism_viable(&config, &phenotype),
            Err(DivideRejection::MissingRequiredTask { task: 2 })
        );
        phenotype.record_task(0);
        assert_eq!(organism_viable(&config, &phenotype), Ok(()));
    }

    #[test]
    fn organism_hook_requires_bonus() {
        let config = HardwareConfig {
            required_bonus: 2.0,
            ..HardwareConfig::default()
        };
        let phenotype = Phenotype::new(50, 0);
        assert!(matches!(
            organism_viable(&config, &phenotype),
            Err(DivideRejection::InsufficientBonus { .. })
        ));
    }

    #[test]
    fn rejection_reasons_are_readable() {
        let reason = DivideRejection::OffspringSize {
            size: 250,
            min: 50,
            max: 200,
        };
        assert_eq!(
            reason.to_string(),
            "invalid offspring length (250 outside [50, 200])"
        );
    }
}
