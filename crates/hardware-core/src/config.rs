use serde::{Deserialize, Serialize};

use crate::constants::{MAX_GENOME_LENGTH, MIN_GENOME_LENGTH};
use crate::mutation_rates::MutationRates;

/// Fill policy for the duplicated region of a slip mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlipFillMode {
    Duplication,
    NopX,
    Random,
    Scrambled,
    NopC,
}

impl SlipFillMode {
    pub fn from_selector(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::Duplication),
            1 => Some(Self::NopX),
            2 => Some(Self::Random),
            3 => Some(Self::Scrambled),
            4 => Some(Self::NopC),
            _ => None,
        }
    }
}

/// Fill policy for translocated and laterally transferred fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpliceFillMode {
    Duplication,
    Scrambled,
}

impl SpliceFillMode {
    pub fn from_selector(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::Duplication),
            1 => Some(Self::Scrambled),
            _ => None,
        }
    }
}

/// Where lateral-gene-transfer donors are drawn from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LgtSourceRegion {
    #[default]
    Neighborhood,
    Population,
}

/// How the size component of merit is derived.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BaseMeritMethod {
    Constant,
    CopiedSize,
    ExecutedSize,
    FullSize,
    #[default]
    LeastSize,
    SqrtLeastSize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Deterministic seed for reproducible runs.
    pub seed: u64,
    /// Number of virtual threads each hardware context tracks costs for.
    pub max_cpu_threads: usize,
    /// Absolute lower bound on genome size (0 disables).
    pub min_genome_size: usize,
    /// Absolute upper bound on genome size (0 disables).
    pub max_genome_size: usize,
    /// Offspring may differ from the parent genome by at most this factor.
    pub offspring_size_range: f64,
    /// Cycles an organism must have used before it may divide.
    pub juv_period: u64,
    /// Minimum cycles before division, checked after the juvenile period.
    pub min_cycles: u64,
    /// Fraction of parent lines that must have been executed.
    pub min_exe_lines: f64,
    /// Fraction of offspring lines that must have been copied.
    pub min_copied_lines: f64,
    /// Offspring can only be placed when the parent belongs to a group.
    pub use_form_groups: bool,
    /// Group joined automatically when none was chosen.
    pub default_group: Option<i32>,
    /// Reset hardware state after a divide refused by the organism hook.
    pub divide_failure_resets: bool,
    /// Forward divide rejections to the fault-reporting collaborator.
    pub org_fault_reporting: bool,
    /// Charge instruction energy costs against stored energy.
    pub energy_enabled: bool,
    /// Cycles lost when an organism switches tasks.
    pub task_switch_penalty: u32,
    /// Resource bin used to pay instruction resource costs.
    pub collect_specific_resource: Option<usize>,
    /// Slip fill selector: 0 duplication, 1 nop-X, 2 random, 3 scrambled, 4 nop-C.
    pub slip_fill_mode: u8,
    /// Translocation fill selector: 0 duplication, 1 scrambled.
    pub trans_fill_mode: u8,
    /// Lateral-gene-transfer fill selector: 0 duplication, 1 scrambled.
    pub lgt_fill_mode: u8,
    /// Donor policy for lateral gene transfer.
    pub lgt_source_region: LgtSourceRegion,
    /// Size component of merit used by sterilization fitness ratios.
    pub base_merit_method: BaseMeritMethod,
    /// Merit base used by `BaseMeritMethod::Constant`.
    pub base_const_merit: u32,
    /// Run offspring through the test CPU on every division.
    pub test_on_divide: bool,
    /// 1 sterilizes implicit self-mutators, 2 additionally sterilizes non-viable offspring.
    pub sterilize_unstable: u8,
    pub revert_fatal: f64,
    pub revert_neg: f64,
    pub revert_neut: f64,
    pub revert_pos: f64,
    pub revert_task_loss: f64,
    /// Probability of reverting offspring that gain the final (EQU) task.
    pub revert_equals: f64,
    pub sterilize_fatal: f64,
    pub sterilize_neg: f64,
    pub sterilize_neut: f64,
    pub sterilize_pos: f64,
    pub sterilize_task_loss: f64,
    /// Fraction below parent fitness still considered neutral.
    pub neutral_min: f64,
    /// Fraction above parent fitness still considered neutral.
    pub neutral_max: f64,
    /// Task the organism must have performed before dividing.
    pub required_task: Option<usize>,
    /// Performing this task waives `required_task`.
    pub immunity_task: Option<usize>,
    /// Current bonus required before dividing.
    pub required_bonus: f64,
    /// Implicit reproduction once this many cycles are used (0 disables).
    pub implicit_repro_time: u64,
    /// Implicit reproduction once this many CPU cycles are used (0 disables).
    pub implicit_repro_cpu_cycles: u64,
    /// Implicit reproduction once the current bonus reaches this value (0 disables).
    pub implicit_repro_bonus: f64,
    /// Implicit reproduction after executing the last genome line.
    pub implicit_repro_end: bool,
    /// Implicit reproduction once stored energy reaches this value (0 disables).
    pub implicit_repro_energy: f64,
    /// Instruction symbols that copy mutations never touch.
    pub no_mut_insts: String,
    /// Rates inherited by every organism.
    pub mutation_rates: MutationRates,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_cpu_threads: 1,
            min_genome_size: 0,
            max_genome_size: 0,
            offspring_size_range: 2.0,
            juv_period: 0,
            min_cycles: 0,
            min_exe_lines: 0.5,
            min_copied_lines: 0.5,
            use_form_groups: false,
            default_group: None,
            divide_failure_resets: false,
            org_fault_reporting: false,
            energy_enabled: false,
            task_switch_penalty: 0,
            collect_specific_resource: None,
            slip_fill_mode: 0,
            trans_fill_mode: 0,
            lgt_fill_mode: 0,
            lgt_source_region: LgtSourceRegion::Neighborhood,
            base_merit_method: BaseMeritMethod::LeastSize,
            base_const_merit: 100,
            test_on_divide: false,
            sterilize_unstable: 0,
            revert_fatal: 0.0,
            revert_neg: 0.0,
            revert_neut: 0.0,
            revert_pos: 0.0,
            revert_task_loss: 0.0,
            revert_equals: 0.0,
            sterilize_fatal: 0.0,
            sterilize_neg: 0.0,
            sterilize_neut: 0.0,
            sterilize_pos: 0.0,
            sterilize_task_loss: 0.0,
            neutral_min: 0.0,
            neutral_max: 0.0,
            required_task: None,
            immunity_task: None,
            required_bonus: 0.0,
            implicit_repro_time: 0,
            implicit_repro_cpu_cycles: 0,
            implicit_repro_bonus: 0.0,
            implicit_repro_end: false,
            implicit_repro_energy: 0.0,
            no_mut_insts: String::new(),
            mutation_rates: MutationRates::default(),
        }
    }
}

macro_rules! define_hardware_config_error {
    (
        $(
            $variant:ident $( { $($field:ident : $type:ty),* } )? => $fmt:literal $(, $arg:expr)*
        );* $(;)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum HardwareConfigError {
            $(
                $variant $( { $($field : $type),* } )?,
            )*
        }

        impl std::fmt::Display for HardwareConfigError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$variant $( { $($field),* } )? => write!(f, $fmt $(, $arg)*),
                    )*
                }
            }
        }
    };
}

define_hardware_config_error! {
    InvalidMaxCpuThreads => "max_cpu_threads must be greater than 0";
    InvalidOffspringSizeRange => "offspring_size_range must be finite and positive";
    InvalidGenomeSizeBounds { min: usize, max: usize } => "min_genome_size ({}) exceeds max_genome_size ({})", min, max;
    InvalidExecutedFraction => "min_exe_lines must be finite and within [0,1]";
    InvalidCopiedFraction => "min_copied_lines must be finite and within [0,1]";
    UnknownSlipFillMode { mode: u8 } => "unknown slip_fill_mode {} (expected 0..=4)", mode;
    UnknownTransFillMode { mode: u8 } => "unknown trans_fill_mode {} (expected 0..=1)", mode;
    UnknownLgtFillMode { mode: u8 } => "unknown lgt_fill_mode {} (expected 0..=1)", mode;
    InvalidSterilizeUnstable { level: u8 } => "sterilize_unstable must be 0, 1 or 2 (got {})", level;
    InvalidProbability { field: &'static str, value: f64 } => "{} must be finite and within [0,1] (got {})", field, value;
    InvalidPoissonMean { field: &'static str, value: f64 } => "{} must be finite and non-negative (got {})", field, value;
    InvalidNeutralBounds => "neutral_min and neutral_max must be finite and non-negative";
    InvalidRequiredBonus => "required_bonus must be finite and non-negative";
    InvalidImplicitRepro => "implicit_repro_bonus and implicit_repro_energy must be finite and non-negative";
}

impl std::error::Error for HardwareConfigError {}

impl HardwareConfig {
    pub fn validate(&self) -> Result<(), HardwareConfigError> {
        self.validate_threads()?;
        self.validate_genome_bounds()?;
        self.validate_fill_modes()?;
        self.validate_probabilities()?;
        self.validate_fitness_test()?;
        self.validate_divide_requirements()?;
        Ok(())
    }

    /// Effective lower genome bound: the configured size, never below `MIN_GENOME_LENGTH`.
    pub fn effective_min_genome_size(&self) -> usize {
        self.min_genome_size.max(MIN_GENOME_LENGTH)
    }

    /// Effective upper genome bound: the configured size (0 = unset), never above `MAX_GENOME_LENGTH`.
    pub fn effective_max_genome_size(&self) -> usize {
        if self.max_genome_size == 0 {
            MAX_GENOME_LENGTH
        } else {
            self.max_genome_size.min(MAX_GENOME_LENGTH)
        }
    }

    /// Sterilization on divide is tested only when some sterilize tier can fire.
    pub fn test_sterilize(&self) -> bool {
        self.sterilize_neg > 0.0
            || self.sterilize_neut > 0.0
            || self.sterilize_pos > 0.0
            || self.sterilize_task_loss > 0.0
    }

    pub fn implicit_repro_active(&self) -> bool {
        self.implicit_repro_time > 0
            || self.implicit_repro_cpu_cycles > 0
            || self.implicit_repro_bonus > 0.0
            || self.implicit_repro_end
            || self.implicit_repro_energy > 0.0
    }

    fn validate_threads(&self) -> Result<(), HardwareConfigError> {
        if self.max_cpu_threads == 0 {
            return Err(HardwareConfigError::InvalidMaxCpuThreads);
        }
        Ok(())
    }

    fn validate_genome_bounds(&self) -> Result<(), HardwareConfigError> {
        if !(self.offspring_size_range.is_finite() && self.offspring_size_range > 0.0) {
            return Err(HardwareConfigError::InvalidOffspringSizeRange);
        }
        if self.min_genome_size > 0
            && self.max_genome_size > 0
            && self.min_genome_size > self.max_genome_size
        {
            return Err(HardwareConfigError::InvalidGenomeSizeBounds {
                min: self.min_genome_size,
                max: self.max_genome_size,
            });
        }
        if !(self.min_exe_lines.is_finite() && (0.0..=1.0).contains(&self.min_exe_lines)) {
            return Err(HardwareConfigError::InvalidExecutedFraction);
        }
        if !(self.min_copied_lines.is_finite() && (0.0..=1.0).contains(&self.min_copied_lines)) {
            return Err(HardwareConfigError::InvalidCopiedFraction);
        }
        Ok(())
    }

    fn validate_fill_modes(&self) -> Result<(), HardwareConfigError> {
        if SlipFillMode::from_selector(self.slip_fill_mode).is_none() {
            return Err(HardwareConfigError::UnknownSlipFillMode {
                mode: self.slip_fill_mode,
            });
        }
        if SpliceFillMode::from_selector(self.trans_fill_mode).is_none() {
            return Err(HardwareConfigError::UnknownTransFillMode {
                mode: self.trans_fill_mode,
            });
        }
        if SpliceFillMode::from_selector(self.lgt_fill_mode).is_none() {
            return Err(HardwareConfigError::UnknownLgtFillMode {
                mode: self.lgt_fill_mode,
            });
        }
        Ok(())
    }

    fn validate_probabilities(&self) -> Result<(), HardwareConfigError> {
        let tiers = [
            ("revert_fatal", self.revert_fatal),
            ("revert_neg", self.revert_neg),
            ("revert_neut", self.revert_neut),
            ("revert_pos", self.revert_pos),
            ("revert_task_loss", self.revert_task_loss),
            ("revert_equals", self.revert_equals),
            ("sterilize_fatal", self.sterilize_fatal),
            ("sterilize_neg", self.sterilize_neg),
            ("sterilize_neut", self.sterilize_neut),
            ("sterilize_pos", self.sterilize_pos),
            ("sterilize_task_loss", self.sterilize_task_loss),
        ];
        for (field, value) in tiers
            .into_iter()
            .chain(self.mutation_rates.probabilities())
        {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(HardwareConfigError::InvalidProbability { field, value });
            }
        }
        for (field, value) in self.mutation_rates.poisson_means() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(HardwareConfigError::InvalidPoissonMean { field, value });
            }
        }
        Ok(())
    }

    fn validate_fitness_test(&self) -> Result<(), HardwareConfigError> {
        if self.sterilize_unstable > 2 {
            return Err(HardwareConfigError::InvalidSterilizeUnstable {
                level: self.sterilize_unstable,
            });
        }
        if !(self.neutral_min.is_finite()
            && self.neutral_min >= 0.0
            && self.neutral_max.is_finite()
            && self.neutral_max >= 0.0)
        {
            return Err(HardwareConfigError::InvalidNeutralBounds);
        }
        Ok(())
    }

    fn validate_divide_requirements(&self) -> Result<(), HardwareConfigError> {
        if !(self.required_bonus.is_finite() && self.required_bonus >= 0.0) {
            return Err(HardwareConfigError::InvalidRequiredBonus);
        }
        if !(self.implicit_repro_bonus.is_finite()
            && self.implicit_repro_bonus >= 0.0
            && self.implicit_repro_energy.is_finite()
            && self.implicit_repro_energy >= 0.0)
        {
            return Err(HardwareConfigError::InvalidImplicitRepro);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(HardwareConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_config_json_deserializes_with_defaults() {
        let json = r#"{
            "seed": 7,
            "offspring_size_range": 1.5,
            "slip_fill_mode": 3,
            "lgt_source_region": "population",
            "mutation_rates": { "div_mut_prob": 0.0025 }
        }"#;
        let cfg: HardwareConfig = serde_json::from_str(json).expect("partial config should parse");
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.slip_fill_mode, 3);
        assert_eq!(cfg.lgt_source_region, LgtSourceRegion::Population);
        assert!((cfg.mutation_rates.div_mut_prob - 0.0025).abs() < f64::EPSILON);
        assert_eq!(cfg.max_cpu_threads, 1);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn unknown_fill_modes_are_rejected() {
        let cfg = HardwareConfig {
            slip_fill_mode: 5,
            ..HardwareConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(HardwareConfigError::UnknownSlipFillMode { mode: 5 })
        );
        let cfg = HardwareConfig {
            lgt_fill_mode: 2,
            ..HardwareConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(HardwareConfigError::UnknownLgtFillMode { mode: 2 })
        );
    }

    #[test]
    fn probabilities_outside_unit_interval_are_rejected() {
        let mut cfg = HardwareConfig::default();
        cfg.mutation_rates.div_ins_prob = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(HardwareConfigError::InvalidProbability {
                field: "div_ins_prob",
                ..
            })
        ));
        let cfg = HardwareConfig {
            sterilize_neg: f64::NAN,
            ..HardwareConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(HardwareConfigError::InvalidProbability {
                field: "sterilize_neg",
                ..
            })
        ));
    }

    #[test]
    fn effective_bounds_clamp_to_hard_limits() {
        let cfg = HardwareConfig {
            min_genome_size: 3,
            max_genome_size: 100_000,
            ..HardwareConfig::default()
        };
        assert_eq!(cfg.effective_min_genome_size(), MIN_GENOME_LENGTH);
        assert_eq!(cfg.effective_max_genome_size(), MAX_GENOME_LENGTH);
        let cfg = HardwareConfig {
            min_genome_size: 20,
            max_genome_size: 200,
            ..HardwareConfig::default()
        };
        assert_eq!(cfg.effective_min_genome_size(), 20);
        assert_eq!(cfg.effective_max_genome_size(), 200);
    }

    #[test]
    fn inverted_genome_bounds_are_rejected() {
        let cfg = HardwareConfig {
            min_genome_size: 300,
            max_genome_size: 200,
            ..HardwareConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(HardwareConfigError::InvalidGenomeSizeBounds { min: 300, max: 200 })
        );
    }

    #[test]
    fn error_messages_name_the_field() {
        let err = HardwareConfigError::InvalidProbability {
            field: "revert_neg",
            value: 2.0,
        };
        assert!(err.to_string().contains("revert_neg"));
        assert!(HardwareConfigError::UnknownTransFillMode { mode: 9 }
            .to_string()
            .contains('9'));
    }
}
