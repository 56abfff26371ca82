use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use organism_hardware_core::config::{HardwareConfig, LgtSourceRegion};
use organism_hardware_core::hardware::{
    DivideOutcome, DivideRejection, Hardware, HardwareKind, StepOutcome,
};
use organism_hardware_core::inst_set::InstructionSet;
use organism_hardware_core::organism::{Organism, OrganismState};
use organism_hardware_core::phenotype::Phenotype;
use organism_hardware_core::rng::RandomExt;
use organism_hardware_core::{
    ExecutionContext, InstructionSequence, OrgInterface, TestCpu, TestResult,
};
use rand::RngCore;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INSTRUCTIONS: [&str; 26] = [
    "nop-A", "nop-B", "nop-C", "if-n-equ", "if-less", "if-label", "mov-head", "jmp-head",
    "get-head", "set-flow", "shift-r", "shift-l", "inc", "dec", "push", "pop", "swap-stk", "swap",
    "add", "sub", "nand", "h-copy", "h-alloc", "h-divide", "IO", "h-search",
];

/// Self-replicating ancestor for the default instruction set.
const ANCESTOR: &str = "wzcagcccccccccccccccccccccccccccccccccccczvfcaxgab";

/// Execution budget per genome line before a gestation is abandoned.
const MAX_CYCLES_PER_LINE: usize = 20;

/// Donor pool size when LGT draws from the neighborhood.
const NEIGHBORHOOD_SIZE: usize = 9;

#[derive(Parser)]
#[command(name = "organism-hardware")]
#[command(about = "Drive digital-organism hardware through gestation and division")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a small population from the ancestor genome
    Run {
        /// Path to config file (JSON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of population updates
        #[arg(long, default_value_t = 50)]
        updates: usize,

        /// Maximum number of living organisms
        #[arg(long, default_value_t = 64)]
        capacity: usize,

        /// Hardware flavor: classic or smt
        #[arg(long, default_value = "classic")]
        hardware: String,

        /// Override the config seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write the run summary as JSON to this path
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a config file without running anything
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Dump the default configuration to stdout
    DumpDefaultConfig,
}

/// Population-side services: resources, group opinion, LGT donors and births.
struct Population {
    capacity: usize,
    donors: Vec<InstructionSequence>,
    births: Vec<(InstructionSequence, Phenotype)>,
    resources: Vec<f64>,
    opinion: Option<i32>,
    faults: usize,
    new_tasks: usize,
}

impl Population {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            donors: Vec::new(),
            births: Vec::new(),
            resources: vec![1000.0; 4],
            opinion: None,
            faults: 0,
            new_tasks: 0,
        }
    }
}

impl OrgInterface for Population {
    fn resource_level(&self, bin: usize) -> f64 {
        self.resources.get(bin).copied().unwrap_or(0.0)
    }

    fn consume_resource(&mut self, bin: usize, amount: f64) {
        if let Some(level) = self.resources.get_mut(bin) {
            *level = (*level - amount).max(0.0);
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
        rng: &mut dyn RngCore,
        region: LgtSourceRegion,
        dest: &InstructionSequence,
        len: usize,
    ) -> Option<InstructionSequence> {
        let pool = match region {
            LgtSourceRegion::Neighborhood => self.donors.len().min(NEIGHBORHOOD_SIZE),
            LgtSourceRegion::Population => self.donors.len(),
        };
        let donor = self.donors.get(rng.index(pool))?;
        if donor == dest || donor.is_empty() {
            return None;
        }
        let start = rng.index(donor.len());
        Some(donor.wrapping_fragment(start, len))
    }

    fn report_fault(&mut self, reason: &DivideRejection) {
        debug!(%reason, "organism fault");
        self.faults += 1;
    }

    fn record_new_task(&mut self, task: usize) {
        debug!(task, "new task found in test CPU");
        self.new_tasks += 1;
    }

    fn activate_offspring(
        &mut self,
        _rng: &mut dyn RngCore,
        offspring: InstructionSequence,
        phenotype: Phenotype,
    ) -> bool {
        if self.births.len() >= self.capacity {
            return false;
        }
        self.births.push((offspring, phenotype));
        true
    }
}

/// Scores a genome by its similarity to the ancestor.
struct AncestorSimilarity {
    ancestor: InstructionSequence,
}

impl TestCpu for AncestorSimilarity {
    fn test_genome(&mut self, _rng: &mut dyn RngCore, genome: &InstructionSequence) -> TestResult {
        let matches = genome
            .iter()
            .zip(self.ancestor.iter())
            .filter(|(a, b)| a == b)
            .count();
        let len = genome.len().max(self.ancestor.len()).max(1);
        TestResult {
            fitness: matches as f64 / len as f64,
            task_counts: Vec::new(),
            max_depth: 0,
            viable: matches > 0,
        }
    }
}

#[derive(Default)]
struct RunStats {
    updates: usize,
    births: usize,
    rejected: usize,
    reverted: usize,
    sterilized: usize,
    mutations: usize,
    deaths: usize,
    faults: usize,
    new_tasks: usize,
}

fn parse_kind(name: &str) -> Result<HardwareKind> {
    match name {
        "classic" => Ok(HardwareKind::Classic),
        "smt" => Ok(HardwareKind::Smt),
        other => bail!("unknown hardware flavor '{other}' (expected classic or smt)"),
    }
}

fn load_config(path: &PathBuf) -> Result<HardwareConfig> {
    let file = File::open(path).context("failed to open config file")?;
    let reader = BufReader::new(file);
    let config: HardwareConfig =
        serde_json::from_reader(reader).context("failed to parse config")?;
    config.validate().context("Config validation error")?;
    Ok(config)
}

/// Execute until every memory line has run, then copy memory into the
/// offspring region with copy-time mutations. Returns false if the organism
/// died or ran out of cycles.
fn gestate(
    hardware: &mut Hardware,
    state: &mut OrganismState,
    ctx: &mut ExecutionContext<'_>,
) -> Result<bool> {
    let len = hardware.memory().len();
    let mut cycles = 0;
    while hardware.memory().count_executed(len) < len {
        if cycles >= len * MAX_CYCLES_PER_LINE {
            warn!(len, cycles, "gestation abandoned");
            return Ok(false);
        }
        if hardware.single_process(state, ctx, |_, _| true)? == StepOutcome::Dead {
            state.phenotype.to_die = true;
            return Ok(false);
        }
        cycles += 1;
    }

    for pos in 0..len {
        let inst = hardware.memory().inst(pos);
        let at = hardware.memory().len();
        hardware.memory_mut().push(inst);
        hardware.memory_mut().set_copied(at, true);
        if state.rates.test_copy_mut(&mut *ctx.rng) {
            let mutant = hardware.inst_set().random_inst(&mut *ctx.rng);
            hardware.memory_mut().set(at, mutant);
            hardware.memory_mut().set_mutated(at, true);
        }
        if state.rates.test_copy_uniform(&mut *ctx.rng) {
            hardware.do_uniform_copy_mutation(ctx, at);
        }
    }
    Ok(true)
}

fn run(
    config: HardwareConfig,
    updates: usize,
    capacity: usize,
    kind: HardwareKind,
) -> Result<RunStats> {
    let inst_set = Arc::new(InstructionSet::from_names(INSTRUCTIONS)?);
    let ancestor = inst_set
        .parse_symbols(ANCESTOR)
        .context("ancestor genome does not match the instruction set")?;
    let mut test_cpu = AncestorSimilarity {
        ancestor: ancestor.clone(),
    };

    let mut next_id = 0u64;
    let mut organisms = vec![Organism::new(
        next_id,
        ancestor.clone(),
        Phenotype::new(ancestor.len(), 0),
        Arc::clone(&inst_set),
        kind,
        &config,
    )?];
    let mut stats = RunStats::default();

    for update in 0..updates {
        let mut population = Population::new(capacity.saturating_sub(organisms.len()));
        population.donors = organisms.iter().map(|o| o.genome().clone()).collect();

        for organism in organisms.iter_mut() {
            let (hardware, state, rng) = organism.parts_mut();
            let mut ctx = ExecutionContext::new(&config, rng, &mut population, &mut test_cpu);
            hardware.point_mutate(&state.rates, &mut ctx, None);
            let divide_point = hardware.memory().len();
            let ready = gestate(hardware, state, &mut ctx)?;
            let using_repro = config.implicit_repro_active()
                && hardware.should_implicit_repro(&state.phenotype, &config);
            if !ready && !using_repro {
                continue;
            }
            if using_repro {
                hardware.memory_mut().truncate(divide_point);
            }
            match hardware.divide(state, &mut ctx, divide_point, using_repro, 1.0, usize::MAX)? {
                DivideOutcome::Rejected(reason) => {
                    debug!(%reason, "divide rejected");
                    stats.rejected += 1;
                    hardware.reset(&state.genome);
                }
                DivideOutcome::Born {
                    mutations,
                    verdict,
                    ..
                } => {
                    stats.births += 1;
                    stats.mutations += mutations;
                    stats.reverted += usize::from(verdict.revert);
                    stats.sterilized += usize::from(verdict.sterilize);
                }
            }
        }

        let before = organisms.len();
        organisms.retain(Organism::is_alive);
        stats.deaths += before - organisms.len();

        stats.faults += population.faults;
        stats.new_tasks += population.new_tasks;
        for (genome, phenotype) in population.births {
            next_id += 1;
            organisms.push(Organism::new(
                next_id,
                genome,
                phenotype,
                Arc::clone(&inst_set),
                kind,
                &config,
            )?);
        }
        stats.updates = update + 1;
        info!(
            update,
            population = organisms.len(),
            births = stats.births,
            "update complete"
        );
        if organisms.is_empty() {
            warn!(update, "population went extinct");
            break;
        }
    }

    let mean_length = if organisms.is_empty() {
        0.0
    } else {
        organisms.iter().map(|o| o.genome().len()).sum::<usize>() as f64 / organisms.len() as f64
    };
    println!("Updates:        {}", stats.updates);
    println!("Population:     {}", organisms.len());
    println!("Births:         {}", stats.births);
    println!("Rejected:       {}", stats.rejected);
    println!("Deaths:         {}", stats.deaths);
    println!("Mutations:      {}", stats.mutations);
    println!("Reverted:       {}", stats.reverted);
    println!("Sterilized:     {}", stats.sterilized);
    println!("Faults:         {}", stats.faults);
    println!("New tasks:      {}", stats.new_tasks);
    println!("Mean length:    {mean_length:.1}");
    Ok(stats)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::DumpDefaultConfig => {
            let config = HardwareConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Validate { config } => {
            load_config(&config)?;
            println!("{:?}: ok", config);
        }
        Commands::Run {
            config,
            updates,
            capacity,
            hardware,
            seed,
            out,
        } => {
            let mut hw_config = match &config {
                Some(path) => load_config(path)?,
                None => HardwareConfig::default(),
            };
            if let Some(seed) = seed {
                hw_config.seed = seed;
            }
            let kind = parse_kind(&hardware)?;
            if capacity == 0 {
                bail!("capacity must be greater than 0");
            }
            info!(?kind, updates, capacity, seed = hw_config.seed, "starting run");
            let stats = run(hw_config, updates, capacity, kind)?;

            if let Some(path) = out {
                let summary = serde_json::json!({
                    "updates": stats.updates,
                    "births": stats.births,
                    "rejected": stats.rejected,
                    "deaths": stats.deaths,
                    "mutations": stats.mutations,
                    "reverted": stats.reverted,
                    "sterilized": stats.sterilized,
                    "faults": stats.faults,
                });
                let file = File::create(&path).context("failed to create summary file")?;
                serde_json::to_writer_pretty(file, &summary).context("failed to write summary")?;
                println!("Summary saved to {:?}", path);
            }
        }
    }
    Ok(())
}
