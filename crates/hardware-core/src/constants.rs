/// Smallest genome any division may produce, regardless of configuration.
pub const MIN_GENOME_LENGTH: usize = 8;

/// Largest genome any division may produce, regardless of configuration.
pub const MAX_GENOME_LENGTH: usize = 2048;

/// Prime multiplier used to derive per-organism RNG streams from a base seed.
/// Chosen so streams for consecutive organism IDs have minimal overlap.
pub const RNG_DERIVATION_PRIME: u64 = 7919;

/// Energy costs are expressed per 100 units of merit.
pub const ENERGY_MERIT_SCALE: f64 = 100.0;

/// Above this mean, Poisson draws switch from Knuth's product method to a
/// rounded normal approximation.
pub const POISSON_KNUTH_LIMIT: f64 = 30.0;
