//! Genome mutation operators.
//!
//! Every operator draws from the caller's RNG only, so a division replays
//! identically for the same seed and call order. Operators that can refuse
//! (a genome-size boundary) report whether they changed the genome so the
//! caller's mutation counter stays exact.

use rand::Rng;
use tracing::{debug, error};

use crate::config::{HardwareConfig, SlipFillMode, SpliceFillMode};
use crate::context::ExecutionContext;
use crate::inst_set::InstructionSet;
use crate::instruction::{Instruction, InstructionSequence};
use crate::rng::RandomExt;

use super::HardwareError;

const NOP_X: &str = "nop-X";
const NOP_C: &str = "nop-C";

/// Endpoints of a slip-style rearrangement.
///
/// `from > to` duplicates `[to, from)`; `from < to` deletes `to - from`
/// instructions; equal endpoints leave the genome alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlipSpan {
    pub from: usize,
    pub to: usize,
}

impl SlipSpan {
    /// Random endpoints over `[0, len]`, excluding start-to-past-end.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let from = rng.index(len + 1);
        let to = if from == 0 {
            rng.index(len)
        } else {
            rng.index(len + 1)
        };
        Self { from, to }
    }

    pub fn insertion_length(self) -> isize {
        self.from as isize - self.to as isize
    }
}

/// Replace one random site with a random instruction. False on an empty genome.
pub fn point_substitution<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    rng: &mut R,
) -> bool {
    if genome.is_empty() {
        return false;
    }
    let site = rng.index(genome.len());
    genome.set(site, inst_set.random_inst(rng));
    genome.set_mutated(site, true);
    true
}

/// Insert a random instruction at a random position in `[0, len]`.
pub fn insertion<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    rng: &mut R,
    max_size: usize,
) -> bool {
    if genome.len() >= max_size {
        return false;
    }
    let site = rng.index(genome.len() + 1);
    genome.insert(site, inst_set.random_inst(rng));
    genome.set_mutated(site, true);
    true
}

pub fn deletion<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    rng: &mut R,
    min_size: usize,
) -> bool {
    if genome.len() <= min_size {
        return false;
    }
    let site = rng.index(genome.len());
    genome.remove(site);
    true
}

/// One draw over substitution-to-any-opcode, deletion, or insertion-of-any-opcode.
pub fn uniform_mutation<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    rng: &mut R,
    min_size: usize,
    max_size: usize,
) -> bool {
    let num_insts = inst_set.len();
    let choice = rng.index(2 * num_insts + 1);
    if genome.is_empty() && choice < num_insts {
        return false;
    }
    let site = rng.index(genome.len() + usize::from(choice > num_insts));
    apply_uniform_choice(genome, num_insts, choice, site, min_size, max_size)
}

/// Deterministic half of [`uniform_mutation`].
pub fn apply_uniform_choice(
    genome: &mut InstructionSequence,
    num_insts: usize,
    choice: usize,
    site: usize,
    min_size: usize,
    max_size: usize,
) -> bool {
    if choice < num_insts {
        genome.set(site, Instruction::new(choice as u8));
        genome.set_mutated(site, true);
        true
    } else if choice == num_insts {
        if genome.is_empty() || genome.len() <= min_size {
            return false;
        }
        genome.remove(site);
        true
    } else {
        if genome.len() >= max_size {
            return false;
        }
        genome.insert(site, Instruction::new((choice - num_insts - 1) as u8));
        genome.set_mutated(site, true);
        true
    }
}

/// Insert `insts[i]` at `positions[i]`, in descending position order.
///
/// `positions` index the genome as it was before any insertion; applying them
/// high-to-low keeps every lower index valid.
pub fn insert_descending(
    genome: &mut InstructionSequence,
    positions: &[usize],
    insts: &[Instruction],
) {
    let mut order: Vec<usize> = (0..positions.len().min(insts.len())).collect();
    order.sort_by(|&a, &b| positions[b].cmp(&positions[a]));
    for i in order {
        genome.insert(positions[i], insts[i]);
        genome.set_mutated(positions[i], true);
    }
}

/// Remove the sites at `positions` (pre-deletion indices), highest first.
pub fn remove_descending(genome: &mut InstructionSequence, positions: &[usize]) {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    for pos in sorted {
        if pos < genome.len() {
            genome.remove(pos);
        }
    }
}

/// Draw the source span in a random order: each pick is the k-th
/// not-yet-chosen instruction, counted in original order.
fn scrambled<R: Rng + ?Sized>(source: InstructionSequence, rng: &mut R) -> InstructionSequence {
    let mut remaining: Vec<Instruction> = source.iter().collect();
    let mut out = InstructionSequence::new();
    while !remaining.is_empty() {
        let pick = rng.index(remaining.len());
        out.push(remaining.remove(pick));
    }
    out
}

fn unknown_fill_mode(operator: &'static str, mode: u8) -> HardwareError {
    error!(operator, mode, "unknown fill mode");
    HardwareError::UnknownFillMode { operator, mode }
}

fn slip_fill_mode(config: &HardwareConfig) -> Result<SlipFillMode, HardwareError> {
    SlipFillMode::from_selector(config.slip_fill_mode)
        .ok_or_else(|| unknown_fill_mode("slip", config.slip_fill_mode))
}

fn trans_fill_mode(config: &HardwareConfig) -> Result<SpliceFillMode, HardwareError> {
    SpliceFillMode::from_selector(config.trans_fill_mode)
        .ok_or_else(|| unknown_fill_mode("translocation", config.trans_fill_mode))
}

fn lgt_fill_mode(config: &HardwareConfig) -> Result<SpliceFillMode, HardwareError> {
    SpliceFillMode::from_selector(config.lgt_fill_mode)
        .ok_or_else(|| unknown_fill_mode("lgt", config.lgt_fill_mode))
}

/// `genome[..at] + fill + genome[at..]`.
fn splice(genome: &InstructionSequence, at: usize, fill: &InstructionSequence) -> InstructionSequence {
    let mut out = genome.slice(0..at);
    out.insert_fragment(at, fill);
    out.insert_fragment(out.len(), &genome.slice(at..genome.len()));
    out
}

/// `genome` without the `count` sites starting at `start`.
fn cut(genome: &InstructionSequence, start: usize, count: usize) -> InstructionSequence {
    let mut out = genome.slice(0..start);
    out.insert_fragment(start, &genome.slice(start + count..genome.len()));
    out
}

/// Tandem duplication or deletion depending on the sign of `from - to`.
pub fn slip_mutation(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), HardwareError> {
    let fill = slip_fill_mode(ctx.config)?;
    let span = SlipSpan::draw(&mut *ctx.rng, genome.len());
    apply_slip(genome, span, fill, inst_set, &mut *ctx.rng)
}

pub fn apply_slip<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    span: SlipSpan,
    fill: SlipFillMode,
    inst_set: &InstructionSet,
    rng: &mut R,
) -> Result<(), HardwareError> {
    let SlipSpan { from, to } = span;
    let original = genome.clone();
    if from > to {
        let len = from - to;
        let filler = match fill {
            SlipFillMode::Duplication => original.slice(to..from),
            SlipFillMode::NopX => InstructionSequence::repeat(inst_set.inst_by_name(NOP_X)?, len),
            SlipFillMode::NopC => InstructionSequence::repeat(inst_set.inst_by_name(NOP_C)?, len),
            SlipFillMode::Random => (0..len).map(|_| inst_set.random_inst(rng)).collect(),
            SlipFillMode::Scrambled => scrambled(original.slice(to..from), rng),
        };
        *genome = splice(&original, from, &filler);
    } else if to > from {
        *genome = cut(&original, from, to - from);
    }
    debug!(
        from,
        to,
        parent = %inst_set.sequence_string(&original),
        offspring = %inst_set.sequence_string(genome),
        "slip mutation"
    );
    Ok(())
}

/// Like slip, but the duplicated or removed material sits at an independent location.
pub fn trans_mutation(
    genome: &mut InstructionSequence,
    inst_set: &InstructionSet,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), HardwareError> {
    let fill = trans_fill_mode(ctx.config)?;
    let span = SlipSpan::draw(&mut *ctx.rng, genome.len());
    let ins_loc = ctx.rng.index(genome.len() + 1);
    apply_trans(genome, span, ins_loc, fill, inst_set, &mut *ctx.rng);
    Ok(())
}

pub fn apply_trans<R: Rng + ?Sized>(
    genome: &mut InstructionSequence,
    span: SlipSpan,
    ins_loc: usize,
    fill: SpliceFillMode,
    inst_set: &InstructionSet,
    rng: &mut R,
) {
    let SlipSpan { from, to } = span;
    let original = genome.clone();
    if from > to {
        let source = original.slice(to..from);
        let filler = match fill {
            SpliceFillMode::Duplication => source,
            SpliceFillMode::Scrambled => scrambled(source, rng),
        };
        *genome = splice(&original, ins_loc.min(original.len()), &filler);
    } else if to > from {
        let count = to - from;
        let start = ins_loc.min(original.len() - count);
        *genome = cut(&original, start, count);
    }
    debug!(
        from,
        to,
        ins_loc,
        parent = %inst_set.sequence_string(&original),
        offspring = %inst_set.sequence_string(genome),
        "translocation mutation"
    );
}

/// Splice in a donor fragment, or delete like slip. Falls back to a
/// translocation when no donor is available.
pub fn lgt_mutation(
    genome: &mut InstructionSequence,
    parent_genome: &InstructionSequence,
    inst_set: &InstructionSet,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), HardwareError> {
    let fill = lgt_fill_mode(ctx.config)?;
    let span = SlipSpan::draw(&mut *ctx.rng, genome.len());
    if span.from > span.to {
        let len = span.from - span.to;
        let donor = ctx.interface.lgt_fragment(
            &mut *ctx.rng,
            ctx.config.lgt_source_region,
            parent_genome,
            len,
        );
        match donor {
            Some(fragment) => {
                let ins_loc = ctx.rng.index(genome.len() + 1);
                let filler = match fill {
                    SpliceFillMode::Duplication => fragment,
                    SpliceFillMode::Scrambled => scrambled(fragment, &mut *ctx.rng),
                };
                debug!(ins_loc, len = filler.len(), "lgt mutation");
                *genome = splice(genome, ins_loc, &filler);
            }
            None => {
                debug!("lgt donor unavailable, falling back to translocation");
                trans_mutation(genome, inst_set, ctx)?;
            }
        }
    } else if span.to > span.from {
        *genome = cut(genome, span.from, span.to - span.from);
        debug!(from = span.from, to = span.to, "lgt deletion");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{nop_catalog, Harness};
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn genome(ops: &[u8]) -> InstructionSequence {
        InstructionSequence::from_ops(ops)
    }

    #[test]
    fn slip_with_equal_endpoints_is_a_no_op() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let original = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        for mode in 0..=4 {
            let mut g = original.clone();
            let fill = SlipFillMode::from_selector(mode).unwrap();
            apply_slip(&mut g, SlipSpan { from: 3, to: 3 }, fill, &set, &mut rng).unwrap();
            assert_eq!(g, original);
        }
    }

    #[test]
    fn slip_duplication_repeats_the_source_span() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        apply_slip(
            &mut g,
            SlipSpan { from: 6, to: 2 },
            SlipFillMode::Duplication,
            &set,
            &mut rng,
        )
        .unwrap();
        assert_eq!(g.ops(), vec![4, 5, 6, 7, 8, 9, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn slip_nop_x_fill_inserts_at_from() {
        let set = nop_catalog();
        let nop_x = set.inst_by_name("nop-X").unwrap().op();
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let original = genome(&[4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
        let mut g = original.clone();
        apply_slip(&mut g, SlipSpan { from: 5, to: 2 }, SlipFillMode::NopX, &set, &mut rng).unwrap();
        let mut expected = original.ops();
        expected.splice(5..5, [nop_x; 3]);
        assert_eq!(g.ops(), expected);
    }

    #[test]
    fn slip_with_to_beyond_from_deletes() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        apply_slip(
            &mut g,
            SlipSpan { from: 2, to: 5 },
            SlipFillMode::Duplication,
            &set,
            &mut rng,
        )
        .unwrap();
        assert_eq!(g.ops(), vec![4, 5, 9, 10, 11]);
    }

    #[test]
    fn scrambled_slip_permutes_the_source_span() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        apply_slip(
            &mut g,
            SlipSpan { from: 7, to: 1 },
            SlipFillMode::Scrambled,
            &set,
            &mut rng,
        )
        .unwrap();
        assert_eq!(g.len(), 14);
        let mut inserted = g.ops()[7..13].to_vec();
        inserted.sort_unstable();
        assert_eq!(inserted, vec![5, 6, 7, 8, 9, 10]);
        assert_eq!(&g.ops()[..7], &[4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(g.ops()[13], 11);
    }

    #[test]
    fn drawn_span_never_covers_the_whole_genome_from_zero() {
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        for _ in 0..500 {
            let span = SlipSpan::draw(&mut rng, 10);
            assert!(span.from <= 10 && span.to <= 10);
            if span.from == 0 {
                assert!(span.to < 10);
            }
        }
    }

    #[test]
    fn translocation_places_duplicate_at_insert_location() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        apply_trans(
            &mut g,
            SlipSpan { from: 4, to: 2 },
            0,
            SpliceFillMode::Duplication,
            &set,
            &mut rng,
        );
        assert_eq!(g.ops(), vec![6, 7, 4, 5, 6, 7, 8, 9, 10, 11]);

        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        apply_trans(
            &mut g,
            SlipSpan { from: 1, to: 4 },
            7,
            SpliceFillMode::Duplication,
            &set,
            &mut rng,
        );
        assert_eq!(g.ops(), vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn unknown_fill_mode_is_fatal() {
        let set = nop_catalog();
        let config = HardwareConfig {
            slip_fill_mode: 9,
            ..HardwareConfig::default()
        };
        let mut harness = Harness::new(8);
        let mut ctx = harness.context(&config);
        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(
            slip_mutation(&mut g, &set, &mut ctx),
            Err(HardwareError::UnknownFillMode {
                operator: "slip",
                mode: 9
            })
        );
    }

    #[test]
    fn lgt_splices_donor_or_falls_back() {
        let set = nop_catalog();
        let config = HardwareConfig::default();
        let parent = genome(&[4; 20]);
        let mut harness = Harness::new(9);
        harness.interface.donor = Some(genome(&[12; 40]));
        let mut grew = false;
        for _ in 0..50 {
            let mut g = parent.clone();
            let mut ctx = harness.context(&config);
            lgt_mutation(&mut g, &parent, &set, &mut ctx).unwrap();
            if g.len() > parent.len() {
                grew = true;
                let donated = g.iter().filter(|i| i.op() == 12).count();
                assert_eq!(donated, g.len() - parent.len());
            }
        }
        assert!(grew);

        harness.interface.donor = None;
        for _ in 0..50 {
            let mut g = parent.clone();
            let mut ctx = harness.context(&config);
            lgt_mutation(&mut g, &parent, &set, &mut ctx).unwrap();
            assert!(g.iter().all(|i| i.op() == 4));
        }
    }

    #[test]
    fn slip_nop_c_and_random_fills_keep_the_flanks() {
        let set = nop_catalog();
        let nop_c = set.inst_by_name("nop-C").unwrap().op();
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let original = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);

        let mut g = original.clone();
        apply_slip(&mut g, SlipSpan { from: 5, to: 2 }, SlipFillMode::NopC, &set, &mut rng).unwrap();
        assert_eq!(g.ops(), vec![4, 5, 6, 7, 8, nop_c, nop_c, nop_c, 9, 10, 11]);

        let mut g = original.clone();
        apply_slip(&mut g, SlipSpan { from: 5, to: 2 }, SlipFillMode::Random, &set, &mut rng).unwrap();
        assert_eq!(g.len(), 11);
        assert_eq!(&g.ops()[..5], &[4, 5, 6, 7, 8]);
        assert_eq!(&g.ops()[8..], &[9, 10, 11]);
        assert!(g.ops()[5..8].iter().all(|&op| usize::from(op) < set.len()));
    }

    #[test]
    fn scrambled_translocation_permutes_the_source_span() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(12);
        let mut g = genome(&[4, 5, 6, 7, 8, 9, 10, 11]);
        apply_trans(
            &mut g,
            SlipSpan { from: 5, to: 1 },
            8,
            SpliceFillMode::Scrambled,
            &set,
            &mut rng,
        );
        assert_eq!(g.len(), 12);
        assert_eq!(&g.ops()[..8], &[4, 5, 6, 7, 8, 9, 10, 11]);
        let mut moved = g.ops()[8..].to_vec();
        moved.sort_unstable();
        assert_eq!(moved, vec![5, 6, 7, 8]);
    }

    #[test]
    fn scrambled_lgt_inserts_a_permuted_donor_prefix() {
        let set = nop_catalog();
        let config = HardwareConfig {
            lgt_fill_mode: 1,
            ..HardwareConfig::default()
        };
        let parent = genome(&[4; 20]);
        let donor = genome(&[12, 13, 14, 15].repeat(10));
        let mut harness = Harness::new(13);
        harness.interface.donor = Some(donor.clone());
        let mut grew = false;
        for _ in 0..50 {
            let mut g = parent.clone();
            let mut ctx = harness.context(&config);
            lgt_mutation(&mut g, &parent, &set, &mut ctx).unwrap();
            if g.len() > parent.len() {
                grew = true;
                let len = g.len() - parent.len();
                let mut donated: Vec<u8> = g.iter().map(Instruction::op).filter(|&op| op != 4).collect();
                let mut expected = donor.slice(0..len).ops();
                donated.sort_unstable();
                expected.sort_unstable();
                assert_eq!(donated, expected);
            }
        }
        assert!(grew);
    }

    #[test]
    fn lgt_deletion_removes_one_contiguous_window() {
        let set = nop_catalog();
        let config = HardwareConfig::default();
        let parent = genome(&(0..16).collect::<Vec<u8>>());
        let mut harness = Harness::new(14);
        harness.interface.donor = Some(genome(&[4; 40]));
        let mut shrank = false;
        for _ in 0..50 {
            let mut g = parent.clone();
            let mut ctx = harness.context(&config);
            lgt_mutation(&mut g, &parent, &set, &mut ctx).unwrap();
            if g.len() < parent.len() {
                shrank = true;
                let removed = parent.len() - g.len();
                let matches_a_window = (0..=g.len()).any(|start| {
                    let mut expected = parent.ops();
                    expected.drain(start..start + removed);
                    expected == g.ops()
                });
                assert!(matches_a_window, "{:?}", g.ops());
            }
        }
        assert!(shrank);
    }

    #[test]
    fn uniform_mutation_respects_size_bounds() {
        let mut g = genome(&[1; 8]);
        assert!(!apply_uniform_choice(&mut g, 16, 16, 3, 8, 20));
        assert_eq!(g.len(), 8);
        assert!(apply_uniform_choice(&mut g, 16, 20, 3, 8, 20));
        assert_eq!(g.len(), 9);
        assert_eq!(g.inst(3).op(), 3);

        let mut full = genome(&[1; 20]);
        assert!(!apply_uniform_choice(&mut full, 16, 17, 0, 8, 20));
        assert_eq!(full.len(), 20);
        assert!(apply_uniform_choice(&mut full, 16, 16, 0, 8, 20));
        assert_eq!(full.len(), 19);
        assert!(apply_uniform_choice(&mut full, 16, 5, 2, 8, 20));
        assert_eq!(full.inst(2).op(), 5);
    }

    #[test]
    fn random_uniform_mutation_stays_in_bounds() {
        let set = nop_catalog();
        let mut rng = ChaCha12Rng::seed_from_u64(10);
        let mut g = genome(&[1; 10]);
        for _ in 0..2000 {
            let before = g.len();
            let changed = uniform_mutation(&mut g, &set, &mut rng, 8, 12);
            assert!((8..=12).contains(&g.len()));
            if !changed {
                assert_eq!(g.len(), before);
            }
        }
    }

    #[test]
    fn descending_batch_insert_matches_adjusted_ascending_insert() {
        let base = genome(&[1, 2, 3, 4, 5, 6]);
        let positions = [4, 0, 6, 2];
        let insts: Vec<Instruction> = [10, 11, 12, 13].into_iter().map(Instruction::new).collect();

        let mut batched = base.clone();
        insert_descending(&mut batched, &positions, &insts);

        let mut ascending: Vec<(usize, Instruction)> =
            positions.iter().copied().zip(insts.iter().copied()).collect();
        ascending.sort_by_key(|&(pos, _)| pos);
        let mut stepwise = base.clone();
        for (already_inserted, (pos, inst)) in ascending.into_iter().enumerate() {
            stepwise.insert(pos + already_inserted, inst);
        }

        assert_eq!(batched, stepwise);
        assert_eq!(batched.ops(), vec![11, 1, 2, 13, 3, 4, 10, 5, 6, 12]);
    }

    #[test]
    fn remove_descending_deletes_original_indices() {
        let mut g = genome(&[0, 1, 2, 3, 4, 5, 6, 7]);
        remove_descending(&mut g, &[1, 6, 3]);
        assert_eq!(g.ops(), vec![0, 2, 4, 5, 7]);
    }
}
