use std::ops::Range;

/// Opcode index into an [`crate::inst_set::InstructionSet`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instruction(u8);

impl Instruction {
    pub const fn new(op: u8) -> Self {
        Self(op)
    }

    pub const fn op(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for Instruction {
    fn from(op: u8) -> Self {
        Self(op)
    }
}

/// Per-site execution metadata. Not part of genome identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SiteFlags(u8);

impl SiteFlags {
    pub const EXECUTED: u8 = 0b0001;
    pub const COPIED: u8 = 0b0010;
    pub const MUTATED: u8 = 0b0100;

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Site {
    inst: Instruction,
    flags: SiteFlags,
}

impl Site {
    fn bare(inst: Instruction) -> Self {
        Self {
            inst,
            flags: SiteFlags::default(),
        }
    }
}

/// Ordered, resizable genome (or CPU memory) with per-site flags.
///
/// Equality compares opcodes only, so a freshly copied offspring equals its
/// parent even though the parent's sites carry executed/copied marks.
#[derive(Clone, Debug, Default)]
pub struct InstructionSequence {
    sites: Vec<Site>,
}

impl PartialEq for InstructionSequence {
    fn eq(&self, other: &Self) -> bool {
        self.sites.len() == other.sites.len()
            && self
                .sites
                .iter()
                .zip(&other.sites)
                .all(|(a, b)| a.inst == b.inst)
    }
}

impl Eq for InstructionSequence {}

impl FromIterator<Instruction> for InstructionSequence {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self {
            sites: iter.into_iter().map(Site::bare).collect(),
        }
    }
}

impl InstructionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: &[u8]) -> Self {
        ops.iter().copied().map(Instruction::new).collect()
    }

    pub fn repeat(inst: Instruction, len: usize) -> Self {
        Self {
            sites: vec![Site::bare(inst); len],
        }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<Instruction> {
        self.sites.get(pos).map(|s| s.inst)
    }

    /// Instruction at `pos`. Panics when out of range, like slice indexing.
    pub fn inst(&self, pos: usize) -> Instruction {
        self.sites[pos].inst
    }

    /// Replace the opcode at `pos`, keeping the site's flags.
    pub fn set(&mut self, pos: usize, inst: Instruction) {
        self.sites[pos].inst = inst;
    }

    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        self.sites.insert(pos, Site::bare(inst));
    }

    pub fn remove(&mut self, pos: usize) -> Instruction {
        self.sites.remove(pos).inst
    }

    pub fn push(&mut self, inst: Instruction) {
        self.sites.push(Site::bare(inst));
    }

    /// Grow with default instructions or truncate to `new_len`.
    pub fn resize(&mut self, new_len: usize) {
        self.sites.resize(new_len, Site::default());
    }

    pub fn truncate(&mut self, len: usize) {
        self.sites.truncate(len);
    }

    /// Split off everything from `at` onwards, flags included.
    pub fn split_off(&mut self, at: usize) -> Self {
        Self {
            sites: self.sites.split_off(at),
        }
    }

    /// Copy of the opcodes in `range` without flags.
    pub fn slice(&self, range: Range<usize>) -> Self {
        self.sites[range].iter().map(|s| s.inst).collect()
    }

    /// Insert every instruction of `fragment` starting at `pos`.
    pub fn insert_fragment(&mut self, pos: usize, fragment: &InstructionSequence) {
        let tail = self.sites.split_off(pos);
        self.sites
            .extend(fragment.sites.iter().map(|s| Site::bare(s.inst)));
        self.sites.extend(tail);
    }

    /// Read `len` instructions downstream of `start`, wrapping around the end.
    pub fn wrapping_fragment(&self, start: usize, len: usize) -> Self {
        if self.sites.is_empty() {
            return Self::new();
        }
        (0..len)
            .map(|i| self.sites[(start + i) % self.sites.len()].inst)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.sites.iter().map(|s| s.inst)
    }

    pub fn ops(&self) -> Vec<u8> {
        self.iter().map(Instruction::op).collect()
    }

    pub fn flags(&self, pos: usize) -> SiteFlags {
        self.sites[pos].flags
    }

    pub fn is_executed(&self, pos: usize) -> bool {
        self.sites[pos].flags.contains(SiteFlags::EXECUTED)
    }

    pub fn set_executed(&mut self, pos: usize, on: bool) {
        self.sites[pos].flags.set(SiteFlags::EXECUTED, on);
    }

    pub fn is_copied(&self, pos: usize) -> bool {
        self.sites[pos].flags.contains(SiteFlags::COPIED)
    }

    pub fn set_copied(&mut self, pos: usize, on: bool) {
        self.sites[pos].flags.set(SiteFlags::COPIED, on);
    }

    pub fn is_mutated(&self, pos: usize) -> bool {
        self.sites[pos].flags.contains(SiteFlags::MUTATED)
    }

    pub fn set_mutated(&mut self, pos: usize, on: bool) {
        self.sites[pos].flags.set(SiteFlags::MUTATED, on);
    }

    /// Number of executed sites among the first `limit` positions.
    pub fn count_executed(&self, limit: usize) -> usize {
        self.sites
            .iter()
            .take(limit)
            .filter(|s| s.flags.contains(SiteFlags::EXECUTED))
            .count()
    }

    /// Number of copied sites within `range` (clamped to the sequence).
    pub fn count_copied(&self, range: Range<usize>) -> usize {
        let end = range.end.min(self.sites.len());
        let start = range.start.min(end);
        self.sites[start..end]
            .iter()
            .filter(|s| s.flags.contains(SiteFlags::COPIED))
            .count()
    }

    pub fn set_all_flags(&mut self, flag: u8, on: bool) {
        for site in &mut self.sites {
            site.flags.set(flag, on);
        }
    }

    pub fn clear_flags(&mut self) {
        for site in &mut self.sites {
            site.flags = SiteFlags::default();
        }
    }
}
