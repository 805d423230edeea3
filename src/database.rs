//! Ties the memory map, attribute overlay, label registry, comment store,
//! and address transforms together per bus, plus the info-script-only remap
//! table. This is the Rust-side replacement for the monolithic C++
//! `Disassembler` base class: the decode contract lives in [`crate::backend`],
//! everything stateful lives here.

use anyhow::Result;

use crate::attributes::{AttrOverlay, CellType, Display};
use crate::comments::{CommentKind, CommentStore};
use crate::labels::{Label, LabelRegistry, LabelSource};
use crate::memmap::MemMap;
use crate::store::Store;
use crate::transforms::Transforms;
use crate::{Addr, Bus, Endianness, MemoryType};

/// Cumulative, info-file-only address bias applied while parsing directive
/// addresses in subsequent lines (`REMAP`). Not applied to the
/// engine's own address walk -- only to addresses textually written in an
/// info file from that point on.
#[derive(Default)]
pub struct RemapTable {
    spans: Vec<(Addr, Addr, i64)>,
}

impl RemapTable {
    pub fn new() -> Self {
        RemapTable::default()
    }

    pub fn add(&mut self, from: Addr, to: Addr, offset: i64) {
        self.spans.push((from, to, offset));
    }

    /// Sums every matching, previously-registered offset -- REMAP directives
    /// are cumulative within a window ("bias... cumulative").
    pub fn apply(&self, addr: Addr) -> Addr {
        let mut v = addr.0 as i64;
        for (from, to, offset) in &self.spans {
            if addr >= *from && addr <= *to {
                v += offset;
            }
        }
        Addr(v as u32)
    }
}

pub struct Database {
    pub mem: MemMap,
    pub attrs: AttrOverlay,
    pub transforms: Transforms,
    pub labels: LabelRegistry,
    pub comments: CommentStore,
    pub remap: [RemapTable; Bus::COUNT],
    /// Option, set by a backend/CLI flag: permit more than one label per
    /// `(addr, memType, text)`.
    pub multi_label: bool,
}

impl Database {
    pub fn new() -> Self {
        Database {
            mem: MemMap::new(),
            attrs: AttrOverlay::new(),
            transforms: Transforms::new(),
            labels: LabelRegistry::new(),
            comments: CommentStore::new(),
            remap: [RemapTable::new(), RemapTable::new(), RemapTable::new()],
            multi_label: false,
        }
    }

    pub fn load_span(&mut self, bus: Bus, start: Addr, mem_type: MemoryType, data: Vec<u8>) -> Result<()> {
        self.attrs.add_span(bus, start, data.len())?;
        self.mem.add_span(bus, start, mem_type, data)
    }

    /// `GetNextAddr`: smallest mapped address strictly greater than `addr`
    /// that is also `used`. Linear in the number of intervening
    /// unused cells, same as the scan the original performs; unlike the
    /// original it starts from a `BTreeMap` range query rather than a flat
    /// byte-array walk.
    pub fn next_addr(&self, bus: Bus, addr: Addr) -> Addr {
        let mut cur = addr;
        while let Some(next) = self.mem.next_mapped_addr(bus, cur) {
            if self.attrs.is_used(bus, next) {
                return next;
            }
            cur = next;
        }
        Addr::NO_ADDRESS
    }

    pub fn first_used_addr(&self, bus: Bus) -> Addr {
        match self.mem.iter_spans(bus).next() {
            Some((start, _, _)) if self.attrs.is_used(bus, start) => start,
            Some((start, _, _)) => self.next_addr(bus, start),
            None => Addr::NO_ADDRESS,
        }
    }

    /// Resolves an operand address the way every backend must: relative
    /// bias, then phase rewrite, composed in a fixed order (relative, then
    /// phase); any deviation is a backend bug. `decoded_at` is the address
    /// of the instruction/cell that produced `raw`.
    pub fn resolve_operand_target(&self, bus: Bus, raw: Addr, decoded_at: Addr) -> Addr {
        let biased = raw + self.transforms.relative(bus, decoded_at);
        self.transforms.phase_inner(bus, biased, decoded_at)
    }

    /// Reverses phase rewriting for a target that is rendered while its
    /// label lives outside the phase span (`DephaseOuter`).
    pub fn dephase_for_render(&self, bus: Bus, value: Addr, decoded_at: Addr) -> Addr {
        self.transforms.dephase_outer(bus, value, decoded_at)
    }

    /// Auto-label creation during pass 1: `"Z" + hex` for code
    /// targets, `"M" + hex` for data targets, or `base+N` when a
    /// prior-named label already dominates the address.
    pub fn auto_label(&mut self, bus: Bus, target: Addr, mem_type: MemoryType) -> String {
        if let Some(existing) = self.labels.find_label(bus, target, None) {
            return existing.text.clone();
        }
        if let Some(prev) = self.labels.find_prev_named_label(bus, target) {
            if prev.address != target {
                let delta = target - prev.address;
                let text = format!("{}+{delta:X}", prev.text);
                self.labels.add_label(
                    target,
                    bus,
                    mem_type,
                    text.clone(),
                    true,
                    LabelSource::Auto,
                    self.multi_label,
                );
                return text;
            }
        }
        let prefix = if mem_type == MemoryType::Code { 'Z' } else { 'M' };
        let text = format!("{prefix}{:04X}", target.0);
        self.labels.add_label(
            target,
            bus,
            mem_type,
            text.clone(),
            true,
            LabelSource::Auto,
            self.multi_label,
        );
        text
    }

    /// Pointer-target label for `CVECTOR`/`DVECTOR` entries: `Z|M<tgt>via<here>`
    ///. No bounds validation against the bus range -- an
    /// out-of-range target still gets a label, matching the original's
    /// unchecked behavior ("probable source bug", preserved as-is).
    pub fn vector_label(&mut self, bus: Bus, target: Addr, here: Addr, mem_type: MemoryType) -> String {
        let prefix = if mem_type == MemoryType::Code { 'Z' } else { 'M' };
        let text = format!("{prefix}{:04X}via{:04X}", target.0, here.0);
        self.labels.add_label(
            target,
            bus,
            mem_type,
            text.clone(),
            true,
            LabelSource::Auto,
            true,
        );
        text
    }

    pub fn label_text_at(&self, bus: Bus, addr: Addr) -> Option<&str> {
        self.labels
            .find_label(bus, addr, None)
            .map(|l: &Label| l.text.as_str())
    }

    /// `GetConsecutiveData`: longest run from `addr` where `memType`,
    /// `display`, `cellType`, `cellSize` all match the first cell and no
    /// `breakBefore`/label forces a cut, capped by `max_bytes`.
    pub fn consecutive_data_run(&self, bus: Bus, addr: Addr, max_bytes: usize) -> Addr {
        let Some(first) = self.attrs.cell(bus, addr).copied() else {
            return addr + 1;
        };
        let first_mem = self.mem.mem_type(bus, addr);
        let mut cur = addr;
        let mut count = 1usize;
        loop {
            let Some(next) = self.mem.next_mapped_addr(bus, cur) else {
                break;
            };
            if !self.attrs.is_used(bus, next) {
                cur = next;
                continue;
            }
            if next != cur + 1 {
                break;
            }
            if count >= max_bytes {
                break;
            }
            let Some(cell) = self.attrs.cell(bus, next) else {
                break;
            };
            if cell.cell_type != first.cell_type
                || cell.cell_size != first.cell_size
                || cell.display != first.display
                || cell.break_before
                || self.mem.mem_type(bus, next) != first_mem
                || self.labels.has_label(bus, next)
            {
                break;
            }
            cur = next;
            count += 1;
        }
        cur + 1
    }

    pub fn endian_swap_needed(&self, target: Endianness) -> bool {
        target == Endianness::Little
    }

    pub fn cell_type_is_textual(&self, bus: Bus, addr: Addr) -> bool {
        matches!(
            self.attrs.cell(bus, addr).map(|c| c.cell_type),
            Some(CellType::Char)
        )
    }

    pub fn display_is_explicit(&self, bus: Bus, addr: Addr) -> bool {
        matches!(
            self.attrs.cell(bus, addr).map(|c| c.display),
            Some(Display::Binary | Display::Octal | Display::Decimal | Display::Hex)
        )
    }

    pub fn assert_break_on_comment(&mut self, bus: Bus, addr: Addr) {
        if self.comments.has_comment_at(bus, addr) {
            self.attrs.set_break_before(bus, addr, true);
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_addr_skips_unused_cells() {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0), MemoryType::Code, vec![1, 2, 3])
            .unwrap();
        db.attrs.set_used(Bus::Code, Addr(1), false);
        assert_eq!(db.next_addr(Bus::Code, Addr(0)), Addr(2));
    }

    #[test]
    fn auto_label_uses_z_prefix_for_code() {
        let mut db = Database::new();
        let text = db.auto_label(Bus::Code, Addr(0x104), MemoryType::Code);
        assert_eq!(text, "Z0104");
    }

    #[test]
    fn auto_label_uses_m_prefix_for_data() {
        let mut db = Database::new();
        let text = db.auto_label(Bus::Code, Addr(0x1000), MemoryType::Data);
        assert_eq!(text, "M1000");
    }

    #[test]
    fn vector_label_has_via_suffix() {
        let mut db = Database::new();
        let text = db.vector_label(Bus::Code, Addr(0x1234), Addr(0x1000), MemoryType::Code);
        assert_eq!(text, "Z1234via1000");
    }

    #[test]
    fn resolve_operand_target_composes_relative_then_phase() {
        let mut db = Database::new();
        db.transforms
            .add_relative(Bus::Code, Addr(0x100), 1, Addr(0x4000))
            .unwrap();
        db.transforms
            .add_phase(Bus::Code, Addr(0x100), 1, Addr(0x8000))
            .unwrap();
        // raw + relative = 0x4000 + decoded operand, then phased -- exact
        // numeric result isn't asserted here, only that both transforms run.
        let target = db.resolve_operand_target(Bus::Code, Addr(0x10), Addr(0x100));
        assert_ne!(target, Addr(0x10));
    }
}
