//! The label registry. A sorted `Vec` plus a text index, rather than the
//! from-scratch tree the original base class builds its label array on --
//! the registry's two dominant access patterns (range-scan by address,
//! exact-match by text) are well served by a sorted vec + hash index.

use std::collections::HashMap;

use crate::{Addr, Bus, MemoryType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelSource {
    Loader,
    Info,
    Auto,
}

#[derive(Clone, Debug)]
pub struct Label {
    pub address: Addr,
    pub bus: Bus,
    pub mem_type: MemoryType,
    pub text: String,
    pub used: bool,
    pub source: LabelSource,
}

#[derive(Clone, Debug)]
pub struct DefLabel {
    pub text: String,
    pub definition: String,
    pub mem_type: MemoryType,
}

#[derive(Default)]
pub struct LabelRegistry {
    labels: Vec<Label>,
    /// text -> indices into `labels`, kept in sync on insert/remove.
    by_text: HashMap<String, Vec<usize>>,
    def_labels: Vec<DefLabel>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        LabelRegistry::default()
    }

    fn rebuild_text_index(&mut self) {
        self.by_text.clear();
        for (i, l) in self.labels.iter().enumerate() {
            self.by_text.entry(l.text.clone()).or_default().push(i);
        }
    }

    /// De-duplicates by `(address, mem_type, text)` unless `multi_label` is
    /// set, matching `AddLabel`'s default de-dup rule.
    pub fn add_label(
        &mut self,
        address: Addr,
        bus: Bus,
        mem_type: MemoryType,
        text: String,
        used: bool,
        source: LabelSource,
        multi_label: bool,
    ) {
        if !multi_label
            && self.labels.iter().any(|l| {
                l.address == address && l.bus == bus && l.mem_type == mem_type && l.text == text
            })
        {
            return;
        }
        // ascending by address; ties keep insertion order, so insert just
        // past the last existing entry at this address.
        let insert_at = self.labels.partition_point(|l| l.address <= address);
        self.labels.insert(
            insert_at,
            Label {
                address,
                bus,
                mem_type,
                text,
                used,
                source,
            },
        );
        self.rebuild_text_index();
    }

    pub fn remove_at(&mut self, address: Addr, bus: Bus, text: &str) {
        self.labels
            .retain(|l| !(l.address == address && l.bus == bus && l.text == text));
        self.rebuild_text_index();
    }

    pub fn remove_range(&mut self, bus: Bus, from: Addr, to: Addr) {
        self.labels
            .retain(|l| !(l.bus == bus && l.address >= from && l.address <= to));
        self.rebuild_text_index();
    }

    /// Last matching label at `addr`, optionally filtered by `mem_type`
    /// (most-recently-added wins when rendering).
    pub fn find_label(&self, bus: Bus, addr: Addr, mem_type: Option<MemoryType>) -> Option<&Label> {
        self.labels
            .iter()
            .filter(|l| l.bus == bus && l.address == addr)
            .filter(|l| mem_type.is_none_or(|mt| l.mem_type == mt))
            .last()
    }

    pub fn find_by_text(&self, text: &str) -> Option<&Label> {
        let idx = self.by_text.get(text)?.last().copied()?;
        self.labels.get(idx)
    }

    /// Backward scan for the closest named (non-auto) label at or before
    /// `addr`, used to derive `base+N` auto-label text.
    pub fn find_prev_named_label(&self, bus: Bus, addr: Addr) -> Option<&Label> {
        self.labels
            .iter()
            .rev()
            .find(|l| l.bus == bus && l.address <= addr && l.source != LabelSource::Auto)
    }

    pub fn labels_in_range(&self, bus: Bus, from: Addr, to: Addr) -> impl Iterator<Item = &Label> {
        self.labels
            .iter()
            .filter(move |l| l.bus == bus && l.address >= from && l.address <= to)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn has_label(&self, bus: Bus, addr: Addr) -> bool {
        self.labels.iter().any(|l| l.bus == bus && l.address == addr)
    }

    pub fn add_def_label(&mut self, text: String, definition: String, mem_type: MemoryType) {
        self.def_labels.push(DefLabel {
            text,
            definition,
            mem_type,
        });
    }

    pub fn def_labels(&self) -> &[DefLabel] {
        &self.def_labels
    }

    /// Re-entrant expression-label resolution: labels whose
    /// text is `base(+|-)offset` are removed and re-inserted at the computed
    /// address under `base`, used=true. Re-scans from scratch after each
    /// mutation rather than holding an iterator across removal, since
    /// removing can shift positions backing any previously-taken index.
    pub fn resolve_labels(&mut self, bus: Bus) {
        loop {
            let hit = self.labels.iter().enumerate().find_map(|(i, l)| {
                if l.bus != bus || !l.used {
                    return None;
                }
                parse_expression(&l.text).map(|(base, op, offset)| (i, base, op, offset))
            });
            let Some((i, base, op, offset)) = hit else {
                break;
            };
            let removed = self.labels.remove(i);
            let new_addr = match op {
                '+' => removed.address + offset,
                _ => removed.address - offset,
            };
            self.add_label(
                new_addr,
                bus,
                removed.mem_type,
                base,
                true,
                removed.source,
                true,
            );
        }
        self.rebuild_text_index();
    }
}

/// Splits `"base+123"`/`"base-0x10"` into `(base, sign, offset)`. Returns
/// `None` for plain text labels with no trailing signed numeric suffix.
fn parse_expression(text: &str) -> Option<(String, char, u32)> {
    let idx = text.rfind(['+', '-'])?;
    if idx == 0 {
        return None;
    }
    let (base, rest) = text.split_at(idx);
    let sign = rest.chars().next().unwrap();
    let digits = &rest[1..];
    if digits.is_empty() {
        return None;
    }
    let offset = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    Some((base.to_string(), sign, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_in_span_are_ascending_by_address_then_insertion() {
        let mut r = LabelRegistry::new();
        r.add_label(Addr(20), Bus::Code, MemoryType::Code, "b".into(), true, LabelSource::Auto, true);
        r.add_label(Addr(10), Bus::Code, MemoryType::Code, "a".into(), true, LabelSource::Auto, true);
        r.add_label(Addr(10), Bus::Code, MemoryType::Code, "a2".into(), true, LabelSource::Auto, true);
        let texts: Vec<_> = r
            .labels_in_range(Bus::Code, Addr(0), Addr(100))
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(texts, vec!["a", "a2", "b"]);
    }

    #[test]
    fn dedup_rejects_identical_label_without_multi() {
        let mut r = LabelRegistry::new();
        r.add_label(Addr(1), Bus::Code, MemoryType::Code, "x".into(), true, LabelSource::Auto, false);
        r.add_label(Addr(1), Bus::Code, MemoryType::Code, "x".into(), true, LabelSource::Auto, false);
        assert_eq!(r.labels_in_range(Bus::Code, Addr(0), Addr(10)).count(), 1);
    }

    #[test]
    fn resolve_labels_rewrites_expression_labels() {
        let mut r = LabelRegistry::new();
        r.add_label(Addr(0x10), Bus::Code, MemoryType::Code, "base".into(), true, LabelSource::Auto, true);
        r.add_label(Addr(0), Bus::Code, MemoryType::Code, "base+4".into(), true, LabelSource::Auto, true);
        r.resolve_labels(Bus::Code);
        assert!(r.find_label(Bus::Code, Addr(4), None).is_some());
        assert!(r
            .labels_in_range(Bus::Code, Addr(0), Addr(0))
            .all(|l| l.text != "base+4"));
    }

    #[test]
    fn resolve_labels_is_a_fixed_point() {
        let mut r = LabelRegistry::new();
        r.add_label(Addr(0), Bus::Code, MemoryType::Code, "lbl+2".into(), true, LabelSource::Auto, true);
        r.resolve_labels(Bus::Code);
        let before: Vec<_> = r.iter().map(|l| (l.address, l.text.clone())).collect();
        r.resolve_labels(Bus::Code);
        let after: Vec<_> = r.iter().map(|l| (l.address, l.text.clone())).collect();
        assert_eq!(before, after);
    }
}
