//! The comment store. `[bus][kind]`-indexed, multi-value per address,
//! with `prepend` entries ordered ahead of append entries at render time
//! ('s Comment ordering rule).

use std::collections::HashMap;

use crate::{Addr, Bus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommentKind {
    Before,
    After,
    Line,
}

#[derive(Default)]
pub struct CommentStore {
    entries: HashMap<(Bus, Addr, CommentKind), Vec<(bool, String)>>,
}

impl CommentStore {
    pub fn new() -> Self {
        CommentStore::default()
    }

    pub fn add(&mut self, bus: Bus, addr: Addr, kind: CommentKind, text: String, prepend: bool) {
        self.entries
            .entry((bus, addr, kind))
            .or_default()
            .push((prepend, text));
    }

    pub fn remove_range(&mut self, bus: Bus, kind: CommentKind, from: Addr, to: Addr) {
        self.entries
            .retain(|(b, a, k), _| !(*b == bus && *k == kind && *a >= from && *a <= to));
    }

    /// Comments for `(bus, addr, kind)` in render order: all `prepend`
    /// entries first (insertion order), then all append entries (insertion
    /// order).
    pub fn get(&self, bus: Bus, addr: Addr, kind: CommentKind) -> Vec<&str> {
        let Some(entries) = self.entries.get(&(bus, addr, kind)) else {
            return Vec::new();
        };
        let mut prepended: Vec<&str> = entries
            .iter()
            .filter(|(p, _)| *p)
            .map(|(_, t)| t.as_str())
            .collect();
        let appended = entries
            .iter()
            .filter(|(p, _)| !*p)
            .map(|(_, t)| t.as_str());
        prepended.extend(appended);
        prepended
    }

    pub fn has_any(&self, bus: Bus, addr: Addr, kind: CommentKind) -> bool {
        self.entries
            .get(&(bus, addr, kind))
            .is_some_and(|v| !v.is_empty())
    }

    /// True if any comment exists at `addr` on `bus`, regardless of kind --
    /// used to assert the `BREAK` attribute on commented addresses: a
    /// `BREAK` is asserted on every commented address.
    pub fn has_comment_at(&self, bus: Bus, addr: Addr) -> bool {
        [CommentKind::Before, CommentKind::After, CommentKind::Line]
            .into_iter()
            .any(|k| self.has_any(bus, addr, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_entries_precede_append_entries() {
        let mut c = CommentStore::new();
        c.add(Bus::Code, Addr(0), CommentKind::Before, "appended first".into(), false);
        c.add(Bus::Code, Addr(0), CommentKind::Before, "prepended second".into(), true);
        let rendered = c.get(Bus::Code, Addr(0), CommentKind::Before);
        assert_eq!(rendered, vec!["prepended second", "appended first"]);
    }

    #[test]
    fn remove_range_only_touches_selected_kind_and_bus() {
        let mut c = CommentStore::new();
        c.add(Bus::Code, Addr(5), CommentKind::Line, "x".into(), false);
        c.add(Bus::Data, Addr(5), CommentKind::Line, "y".into(), false);
        c.remove_range(Bus::Code, CommentKind::Line, Addr(0), Addr(10));
        assert!(c.get(Bus::Code, Addr(5), CommentKind::Line).is_empty());
        assert_eq!(c.get(Bus::Data, Addr(5), CommentKind::Line), vec!["y"]);
    }
}
