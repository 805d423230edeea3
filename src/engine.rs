//! The two-pass engine. Pass 1 (twice) discovers labels;
//! pass 2 renders the listing. Never mutates during render.

use log::{debug, warn};

use crate::attributes::DisassemblyFlags;
use crate::backend::Backend;
use crate::comments::CommentKind;
use crate::database::Database;
use crate::{Addr, Bus, MemoryType};

/// One rendered listing element, in emission order. Kept deliberately plain
/// -- the final column alignment/pretty-printing is an out-of-scope external
/// collaborator; this is its input.
#[derive(Clone, Debug)]
pub enum ListingEvent {
    Blank,
    Label {
        text: String,
        mnemonic: String,
        operands: String,
        comment: Option<String>,
    },
    Line {
        addr: Addr,
        label: Option<String>,
        mnemonic: String,
        operands: String,
        comment: Option<String>,
    },
    Comment(String),
}

pub struct Engine<'a> {
    pub db: &'a mut Database,
    pub max_parm_len: usize,
}

impl<'a> Engine<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Engine { db, max_parm_len: 24 }
    }

    /// Runs parse pass 1, parse pass 1' (re-parse so second-pass-discovered
    /// labels feed first-pass auto-naming), `resolve_labels`, for every bus
    /// the backend exposes.
    pub fn parse_all(&mut self, backend: &mut dyn Backend) {
        for bus in Bus::ALL.into_iter().take(backend.bus_count()) {
            backend.init_parse(self.db, bus);
            self.parse_pass(backend, bus);
            self.parse_pass(backend, bus);
            self.db.labels.resolve_labels(bus);
        }
    }

    fn parse_pass(&mut self, backend: &mut dyn Backend, bus: Bus) {
        let mut addr = self.db.first_used_addr(bus);
        while addr.is_valid() {
            let size = backend.parse(self.db, addr, bus);
            let consumed = if size.is_failure() {
                warn!("parse failure at {addr:?} on {bus:?}; demoting cell to Const");
                self.db.mem.set_mem_type(bus, addr, MemoryType::Const);
                self.db.attrs.set_cell_size(bus, addr, 1);
                self.db
                    .attrs
                    .set_cell_type(bus, addr, crate::attributes::CellType::Untyped);
                1
            } else {
                size.0.max(1)
            };
            addr = self.db.next_addr(bus, addr + (consumed as u32 - 1));
        }
    }

    /// Renders every bus with mapped memory into a flat event stream (pass
    /// 2). Read-only over `Database` beyond `BREAK`-on-comment bookkeeping,
    /// which render asserts just-in-time.
    pub fn render_all(&mut self, backend: &mut dyn Backend) -> Vec<ListingEvent> {
        let mut events = Vec::new();
        for bus in Bus::ALL.into_iter().take(backend.bus_count()) {
            if self.db.mem.iter_spans(bus).next().is_none() {
                continue;
            }
            events.extend(self.render_def_label_header(backend));
            events.extend(self.render_unused_label_header(backend, bus));
            events.extend(self.render_bus(backend, bus));
        }
        events
    }

    fn render_def_label_header(&mut self, backend: &mut dyn Backend) -> Vec<ListingEvent> {
        let mut out = Vec::new();
        let defs: Vec<_> = self.db.labels.def_labels().to_vec();
        for def in &defs {
            if let Some(line) = backend.disassemble_def_label(self.db, def) {
                out.push(ListingEvent::Label {
                    text: def.text.clone(),
                    mnemonic: line.mnemonic,
                    operands: line.operands,
                    comment: None,
                });
            }
        }
        out
    }

    /// Used labels whose cell is `Untyped` (no data there) get a header line
    /// via `DisassembleLabel`.
    fn render_unused_label_header(&mut self, backend: &mut dyn Backend, bus: Bus) -> Vec<ListingEvent> {
        let mut out = Vec::new();
        let candidates: Vec<(Addr, String)> = self
            .db
            .labels
            .iter()
            .filter(|l| l.bus == bus && l.used)
            .filter(|l| self.db.mem.mem_type(bus, l.address) == Some(MemoryType::Untyped) || !self.db.mem.is_mapped(bus, l.address))
            .map(|l| (l.address, l.text.clone()))
            .collect();
        for (_addr, text) in candidates {
            if let Some(line) = backend.disassemble_label(self.db, &text) {
                out.push(ListingEvent::Label {
                    text,
                    mnemonic: line.mnemonic,
                    operands: line.operands,
                    comment: None,
                });
            }
        }
        out
    }

    fn render_bus(&mut self, backend: &mut dyn Backend, bus: Bus) -> Vec<ListingEvent> {
        let mut out = Vec::new();
        let mut addr = self.db.first_used_addr(bus);
        let mut prev_addr: Option<Addr> = None;
        let mut prev_size: u32 = 0;

        while addr.is_valid() {
            self.db.assert_break_on_comment(bus, addr);

            let mem_type = self.db.mem.mem_type(bus, addr).unwrap_or(MemoryType::Untyped);
            let label = self.db.label_text_at(bus, addr).map(str::to_string);
            let flags = self.db.attrs.disassembly_flags(
                bus,
                addr,
                self.db.mem.get_byte(bus, addr).unwrap_or(0),
                mem_type,
                prev_addr.and_then(|p| self.db.mem.mem_type(bus, p)),
                label.is_some(),
            );

            // spec.md:85 -- BREAK is the prior-memType-changed / breakBefore /
            // label-here three-way OR, not the raw `breakBefore` bit alone.
            if flags.contains(DisassemblyFlags::BREAK) {
                out.push(ListingEvent::Blank);
            }

            for c in self.db.comments.get(bus, addr, CommentKind::Before) {
                out.push(ListingEvent::Comment(c.to_string()));
            }

            if let Some(change) = backend.disassemble_changes(self.db, addr, bus, false) {
                out.push(ListingEvent::Comment(format!("{} {}", change.mnemonic, change.operands)));
            }

            let line_comment = self.db.comments.get(bus, addr, CommentKind::Line).join("; ");
            let line_comment = (!line_comment.is_empty()).then_some(line_comment);

            let (size, mnemonic, operands) = if mem_type == MemoryType::Code {
                let (size, line) = backend.disassemble_code(self.db, addr, bus);
                let size = if size.is_failure() {
                    debug!("disassemble_code failure at {addr:?}; demoted to Const FCB");
                    self.db.mem.set_mem_type(bus, addr, MemoryType::Const);
                    self.db.attrs.set_cell_size(bus, addr, 1);
                    1
                } else {
                    size.0.max(1)
                };
                (size, line.mnemonic, line.operands)
            } else {
                let end = self.db.consecutive_data_run(bus, addr, self.max_parm_len);
                let (size, line) = backend.disassemble_data(self.db, addr, end, bus, flags, self.max_parm_len);
                (size.0.max(1), line.mnemonic, line.operands)
            };

            out.push(ListingEvent::Line {
                addr,
                label,
                mnemonic,
                operands,
                comment: line_comment,
            });

            for c in self.db.comments.get(bus, addr, CommentKind::After) {
                out.push(ListingEvent::Comment(c.to_string()));
            }
            if let Some(change) = backend.disassemble_changes(self.db, addr, bus, true) {
                out.push(ListingEvent::Comment(format!("{} {}", change.mnemonic, change.operands)));
            }

            prev_addr = Some(addr);
            prev_size = size as u32;
            addr = self.db.next_addr(bus, addr + (prev_size - 1));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::m6800::M6800;
    use crate::{Addr, Bus, MemoryType};

    #[test]
    fn end_to_end_branch_listing() {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0x100), MemoryType::Code, vec![0x20, 0x02, 0x01, 0x01, 0x39])
            .unwrap();
        let mut backend = M6800::new();
        let mut engine = Engine::new(&mut db);
        engine.parse_all(&mut backend);
        let events = engine.render_all(&mut backend);
        let first_line = events.iter().find_map(|e| match e {
            ListingEvent::Line { addr, mnemonic, operands, .. } if *addr == Addr(0x100) => {
                Some((mnemonic.clone(), operands.clone()))
            }
            _ => None,
        });
        assert_eq!(first_line, Some(("BRA".to_string(), "Z0104".to_string())));
    }

    #[test]
    fn phase_rewrites_jsr_target_in_listing() {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0x200), MemoryType::Code, vec![0xBD, 0x82, 0x34])
            .unwrap();
        db.transforms.add_phase(Bus::Code, Addr(0x200), 0x100, Addr(0x8000)).unwrap();
        let mut backend = M6800::new();
        let mut engine = Engine::new(&mut db);
        engine.parse_all(&mut backend);
        let events = engine.render_all(&mut backend);
        let line = events.iter().find_map(|e| match e {
            ListingEvent::Line { addr, mnemonic, operands, .. } if *addr == Addr(0x200) => {
                Some((mnemonic.clone(), operands.clone()))
            }
            _ => None,
        });
        let (mnemonic, operands) = line.unwrap();
        assert_eq!(mnemonic, "JSR");
        assert_eq!(operands, "Z8234");
    }

    #[test]
    fn get_next_addr_strictly_increases_across_a_run() {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0), MemoryType::Code, vec![0x01, 0x01, 0x39])
            .unwrap();
        let mut a = Addr(0);
        loop {
            let next = db.next_addr(Bus::Code, a);
            if !next.is_valid() {
                break;
            }
            assert!(next > a);
            a = next;
        }
    }
}
