//! The backend contract. A backend is stateless decode/render logic;
//! all addressable state lives in [`crate::database::Database`] (the split
//! that replaces the original monolithic `Disassembler` base class -- see
//! `REDESIGN FLAGS` for the rationale).

use crate::attributes::DisassemblyFlags;
use crate::database::Database;
use crate::labels::DefLabel;
use crate::{Addr, Architecture, Bus, Endianness, MemoryType};

/// What a decode/render step consumed, so the engine can advance its walk
/// and demote a cell on hard failure ("Failure semantics").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeSize(pub usize);

impl DecodeSize {
    pub const FAILURE: DecodeSize = DecodeSize(0);

    pub fn is_failure(self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Debug)]
pub struct RenderedLine {
    pub mnemonic: String,
    pub operands: String,
}

/// A named, backend-declared option with help text (`SetOption`/`GetOption`).
pub struct OptionSpec {
    pub name: &'static str,
    pub help: &'static str,
}

/// Outcome of a backend's attempt to consume an info-script directive its
/// generic handling doesn't cover ("a backend that consumes the
/// directive returns a flag that suppresses generic handling").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoHandled {
    Consumed,
    NotMine,
}

pub trait Backend {
    fn name(&self) -> &'static str;
    fn endianness(&self) -> Endianness;
    fn architecture(&self) -> Architecture;
    fn bus_count(&self) -> usize;
    fn bus_width(&self, bus: Bus) -> u32;
    fn lowest_addr(&self, bus: Bus) -> Addr;
    fn highest_addr(&self, bus: Bus) -> Addr;
    fn code_ptr_size(&self) -> u8;
    fn data_ptr_size(&self) -> u8;
    fn default_memory_type(&self, bus: Bus) -> MemoryType;

    fn options(&self) -> &[OptionSpec];
    fn set_option(&mut self, name: &str, value: &str) -> anyhow::Result<()>;
    fn get_option(&self, name: &str) -> Option<String>;

    /// One-time per-bus setup before pass 1 begins (`InitParse`).
    fn init_parse(&mut self, _db: &mut Database, _bus: Bus) {}

    /// Decodes the instruction/cell at `addr`, registers any operand
    /// addresses as used labels (through relative+phase resolution first),
    /// and returns how many bytes it consumed.
    fn parse(&mut self, db: &mut Database, addr: Addr, bus: Bus) -> DecodeSize;

    /// Same decode as `parse`, but renders mnemonic/operand text -- operand
    /// addresses render through the label registry, falling back to a
    /// plain numeric `Address2String`.
    fn disassemble_code(&mut self, db: &mut Database, addr: Addr, bus: Bus) -> (DecodeSize, RenderedLine);

    /// Renders a run of non-code cells as `FCB`/`FDB`/`FCC`/... per the
    /// cell's disassembly flags. `flags` is the already-computed 32-bit
    /// disassembly-flags word for `addr` (`AttrOverlay::disassembly_flags`)
    /// so the backend doesn't need to re-derive `DATA`/`RMB`/`TXT`/`BREAK`
    /// from the raw attributes itself.
    fn disassemble_data(
        &mut self,
        db: &mut Database,
        addr: Addr,
        end: Addr,
        bus: Bus,
        flags: DisassemblyFlags,
        max_parm_len: usize,
    ) -> (DecodeSize, RenderedLine);

    /// Default no-op hooks a base disassembler doesn't need to override.
    fn disassemble_label(&mut self, _db: &Database, _label_text: &str) -> Option<RenderedLine> {
        None
    }

    fn disassemble_def_label(&mut self, _db: &Database, _def: &DefLabel) -> Option<RenderedLine> {
        None
    }

    fn disassemble_changes(
        &mut self,
        _db: &Database,
        _addr: Addr,
        _bus: Bus,
        _after_line: bool,
    ) -> Option<RenderedLine> {
        None
    }

    /// First chance at an info-script directive the generic interpreter
    /// doesn't recognize.
    fn process_info(&mut self, _db: &mut Database, _keyword: &str, _args: &[&str]) -> InfoHandled {
        InfoHandled::NotMine
    }

    /// Converts numeric text in the info file's current radix, honoring a
    /// `0x` override to hex.
    fn string_to_number(&self, text: &str, default_radix: u32) -> Option<i64> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16).ok();
        }
        if let Some(neg) = text.strip_prefix('-') {
            return parse_radix(neg, default_radix).map(|v| -v);
        }
        parse_radix(text, default_radix)
    }

    fn number_to_string(&self, value: i64, radix: u32) -> String {
        match radix {
            16 => format!("{value:X}"),
            8 => format!("{value:o}"),
            2 => format!("{value:b}"),
            _ => format!("{value}"),
        }
    }

    /// Renders an address as a backend-formatted number (fallback when no
    /// label covers it).
    fn address_to_string(&self, addr: Addr) -> String {
        format!("${:X}", addr.0)
    }
}

fn parse_radix(text: &str, radix: u32) -> Option<i64> {
    i64::from_str_radix(text, radix).ok()
}
