//! The attribute overlay. Per-cell metadata parallel to the memory map,
//! plus the derived "disassembly flags" word the backend contract consumes
//! instead of re-inspecting attributes itself.

use crate::store::Store;
use crate::{Addr, Bus, MemoryType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CellType {
    #[default]
    Untyped,
    UnsignedInt,
    SignedInt,
    Float,
    Char,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Display {
    #[default]
    Default,
    Binary,
    Octal,
    Decimal,
    Hex,
    Char,
    Undisplayable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub used: bool,
    pub cell_type: CellType,
    pub cell_size: u8,
    pub display: Display,
    pub break_before: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            used: true,
            cell_type: CellType::Untyped,
            cell_size: 1,
            display: Display::Default,
            break_before: false,
        }
    }
}

/// `(cellSize - 1)` lives in the low 8 bits alongside the flag bits above.
pub fn cell_size_bits(cell_size: u8) -> u32 {
    (cell_size.saturating_sub(1)) as u32 & 0xff
}

/// A tiny macro standing in for the `bitflags` crate: this project doesn't
/// carry that dependency, so flag words get a local, from-scratch
/// bit-constant struct with `bits()`/`contains()`/`|` — the same shape the
/// teacher generates its segment-flag types with, minus the derive macro.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($repr);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn from_bits(bits: $repr) -> Self {
                $name(bits)
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.0 |= other.0;
                } else {
                    self.0 &= !other.0;
                }
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut names = Vec::new();
                $(if self.contains($name::$flag) { names.push(stringify!($flag)); })*
                write!(f, "{}({:#x})", stringify!($name), self.0)?;
                if !names.is_empty() {
                    write!(f, " [{}]", names.join("|"))?;
                }
                Ok(())
            }
        }
    };
}

bitflags_like! {
    /// The derived 32-bit "disassembly flags" word passed to a backend's
    /// `DisassembleData` so it never needs to re-derive attributes itself
    ///.
    pub struct DisassemblyFlags: u32 {
        const DATA  = 1 << 8;
        const RMB   = 1 << 9;
        const TXT   = 1 << 10;
        const BREAK = 1 << 11;
        const NOTXT = 1 << 12;
    }
}

/// Per-bus attribute store.
#[derive(Default)]
pub struct AttrOverlay {
    buses: [Store<(), Cell>; Bus::COUNT],
}

impl AttrOverlay {
    pub fn new() -> Self {
        AttrOverlay {
            buses: [Store::new(), Store::new(), Store::new()],
        }
    }

    fn store(&self, bus: Bus) -> &Store<(), Cell> {
        &self.buses[bus.index()]
    }

    fn store_mut(&mut self, bus: Bus) -> &mut Store<(), Cell> {
        &mut self.buses[bus.index()]
    }

    /// Allocate default attribute cells in lockstep with a freshly-mapped
    /// memory span. Not overlap-checked against existing attribute spans
    /// beyond what [`Store::add`] already enforces, since attribute spans
    /// and memory spans are always added together.
    pub fn add_span(&mut self, bus: Bus, start: Addr, len: usize) -> anyhow::Result<()> {
        self.store_mut(bus)
            .add(start, (), vec![Cell::default(); len])
    }

    pub fn cell(&self, bus: Bus, addr: Addr) -> Option<&Cell> {
        self.store(bus).get(addr)
    }

    fn cell_mut(&mut self, bus: Bus, addr: Addr) -> Option<&mut Cell> {
        self.store_mut(bus).find_span_mut(addr).and_then(|span| {
            let idx = (addr - span.start()) as usize;
            span.payload_mut().get_mut(idx)
        })
    }

    pub fn is_used(&self, bus: Bus, addr: Addr) -> bool {
        self.cell(bus, addr).map(|c| c.used).unwrap_or(false)
    }

    pub fn set_used(&mut self, bus: Bus, addr: Addr, used: bool) {
        if let Some(cell) = self.cell_mut(bus, addr) {
            cell.used = used;
        }
    }

    pub fn set_cell_type(&mut self, bus: Bus, addr: Addr, cell_type: CellType) {
        if let Some(cell) = self.cell_mut(bus, addr) {
            cell.cell_type = cell_type;
        }
    }

    /// Sets `cellSize` on the primary cell and marks the following
    /// `size - 1` cells unused ("intermediate cells have used=false
    /// after the primary is emitted").
    pub fn set_cell_size(&mut self, bus: Bus, addr: Addr, size: u8) {
        if let Some(cell) = self.cell_mut(bus, addr) {
            cell.cell_size = size;
        }
        for i in 1..size as u32 {
            if let Some(Addr(a)) = addr.checked_add(i) {
                self.set_used(bus, Addr(a), false);
            }
        }
    }

    pub fn set_display(&mut self, bus: Bus, addr: Addr, display: Display) {
        if let Some(cell) = self.cell_mut(bus, addr) {
            cell.display = display;
        }
    }

    pub fn set_break_before(&mut self, bus: Bus, addr: Addr, value: bool) {
        if let Some(cell) = self.cell_mut(bus, addr) {
            cell.break_before = value;
        }
    }

    /// Composes the 32-bit disassembly flags word for `addr`
    /// `prev_mem_type` is the memory type of the cell immediately before
    /// `addr` (or `None` at the start of a bus), used for the `BREAK`
    /// "different memType than previous cell" rule; `has_label` reports
    /// whether a label sits at `addr`.
    pub fn disassembly_flags(
        &self,
        bus: Bus,
        addr: Addr,
        byte: u8,
        mem_type: MemoryType,
        prev_mem_type: Option<MemoryType>,
        has_label: bool,
    ) -> DisassemblyFlags {
        let cell = match self.cell(bus, addr) {
            Some(c) => *c,
            None => return DisassemblyFlags::empty(),
        };
        let mut flags = DisassemblyFlags::from_bits(cell_size_bits(cell.cell_size));
        flags.set(
            DisassemblyFlags::DATA,
            matches!(mem_type, MemoryType::Data | MemoryType::Const | MemoryType::Bss),
        );
        flags.set(DisassemblyFlags::RMB, mem_type == MemoryType::Bss);
        let printable = (0x20..0x7f).contains(&byte);
        let text_allowed = !matches!(
            cell.display,
            Display::Binary | Display::Octal | Display::Decimal | Display::Hex
        );
        flags.set(DisassemblyFlags::TXT, printable && text_allowed);
        flags.set(
            DisassemblyFlags::BREAK,
            prev_mem_type.is_some_and(|p| p != mem_type) || cell.break_before || has_label,
        );
        flags.set(
            DisassemblyFlags::NOTXT,
            matches!(
                cell.display,
                Display::Binary | Display::Octal | Display::Decimal | Display::Hex
            ),
        );
        flags
    }

    pub fn iter_spans(&self, bus: Bus) -> impl Iterator<Item = (Addr, Addr)> + '_ {
        self.store(bus).iter().map(|s| (s.start(), s.end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_cell_implies_typed_or_deflabel_per_spec_invariant() {
        let mut a = AttrOverlay::new();
        a.add_span(Bus::Code, Addr(0), 4).unwrap();
        assert!(a.is_used(Bus::Code, Addr(0)));
        a.set_used(Bus::Code, Addr(0), false);
        assert!(!a.is_used(Bus::Code, Addr(0)));
    }

    #[test]
    fn cell_size_marks_following_cells_unused() {
        let mut a = AttrOverlay::new();
        a.add_span(Bus::Code, Addr(0), 4).unwrap();
        a.set_cell_size(Bus::Code, Addr(0), 2);
        assert!(a.is_used(Bus::Code, Addr(0)));
        assert!(!a.is_used(Bus::Code, Addr(1)));
        assert!(a.is_used(Bus::Code, Addr(2)));
    }

    #[test]
    fn disassembly_flags_set_break_on_memtype_change() {
        let mut a = AttrOverlay::new();
        a.add_span(Bus::Code, Addr(0), 2).unwrap();
        let flags = a.disassembly_flags(
            Bus::Code,
            Addr(0),
            b'A',
            MemoryType::Data,
            Some(MemoryType::Code),
            false,
        );
        assert!(flags.contains(DisassemblyFlags::BREAK));
        assert!(flags.contains(DisassemblyFlags::DATA));
    }

    #[test]
    fn bss_sets_rmb_flag() {
        let a = AttrOverlay::new();
        let flags = a.disassembly_flags(Bus::Code, Addr(0), 0, MemoryType::Bss, None, false);
        // no cell mapped at all -> empty, sanity check the empty path
        assert_eq!(flags, DisassemblyFlags::empty());
    }
}
