//! The memory map. One [`Store`] of raw bytes per bus, typed multibyte
//! accessors layered on top of [`Store::get_range`]/[`Store::set_range`].

use anyhow::{ensure, Result};

use crate::store::Store;
use crate::{Addr, Bus, Endianness, MemoryType};

/// Per-bus byte storage.
#[derive(Default)]
pub struct MemMap {
    buses: [Store<MemoryType, u8>; Bus::COUNT],
}

impl MemMap {
    pub fn new() -> Self {
        MemMap {
            buses: [Store::new(), Store::new(), Store::new()],
        }
    }

    fn store(&self, bus: Bus) -> &Store<MemoryType, u8> {
        &self.buses[bus.index()]
    }

    fn store_mut(&mut self, bus: Bus) -> &mut Store<MemoryType, u8> {
        &mut self.buses[bus.index()]
    }

    pub fn add_span(
        &mut self,
        bus: Bus,
        start: Addr,
        mem_type: MemoryType,
        data: Vec<u8>,
    ) -> Result<()> {
        self.store_mut(bus).add(start, mem_type, data)
    }

    pub fn get_byte(&self, bus: Bus, addr: Addr) -> Option<u8> {
        self.store(bus).get(addr).copied()
    }

    pub fn set_byte(&mut self, bus: Bus, addr: Addr, value: u8) -> bool {
        self.store_mut(bus).set(addr, value)
    }

    pub fn mem_type(&self, bus: Bus, addr: Addr) -> Option<MemoryType> {
        self.store(bus).find_span(addr).map(|s| *s.tag())
    }

    pub fn set_mem_type(&mut self, bus: Bus, addr: Addr, mem_type: MemoryType) {
        if let Some(span) = self.store_mut(bus).find_span_mut(addr) {
            span.set_tag(mem_type);
        }
    }

    fn get_range(&self, bus: Bus, addr: Addr, len: usize) -> Option<Vec<u8>> {
        self.store(bus).get_range(addr, len)
    }

    /// Multibyte read honoring `endian`; bytes are stored in the order they
    /// were loaded (i.e. wire order), so only a target of [`Endianness::Little`]
    /// needs a swap relative to storage, which mirrors `getRange`'s
    /// `swapEndian` in spec's original host/target comparison collapsed to
    /// "does target disagree with big-endian wire order".
    fn get_multi(&self, bus: Bus, addr: Addr, len: usize, endian: Endianness) -> Option<u64> {
        let bytes = self.get_range(bus, addr, len)?;
        let mut value: u64 = 0;
        match endian {
            Endianness::Big => {
                for b in &bytes {
                    value = (value << 8) | *b as u64;
                }
            }
            Endianness::Little => {
                for b in bytes.iter().rev() {
                    value = (value << 8) | *b as u64;
                }
            }
        }
        Some(value)
    }

    fn set_multi(&mut self, bus: Bus, addr: Addr, len: usize, value: u64, endian: Endianness) -> bool {
        let mut bytes = vec![0u8; len];
        match endian {
            Endianness::Big => {
                for (i, b) in bytes.iter_mut().rev().enumerate() {
                    *b = ((value >> (i * 8)) & 0xff) as u8;
                }
            }
            Endianness::Little => {
                for (i, b) in bytes.iter_mut().enumerate() {
                    *b = ((value >> (i * 8)) & 0xff) as u8;
                }
            }
        }
        self.store_mut(bus).set_range(addr, &bytes)
    }

    pub fn get_u16(&self, bus: Bus, addr: Addr, endian: Endianness) -> Option<u16> {
        self.get_multi(bus, addr, 2, endian).map(|v| v as u16)
    }

    pub fn set_u16(&mut self, bus: Bus, addr: Addr, value: u16, endian: Endianness) -> bool {
        self.set_multi(bus, addr, 2, value as u64, endian)
    }

    pub fn get_s16(&self, bus: Bus, addr: Addr, endian: Endianness) -> Option<i16> {
        self.get_u16(bus, addr, endian).map(|v| v as i16)
    }

    pub fn get_u32(&self, bus: Bus, addr: Addr, endian: Endianness) -> Option<u32> {
        self.get_multi(bus, addr, 4, endian).map(|v| v as u32)
    }

    pub fn set_u32(&mut self, bus: Bus, addr: Addr, value: u32, endian: Endianness) -> bool {
        self.set_multi(bus, addr, 4, value as u64, endian)
    }

    pub fn get_u64(&self, bus: Bus, addr: Addr, endian: Endianness) -> Option<u64> {
        self.get_multi(bus, addr, 8, endian)
    }

    pub fn set_u64(&mut self, bus: Bus, addr: Addr, value: u64, endian: Endianness) -> bool {
        self.set_multi(bus, addr, 8, value, endian)
    }

    pub fn get_float(&self, bus: Bus, addr: Addr, endian: Endianness) -> Option<f32> {
        self.get_u32(bus, addr, endian).map(f32::from_bits)
    }

    pub fn get_double(&self, bus: Bus, addr: Addr, endian: Endianness) -> Option<f64> {
        self.get_u64(bus, addr, endian).map(f64::from_bits)
    }

    pub fn get_string(&self, bus: Bus, addr: Addr, len: usize) -> Option<String> {
        let bytes = self.get_range(bus, addr, len)?;
        Some(bytes.iter().map(|&b| b as char).collect())
    }

    /// Overwrite `len` bytes at `addr`, auto-mapping an `Untyped` span first
    /// if the target is currently unmapped (`PATCH` directive semantics).
    pub fn patch(&mut self, bus: Bus, addr: Addr, bytes: &[u8]) -> Result<()> {
        if self.store(bus).find_span(addr).is_none() {
            self.add_span(bus, addr, MemoryType::Untyped, bytes.to_vec())?;
            return Ok(());
        }
        ensure!(
            self.store_mut(bus).set_range(addr, bytes),
            "patch at {addr:#x} runs past the end of its span"
        );
        Ok(())
    }

    pub fn span_containing(&self, bus: Bus, addr: Addr) -> Option<(Addr, Addr)> {
        self.store(bus)
            .find_span(addr)
            .map(|s| (s.start(), s.end()))
    }

    pub fn is_mapped(&self, bus: Bus, addr: Addr) -> bool {
        self.store(bus).find_span(addr).is_some()
    }

    /// Next mapped address after `addr`, ignoring "used"-ness -- callers
    /// needing the "and used" clause go through
    /// [`crate::database::Database::next_addr`], which additionally
    /// consults the attribute overlay.
    pub fn next_mapped_addr(&self, bus: Bus, addr: Addr) -> Option<Addr> {
        self.store(bus).next_mapped_addr(addr)
    }

    pub fn iter_spans(&self, bus: Bus) -> impl Iterator<Item = (Addr, Addr, MemoryType)> + '_ {
        self.store(bus)
            .iter()
            .map(|s| (s.start(), s.end(), *s.tag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_roundtrip_is_endian_inverse() {
        for endian in [Endianness::Big, Endianness::Little] {
            let mut m = MemMap::new();
            m.add_span(Bus::Code, Addr(0), MemoryType::Code, vec![0, 0])
                .unwrap();
            assert!(m.set_u16(Bus::Code, Addr(0), 0xBEEF, endian));
            assert_eq!(m.get_u16(Bus::Code, Addr(0), endian), Some(0xBEEF));
        }
    }

    #[test]
    fn big_endian_byte_order_matches_motorola_wire_order() {
        let mut m = MemMap::new();
        m.add_span(Bus::Code, Addr(0), MemoryType::Code, vec![0x82, 0x34])
            .unwrap();
        assert_eq!(m.get_u16(Bus::Code, Addr(0), Endianness::Big), Some(0x8234));
    }

    #[test]
    fn get_byte_succeeds_only_inside_loaded_span() {
        let mut m = MemMap::new();
        m.add_span(Bus::Code, Addr(10), MemoryType::Code, vec![1, 2])
            .unwrap();
        assert_eq!(m.get_byte(Bus::Code, Addr(10)), Some(1));
        assert_eq!(m.get_byte(Bus::Code, Addr(12)), None);
        assert_eq!(m.get_byte(Bus::Data, Addr(10)), None);
    }

    #[test]
    fn patch_automaps_unmapped_target() {
        let mut m = MemMap::new();
        m.patch(Bus::Code, Addr(0x100), &[0xde, 0xad]).unwrap();
        assert_eq!(m.get_byte(Bus::Code, Addr(0x100)), Some(0xde));
        assert_eq!(m.get_byte(Bus::Code, Addr(0x101)), Some(0xad));
    }
}
