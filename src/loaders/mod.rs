//! File loaders. Four formats behind one [`Loader`] trait; detection is
//! by first-byte inspection.

pub mod flex;
pub mod intelhex;
pub mod raw;
pub mod srecord;

use anyhow::Result;

use crate::database::Database;
use crate::{Addr, Bus, MemoryType};

#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    pub bus: Bus,
    pub mem_type: MemoryType,
    /// Raw-loader placement; ignored by the self-addressed formats.
    pub offset: Addr,
    /// Raw-loader byte distribution across buses; 1 means no interleave.
    pub interleave: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            bus: Bus::Code,
            mem_type: MemoryType::Code,
            offset: Addr(0),
            interleave: 1,
        }
    }
}

#[derive(Debug)]
pub struct LoadSummary {
    pub bus: Bus,
    pub spans_added: usize,
    pub kind: &'static str,
    pub entry_point: Option<Addr>,
}

pub trait Loader {
    /// Cheap sniff of the first bytes of a file; must not be fooled by raw
    /// binaries that happen to start with `:`/`S`/`0x02` in a way that
    /// would misparse -- callers try loaders in a fixed priority order and
    /// fall back to `raw` when nothing else claims the file.
    fn detect(&self, bytes: &[u8]) -> bool;

    fn load(&self, db: &mut Database, bytes: &[u8], opts: &LoadOptions) -> Result<LoadSummary>;
}

/// Detects and loads `bytes` using the first loader (in priority order)
/// that claims it, falling back to [`raw::RawLoader`] ("detection
/// by first-byte inspection").
pub fn load_auto(db: &mut Database, bytes: &[u8], opts: &LoadOptions) -> Result<LoadSummary> {
    let candidates: [&dyn Loader; 3] = [&intelhex::IntelHexLoader, &srecord::SRecordLoader, &flex::FlexLoader];
    for loader in candidates {
        if loader.detect(bytes) {
            return loader.load(db, bytes, opts);
        }
    }
    raw::RawLoader.load(db, bytes, opts)
}

/// Discards bytes for addresses the bus can't hold; "out-of-range
/// bytes... are silently discarded." `bus_width` bits bound the address.
pub(crate) fn in_range(addr: Addr, bus_width: u32) -> bool {
    bus_width >= 32 || addr.0 < (1u32 << bus_width)
}
