//! Raw binary fallback loader: the whole file at a configured offset, with
//! optional interleaving across an EPROM-pair style split.

use anyhow::Result;

use super::{LoadOptions, LoadSummary, Loader};
use crate::database::Database;
use crate::{Addr, Bus};

pub struct RawLoader;

impl Loader for RawLoader {
    fn detect(&self, _bytes: &[u8]) -> bool {
        // Only ever selected as the fallback in `load_auto`.
        false
    }

    fn load(&self, db: &mut Database, bytes: &[u8], opts: &LoadOptions) -> Result<LoadSummary> {
        if opts.interleave <= 1 {
            db.load_span(opts.bus, opts.offset, opts.mem_type, bytes.to_vec())?;
            return Ok(LoadSummary {
                bus: opts.bus,
                spans_added: 1,
                kind: "raw",
                entry_point: None,
            });
        }

        // byte i goes to address offset + i/interleave on the bus indicated
        // by i%interleave -- each lane is a distinct bus, not a
        // distinct span on the same bus, since EPROM-pair interleaving
        // distributes into separate address spaces (e.g. odd/even ROMs
        // wired as Code/Data).
        let mut lanes: Vec<Vec<u8>> = vec![Vec::new(); opts.interleave as usize];
        for (i, &b) in bytes.iter().enumerate() {
            lanes[i % opts.interleave as usize].push(b);
        }
        let mut spans_added = 0;
        for (lane_idx, lane) in lanes.into_iter().enumerate() {
            if lane.is_empty() {
                continue;
            }
            let bus = Bus::ALL[lane_idx % Bus::COUNT];
            db.load_span(bus, opts.offset, opts.mem_type, lane)?;
            spans_added += 1;
        }
        Ok(LoadSummary {
            bus: opts.bus,
            spans_added,
            kind: "raw",
            entry_point: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryType;

    #[test]
    fn loads_whole_file_at_offset() {
        let mut db = Database::new();
        let opts = LoadOptions {
            bus: Bus::Code,
            mem_type: MemoryType::Code,
            offset: Addr(0x100),
            interleave: 1,
        };
        let summary = RawLoader.load(&mut db, &[1, 2, 3], &opts).unwrap();
        assert_eq!(summary.spans_added, 1);
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(0x100)), Some(1));
    }

    #[test]
    fn interleave_distributes_lanes_across_distinct_buses() {
        let mut db = Database::new();
        let opts = LoadOptions {
            bus: Bus::Code,
            mem_type: MemoryType::Code,
            offset: Addr(0),
            interleave: 2,
        };
        // even-index bytes -> Code, odd-index bytes -> Data, each at offset+i/2
        let summary = RawLoader.load(&mut db, &[0xAA, 0xBB, 0xCC, 0xDD], &opts).unwrap();
        assert_eq!(summary.spans_added, 2);
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(0)), Some(0xAA));
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(1)), Some(0xCC));
        assert_eq!(db.mem.get_byte(Bus::Data, Addr(0)), Some(0xBB));
        assert_eq!(db.mem.get_byte(Bus::Data, Addr(1)), Some(0xDD));
    }
}
