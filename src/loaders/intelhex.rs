//! Intel HEX loader: `:llaaaatt[dd...]cc` lines, checksummed.
//! Record types: 00 data, 01 EOF, 02 extended segment address, 03 start
//! segment address, 04 extended linear address, 05 start linear address.
//! Adjacent data records coalesce into one span per contiguous region.

use anyhow::{anyhow, bail, Result};

use super::{LoadOptions, LoadSummary, Loader};
use crate::database::Database;
use crate::Addr;

pub struct IntelHexLoader;

impl Loader for IntelHexLoader {
    fn detect(&self, bytes: &[u8]) -> bool {
        bytes.first() == Some(&b':')
    }

    fn load(&self, db: &mut Database, bytes: &[u8], opts: &LoadOptions) -> Result<LoadSummary> {
        let text = std::str::from_utf8(bytes).map_err(|e| anyhow!("not valid ASCII: {e}"))?;

        let mut upper_linear: u32 = 0;
        let mut upper_segment: u32 = 0;
        let mut entry_point = None;
        let mut run_start: Option<Addr> = None;
        let mut run: Vec<u8> = Vec::new();
        let mut spans_added = 0;

        let mut flush = |db: &mut Database, run_start: &mut Option<Addr>, run: &mut Vec<u8>, spans_added: &mut usize| -> Result<()> {
            if let Some(start) = run_start.take() {
                if !run.is_empty() {
                    db.load_span(opts.bus, start, opts.mem_type, std::mem::take(run))?;
                    *spans_added += 1;
                }
            }
            run.clear();
            Ok(())
        };

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !line.starts_with(':') {
                bail!("line {}: Intel HEX records must start with ':'", lineno + 1);
            }
            let record = parse_record(line).map_err(|e| anyhow!("line {}: {e}", lineno + 1))?;

            match record.rec_type {
                0x00 => {
                    let linear = (upper_linear << 16) | (upper_segment.wrapping_shl(4)) | record.address as u32;
                    let addr = Addr(linear);
                    let contiguous = run_start
                        .map(|s| s + run.len() as u32 == addr)
                        .unwrap_or(false);
                    if !contiguous {
                        flush(db, &mut run_start, &mut run, &mut spans_added)?;
                        run_start = Some(addr);
                    }
                    run.extend_from_slice(&record.data);
                }
                0x01 => {
                    flush(db, &mut run_start, &mut run, &mut spans_added)?;
                    break;
                }
                0x02 => {
                    flush(db, &mut run_start, &mut run, &mut spans_added)?;
                    upper_segment = u16::from_be_bytes([record.data[0], record.data[1]]) as u32;
                }
                0x04 => {
                    flush(db, &mut run_start, &mut run, &mut spans_added)?;
                    upper_linear = u16::from_be_bytes([record.data[0], record.data[1]]) as u32;
                }
                0x03 => {
                    let seg = u16::from_be_bytes([record.data[0], record.data[1]]) as u32;
                    let off = u16::from_be_bytes([record.data[2], record.data[3]]) as u32;
                    entry_point = Some(Addr((seg << 4) + off));
                }
                0x05 => {
                    let v = u32::from_be_bytes([record.data[0], record.data[1], record.data[2], record.data[3]]);
                    entry_point = Some(Addr(v));
                }
                other => bail!("line {}: unsupported record type {other:02X}", lineno + 1),
            }
        }
        flush(db, &mut run_start, &mut run, &mut spans_added)?;

        Ok(LoadSummary {
            bus: opts.bus,
            spans_added,
            kind: "intelhex",
            entry_point,
        })
    }
}

struct Record {
    rec_type: u8,
    address: u16,
    data: Vec<u8>,
}

fn hex_byte(s: &str, pos: usize) -> Result<u8> {
    u8::from_str_radix(&s[pos..pos + 2], 16).map_err(|_| anyhow!("bad hex at column {pos}"))
}

fn parse_record(line: &str) -> Result<Record> {
    let body = &line[1..];
    if body.len() < 10 {
        bail!("truncated record");
    }
    let len = hex_byte(body, 0)? as usize;
    let addr_hi = hex_byte(body, 2)?;
    let addr_lo = hex_byte(body, 4)?;
    let rec_type = hex_byte(body, 6)?;
    let expected_len = 8 + len * 2 + 2;
    if body.len() < expected_len {
        bail!("truncated record: expected {expected_len} hex chars, got {}", body.len());
    }
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        data.push(hex_byte(body, 8 + i * 2)?);
    }
    let checksum = hex_byte(body, 8 + len * 2)?;

    let mut sum: u32 = len as u32 + addr_hi as u32 + addr_lo as u32 + rec_type as u32;
    for &b in &data {
        sum += b as u32;
    }
    let computed = (!(sum as u8)).wrapping_add(1);
    if computed != checksum {
        bail!("checksum mismatch: expected {checksum:02X}, computed {computed:02X}");
    }

    Ok(Record {
        rec_type,
        address: ((addr_hi as u16) << 8) | addr_lo as u16,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, MemoryType};

    fn opts() -> LoadOptions {
        LoadOptions {
            bus: Bus::Code,
            mem_type: MemoryType::Code,
            offset: Addr(0),
            interleave: 1,
        }
    }

    #[test]
    fn detects_by_leading_colon() {
        assert!(IntelHexLoader.detect(b":00000001FF"));
        assert!(!IntelHexLoader.detect(b"S113"));
    }

    #[test]
    fn loads_simple_data_record() {
        let mut db = Database::new();
        // :02 0000 00 1234 B8  -- 2 data bytes 0x12,0x34 at address 0, type 00
        let text = ":020000001234B8\n:00000001FF\n";
        let summary = IntelHexLoader.load(&mut db, text.as_bytes(), &opts()).unwrap();
        assert_eq!(summary.spans_added, 1);
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(0)), Some(0x12));
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(1)), Some(0x34));
    }

    #[test]
    fn extended_linear_address_record_loads_no_data() {
        let mut db = Database::new();
        // :02 0000 04 0021 -- extended linear address 0x0021, no data bytes
        let text = ":020000042100DB\n:00000001FF\n";
        let summary = IntelHexLoader.load(&mut db, text.as_bytes(), &opts()).unwrap();
        assert_eq!(summary.spans_added, 0);
    }

    #[test]
    fn bad_checksum_fails_the_file() {
        let mut db = Database::new();
        let text = ":020000001234FF\n";
        assert!(IntelHexLoader.load(&mut db, text.as_bytes(), &opts()).is_err());
    }
}
