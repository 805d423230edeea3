//! Motorola S-record loader: lines starting with `S`. S0 header
//! is ignored for addressing; S1/S2/S3 carry 2/3/4-byte addresses; S7/S8/S9
//! carry start addresses of matching width. Checksum is the one's
//! complement of the sum of all bytes from the byte count through the data.

use anyhow::{anyhow, bail, Result};

use super::{LoadOptions, LoadSummary, Loader};
use crate::database::Database;
use crate::Addr;

pub struct SRecordLoader;

impl Loader for SRecordLoader {
    fn detect(&self, bytes: &[u8]) -> bool {
        bytes.first() == Some(&b'S')
    }

    fn load(&self, db: &mut Database, bytes: &[u8], opts: &LoadOptions) -> Result<LoadSummary> {
        let text = std::str::from_utf8(bytes).map_err(|e| anyhow!("not valid ASCII: {e}"))?;

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
            if !line.starts_with('S') {
                bail!("line {}: S-records must start with 'S'", lineno + 1);
            }
            let addr_bytes = match line.as_bytes().get(1) {
                Some(b'0') => 2,
                Some(b'1') | Some(b'7') => 2,
                Some(b'2') | Some(b'8') => 3,
                Some(b'3') | Some(b'9') => 4,
                Some(other) => bail!("line {}: unsupported record type S{}", lineno + 1, *other as char),
                None => bail!("line {}: truncated record", lineno + 1),
            };
            let kind = line.as_bytes()[1];
            let record = parse_record(line, addr_bytes).map_err(|e| anyhow!("line {}: {e}", lineno + 1))?;

            match kind {
                b'0' => {}
                b'1' | b'2' | b'3' => {
                    let addr = Addr(record.address);
                    let contiguous = run_start
                        .map(|s| s + run.len() as u32 == addr)
                        .unwrap_or(false);
                    if !contiguous {
                        flush(db, &mut run_start, &mut run, &mut spans_added)?;
                        run_start = Some(addr);
                    }
                    run.extend_from_slice(&record.data);
                }
                b'7' | b'8' | b'9' => {
                    entry_point = Some(Addr(record.address));
                }
                _ => unreachable!(),
            }
        }
        flush(db, &mut run_start, &mut run, &mut spans_added)?;

        Ok(LoadSummary {
            bus: opts.bus,
            spans_added,
            kind: "srecord",
            entry_point,
        })
    }
}

struct Record {
    address: u32,
    data: Vec<u8>,
}

fn hex_byte(s: &str, pos: usize) -> Result<u8> {
    u8::from_str_radix(&s[pos..pos + 2], 16).map_err(|_| anyhow!("bad hex at column {pos}"))
}

fn parse_record(line: &str, addr_bytes: usize) -> Result<Record> {
    let body = &line[2..];
    if body.len() < 2 + addr_bytes * 2 + 2 {
        bail!("truncated record");
    }
    let count = hex_byte(body, 0)? as usize;
    let mut address: u32 = 0;
    for i in 0..addr_bytes {
        address = (address << 8) | hex_byte(body, 2 + i * 2)? as u32;
    }
    let data_len = count
        .checked_sub(addr_bytes + 1)
        .ok_or_else(|| anyhow!("byte count {count} too small for a {addr_bytes}-byte address"))?;
    let data_start = 2 + addr_bytes * 2;
    let mut data = Vec::with_capacity(data_len);
    for i in 0..data_len {
        data.push(hex_byte(body, data_start + i * 2)?);
    }
    let checksum = hex_byte(body, data_start + data_len * 2)?;

    let mut sum: u32 = count as u32;
    for i in 0..addr_bytes {
        sum += hex_byte(body, 2 + i * 2)? as u32;
    }
    for &b in &data {
        sum += b as u32;
    }
    let computed = !(sum as u8);
    if computed != checksum {
        bail!("checksum mismatch: expected {checksum:02X}, computed {computed:02X}");
    }

    Ok(Record { address, data })
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
    fn detects_by_leading_s() {
        assert!(SRecordLoader.detect(b"S1130000"));
        assert!(!SRecordLoader.detect(b":00"));
    }

    #[test]
    fn loads_s1_data_record() {
        let mut db = Database::new();
        // S1 07 0000 112233445566 CC  (count=7: 2 addr + 4 data + 1 csum)
        // sum = 07+00+00+11+22+33+44 = 0xB1, checksum = ~0xB1 = 0x4E
        let line = "S107000011223344".to_string() + "4E";
        let summary = SRecordLoader.load(&mut db, line.as_bytes(), &opts()).unwrap();
        assert_eq!(summary.spans_added, 1);
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(0)), Some(0x11));
    }

    #[test]
    fn bad_checksum_fails_the_file() {
        let mut db = Database::new();
        let line = "S107000011223344FF";
        assert!(SRecordLoader.load(&mut db, line.as_bytes(), &opts()).is_err());
    }
}
