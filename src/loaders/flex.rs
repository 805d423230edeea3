//! FLEX.BIN loader: a frame-tagged stream, `0x02 addrHi addrLo
//! len data...` for data chunks, `0x16 addrHi addrLo` for the transfer
//! (entry) address. Any other leading byte ends the scan -- FLEX binaries
//! don't carry an explicit end marker beyond running out of frames.

use anyhow::{bail, Result};

use super::{LoadOptions, LoadSummary, Loader};
use crate::database::Database;
use crate::Addr;

pub struct FlexLoader;

const FRAME_DATA: u8 = 0x02;
const FRAME_XFER: u8 = 0x16;

impl Loader for FlexLoader {
    fn detect(&self, bytes: &[u8]) -> bool {
        matches!(bytes.first(), Some(&FRAME_DATA) | Some(&FRAME_XFER))
    }

    fn load(&self, db: &mut Database, bytes: &[u8], opts: &LoadOptions) -> Result<LoadSummary> {
        let mut pos = 0usize;
        let mut entry_point = None;
        let mut spans_added = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                FRAME_DATA => {
                    if pos + 4 > bytes.len() {
                        bail!("truncated data frame at offset {pos}");
                    }
                    let addr = Addr(((bytes[pos + 1] as u32) << 8) | bytes[pos + 2] as u32);
                    let len = bytes[pos + 3] as usize;
                    let data_start = pos + 4;
                    if data_start + len > bytes.len() {
                        bail!("data frame at offset {pos} claims {len} bytes past end of file");
                    }
                    let data = bytes[data_start..data_start + len].to_vec();
                    db.load_span(opts.bus, addr, opts.mem_type, data)?;
                    spans_added += 1;
                    pos = data_start + len;
                }
                FRAME_XFER => {
                    if pos + 3 > bytes.len() {
                        bail!("truncated transfer-address frame at offset {pos}");
                    }
                    entry_point = Some(Addr(((bytes[pos + 1] as u32) << 8) | bytes[pos + 2] as u32));
                    pos += 3;
                }
                _ => break,
            }
        }

        Ok(LoadSummary {
            bus: opts.bus,
            spans_added,
            kind: "flex",
            entry_point,
        })
    }
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
    fn detects_by_leading_frame_byte() {
        assert!(FlexLoader.detect(&[0x02, 0, 0, 0]));
        assert!(FlexLoader.detect(&[0x16, 0, 0]));
        assert!(!FlexLoader.detect(&[0xff]));
    }

    #[test]
    fn loads_data_frame_then_transfer_address() {
        let mut db = Database::new();
        let bytes = [0x02, 0x01, 0x00, 0x02, 0xAA, 0xBB, 0x16, 0x01, 0x00];
        let summary = FlexLoader.load(&mut db, &bytes, &opts()).unwrap();
        assert_eq!(summary.spans_added, 1);
        assert_eq!(summary.entry_point, Some(Addr(0x0100)));
        assert_eq!(db.mem.get_byte(Bus::Code, Addr(0x100)), Some(0xAA));
    }
}
