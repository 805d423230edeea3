//! The info-script interpreter. Directive-driven mutator of the memory map,
//! attribute overlay, label registry, and comment store. Two passes over
//! the same text: `Bootstrap` only honors
//! `INCLUDE`/`OPTION`/`FILE` (selecting the backend and queuing binaries
//! before anything is loaded); `Full` honors everything except `FILE`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::warn;

use crate::attributes::{CellType, Display};
use crate::backend::{Backend, InfoHandled};
use crate::comments::CommentKind;
use crate::database::Database;
use crate::labels::LabelSource;
use crate::{Addr, Bus, MemoryType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoPass {
    Bootstrap,
    Full,
}

/// A `FILE` directive queued during the bootstrap pass, consumed by the
/// caller once loaders are available.
#[derive(Clone, Debug)]
pub struct QueuedFile {
    pub name: String,
    pub offset: Addr,
    pub interleave: u32,
}

/// Parser/interpreter state threaded through one logical run of (possibly
/// `INCLUDE`-nested) info files. `load_stack` breaks include cycles:
/// cycles are detected via the load-stack and silently broken.
pub struct InfoState {
    pub bus: Bus,
    pub radix: u32,
    pub prepend_default: bool,
    load_stack: Vec<PathBuf>,
    pub queued_files: Vec<QueuedFile>,
}

impl Default for InfoState {
    fn default() -> Self {
        InfoState {
            bus: Bus::Code,
            radix: 10,
            prepend_default: false,
            load_stack: Vec::new(),
            queued_files: Vec::new(),
        }
    }
}

/// Runs one info file's text against `db`/`backend` for `pass`. `path` is
/// used only to resolve relative `INCLUDE` targets and to detect cycles;
/// pass a synthetic name for in-memory text with no real file backing it.
pub fn run(
    state: &mut InfoState,
    db: &mut Database,
    backend: &mut dyn Backend,
    path: &Path,
    text: &str,
    pass: InfoPass,
) -> Result<()> {
    let canon = path.to_path_buf();
    if state.load_stack.contains(&canon) {
        warn!("info include cycle detected at {}; skipping", path.display());
        return Ok(());
    }
    state.load_stack.push(canon);

    for logical in join_continuations(text) {
        let logical = strip_comment(&logical);
        let logical = logical.trim();
        if logical.is_empty() {
            continue;
        }
        let tokens = tokenize(logical);
        if tokens.is_empty() {
            continue;
        }
        let keyword = tokens[0].to_ascii_uppercase();
        let mut args = &tokens[1..];

        // An optional `BUS code|data` selector may prefix any directive's
        // arguments, overriding `state.bus` for this line only.
        let mut line_bus = state.bus;
        if args.len() >= 2 && args[0].eq_ignore_ascii_case("BUS") {
            if let Some(b) = Bus::from_name(&args[1]) {
                line_bus = b;
            }
            args = &args[2..];
        }

        if keyword == "END" {
            break;
        }

        match (pass, keyword.as_str()) {
            (_, "INCLUDE") => {
                if let Some(name) = args.first() {
                    let inc_path = resolve_include(path, name);
                    match std::fs::read_to_string(&inc_path) {
                        Ok(inc_text) => run(state, db, backend, &inc_path, &inc_text, pass)?,
                        Err(e) => warn!("INCLUDE {name}: {e}"),
                    }
                }
            }
            (_, "OPTION") => {
                if args.len() >= 2 {
                    if backend.set_option(args[0], args[1]).is_err() {
                        warn!("unknown option {:?}", args[0]);
                    }
                }
            }
            (InfoPass::Bootstrap, "FILE") => {
                if let Some(name) = args.first() {
                    let offset = args
                        .get(1)
                        .and_then(|s| parse_number(s, state.radix))
                        .map(Addr)
                        .unwrap_or(Addr(0));
                    state.queued_files.push(QueuedFile {
                        name: (*name).to_string(),
                        offset,
                        interleave: 1,
                    });
                }
            }
            (InfoPass::Full, "FILE") => {}
            (InfoPass::Bootstrap, _) => {} // everything else waits for pass B
            (InfoPass::Full, _) => {
                handle_full_directive(state, db, backend, &keyword, line_bus, args);
            }
        }
    }

    state.load_stack.pop();
    Ok(())
}

fn handle_full_directive(
    state: &mut InfoState,
    db: &mut Database,
    backend: &mut dyn Backend,
    keyword: &str,
    bus: Bus,
    args: &[&str],
) {
    if let InfoHandled::Consumed = backend.process_info(db, keyword, args) {
        return;
    }

    match keyword {
        "BUS" => {
            if let Some(b) = args.first().and_then(|s| Bus::from_name(s)) {
                state.bus = b;
            }
        }
        "CODE" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.mem.set_mem_type(bus, a, MemoryType::Code)
        }),
        "DATA" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.mem.set_mem_type(bus, a, MemoryType::Data)
        }),
        "CONST" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.mem.set_mem_type(bus, a, MemoryType::Const)
        }),
        "RMB" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.mem.set_mem_type(bus, a, MemoryType::Bss)
        }),
        // "probable source bug": UNUSED falls through into the
        // byte-size-1 handling below, preserved intentionally.
        "UNUSED" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_used(bus, a, false);
            db.attrs.set_cell_size(bus, a, 1);
        }),
        "BYTE" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_cell_size(bus, a, 1)
        }),
        "WORD" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_cell_size(bus, a, 2)
        }),
        "DWORD" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_cell_size(bus, a, 4)
        }),
        "FLOAT" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_cell_size(bus, a, 4);
            db.attrs.set_cell_type(bus, a, CellType::Float);
        }),
        "DOUBLE" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_cell_size(bus, a, 8);
            db.attrs.set_cell_type(bus, a, CellType::Float);
        }),
        "TENBYTES" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_cell_size(bus, a, 10);
            db.attrs.set_cell_type(bus, a, CellType::Float);
        }),
        "BIN" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_display(bus, a, Display::Binary)
        }),
        "OCT" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_display(bus, a, Display::Octal)
        }),
        "DEC" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_display(bus, a, Display::Decimal)
        }),
        "HEX" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_display(bus, a, Display::Hex)
        }),
        "CHAR" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_display(bus, a, Display::Char);
            db.attrs.set_cell_type(bus, a, CellType::Char);
        }),
        "BREAK" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_break_before(bus, a, true)
        }),
        "UNBREAK" => with_range(db, bus, state.radix, args, |db, bus, a| {
            db.attrs.set_break_before(bus, a, false)
        }),

        "CVECTOR" => do_vector(db, bus, state.radix, args, backend.code_ptr_size(), MemoryType::Code),
        "DVECTOR" => do_vector(db, bus, state.radix, args, backend.data_ptr_size(), MemoryType::Data),

        "RELATIVE" | "REL" => {
            if let (Some(range), Some(rel)) = (args.first(), args.get(1)) {
                if let Some((from, to)) = parse_range(range, state.radix) {
                    let from = remap_addr(db, bus, from);
                    let to = remap_addr(db, bus, to);
                    if let Some(delta) = parse_number(rel, state.radix) {
                        let _ = db
                            .transforms
                            .add_relative(bus, from, (to - from + 1) as usize, Addr(delta));
                    }
                }
            }
        }
        "UNRELATIVE" | "UNREL" => {
            if let Some(range) = args.first() {
                if let Some((from, _to)) = parse_range(range, state.radix) {
                    let from = remap_addr(db, bus, from);
                    db.transforms.remove_relative(bus, from);
                }
            }
        }
        "PHASE" => {
            if let (Some(range), Some(phase_tok)) = (args.first(), args.get(1)) {
                if let Some((from, to)) = parse_range(range, state.radix) {
                    let from = remap_addr(db, bus, from);
                    let to = remap_addr(db, bus, to);
                    let relative = phase_tok.starts_with('+') || phase_tok.starts_with('-');
                    if let Some(v) = parse_number(phase_tok.trim_start_matches(['+', '-']), state.radix) {
                        let phase_start = if relative {
                            let sign: i64 = if phase_tok.starts_with('-') { -1 } else { 1 };
                            Addr((from.0 as i64 + sign * v as i64) as u32)
                        } else {
                            Addr(v)
                        };
                        let _ = db.transforms.add_phase(bus, from, (to - from + 1) as usize, phase_start);
                    }
                }
            }
        }
        "UNPHASE" => {
            if let Some(range) = args.first() {
                if let Some((from, _to)) = parse_range(range, state.radix) {
                    let from = remap_addr(db, bus, from);
                    db.transforms.remove_phase(bus, from);
                }
            }
        }

        "LABEL" | "USEDLABEL" => {
            let used = keyword == "USEDLABEL";
            if let (Some(range), Some(name)) = (args.first(), args.get(1)) {
                if let Some((from, to)) = parse_range(range, state.radix) {
                    let from = remap_addr(db, bus, from);
                    let to = remap_addr(db, bus, to);
                    let mut n = 0u32;
                    let mut a = from;
                    loop {
                        let text = if n == 0 { (*name).to_string() } else { format!("{name}+{n:X}") };
                        db.labels.add_label(a, bus, MemoryType::Untyped, text, used, LabelSource::Info, db.multi_label);
                        if a >= to {
                            break;
                        }
                        a = a + 1;
                        n += 1;
                    }
                }
            }
        }
        "UNLABEL" => {
            if let (Some(range), name) = (args.first(), args.get(1)) {
                if let Some((from, to)) = parse_range(range, state.radix) {
                    let from = remap_addr(db, bus, from);
                    let to = remap_addr(db, bus, to);
                    if let Some(name) = name {
                        db.labels.remove_at(from, bus, name);
                    } else {
                        db.labels.remove_range(bus, from, to);
                    }
                }
            }
        }

        "COMMENT" | "COMM" => add_comment(db, bus, state.radix, args, false, false),
        "PREPCOMM" => add_comment(db, bus, state.radix, args, false, true),
        "LCOMMENT" | "LCOMM" => add_comment(db, bus, state.radix, args, true, false),
        "PREPLCOMM" => add_comment(db, bus, state.radix, args, true, true),
        "INSERT" => add_verbatim(db, bus, state.radix, args, false),
        "PREPEND" => add_verbatim(db, bus, state.radix, args, true),
        "UNCOMMENT" => remove_comment_range(db, bus, state.radix, args, CommentKind::Before),
        "UNLCOMMENT" => remove_comment_range(db, bus, state.radix, args, CommentKind::Line),

        "PATCH" => do_patch(db, bus, state.radix, args, 1),
        "PATCHW" => do_patch(db, bus, state.radix, args, 2),
        "PATCHDW" => do_patch(db, bus, state.radix, args, 4),
        "PATCHF" => do_patch_float(db, bus, state.radix, args),

        "REMAP" => {
            if let (Some(range), Some(offs)) = (args.first(), args.get(1)) {
                if let Some((from, to)) = parse_range(range, state.radix) {
                    if let Some(delta) = parse_signed_number(offs, state.radix) {
                        db.remap[bus.index()].add(from, to, delta);
                    }
                }
            }
        }

        other => {
            warn!("unknown info directive {other:?}; ignored");
        }
    }
}

// -- tokenizing / line joining ------------------------------------------------

fn join_continuations(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in text.lines() {
        let trimmed_start = raw.trim_start();
        if trimmed_start.starts_with('+') {
            let cont = &trimmed_start[1..];
            if let Some(last) = out.last_mut() {
                last.push(' ');
                last.push_str(cont.trim_start());
                continue;
            }
        }
        out.push(raw.to_string());
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with('*') {
        return "";
    }
    line
}

fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

fn resolve_include(current: &Path, name: &str) -> PathBuf {
    let name = name.trim_matches(|c| c == '"' || c == '\'');
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    current
        .parent()
        .map(|p| p.join(candidate))
        .unwrap_or_else(|| candidate.to_path_buf())
}

// -- number / range parsing ---------------------------------------------------

fn parse_number(text: &str, radix: u32) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    u32::from_str_radix(text, radix).ok()
}

fn parse_signed_number(text: &str, radix: u32) -> Option<i64> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('-') {
        return parse_number(rest, radix).map(|v| -(v as i64));
    }
    parse_number(text, radix).map(|v| v as i64)
}

fn parse_range(text: &str, radix: u32) -> Option<(Addr, Addr)> {
    match text.split_once('-') {
        Some((a, b)) => {
            let from = parse_number(a, radix)?;
            let to = parse_number(b, radix)?;
            Some((Addr(from), Addr(to)))
        }
        None => {
            let v = parse_number(text, radix)?;
            Some((Addr(v), Addr(v)))
        }
    }
}

/// Biases `addr` by the cumulative `REMAP` offset registered for `bus` at
/// that address ("before parsing any range in subsequent directives, bias
/// all addresses in this window by offs"). Every directive address literal
/// except `REMAP`'s own arguments passes through here.
fn remap_addr(db: &Database, bus: Bus, addr: Addr) -> Addr {
    db.remap[bus.index()].apply(addr)
}

fn with_range(db: &mut Database, bus: Bus, radix: u32, args: &[&str], mut f: impl FnMut(&mut Database, Bus, Addr)) {
    let Some(range) = args.first() else {
        warn!("directive missing an address range; ignored");
        return;
    };
    let Some((from, to)) = parse_range(range, radix) else {
        warn!("unparseable address range {range:?}; ignored");
        return;
    };
    let mut a = from;
    loop {
        let target = remap_addr(db, bus, a);
        f(db, bus, target);
        if a >= to {
            break;
        }
        a = a + 1;
    }
}

fn do_vector(db: &mut Database, bus: Bus, radix: u32, args: &[&str], ptr_size: u8, mem_type: MemoryType) {
    let Some(range) = args.first() else { return };
    let Some((from, to)) = parse_range(range, radix) else { return };
    let mut a = from;
    while a <= to {
        let target_cell = remap_addr(db, bus, a);
        // a vector table is itself data, regardless of whether its entries
        // point into code (CVECTOR) or data (DVECTOR)
        db.mem.set_mem_type(bus, target_cell, MemoryType::Data);
        db.attrs.set_cell_size(bus, target_cell, ptr_size);
        // No bounds validation against bus range -- "probable
        // source bug", preserved as-is.
        if let Some(target) = read_pointer(db, bus, target_cell, ptr_size) {
            db.vector_label(bus, target, target_cell, mem_type);
        }
        a = a + ptr_size as u32;
    }
}

fn read_pointer(db: &Database, bus: Bus, addr: Addr, ptr_size: u8) -> Option<Addr> {
    match ptr_size {
        2 => db.mem.get_u16(bus, addr, crate::Endianness::Big).map(|v| Addr(v as u32)),
        4 => db.mem.get_u32(bus, addr, crate::Endianness::Big).map(Addr),
        _ => db.mem.get_byte(bus, addr).map(|v| Addr(v as u32)),
    }
}

fn add_comment(db: &mut Database, bus: Bus, radix: u32, args: &[&str], line: bool, prepend: bool) {
    let mut args = args;
    let mut after = false;
    if let Some(first) = args.first() {
        if first.eq_ignore_ascii_case("AFTER") {
            after = true;
            args = &args[1..];
        }
    }
    let Some(addr_tok) = args.first() else { return };
    let Some(addr) = parse_number(addr_tok, radix).map(Addr) else { return };
    let addr = remap_addr(db, bus, addr);
    let text = args[1..].join(" ");
    let kind = if line {
        CommentKind::Line
    } else if after {
        CommentKind::After
    } else {
        CommentKind::Before
    };
    db.comments.add(bus, addr, kind, text, prepend);
}

fn add_verbatim(db: &mut Database, bus: Bus, radix: u32, args: &[&str], prepend: bool) {
    let Some(addr_tok) = args.first() else { return };
    let Some(addr) = parse_number(addr_tok, radix).map(Addr) else { return };
    let addr = remap_addr(db, bus, addr);
    let text = args[1..].join(" ");
    db.comments.add(bus, addr, CommentKind::Before, text, prepend);
}

fn remove_comment_range(db: &mut Database, bus: Bus, radix: u32, args: &[&str], kind: CommentKind) {
    let Some(range) = args.first() else { return };
    let Some((from, to)) = parse_range(range, radix) else { return };
    let from = remap_addr(db, bus, from);
    let to = remap_addr(db, bus, to);
    db.comments.remove_range(bus, kind, from, to);
}

fn do_patch(db: &mut Database, bus: Bus, radix: u32, args: &[&str], unit: usize) {
    let Some(addr_tok) = args.first() else { return };
    let Some(addr) = parse_number(addr_tok, radix).map(Addr) else { return };
    let addr = remap_addr(db, bus, addr);
    let mut bytes = Vec::new();
    for tok in &args[1..] {
        let Some(v) = parse_number(tok, radix) else { continue };
        match unit {
            1 => bytes.push(v as u8),
            2 => bytes.extend_from_slice(&(v as u16).to_be_bytes()),
            4 => bytes.extend_from_slice(&v.to_be_bytes()),
            _ => unreachable!(),
        }
    }
    if let Err(e) = db.mem.patch(bus, addr, &bytes) {
        warn!("PATCH at {addr:?} failed: {e}");
    }
}

fn do_patch_float(db: &mut Database, bus: Bus, radix: u32, args: &[&str]) {
    let Some(addr_tok) = args.first() else { return };
    let Some(addr) = parse_number(addr_tok, radix).map(Addr) else { return };
    let addr = remap_addr(db, bus, addr);
    let Some(value_tok) = args.get(1) else { return };
    let Some(v) = value_tok.parse::<f32>().ok() else { return };
    if let Err(e) = db.mem.patch(bus, addr, &v.to_be_bytes()) {
        warn!("PATCHF at {addr:?} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::m6800::M6800;
    use crate::MemoryType;

    fn db_with_span() -> Database {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0x100), MemoryType::Code, vec![0x20, 0xFE])
            .unwrap();
        db
    }

    #[test]
    fn label_directive_attaches_named_label() {
        let mut db = db_with_span();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), "LABEL 0x100 loop\n", InfoPass::Full).unwrap();
        assert_eq!(db.label_text_at(Bus::Code, Addr(0x100)), Some("loop"));
    }

    #[test]
    fn unlabel_then_label_leaves_only_the_second() {
        let mut db = db_with_span();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        let text = "LABEL 0x100 old\nUNLABEL 0x100 old\nLABEL 0x100 new\n";
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), text, InfoPass::Full).unwrap();
        let texts: Vec<_> = db.labels.labels_in_range(Bus::Code, Addr(0x100), Addr(0x100)).map(|l| l.text.clone()).collect();
        assert_eq!(texts, vec!["new".to_string()]);
    }

    #[test]
    fn comment_line_continuation_joins_logical_lines() {
        let joined = join_continuations("COMMENT 0x100 hello\n+ world\n");
        assert_eq!(joined, vec!["COMMENT 0x100 hello world".to_string(), String::new()]);
    }

    #[test]
    fn star_comment_lines_are_ignored() {
        let mut db = db_with_span();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), "* just a comment\nBREAK 0x100\n", InfoPass::Full).unwrap();
        assert!(db.attrs.cell(Bus::Code, Addr(0x100)).unwrap().break_before);
    }

    #[test]
    fn bootstrap_pass_only_honors_include_option_file() {
        let mut db = db_with_span();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), "LABEL 0x100 loop\nFILE extra.bin 0x10\n", InfoPass::Bootstrap).unwrap();
        assert!(db.label_text_at(Bus::Code, Addr(0x100)).is_none());
        assert_eq!(state.queued_files.len(), 1);
        assert_eq!(state.queued_files[0].name, "extra.bin");
    }

    #[test]
    fn phase_directive_creates_rebasing_span() {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0x200), MemoryType::Code, vec![0; 0x100]).unwrap();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), "PHASE 0x200-0x2FF 0x8000\n", InfoPass::Full).unwrap();
        assert!(db.transforms.has_phase(Bus::Code, Addr(0x200)));
    }

    #[test]
    fn remap_biases_addresses_in_subsequent_directives() {
        let mut db = db_with_span();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        let text = "REMAP 0x100-0x1FF 0x1000\nLABEL 0x150 foo\n";
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), text, InfoPass::Full).unwrap();
        assert!(db.label_text_at(Bus::Code, Addr(0x150)).is_none());
        assert_eq!(db.label_text_at(Bus::Code, Addr(0x1150)), Some("foo"));
    }

    #[test]
    fn cvector_retypes_span_as_data_and_labels_targets() {
        let mut db = Database::new();
        db.load_span(Bus::Code, Addr(0x1000), MemoryType::Code, vec![0x12, 0x34, 0x56, 0x78])
            .unwrap();
        let mut backend = M6800::new();
        let mut state = InfoState::default();
        run(&mut state, &mut db, &mut backend, Path::new("<mem>"), "CVECTOR 0x1000-0x1003\n", InfoPass::Full).unwrap();

        assert_eq!(db.mem.mem_type(Bus::Code, Addr(0x1000)), Some(MemoryType::Data));
        assert_eq!(db.attrs.cell(Bus::Code, Addr(0x1000)).unwrap().cell_size, 2);
        assert_eq!(db.label_text_at(Bus::Code, Addr(0x1234)), Some("Z1234via1000"));
        assert_eq!(db.label_text_at(Bus::Code, Addr(0x5678)), Some("Z5678via1002"));
    }
}
