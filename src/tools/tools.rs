//! `dasm6800`: the reference CLI front-end wiring the library, the 6800
//! backend, and the info-file/loader pipeline together. The CLI's own
//! option grammar (`-opt:value` / `-opt=value`, single dash, `-noOpt`
//! negation, order-sensitive `offset`/`interleave` applying to the *next*
//! file token) doesn't fit `clap`'s derive macros the way the teacher's
//! subcommand dispatcher does, so this uses `clap`'s builder API instead:
//! the well-known global options are declared as ordinary `Arg`s (with the
//! legacy single-dash tokens translated to `--name=value` before handing
//! them to `clap`), while a trailing catch-all positional collects bare
//! file tokens and backend-specific options `clap` doesn't know about.
//! `ArgMatches::indices_of` recovers each occurrence's position in the
//! original argv so the file-sequencing loop below can still honor
//! "command-line order matters" (see `DESIGN.md`).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use log::{info, warn};

use dasmfw::backend::Backend;
use dasmfw::backends;
use dasmfw::database::Database;
use dasmfw::engine::{Engine, ListingEvent};
use dasmfw::info::{self, InfoPass, InfoState};
use dasmfw::loaders::{self, LoadOptions};
use dasmfw::{Addr, Bus, MemoryType};

#[derive(Clone)]
struct FileSpec {
    name: String,
    offset: Addr,
    interleave: u32,
}

struct Cli {
    dasm: Option<String>,
    out: Option<String>,
    info_path: Option<String>,
    show_addr: bool,
    backend_options: Vec<(String, String)>,
    files: Vec<FileSpec>,
}

/// Global options `clap` recognizes by name once translated to `--name=value`
/// form. Anything else falls through to the `tokens` catch-all untouched.
const KNOWN_OPTIONS: &[&str] = &[
    "dasm", "out", "info", "addr", "hex", "asc", "offset", "interleave", "begin", "end",
];

/// One occurrence of an order-sensitive argument, tagged with its position
/// in the original argv (via `ArgMatches::indices_of`) so the replay loop
/// in [`parse_args`] can apply `offset`/`interleave` to the right file.
enum Entry {
    Offset(String),
    Interleave(String),
    Token(String),
}

fn build_cli() -> Command {
    Command::new("dasm6800")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(Arg::new("help").long("help").action(ArgAction::SetTrue))
        .arg(Arg::new("dasm").long("dasm"))
        .arg(Arg::new("out").long("out"))
        .arg(Arg::new("info").long("info"))
        .arg(Arg::new("addr").long("addr"))
        .arg(Arg::new("hex").long("hex"))
        .arg(Arg::new("asc").long("asc"))
        .arg(Arg::new("offset").long("offset").action(ArgAction::Append))
        .arg(Arg::new("interleave").long("interleave").action(ArgAction::Append))
        .arg(Arg::new("begin").long("begin").action(ArgAction::Append))
        .arg(Arg::new("end").long("end").action(ArgAction::Append))
        .arg(
            Arg::new("tokens")
                .action(ArgAction::Append)
                .num_args(0..)
                .allow_hyphen_values(true),
        )
}

/// Translates a legacy single-dash `-opt[:=]value` / `-noOpt` token for one
/// of [`KNOWN_OPTIONS`] into the `--opt=value` form `clap` expects. Bare
/// file tokens and backend-specific options (`clap` has no `Arg` for them)
/// pass through unchanged into the `tokens` catch-all.
fn normalize_for_clap(raw: &str) -> String {
    let Some(rest) = raw.strip_prefix('-') else {
        return raw.to_string();
    };
    if rest.eq_ignore_ascii_case("?") || rest.eq_ignore_ascii_case("help") {
        return "--help".to_string();
    }
    let (name, value, negated) = split_option(rest);
    let lower = name.to_ascii_lowercase();
    if !KNOWN_OPTIONS.contains(&lower.as_str()) {
        return raw.to_string();
    }
    if negated {
        format!("--{lower}=")
    } else {
        format!("--{lower}={value}")
    }
}

/// `-noXXX` is a synonym for `-XXX=`; `:`/`=` both separate name from
/// value.
fn split_option(rest: &str) -> (&str, &str, bool) {
    if let Some(sep) = rest.find([':', '=']) {
        (&rest[..sep], &rest[sep + 1..], false)
    } else if let Some(name) = rest.strip_prefix("no") {
        (name, "", true)
    } else {
        (rest, "", false)
    }
}

/// Parses `-option[:|=]value` / `-noOption` / bare `file[:interleave]`
/// tokens left to right ("Command-line order matters"): `clap` recognizes
/// the well-known global options; `offset`/`interleave` occurrences are
/// replayed in original argv order against the bare file tokens and
/// unrecognized backend options collected in `tokens`.
fn parse_args(args: &[String]) -> Result<Cli> {
    let normalized: Vec<String> = args.iter().map(|a| normalize_for_clap(a)).collect();
    let matches = build_cli()
        .try_get_matches_from(std::iter::once("dasm6800".to_string()).chain(normalized))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if matches.get_flag("help") {
        print_help();
        std::process::exit(0);
    }

    let mut cli = Cli {
        dasm: matches.get_one::<String>("dasm").cloned(),
        out: matches.get_one::<String>("out").cloned(),
        info_path: matches.get_one::<String>("info").cloned(),
        show_addr: match matches.get_one::<String>("addr") {
            Some(addr) => !addr.is_empty() && addr != "off",
            None => true,
        },
        backend_options: Vec::new(),
        files: Vec::new(),
    };
    // -hex/-asc: external hex/ASCII gutter formatter, out of scope.
    // -begin/-end: range-restricted loads, not honored by this engine.

    let mut timeline: Vec<(usize, Entry)> = Vec::new();
    if let (Some(idx), Some(vals)) = (matches.indices_of("offset"), matches.get_many::<String>("offset")) {
        timeline.extend(idx.zip(vals).map(|(i, v)| (i, Entry::Offset(v.clone()))));
    }
    if let (Some(idx), Some(vals)) = (matches.indices_of("interleave"), matches.get_many::<String>("interleave")) {
        timeline.extend(idx.zip(vals).map(|(i, v)| (i, Entry::Interleave(v.clone()))));
    }
    if let (Some(idx), Some(vals)) = (matches.indices_of("tokens"), matches.get_many::<String>("tokens")) {
        timeline.extend(idx.zip(vals).map(|(i, v)| (i, Entry::Token(v.clone()))));
    }
    timeline.sort_by_key(|(i, _)| *i);

    let mut pending_offset = Addr(0);
    let mut pending_interleave: u32 = 1;
    for (_, entry) in timeline {
        match entry {
            Entry::Offset(v) => pending_offset = Addr(v.parse().unwrap_or(0)),
            Entry::Interleave(v) => pending_interleave = v.parse().unwrap_or(1),
            Entry::Token(tok) => {
                if let Some(rest) = tok.strip_prefix('-') {
                    let (name, value, _) = split_option(rest);
                    cli.backend_options.push((name.to_string(), value.to_string()));
                } else {
                    let (name, interleave) = match tok.split_once(':') {
                        Some((n, i)) => (n.to_string(), i.parse().unwrap_or(pending_interleave)),
                        None => (tok.clone(), pending_interleave),
                    };
                    cli.files.push(FileSpec {
                        name,
                        offset: pending_offset,
                        interleave,
                    });
                }
            }
        }
    }
    Ok(cli)
}

fn print_help() {
    println!("dasm6800 [-option[:|=]value] [file[:interleave]]...");
    println!("  -dasm <code>     select backend (only '6800' is built in)");
    println!("  -out <path|console>  write listing to file, or stdout");
    println!("  -info <file>     read an additional info script");
    println!("  -addr {{on|off}}   show the address column");
    println!("  -hex {{on|off}}    (external hex gutter, not implemented here)");
    println!("  -asc {{on|off}}    (external ASCII gutter, not implemented here)");
    println!("  -?, -help        show this text");
}

/// `~/.dasmfw/<progname>.nfo` and `./<progname>.nfo`, both optional
/// ("Environment").
fn default_info_files(progname: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok();
    if let Some(home) = home {
        out.push(Path::new(&home).join(".dasmfw").join(format!("{progname}.nfo")));
    }
    out.push(PathBuf::from(format!("{progname}.nfo")));
    out
}

fn progname() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("dasm6800")
        .to_string()
}

/// The program name's suffix after `dasm` selects the backend;
/// `dasm6800` selects the 6800. Looked up through the process-wide backend
/// registry (`backends::create_backend`) rather than constructed directly,
/// so adding a second backend never touches this dispatcher.
fn select_backend(progname: &str, explicit: Option<&str>) -> Result<Box<dyn Backend>> {
    let code = explicit
        .map(str::to_string)
        .or_else(|| progname.strip_prefix("dasm").map(str::to_string))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "6800".to_string());
    backends::create_backend(&code).ok_or_else(|| anyhow::anyhow!("backend not found: {code:?}"))
}

fn run() -> Result<i32> {
    env_logger::init();

    let progname = progname();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    if cli.files.is_empty() {
        print_help();
        return Ok(1);
    }

    let mut backend = match select_backend(&progname, cli.dasm.as_deref()) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{e}");
            return Ok(1);
        }
    };
    for (name, value) in &cli.backend_options {
        if backend.set_option(name, value).is_err() {
            warn!("unknown backend option {name:?}; ignored");
        }
    }

    let mut db = Database::new();
    let mut state = InfoState::default();

    // Pass A (bootstrap): default + explicit info files, INCLUDE/OPTION/FILE only.
    let mut info_texts: Vec<(PathBuf, String)> = Vec::new();
    for path in default_info_files(&progname) {
        if let Ok(text) = fs::read_to_string(&path) {
            info_texts.push((path, text));
        }
    }
    if let Some(explicit) = &cli.info_path {
        match fs::read_to_string(explicit) {
            Ok(text) => info_texts.push((PathBuf::from(explicit), text)),
            Err(e) => warn!("-info {explicit}: {e}"),
        }
    }
    for (path, text) in &info_texts {
        info::run(&mut state, &mut db, &mut backend, path, text, InfoPass::Bootstrap)?;
    }

    // Load CLI-named files, then any the info script queued via FILE.
    for spec in &cli.files {
        load_one(&mut db, &spec.name, spec.offset, spec.interleave, backend.default_memory_type(Bus::Code));
    }
    for queued in state.queued_files.clone() {
        load_one(&mut db, &queued.name, queued.offset, queued.interleave, backend.default_memory_type(Bus::Code));
    }

    // Pass B (full): everything except FILE.
    for (path, text) in &info_texts {
        info::run(&mut state, &mut db, &mut backend, path, text, InfoPass::Full)?;
    }

    let mut engine = Engine::new(&mut db);
    engine.parse_all(&mut backend);
    let events = engine.render_all(&mut backend);

    let rendered = render_listing(&events, cli.show_addr);
    write_output(cli.out.as_deref(), &rendered);

    Ok(0)
}

fn load_one(db: &mut Database, name: &str, offset: Addr, interleave: u32, default_mem_type: MemoryType) {
    let bytes = match fs::read(name) {
        Ok(b) => b,
        Err(e) => {
            warn!("{name}: {e}");
            return;
        }
    };
    let opts = LoadOptions {
        bus: Bus::Code,
        mem_type: default_mem_type,
        offset,
        interleave,
    };
    match loaders::load_auto(db, &bytes, &opts) {
        Ok(summary) => info!("{name}: loaded {} span(s) as {}", summary.spans_added, summary.kind),
        Err(e) => warn!("{name}: {e}"),
    }
}

/// Column layout: label 0-7, mnemonic 8-15, operands 16-40,
/// comment from 41. The final pretty-printer (alignment beyond this) is an
/// out-of-scope external collaborator; this produces its plain-text input.
fn render_listing(events: &[ListingEvent], show_addr: bool) -> String {
    let mut out = String::new();
    for event in events {
        match event {
            ListingEvent::Blank => out.push('\n'),
            ListingEvent::Comment(text) => {
                out.push_str(&format!("{:41}* {text}\n", ""));
            }
            ListingEvent::Label { text, mnemonic, operands, comment } => {
                out.push_str(&column_line(None, show_addr, Some(text), mnemonic, operands, comment.as_deref()));
            }
            ListingEvent::Line { addr, label, mnemonic, operands, comment } => {
                out.push_str(&column_line(Some(*addr), show_addr, label.as_deref(), mnemonic, operands, comment.as_deref()));
            }
        }
    }
    out
}

fn column_line(
    addr: Option<Addr>,
    show_addr: bool,
    label: Option<&str>,
    mnemonic: &str,
    operands: &str,
    comment: Option<&str>,
) -> String {
    let mut line = String::new();
    if show_addr {
        if let Some(a) = addr {
            line.push_str(&format!("{:04X} ", a.0));
        } else {
            line.push_str("     ");
        }
    }
    line.push_str(&format!("{:<8}", label.unwrap_or("")));
    line.push_str(&format!("{:<8}", mnemonic));
    line.push_str(&format!("{:<25}", operands));
    if let Some(c) = comment {
        line.push_str("* ");
        line.push_str(c);
    }
    line.push('\n');
    line
}

/// Falls back to stdout if the output file can't be opened.
fn write_output(out: Option<&str>, text: &str) {
    match out {
        None | Some("console") => {
            print!("{text}");
        }
        Some(path) => match fs::File::create(path) {
            Ok(mut f) => {
                if let Err(e) = f.write_all(text.as_bytes()) {
                    warn!("writing {path}: {e}; falling back to stdout");
                    print!("{text}");
                }
            }
            Err(e) => {
                warn!("opening {path}: {e}; falling back to stdout");
                print!("{text}");
            }
        },
    }
}

fn main() -> std::process::ExitCode {
    match run() {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::from(1)
        }
    }
}
