//! Binary entry point for the docgraph command line tool.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use docgraph::admin::{inspect, verify, InspectReport, VerifyReport};
use docgraph::graph::sample::build_sample;
use docgraph::graph::{IdKind, Main};
use docgraph::session::{Session, SessionConfig};
use docgraph::storage::{write_file, AppendStats, OwnershipReport};
use docgraph::wm::WindowManager;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "docgraph",
    version,
    about = "Inspect, verify and exercise docgraph documents",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "DOCGRAPH_CONFIG",
        value_name = "FILE",
        help = "Configuration file (defaults to the platform config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "List header, catalog and blocks of a document")]
    Inspect {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    #[command(about = "Read and link a document and report integrity findings")]
    Verify {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    #[command(about = "Write a sample document")]
    Init {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, default_value_t = 3, help = "Number of cube objects")]
        objects: usize,
    },

    #[command(about = "Verify the autosave file and copy it to a path")]
    Recover(RecoverCmd),

    #[command(about = "Run a scripted push/undo/redo sequence and report sharing")]
    UndoDemo(UndoDemoCmd),

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct RecoverCmd {
    #[arg(value_name = "DEST", help = "Where to write the recovered document")]
    dest: PathBuf,

    #[arg(long, value_name = "FILE", help = "Autosave file to recover from")]
    from: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UndoDemoCmd {
    #[arg(long, default_value_t = 5, help = "Number of edits to push")]
    edits: usize,

    #[arg(long, help = "Override the retained history length")]
    steps: Option<usize>,

    #[arg(long, default_value_t = 3, help = "Cube objects in the sample")]
    objects: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct InitReport {
    path: PathBuf,
    ids: usize,
    bytes: u64,
    checksum: String,
}

#[derive(Debug, Serialize)]
struct RecoverReport {
    source: PathBuf,
    dest: PathBuf,
    verify: VerifyReport,
    bytes: u64,
}

#[derive(Debug, Serialize)]
struct DemoStep {
    name: String,
    bytes: u64,
    append: AppendStats,
    evicted: usize,
}

#[derive(Debug, Serialize)]
struct UndoDemoReport {
    pushes: Vec<DemoStep>,
    history: Vec<String>,
    memory_usage: usize,
    undone: usize,
    redone: usize,
    restored_original: bool,
    restored_latest: bool,
    ownership: OwnershipReport,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DOCGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { path } => {
            let report = inspect(&path)?;
            emit(&cli.format, &report, || print_inspect_text(&report))?;
            if report.error.is_some() {
                std::process::exit(2);
            }
        }
        Command::Verify { path } => {
            let report = verify(&path)?;
            emit(&cli.format, &report, || print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Init { path, objects } => {
            let mut main = Main::new();
            build_sample(&mut main, objects)?;
            let stats = write_file(&main, &path)?;
            let report = InitReport {
                path,
                ids: stats.ids,
                bytes: stats.bytes,
                checksum: format!("{:08x}", stats.checksum),
            };
            emit(&cli.format, &report, || {
                println!(
                    "Wrote {} ({} datablocks, {} bytes, crc {})",
                    report.path.display(),
                    report.ids,
                    report.bytes,
                    report.checksum
                )
            })?;
        }
        Command::Recover(cmd) => {
            let config = SessionConfig::load(cli.config)?;
            let report = run_recover(&cmd, &config)?;
            emit(&cli.format, &report, || {
                println!(
                    "Recovered {} -> {} ({} bytes)",
                    report.source.display(),
                    report.dest.display(),
                    report.bytes
                );
                print_verify_text(&report.verify);
            })?;
        }
        Command::UndoDemo(cmd) => {
            let mut config = SessionConfig::load(cli.config)?.autosave_enabled(false);
            if let Some(steps) = cmd.steps {
                config = config.undo_steps(steps);
            }
            let report = run_undo_demo(&cmd, config)?;
            emit(&cli.format, &report, || print_demo_text(&report))?;
        }
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "docgraph", &mut io::stdout());
        }
    }

    Ok(())
}

fn run_recover(cmd: &RecoverCmd, config: &SessionConfig) -> Result<RecoverReport, Box<dyn Error>> {
    let source = match &cmd.from {
        Some(path) => path.clone(),
        None => Session::<WindowManager>::recoverable_autosave(config)
            .ok_or("no autosave file to recover")?,
    };
    let report = verify(&source)?;
    if !report.success {
        return Err(format!("autosave {} failed verification", source.display()).into());
    }
    let bytes = std::fs::copy(&source, &cmd.dest)?;
    Ok(RecoverReport {
        source,
        dest: cmd.dest.clone(),
        verify: report,
        bytes,
    })
}

fn run_undo_demo(cmd: &UndoDemoCmd, config: SessionConfig) -> Result<UndoDemoReport, Box<dyn Error>> {
    let mut wm = WindowManager::new();
    wm.open(None, None);
    let mut session = Session::new(config, wm)?;
    let original = session.main().outline();

    let mut pushes = Vec::with_capacity(cmd.edits + 1);
    build_sample(session.main_mut(), cmd.objects)?;
    let report = session.push("Add sample")?;
    pushes.push(DemoStep {
        name: "Add sample".into(),
        bytes: report.bytes,
        append: report.append,
        evicted: report.evicted,
    });
    for i in 0..cmd.edits {
        let name = format!("Move {}", i + 1);
        let objects: Vec<_> = session.main().list(IdKind::Object).collect();
        if let Some(&target) = objects.get(i % objects.len().max(1)) {
            if let Some(ob) = session.main_mut().object_mut(target) {
                ob.location[2] += 1.0;
            }
        }
        let report = session.push(&name)?;
        pushes.push(DemoStep {
            name,
            bytes: report.bytes,
            append: report.append,
            evicted: report.evicted,
        });
    }
    let latest = session.main().outline();

    let mut undone = 0;
    while session.ledger().can_undo() {
        session.undo()?;
        undone += 1;
    }
    let restored_original =
        session.ledger().cursor() == Some(0) && session.main().outline() == original;
    let mut redone = 0;
    while session.ledger().can_redo() {
        session.redo()?;
        redone += 1;
    }
    let restored_latest = session.main().outline() == latest;

    Ok(UndoDemoReport {
        pushes,
        history: session
            .ledger()
            .names()
            .into_iter()
            .map(str::to_owned)
            .collect(),
        memory_usage: session.ledger().memory_usage(),
        undone,
        redone,
        restored_original,
        restored_latest,
        ownership: session.ledger().verify()?,
    })
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_inspect_text(report: &InspectReport) {
    println!("Format version: {}", report.format_version);
    println!("Catalog ({} structs):", report.catalog.len());
    for def in &report.catalog {
        println!("  {:<12} size={:<4} fields={}", def.name, def.size, def.fields);
    }
    println!("Blocks ({}):", report.blocks.len());
    for block in &report.blocks {
        println!(
            "  @{:<7} {:<4} len={:<6} old={} struct={} count={}{}",
            block.offset,
            block.code,
            block.len,
            block.identity,
            block.struct_name.as_deref().unwrap_or("?"),
            block.count,
            block
                .id_name
                .as_deref()
                .map(|n| format!(" name={n:?}"))
                .unwrap_or_default()
        );
    }
    match (&report.checksum, &report.error) {
        (_, Some(err)) => println!("Error: {err}"),
        (Some(crc), None) => println!("Checksum: {crc} (ok)"),
        (None, None) => {}
    }
}

fn print_verify_text(report: &VerifyReport) {
    let counts: Vec<String> = report
        .counts
        .iter()
        .map(|(code, n)| format!("{code}={n}"))
        .collect();
    println!(
        "Verify => success={} {} rewrite_stable={}",
        report.success,
        counts.join(" "),
        report
            .rewrite_stable
            .map_or_else(|| "-".to_string(), |s| s.to_string())
    );
    if let Some(read) = &report.read {
        println!(
            "  blocks={} data_blocks={} remapped={} dangling={} unresolved={} crc={:08x}",
            read.blocks,
            read.data_blocks,
            read.remapped_blocks,
            read.dangling_pointers,
            read.unresolved_refs,
            read.checksum
        );
    }
    for finding in &report.findings {
        println!("- {:?}: {}", finding.severity, finding.message);
    }
}

fn print_demo_text(report: &UndoDemoReport) {
    println!("Pushes:");
    for step in &report.pushes {
        println!(
            "  {:<12} bytes={:<6} shared={} copied={} copied_bytes={} evicted={}",
            step.name,
            step.bytes,
            step.append.identical_chunks,
            step.append.copied_chunks,
            step.append.copied_bytes,
            step.evicted
        );
    }
    println!("History: {}", report.history.join(" | "));
    println!(
        "Undone={} redone={} restored_original={} restored_latest={}",
        report.undone, report.redone, report.restored_original, report.restored_latest
    );
    println!(
        "Memory: {} bytes owned, {} distinct payloads",
        report.memory_usage, report.ownership.payloads
    );
}
