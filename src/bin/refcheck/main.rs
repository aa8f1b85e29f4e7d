//! Binary entry point for the refcheck CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use refcheck::{
    audit::{
        default_catalogs, scan, sweep_catalogs, AuditError, DiagnosticRecord, JsonLinesSink,
        RepairOutcome, ReportSink, ScanOptions, ScanReport, StrategyKind, SweepOptions,
        SweepReport, TextSink, DEFAULT_ROOT_NAME,
    },
    storage::{MemoryStore, StoreBuilder},
    types::ObjectPath,
};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::ui::{format_duration, ColorMode, TaskGuard, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "refcheck",
    version,
    about = "Find and repair broken references in an object store",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "REFCHECK_STORE",
        value_name = "STORE",
        help = "Snapshot file of the store to audit"
    )]
    store: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "REFCHECK_CONFIG",
        value_name = "FILE",
        help = "Config file (defaults to the per-user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ColorMode::Auto,
        help = "When to colour text output"
    )]
    color: ColorMode,

    #[arg(long, global = true, help = "Print findings only")]
    quiet: bool,

    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Log more (-v info, -vv debug); RUST_LOG overrides"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ScanCmd {
    #[arg(
        value_name = "PATH",
        help = "Starting object, dot or slash delimited (e.g. app.zport.dmd)"
    )]
    path: String,

    #[arg(long, help = "Repair recognized breakage as it is found")]
    fixrels: bool,

    #[arg(
        long = "strategy",
        value_name = "KIND",
        value_enum,
        action = ArgAction::Append,
        help = "Restrict repairs to these strategies (repeatable)"
    )]
    strategies: Vec<StrategyArg>,
}

#[derive(Args, Debug)]
struct SweepCmd {
    #[arg(long, help = "Remove dangling entries, then reindex the configured structures")]
    fix: bool,

    #[arg(value_name = "CATALOG", help = "Catalog paths (defaults to the configured list)")]
    catalogs: Vec<String>,
}

#[derive(Args, Debug)]
struct SeedDemoCmd {
    #[arg(value_name = "STORE")]
    store_path: PathBuf,

    #[arg(long, help = "Include every repairable breakage pattern")]
    corrupt: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Walk the object graph and report broken references")]
    Scan(ScanCmd),
    #[command(about = "Report or remove catalog entries whose objects are gone")]
    SweepCatalogs(SweepCmd),
    #[command(about = "Write a demo store, optionally with breakage")]
    SeedDemo(SeedDemoCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    Relationship,
    SearchManager,
    ComponentSearch,
}

impl From<StrategyArg> for StrategyKind {
    fn from(kind: StrategyArg) -> Self {
        match kind {
            StrategyArg::Relationship => StrategyKind::Relationship,
            StrategyArg::SearchManager => StrategyKind::SearchManager,
            StrategyArg::ComponentSearch => StrategyKind::ComponentSearch,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "refcheck=warn",
        1 => "refcheck=info",
        _ => "refcheck=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let ui = Ui::new(cli.color, cli.quiet);
    match &cli.command {
        Command::Scan(cmd) => {
            let config = CliConfig::load(cli.config.clone())?;
            debug!(config = ?config.path(), "config.loaded");
            let store = open_store(&cli, &config)?;
            let opts = build_scan_options(cmd, &config);
            let start = ObjectPath::parse(&cmd.path, &opts.root_name);
            let report = match run_scan(&cli.format, &ui, &store, &start, &opts) {
                Err(AuditError::InvalidPath(_)) => {
                    println!("Invalid path: {}", cmd.path);
                    std::process::exit(1);
                }
                other => other?,
            };
            emit(&cli.format, &report, || print_scan_text(&ui, &report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::SweepCatalogs(cmd) => {
            let config = CliConfig::load(cli.config.clone())?;
            let store = open_store(&cli, &config)?;
            let root_name = config.root_name().unwrap_or(DEFAULT_ROOT_NAME).to_string();
            let catalogs = catalog_paths(cmd, &config, &root_name);
            let mut opts = SweepOptions {
                fix: cmd.fix,
                ..SweepOptions::default()
            };
            if let Some(targets) = config.reindex_targets() {
                opts.reindex = targets
                    .iter()
                    .map(|path| ObjectPath::parse(path, &root_name))
                    .collect();
            }
            let report = match cli.format {
                OutputFormat::Json => {
                    let mut sink = JsonLinesSink::new(io::stdout().lock(), root_name.as_str());
                    sweep_catalogs(&store, &catalogs, &opts, &mut sink)?
                }
                OutputFormat::Text => {
                    let task = ui.task("Sweeping catalogs");
                    let mut sink = UiSink::new(&task, &root_name);
                    let report = sweep_catalogs(&store, &catalogs, &opts, &mut sink)?;
                    task.finish();
                    report
                }
            };
            emit(&cli.format, &report, || print_sweep_text(&ui, &report))?;
            let remaining = report.dangling() as u64 - report.removed();
            if remaining > 0 {
                std::process::exit(2);
            }
        }
        Command::SeedDemo(cmd) => {
            let snapshot = StoreBuilder::demo(cmd.corrupt)?.into_snapshot();
            let store = MemoryStore::create(&cmd.store_path, snapshot)?;
            let records = store.snapshot().records.len();
            ui.success(&format!(
                "Demo store written to {} ({} records{})",
                cmd.store_path.display(),
                records,
                if cmd.corrupt { ", with breakage" } else { "" }
            ));
        }
    }
    Ok(())
}

fn open_store(cli: &Cli, config: &CliConfig) -> Result<MemoryStore, Box<dyn Error>> {
    let path = cli
        .store
        .clone()
        .or_else(|| config.default_store().cloned())
        .ok_or("no store given; pass --store, set REFCHECK_STORE or set [store] default in the config")?;
    Ok(MemoryStore::open(path)?)
}

fn build_scan_options(cmd: &ScanCmd, config: &CliConfig) -> ScanOptions {
    let mut opts = ScanOptions {
        repair: cmd.fixrels,
        ..ScanOptions::default()
    };
    if let Some(root_name) = config.root_name() {
        opts.root_name = root_name.to_string();
    }
    if !cmd.strategies.is_empty() {
        opts.strategies = cmd.strategies.iter().copied().map(Into::into).collect();
    } else if let Some(kinds) = config.strategies() {
        opts.strategies = kinds.to_vec();
    }
    opts
}

fn catalog_paths(cmd: &SweepCmd, config: &CliConfig, root_name: &str) -> Vec<ObjectPath> {
    let raw: &[String] = if !cmd.catalogs.is_empty() {
        &cmd.catalogs
    } else {
        config.catalogs()
    };
    if raw.is_empty() {
        return default_catalogs();
    }
    raw.iter()
        .map(|path| ObjectPath::parse(path, root_name))
        .collect()
}

fn run_scan(
    format: &OutputFormat,
    ui: &Ui,
    store: &MemoryStore,
    start: &ObjectPath,
    opts: &ScanOptions,
) -> Result<ScanReport, AuditError> {
    match format {
        OutputFormat::Json => {
            let mut sink = JsonLinesSink::new(io::stdout().lock(), opts.root_name.as_str());
            scan(store, start, opts, &mut sink)
        }
        OutputFormat::Text => {
            let task = ui.task(format!("Scanning {}", start.dotted(&opts.root_name)));
            let mut sink = UiSink::new(&task, &opts.root_name);
            let report = scan(store, start, opts, &mut sink)?;
            let elapsed = task.finish();
            debug!(elapsed = %format_duration(elapsed), "scan.elapsed");
            Ok(report)
        }
    }
}

/// Text sink that keeps the spinner out of the way of printed lines.
struct UiSink<'a> {
    task: &'a TaskGuard<'a>,
    lines: TextSink<Vec<u8>>,
}

impl<'a> UiSink<'a> {
    fn new(task: &'a TaskGuard<'a>, root_name: &str) -> Self {
        Self {
            task,
            lines: TextSink::with_root_name(Vec::new(), root_name),
        }
    }

    fn flush(&mut self, repair: bool) -> io::Result<()> {
        let bytes = std::mem::take(self.lines.get_mut());
        let text = String::from_utf8_lossy(&bytes);
        let ui = self.task.ui();
        self.task.suspend(|| {
            for line in text.lines() {
                if repair {
                    ui.repair(line);
                } else {
                    ui.finding(line);
                }
            }
        });
        io::stdout().flush()
    }
}

impl ReportSink for UiSink<'_> {
    fn diagnostic(&mut self, record: &DiagnosticRecord) -> io::Result<()> {
        self.lines.diagnostic(record)?;
        self.flush(false)
    }

    fn repaired(&mut self, record: &DiagnosticRecord, outcome: &RepairOutcome) -> io::Result<()> {
        self.lines.repaired(record, outcome)?;
        self.flush(outcome.applied)
    }

    fn catalog(&mut self, catalog: &ObjectPath, found: bool) -> io::Result<()> {
        self.lines.catalog(catalog, found)?;
        self.flush(false)
    }

    fn dangling_entry(
        &mut self,
        catalog: &ObjectPath,
        entry: &ObjectPath,
        removed: bool,
    ) -> io::Result<()> {
        self.lines.dangling_entry(catalog, entry, removed)?;
        self.flush(removed)
    }

    fn reindexed(&mut self, target: &ObjectPath, found: bool) -> io::Result<()> {
        self.lines.reindexed(target, found)?;
        self.flush(found)
    }
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let summary = json!({ "type": "summary", "report": value });
            println!("{}", serde_json::to_string(&summary)?);
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_scan_text(ui: &Ui, report: &ScanReport) {
    let mut rows = vec![
        ("start", report.start.clone()),
        ("repair", report.repair.to_string()),
        ("nodes visited", report.nodes_visited.to_string()),
        ("records", report.records.to_string()),
        ("repairs applied", report.repairs_applied.to_string()),
    ];
    for (kind, count) in &report.by_kind {
        rows.push((kind.as_str(), count.to_string()));
    }
    ui.section("Scan", rows);
    if report.success {
        ui.success("No broken references found");
    } else if report.repairs_applied == report.records {
        ui.success(&format!("Repaired all {} broken references", report.records));
    } else {
        ui.warn(&format!(
            "{} broken references, {} repaired",
            report.records, report.repairs_applied
        ));
    }
}

fn print_sweep_text(ui: &Ui, report: &SweepReport) {
    let rows: Vec<(&str, String)> = report
        .catalogs
        .iter()
        .filter(|catalog| catalog.found)
        .map(|catalog| {
            (
                catalog.path.last().unwrap_or_default(),
                format!(
                    "{} entries, {} dangling, {} removed",
                    catalog.entries,
                    catalog.dangling.len(),
                    catalog.removed
                ),
            )
        })
        .collect();
    ui.section("Catalogs", rows);
    if !report.reindexed.is_empty() {
        let rows: Vec<(&str, String)> = report
            .reindexed
            .iter()
            .filter(|target| target.found)
            .map(|target| {
                (
                    target.path.last().unwrap_or_default(),
                    format!("{} catalogs rebuilt", target.catalogs),
                )
            })
            .collect();
        ui.section("Reindexed", rows);
    }
    let missing = report.catalogs.iter().filter(|c| !c.found).count();
    if missing > 0 && !ui.is_quiet() {
        ui.warn(&format!("{missing} catalogs not found"));
    }
    if report.dangling() == 0 {
        ui.success("No dangling catalog entries");
    }
}
