use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlineage_core::{Config, Diagnostic, Direction, RebuildReport, RunId, Severity};
use sqlineage_engine::{IngestOutcome, LineageEngine, LineageQuery, BatchReprocessor};
use sqlineage_graph::canonicalize;
use sqlineage_store::{InMemoryStore, LineageStore, RelationshipFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod events;

/// sqlineage - SQL lineage aggregation
#[derive(Parser)]
#[command(name = "sqlineage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: $SQLINEAGE_CONFIG or sqlineage.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker event files or directories to replay
    #[arg(short, long = "events", global = true, default_value = "events")]
    events: Vec<PathBuf>,

    /// Run to operate on (default: the only run in the events)
    #[arg(short, long, global = true)]
    run: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay worker events and summarize what was ingested
    Ingest {
        /// Directory for rebuild reports of completed runs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild a run's lineage graph from its raw records
    Reprocess {
        /// Output file for the rebuild report
        #[arg(short, long, default_value = "rebuild-report.json")]
        output: PathBuf,
    },

    /// Show lineage of a table
    Lineage {
        /// Table name, qualified or short
        table: String,

        /// Which side of the table to show
        #[arg(short, long, value_enum, default_value = "upstream")]
        direction: DirectionArg,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show a table and its neighbor counts
    Entity {
        /// Table name, qualified or short
        table: String,
    },

    /// Search tables by name
    Search {
        /// Case-insensitive substring of the short id
        query: String,
    },

    /// Show run statistics
    Stats,

    /// Show every table affected by a change to a table
    Impact {
        /// Table name, qualified or short
        table: String,

        /// Show what the table depends on instead
        #[arg(long)]
        upstream: bool,
    },

    /// Check whether one table is derived from another
    DependsOn {
        /// Downstream table, qualified or short
        table: String,

        /// Upstream table, qualified or short
        upstream: String,
    },

    /// List runs found in the events
    Runs,

    /// Write a config file with default settings
    InitConfig {
        /// Destination
        #[arg(default_value = "sqlineage.toml")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Upstream,
    Downstream,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Upstream => Direction::Upstream,
            DirectionArg::Downstream => Direction::Downstream,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    if let Commands::InitConfig { path } = &cli.command {
        return init_config_command(&config, path);
    }

    let session = Session::replay(&cli.events, &config, cli.verbose).await?;
    let run = cli.run.as_deref();

    match cli.command {
        Commands::InitConfig { .. } => Ok(()),
        Commands::Ingest { output } => ingest_command(&session, output.as_deref()).await,
        Commands::Runs => runs_command(&session).await,
        Commands::Reprocess { output } => {
            let run_id = session.resolve_run(run).await?;
            reprocess_command(&session, &run_id, &output, cli.verbose).await
        }
        Commands::Lineage { table, direction, json } => {
            let run_id = session.resolve_run(run).await?;
            lineage_command(&session.query, &run_id, &table, direction.into(), json).await
        }
        Commands::Entity { table } => {
            let run_id = session.resolve_run(run).await?;
            entity_command(&session.query, &run_id, &table).await
        }
        Commands::Search { query } => {
            let run_id = session.resolve_run(run).await?;
            search_command(&session.query, &run_id, &query).await
        }
        Commands::Stats => {
            let run_id = session.resolve_run(run).await?;
            stats_command(&session.query, &run_id).await
        }
        Commands::Impact { table, upstream } => {
            let run_id = session.resolve_run(run).await?;
            impact_command(&session.query, &run_id, &table, upstream).await
        }
        Commands::DependsOn { table, upstream } => {
            let run_id = session.resolve_run(run).await?;
            depends_on_command(&session.query, &run_id, &table, &upstream).await
        }
    }
}

/// Explicit path, then `SQLINEAGE_CONFIG`, then `sqlineage.toml`, then defaults
fn load_config(explicit: Option<&Path>, verbose: bool) -> Result<Config> {
    let from_env = std::env::var_os("SQLINEAGE_CONFIG").map(PathBuf::from);

    let config = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?,
        None => {
            let default_path = Path::new("sqlineage.toml");
            if verbose && !default_path.exists() {
                eprintln!("{}", "No config file found, using defaults".yellow());
            }
            Config::load_or_default(default_path)?
        }
    };

    if verbose {
        eprintln!(
            "{} column merge: {:?}, parking: {}",
            "Using".cyan(),
            config.aggregation.column_merge,
            config.realtime.park_orphan_edges
        );
    }
    Ok(config)
}

/// Events replayed into an in-memory store, with realtime updates drained
struct Session {
    store: Arc<dyn LineageStore>,
    reprocessor: BatchReprocessor,
    query: LineageQuery,
    outcomes: Vec<IngestOutcome>,
    failures: usize,
}

impl Session {
    async fn replay(paths: &[PathBuf], config: &Config, verbose: bool) -> Result<Self> {
        let events = events::load_events(paths)?;
        if verbose {
            eprintln!("{} {} worker events", "Replaying".cyan(), events.len());
        }

        let store: Arc<dyn LineageStore> = Arc::new(InMemoryStore::new());
        let engine = LineageEngine::start(Arc::clone(&store), config);

        let mut outcomes = Vec::new();
        let mut failures = 0;
        for event in &events {
            match engine.gateway.handle_event(event).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    failures += 1;
                    tracing::error!(
                        run_id = %event.run_id,
                        event_type = %event.event_type,
                        error = %err,
                        "event failed"
                    );
                    if verbose {
                        eprintln!(
                            "  {} {} ({}): {}",
                            "✗".red(),
                            event.event_type,
                            event.run_id,
                            err
                        );
                    }
                }
            }
        }

        let (reprocessor, query) = engine.shutdown().await;
        Ok(Self {
            store,
            reprocessor,
            query,
            outcomes,
            failures,
        })
    }

    async fn resolve_run(&self, requested: Option<&str>) -> Result<RunId> {
        let runs = self.store.runs().await?;

        if let Some(requested) = requested {
            let run_id = RunId::new(requested);
            if !runs.iter().any(|r| r.run_id == run_id) {
                anyhow::bail!("Run '{}' not found in the replayed events", requested);
            }
            return Ok(run_id);
        }

        match runs.as_slice() {
            [only] => Ok(only.run_id.clone()),
            [] => Err(anyhow::anyhow!(
                "No runs found. Point --events at worker event files containing an \
                 extraction_run_started event."
            )),
            many => Err(anyhow::anyhow!(
                "Several runs found ({}). Pick one with --run.",
                many.iter().map(|r| r.run_id.as_str()).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

/// Ingest command - summarize replayed events
async fn ingest_command(session: &Session, output: Option<&Path>) -> Result<()> {
    let mut files = 0;
    let mut tables = 0;
    let mut edges = 0;
    let mut rejected: Vec<&Diagnostic> = Vec::new();
    let mut reports: Vec<&RebuildReport> = Vec::new();

    for outcome in &session.outcomes {
        match outcome {
            IngestOutcome::FileIngested {
                tables: t,
                edges: e,
                rejected: r,
                ..
            } => {
                files += 1;
                tables += t;
                edges += e;
                rejected.extend(r);
            }
            IngestOutcome::RunReprocessed(report) => reports.push(report),
            IngestOutcome::RunRegistered(_) | IngestOutcome::Ignored => {}
        }
    }

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Ingestion Summary".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!("{} {}", "Runs:".bold(), session.store.runs().await?.len());
    println!("{} {}", "Files:".bold(), files);
    println!("{} {}", "Table records:".bold(), tables);
    println!("{} {}", "Edge records:".bold(), edges);

    if !rejected.is_empty() {
        println!();
        println!("{} {}", "Rejected records:".bold(), rejected.len().to_string().yellow());
        for diagnostic in &rejected {
            print_diagnostic(diagnostic);
        }
    }

    if session.failures > 0 {
        println!();
        println!("{} {}", "Failed events:".bold(), session.failures.to_string().red());
    }

    for report in &reports {
        println!();
        print_report_summary(report);

        if let Some(dir) = output {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("rebuild-{}.json", report.run_id));
            report.save_to_file(&path)?;
            println!("{} {}", "Report saved to:".green(), path.display());
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Reprocess command - full rebuild of one run
async fn reprocess_command(
    session: &Session,
    run_id: &RunId,
    output: &Path,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("{} {}", "Reprocessing run".cyan(), run_id);
    }

    let report = session.reprocessor.reprocess_run(run_id).await?;
    report.save_to_file(output)?;

    print_report_summary(&report);
    let shown = report
        .diagnostics
        .iter()
        .filter(|d| d.severity != Severity::Info || verbose);
    for diagnostic in shown {
        print_diagnostic(diagnostic);
    }

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }
    Ok(())
}

/// Lineage command - neighbors and column lineage on one side of a table
async fn lineage_command(
    query: &LineageQuery,
    run_id: &RunId,
    table: &str,
    direction: Direction,
    json: bool,
) -> Result<()> {
    let lineage = query.lineage(run_id, table, direction).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lineage)?);
        return Ok(());
    }

    let entity = &lineage.entity;
    println!("{} {}", "Table:".bold(), entity.table.short_id.green());
    println!("{} {}", "Source:".bold(), entity.table.source);
    println!("{} {}", "Fields:".bold(), lineage.fields.join(", "));
    println!();

    println!("{}", format!("{} tables ({}):", direction, lineage.neighbors.len()).bold());
    for neighbor in &lineage.neighbors {
        println!("  {}", neighbor.table.yellow());
        for provenance in &neighbor.transformations {
            println!(
                "    {} {} {}",
                provenance.transformation_type.cyan(),
                provenance.file_id,
                format_lines(provenance.lines.start_line, provenance.lines.end_line).dimmed()
            );
        }
    }

    if !lineage.fine_grained.is_empty() {
        println!();
        println!("{}", "Column lineage:".bold());
        for group in &lineage.fine_grained {
            println!("  {}", group.column.green());
            for field in &group.related {
                let arrow = match direction {
                    Direction::Upstream => "<-",
                    Direction::Downstream => "->",
                };
                let lines = format_lines(field.lines.start_line, field.lines.end_line);
                println!(
                    "    {} {}.{} {} {}",
                    arrow,
                    field.table,
                    field.column,
                    field.transformation_type.cyan(),
                    format!("{} {}", field.file_id, lines).dimmed()
                );
            }
        }
    }
    Ok(())
}

/// Entity command - canonical table summary
async fn entity_command(query: &LineageQuery, run_id: &RunId, table: &str) -> Result<()> {
    let entity = query.entity(run_id, table).await?;

    println!("{} {}", "Table:".bold(), entity.table.short_id.green());
    println!("{} {}", "Source:".bold(), entity.table.source);
    println!("{} {}", "Columns:".bold(), entity.table.columns.join(", "));
    if !entity.table.partition_keys.is_empty() {
        println!("{} {}", "Partition keys:".bold(), entity.table.partition_keys.join(", "));
    }
    println!("{} {}", "Upstream tables:".bold(), entity.upstream_count);
    println!("{} {}", "Downstream tables:".bold(), entity.downstream_count);
    Ok(())
}

/// Search command - tables by name
async fn search_command(query: &LineageQuery, run_id: &RunId, needle: &str) -> Result<()> {
    let tables = query.search(run_id, needle).await?;

    if tables.is_empty() {
        println!("{}", "No matching tables".yellow());
        return Ok(());
    }
    for table in tables {
        println!("{} {}", table.short_id.green(), format!("({})", table.source).dimmed());
    }
    Ok(())
}

/// Stats command - counts for one run
async fn stats_command(query: &LineageQuery, run_id: &RunId) -> Result<()> {
    let stats = query.stats(run_id).await?;
    let roots = query
        .relationships(run_id, RelationshipFilter::all().with_upstream(false))
        .await?
        .len();

    println!("{} {}", "Run:".bold(), run_id.as_str().green());
    println!("  {:<24} {}", "tables", stats.tables);
    println!("  {:<24} {}", "column facts", stats.column_facts);
    println!("  {:<24} {}", "relationships", stats.relationships);
    println!("  {:<24} {}", "table edges", stats.table_edges);
    println!("  {:<24} {}", "root tables", roots);
    println!("  {:<24} {}", "source sightings", stats.source_sightings);
    println!("  {:<24} {}", "target sightings", stats.target_sightings);
    println!("  {:<24} {}", "intermediate sightings", stats.intermediate_sightings);
    println!("  {:<24} {}", "raw table records", stats.raw_tables);
    println!("  {:<24} {}", "raw table edges", stats.raw_table_edges);
    println!("  {:<24} {}", "raw column edges", stats.raw_column_edges);
    Ok(())
}

/// Impact command - transitive downstream (or upstream) closure
async fn impact_command(
    query: &LineageQuery,
    run_id: &RunId,
    table: &str,
    upstream: bool,
) -> Result<()> {
    let short_id = canonicalize(table)?.short_id;
    let closure = if upstream {
        query.upstream_closure(run_id, table).await?
    } else {
        query.impact(run_id, table).await?
    };
    let label = if upstream { "Upstream" } else { "Downstream" };

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", format!("{} Impact Analysis", label).bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Table:".bold(), short_id.green());
    println!("{} {}", format!("{} tables:", label).bold(), closure.len());
    println!();

    if closure.is_empty() {
        println!("{}", format!("✓ No {} dependencies", label.to_lowercase()).green());
    } else {
        println!("{}", "Affected tables (nearest first):".bold());
        println!();
        for (i, dep) in closure.iter().enumerate() {
            println!("  {}. {}", i + 1, dep.yellow());
        }
        if !upstream {
            println!();
            let warning = "⚠ Changes to this table may break downstream tables!";
            println!("{}", warning.yellow().bold());
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Depends-on command - is there a lineage path between two tables
async fn depends_on_command(
    query: &LineageQuery,
    run_id: &RunId,
    table: &str,
    upstream: &str,
) -> Result<()> {
    let downstream_id = canonicalize(table)?.short_id;
    let upstream_id = canonicalize(upstream)?.short_id;

    if query.depends_on(run_id, table, upstream).await? {
        println!("{} {} {}", downstream_id.green(), "depends on".bold(), upstream_id.green());
    } else {
        println!(
            "{} {} {}",
            downstream_id.yellow(),
            "does not depend on".bold(),
            upstream_id.yellow()
        );
    }
    Ok(())
}

/// Runs command - registered runs
async fn runs_command(session: &Session) -> Result<()> {
    for run in session.store.runs().await? {
        let status = match run.completed_at {
            Some(at) => format!("completed {}", at.to_rfc3339()).green(),
            None => "in progress".yellow(),
        };
        println!(
            "{} {} {} {}",
            run.run_id.as_str().bold(),
            run.repository_url,
            run.branch.cyan(),
            status
        );
    }
    Ok(())
}

/// Init-config command - write defaults
fn init_config_command(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    config.save_to_file(path)?;
    println!("{} {}", "Config written to:".green(), path.display());
    Ok(())
}

fn print_report_summary(report: &RebuildReport) {
    let summary = &report.summary;
    println!("{} {}", "Rebuilt run:".bold(), report.run_id.as_str().green());
    println!(
        "  {} tables, {} column facts, {} relationships from {} table records and {} edge records",
        summary.tables,
        summary.column_facts,
        summary.relationships,
        summary.raw_tables,
        summary.raw_edges
    );
    if summary.dropped > 0 {
        println!("  {} records dropped", summary.dropped.to_string().yellow());
    }
    if summary.duplicates > 0 {
        println!("  {} duplicates collapsed", summary.duplicates);
    }
    println!("  {} {}", "fingerprint".dimmed(), report.fingerprint.dimmed());
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    let code = match diagnostic.severity {
        Severity::Error => diagnostic.code.as_str().red(),
        Severity::Warn => diagnostic.code.as_str().yellow(),
        Severity::Info => diagnostic.code.as_str().cyan(),
    };
    let location = diagnostic
        .location
        .as_ref()
        .map(|l| format!("{} {}", l.file, format_lines(l.line, l.end_line)))
        .unwrap_or_default();
    println!("    {} {} {}", code, diagnostic.message, location.dimmed());
}

fn format_lines(start: Option<u32>, end: Option<u32>) -> String {
    match (start, end) {
        (Some(start), Some(end)) if start != end => format!("L{}-{}", start, end),
        (Some(line), _) | (None, Some(line)) => format!("L{}", line),
        (None, None) => String::new(),
    }
}
