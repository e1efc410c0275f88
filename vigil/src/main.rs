//! vigil - live client for a code-analysis engine
//!
//! Commands:
//! - `watch`: follow the engine's event stream and print module progress
//! - `run` / `stop`: send run commands to the engine's API
//! - `findings`: extract, filter, sort and export findings from a saved log
//! - `status`: show configuration and the restorable session
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/vigil/config.toml (~/.config/vigil/config.toml)
//! - Logs and session: $XDG_STATE_HOME/vigil/ (~/.local/state/vigil/)

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use vigil_core::commands::CommandClient;
use vigil_core::findings::FindingExtractor;
use vigil_core::format::{format_age, format_sparkline};
use vigil_core::session::{RestorableSession, SessionFile};
use vigil_core::view::{self, Column, ExportFormat, FindingStats, SortSpec, ViewQuery};
use vigil_core::{
    Config, ModuleStatus, Reconciler, ReconcilerOptions, RunMode, RunState, TungsteniteConnector,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Live client for a code-analysis engine")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the event stream until interrupted
    Watch {
        /// Project to select (default: the restored session's project)
        #[arg(short, long)]
        path: Option<String>,

        /// Start a run once connected
        #[arg(long)]
        start: bool,

        /// Run mode used with --start (full, incremental, watch)
        #[arg(short, long, default_value = "full")]
        mode: RunMode,

        /// Comma-separated module ids to run
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },

    /// Ask the engine to start a run
    Run {
        /// Project to analyse
        #[arg(short, long)]
        path: String,

        /// Run mode (full, incremental, watch)
        #[arg(short, long, default_value = "full")]
        mode: RunMode,

        /// Comma-separated module ids to run
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },

    /// Ask the engine to stop the current run
    Stop {
        /// Project (default: the restored session's project)
        #[arg(short, long)]
        path: Option<String>,

        /// Stop watch mode instead of a run
        #[arg(long)]
        watch: bool,
    },

    /// Extract findings from a saved module log
    Findings {
        /// Module id that produced the log
        #[arg(short, long)]
        module: String,

        /// Log file to read
        #[arg(short, long)]
        file: PathBuf,

        /// Column filter as COLUMN=VALUE (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(Column, String)>,

        /// Column to sort by
        #[arg(short, long)]
        sort: Option<Column>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,

        /// Collapse findings with the same type, tool and message
        #[arg(long)]
        cluster: bool,

        /// Output format (table, json, yaml, toon, raw)
        #[arg(long, default_value = "table")]
        format: ExportFormat,

        /// Print the summary line to stderr
        #[arg(long)]
        summary: bool,
    },

    /// Show configuration, session and log locations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the engine's tool catalog
    Tools,
}

fn parse_filter(raw: &str) -> std::result::Result<(Column, String), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{}'", raw))?;
    Ok((column.trim().parse()?, value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        vigil_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("vigil starting up");

    match args.command {
        Command::Watch {
            path,
            start,
            mode,
            tools,
        } => cmd_watch(&config, path, start, mode, tools).await,
        Command::Run { path, mode, tools } => cmd_run(&config, &path, mode, tools).await,
        Command::Stop { path, watch } => cmd_stop(&config, path, watch).await,
        Command::Findings {
            module,
            file,
            filters,
            sort,
            desc,
            cluster,
            format,
            summary,
        } => {
            let sort = sort.map(|column| {
                if desc {
                    SortSpec::descending(column)
                } else {
                    SortSpec::ascending(column)
                }
            });
            let query = ViewQuery {
                filters,
                sort,
                cluster,
                trend_buckets: config.view.trend_buckets,
            };
            cmd_findings(&config, &module, &file, &query, format, summary)
        }
        Command::Status { json } => cmd_status(&config, json),
        Command::Tools => cmd_tools(&config).await,
    }
}

async fn cmd_watch(
    config: &Config,
    path: Option<String>,
    start: bool,
    mode: RunMode,
    tools: Vec<String>,
) -> Result<()> {
    let options = ReconcilerOptions::from_config(config).context("invalid server configuration")?;
    let reconciler = Reconciler::spawn(options, Arc::new(TungsteniteConnector));

    if let Some(path) = &path {
        reconciler.select_project(path.clone());
    }
    reconciler.connect();
    reconciler.refresh_tools();

    if start {
        let tools = (!tools.is_empty()).then_some(tools);
        reconciler.start_run(mode, path, tools);
    }

    println!("Watching {} (Ctrl+C to stop)", config.server.stream_url());

    follow(&reconciler, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Interrupted, disconnecting");
    })
    .await;

    reconciler.disconnect();
    print_summary(&reconciler.findings(), config.view.trend_buckets);
    Ok(())
}

/// Print state and connection transitions until `shutdown` resolves or the
/// reconciler stops.
async fn follow(reconciler: &Reconciler, shutdown: impl Future<Output = ()>) -> PrintedState {
    let mut states = reconciler.subscribe();
    let mut connection = reconciler.subscribe_connection();
    let mut printed = PrintedState::default();
    printed.print(&reconciler.snapshot());

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                printed.print(&state);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                println!("connection: {}", state.as_str());
            }
            _ = &mut shutdown => break,
        }
    }
    printed
}

/// What has already been printed, so only transitions are shown
#[derive(Default)]
struct PrintedState {
    overall: Option<String>,
    modules: BTreeMap<String, ModuleStatus>,
    system_message: String,
}

impl PrintedState {
    fn print(&mut self, state: &RunState) {
        let overall = state.overall_status.as_str().to_string();
        if self.overall.as_deref() != Some(overall.as_str()) {
            let project = if state.project_path.is_empty() {
                "no project"
            } else {
                state.project_path.as_str()
            };
            println!("[{}] {}", overall, project);
            self.overall = Some(overall);
        }

        if state.last_system_message != self.system_message {
            if !state.last_system_message.is_empty() {
                println!("  {}", state.last_system_message);
            }
            self.system_message = state.last_system_message.clone();
        }

        // Reset removes modules
        self.modules.retain(|id, _| state.modules.contains_key(id));
        for (id, module) in &state.modules {
            if self.modules.get(id) == Some(&module.status) {
                continue;
            }
            match &module.summary {
                Some(summary) => println!("  {:<24} {:<8} {}", id, module.status, summary),
                None => println!("  {:<24} {}", id, module.status),
            }
            self.modules.insert(id.clone(), module.status);
        }
    }
}

fn print_summary(findings: &[vigil_core::Finding], trend_buckets: usize) {
    let stats = FindingStats::calculate(findings, trend_buckets);
    println!();
    println!(
        "{} errors, {} warnings, {} infos",
        stats.total_errors, stats.total_warnings, stats.total_infos
    );
    if let Some(last) = stats.last_finding {
        println!("last finding {}", format_age(last, Utc::now()));
    }
    if !stats.trend.is_empty() {
        println!("trend {}", format_sparkline(&stats.trend));
    }
}

async fn cmd_run(config: &Config, path: &str, mode: RunMode, tools: Vec<String>) -> Result<()> {
    let client = CommandClient::new(&config.server).context("invalid server configuration")?;
    let tools = (!tools.is_empty()).then_some(tools);

    client
        .start_run(path, mode, tools.as_deref())
        .await
        .context("start request failed")?;

    println!("Started {} run for {}", mode.as_str(), path);

    update_session(|session| {
        session.project_path = path.to_string();
        session.is_watching = mode == RunMode::Watch;
    })
}

async fn cmd_stop(config: &Config, path: Option<String>, watch: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => SessionFile::default_location().load().project_path,
    };
    if path.is_empty() {
        return Err(anyhow!("no project selected; pass --path"));
    }

    let client = CommandClient::new(&config.server).context("invalid server configuration")?;
    if watch {
        client
            .stop_watch(&path)
            .await
            .context("stop-watch request failed")?;
        println!("Stopped watching {}", path);
    } else {
        client
            .stop_run(&path)
            .await
            .context("stop request failed")?;
        println!("Stopped run for {}", path);
    }

    update_session(|session| {
        session.project_path = path;
        if watch {
            session.is_watching = false;
        }
    })
}

/// Apply a change to the stored session so `status` and later commands see it
fn update_session(change: impl FnOnce(&mut RestorableSession)) -> Result<()> {
    let file = SessionFile::default_location();
    let mut session = file.load();
    change(&mut session);
    file.save(&session)
        .with_context(|| format!("failed to save {}", file.path().display()))
}

fn cmd_findings(
    config: &Config,
    module: &str,
    file: &Path,
    query: &ViewQuery,
    format: ExportFormat,
    summary: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let extractor = FindingExtractor::new(config.tool_names());
    let findings = extractor.extract(module, &text);
    tracing::debug!(module, count = findings.len(), "Extracted findings");

    let result = query.process(&findings);
    let output = if query.cluster && format == ExportFormat::Table {
        result
            .rows
            .iter()
            .map(|row| {
                let line = view::serialize(std::slice::from_ref(&row.finding), format)?;
                Ok(match row.count {
                    Some(count) => format!("{};x{}", line, count),
                    None => line,
                })
            })
            .collect::<vigil_core::Result<Vec<_>>>()?
            .join("\n")
    } else {
        view::serialize(&result.findings(), format)?
    };

    if !output.is_empty() {
        println!("{}", output);
    }
    if summary {
        let stats = &result.summary;
        eprintln!(
            "{} findings: {} errors, {} warnings, {} infos",
            stats.total(),
            stats.total_errors,
            stats.total_warnings,
            stats.total_infos
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    config_path: PathBuf,
    log_path: PathBuf,
    session_path: PathBuf,
    stream_url: String,
    api_url: String,
    project_path: String,
    is_watching: bool,
}

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let session_file = SessionFile::default_location();
    let session = session_file.load();

    let report = StatusReport {
        config_path: Config::config_path(),
        log_path: vigil_core::logging::log_file_path(),
        session_path: session_file.path().to_path_buf(),
        stream_url: config.server.stream_url(),
        api_url: config.server.api_url.clone(),
        project_path: session.project_path,
        is_watching: session.is_watching,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("vigil status");
    println!("============");
    println!();
    println!("Config:       {}", report.config_path.display());
    println!("Log file:     {}", report.log_path.display());
    println!("Session:      {}", report.session_path.display());
    println!("Stream URL:   {}", report.stream_url);
    println!("API URL:      {}", report.api_url);
    println!();
    if report.project_path.is_empty() {
        println!("Project:      (none)");
    } else {
        println!("Project:      {}", report.project_path);
    }
    println!("Watching:     {}", report.is_watching);
    Ok(())
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let client = CommandClient::new(&config.server).context("invalid server configuration")?;
    let catalog = client
        .fetch_tools()
        .await
        .context("failed to fetch tool catalog")?;

    for tool in &catalog {
        match &tool.subtitle {
            Some(subtitle) => println!("{:<24} {} ({})", tool.id, tool.title, subtitle),
            None => println!("{:<24} {}", tool.id, tool.title),
        }
    }
    Ok(())
}
