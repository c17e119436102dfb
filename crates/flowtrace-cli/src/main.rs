//! FlowTrace CLI - SQL flow graphs, lineage and change impact

use flowtrace_cli::cli;
use flowtrace_cli::input;
use flowtrace_cli::output;

use anyhow::{Context, Result};
use clap::Parser;
use flowtrace_core::{
    build_flow_batch, build_lineage_graph_from_sources, get_full_column_lineage_with_config,
    AnalyzerConfig, Direction, FlowAnalyzer, FlowOptions, ImpactAnalyzer, ImpactError,
    LineageGraph, SourceFile,
};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{debug, info_span};
use tracing_subscriber::EnvFilter;

use cli::{Args, Command, OutputFormat, TraverseArgs};
use output::{
    format_column_lineage, format_flow_batch, format_flow_result, format_graph,
    format_impact_report, format_json,
};

/// Analysis reported errors (failed statements, unknown nodes or columns).
const EXIT_FAILURE: u8 = 1;
/// Configuration error (unreadable input or config file).
const EXIT_CONFIG_ERROR: u8 = 66;

const LOG_ENV: &str = "FLOWTRACE_LOG";

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.quiet);

    match run(args) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("flowtrace: error: {e:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn init_tracing(quiet: bool) {
    let fallback = if quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    // A second initialization only happens in tests; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Runs one command. `Ok(true)` means the analysis itself reported errors.
fn run(args: Args) -> Result<bool> {
    let config = load_config(&args)?;
    let sources = input::read_input(args.command.inputs())?;
    let _span = info_span!("command", files = sources.len()).entered();
    debug!(dialect = ?config.lineage.dialect, "loaded configuration");

    match &args.command {
        Command::Flow(_) => run_flow(&args, &config, &sources),
        Command::Graph(_) => {
            let graph = build_graph(&config, &sources);
            match args.format {
                OutputFormat::Json => emit(&format_json(&graph, args.compact)?),
                OutputFormat::Text => emit(&format_graph(&graph, args.quiet, true)),
            }?;
            Ok(false)
        }
        Command::Upstream(traverse) => {
            run_traverse(&args, &config, &sources, traverse, Direction::Upstream)
        }
        Command::Downstream(traverse) => {
            run_traverse(&args, &config, &sources, traverse, Direction::Downstream)
        }
        Command::Impact(impact) => {
            let graph = build_graph(&config, &sources);
            let analyzer = ImpactAnalyzer::with_config(&graph, config.clone());
            let change = impact.change.into();
            let report = match &impact.column {
                Some(column) => analyzer.analyze_column_change(&impact.table, column, change),
                None => analyzer.analyze_table_change(&impact.table, change),
            };
            let report = match report {
                Ok(report) => report,
                Err(err @ (ImpactError::MissingTable | ImpactError::MissingColumn)) => {
                    return Err(err).context("invalid impact request");
                }
                Err(ImpactError::NotFound(err)) => {
                    eprintln!("flowtrace: error: {err}");
                    return Ok(true);
                }
            };
            match args.format {
                OutputFormat::Json => emit(&format_json(&report, args.compact)?),
                OutputFormat::Text => emit(&format_impact_report(&report, args.quiet, true)),
            }?;
            Ok(false)
        }
        Command::Columns(columns) => {
            let graph = build_graph(&config, &sources);
            let result = get_full_column_lineage_with_config(
                &graph,
                &columns.table,
                &columns.column,
                &config,
            );
            match args.format {
                OutputFormat::Json => emit(&format_json(&result, args.compact)?),
                OutputFormat::Text => emit(&format_column_lineage(&result, true)),
            }?;
            Ok(result.warning.is_some())
        }
    }
}

/// Config file first, then flag overrides.
fn load_config(args: &Args) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            AnalyzerConfig::from_json(&raw)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        None => AnalyzerConfig::default(),
    };
    if let Some(dialect) = args.dialect {
        config.lineage.dialect = dialect.into();
    }
    if let Some(schema) = &args.default_schema {
        config.lineage.default_schema = Some(schema.clone());
    }
    Ok(config)
}

fn build_graph(config: &AnalyzerConfig, sources: &[SourceFile]) -> LineageGraph {
    build_lineage_graph_from_sources(sources, config.lineage.dialect, &config.lineage)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileFlows {
    file: String,
    #[serde(flatten)]
    batch: flowtrace_core::FlowBatch,
}

fn run_flow(args: &Args, config: &AnalyzerConfig, sources: &[SourceFile]) -> Result<bool> {
    let flows: Vec<FileFlows> = sources
        .iter()
        .map(|source| FileFlows {
            file: source.path.clone(),
            batch: build_flow_batch(&source.content, config.lineage.dialect),
        })
        .collect();
    let has_errors = flows.iter().any(|flow| flow.batch.error_count > 0);

    match args.format {
        OutputFormat::Json => emit(&format_json(&flows, args.compact)?)?,
        OutputFormat::Text => {
            let mut out = String::new();
            for flow in &flows {
                if flows.len() > 1 {
                    out.push_str(&format!("File: {}\n", flow.file));
                }
                out.push_str(&format_flow_batch(&flow.batch, args.quiet, true));
                out.push('\n');
            }
            emit(&out)?;
        }
    }
    Ok(has_errors)
}

fn run_traverse(
    args: &Args,
    config: &AnalyzerConfig,
    sources: &[SourceFile],
    traverse: &TraverseArgs,
    direction: Direction,
) -> Result<bool> {
    let graph = build_graph(config, sources);
    let options = FlowOptions {
        max_depth: traverse.depth,
        exclude_external: traverse.exclude_external,
    };
    let analyzer = FlowAnalyzer::with_config(&graph, config.clone());
    let result = match analyzer.get_lineage(&traverse.node, direction, &options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("flowtrace: error: {err}");
            return Ok(true);
        }
    };
    match args.format {
        OutputFormat::Json => emit(&format_json(&result, args.compact)?)?,
        OutputFormat::Text => emit(&format_flow_result(&result, true))?,
    }
    Ok(false)
}

fn emit(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .context("Failed to write output")?;
    if !text.ends_with('\n') {
        writeln!(stdout).context("Failed to write output")?;
    }
    Ok(())
}
