//! CLI argument parsing using clap.

use clap::{Parser, Subcommand, ValueEnum};
use flowtrace_core::ChangeType;
use std::path::PathBuf;

/// FlowTrace - SQL flow graphs, lineage and change impact
#[derive(Parser, Debug)]
#[command(name = "flowtrace")]
#[command(about = "Trace data flow through SQL files", long_about = None)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// SQL dialect (overrides the config file)
    #[arg(short, long, global = true, value_enum)]
    pub dialect: Option<DialectArg>,

    /// Schema assumed for unqualified table names (overrides the config file)
    #[arg(long, global = true, value_name = "SCHEMA")]
    pub default_schema: Option<String>,

    /// JSON analyzer configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty-printing)
    #[arg(short, long, global = true)]
    pub compact: bool,

    /// Suppress warnings on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the operator pipeline of every statement
    Flow(InputArgs),
    /// Build the workspace lineage graph and print it
    Graph(InputArgs),
    /// List everything a node reads from
    Upstream(TraverseArgs),
    /// List everything that reads from a node
    Downstream(TraverseArgs),
    /// Report what a table or column change would break
    Impact(ImpactArgs),
    /// Trace every path into and out of one column
    Columns(ColumnArgs),
}

impl Command {
    /// Files and directories named on the command line.
    pub fn inputs(&self) -> &[PathBuf] {
        match self {
            Self::Flow(args) | Self::Graph(args) => &args.files,
            Self::Upstream(args) | Self::Downstream(args) => &args.input.files,
            Self::Impact(args) => &args.input.files,
            Self::Columns(args) => &args.input.files,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// SQL files or directories (reads from stdin if none provided)
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct TraverseArgs {
    /// Node id (e.g. `view:customer_orders`, `column:orders.id`) or bare name
    #[arg(short, long)]
    pub node: String,

    /// Hop limit; -1 walks the whole graph
    #[arg(long, allow_negative_numbers = true)]
    pub depth: Option<f64>,

    /// Leave external (undefined) relations out of the output
    #[arg(long)]
    pub exclude_external: bool,

    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(clap::Args, Debug)]
pub struct ImpactArgs {
    /// Table or view being changed
    #[arg(short, long)]
    pub table: String,

    /// Column being changed; omit for a table-level change
    #[arg(long)]
    pub column: Option<String>,

    /// Kind of change
    #[arg(long, default_value = "modify", value_enum)]
    pub change: ChangeArg,

    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(clap::Args, Debug)]
pub struct ColumnArgs {
    /// Table or view owning the column
    #[arg(short, long)]
    pub table: String,

    #[arg(long)]
    pub column: String,

    #[command(flatten)]
    pub input: InputArgs,
}

/// SQL dialect options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Generic,
    Ansi,
    Bigquery,
    Clickhouse,
    Databricks,
    Duckdb,
    Hive,
    Mssql,
    Mysql,
    Postgres,
    Redshift,
    Snowflake,
    Sqlite,
}

impl From<DialectArg> for flowtrace_core::Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Generic => flowtrace_core::Dialect::Generic,
            DialectArg::Ansi => flowtrace_core::Dialect::Ansi,
            DialectArg::Bigquery => flowtrace_core::Dialect::Bigquery,
            DialectArg::Clickhouse => flowtrace_core::Dialect::Clickhouse,
            DialectArg::Databricks => flowtrace_core::Dialect::Databricks,
            DialectArg::Duckdb => flowtrace_core::Dialect::Duckdb,
            DialectArg::Hive => flowtrace_core::Dialect::Hive,
            DialectArg::Mssql => flowtrace_core::Dialect::Mssql,
            DialectArg::Mysql => flowtrace_core::Dialect::Mysql,
            DialectArg::Postgres => flowtrace_core::Dialect::Postgres,
            DialectArg::Redshift => flowtrace_core::Dialect::Redshift,
            DialectArg::Snowflake => flowtrace_core::Dialect::Snowflake,
            DialectArg::Sqlite => flowtrace_core::Dialect::Sqlite,
        }
    }
}

/// Schema change options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChangeArg {
    Modify,
    Rename,
    Drop,
    #[value(alias = "add_column")]
    AddColumn,
}

impl From<ChangeArg> for ChangeType {
    fn from(change: ChangeArg) -> Self {
        match change {
            ChangeArg::Modify => ChangeType::Modify,
            ChangeArg::Rename => ChangeType::Rename,
            ChangeArg::Drop => ChangeType::Drop,
            ChangeArg::AddColumn => ChangeType::AddColumn,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "flowtrace",
            "upstream",
            "--node",
            "view:v",
            "--depth",
            "-1",
            "-f",
            "json",
            "models/",
        ]);
        assert_eq!(args.format, OutputFormat::Json);
        let Command::Upstream(traverse) = &args.command else {
            panic!("expected upstream");
        };
        assert_eq!(traverse.depth, Some(-1.0));
        assert_eq!(args.command.inputs(), &[PathBuf::from("models/")]);
    }

    #[test]
    fn test_change_accepts_snake_case_alias() {
        let args = Args::parse_from([
            "flowtrace",
            "impact",
            "--table",
            "orders",
            "--change",
            "add_column",
        ]);
        let Command::Impact(impact) = args.command else {
            panic!("expected impact");
        };
        assert_eq!(ChangeType::from(impact.change), ChangeType::AddColumn);
        assert!(impact.column.is_none());
    }

    #[test]
    fn test_dialect_conversion() {
        let dialect: flowtrace_core::Dialect = DialectArg::Postgres.into();
        assert_eq!(dialect, flowtrace_core::Dialect::Postgres);
    }
}
