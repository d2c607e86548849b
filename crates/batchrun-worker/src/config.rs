//! Driver configuration.
//!
//! The command line (with environment fallbacks) is parsed once into a
//! [`Cli`], validated into a [`Config`], and passed down explicitly.

use std::path::PathBuf;
use std::time::Duration;

use batchrun_claude_sdk::PermissionMode;
use batchrun_core::{Column, CompletionSentinel, CoreError, RowRange, DEFAULT_PLACEHOLDER};
use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::source::SourceSpec;

#[derive(Parser, Debug)]
#[command(name = "batchrun")]
#[command(about = "Run one agent task per source row and collect the results")]
#[command(version)]
pub struct Cli {
    /// GCS bucket holding the template, source and output (local files when unset)
    #[arg(long, env = "BATCHRUN_BUCKET")]
    pub bucket: Option<String>,

    /// Path of the prompt template
    #[arg(short, long)]
    pub template: String,

    /// Placeholder replaced by each item's identifier
    #[arg(long, default_value = DEFAULT_PLACEHOLDER)]
    pub placeholder: String,

    /// Delimited source file (header row, identifiers in the first column)
    #[arg(long, conflicts_with_all = ["spreadsheet_id", "rows_csv"])]
    pub source_csv: Option<String>,

    /// Google Sheets spreadsheet used as the row source
    #[arg(long, conflicts_with = "rows_csv")]
    pub spreadsheet_id: Option<String>,

    /// Local CSV file used as the row source
    #[arg(long)]
    pub rows_csv: Option<PathBuf>,

    /// Sheet name within the spreadsheet
    #[arg(long)]
    pub sheet: Option<String>,

    /// Column holding the identifiers
    #[arg(long, default_value = "A")]
    pub column: String,

    /// Header row of the range (1-based)
    #[arg(long, default_value = "1")]
    pub start_row: u32,

    /// Last row of the range (inclusive)
    #[arg(long)]
    pub end_row: Option<u32>,

    /// Destination of the aggregate output
    #[arg(short, long)]
    pub output: String,

    /// Also write each result into this column of the source row
    #[arg(long, requires = "output_size")]
    pub output_column: Option<String>,

    /// Maximum number of result fields written per row
    #[arg(long)]
    pub output_size: Option<usize>,

    /// Task executor
    #[arg(long, value_enum, default_value = "claude")]
    pub executor: ExecutorKind,

    /// Path to the claude CLI
    #[arg(long, env = "CLAUDE_PATH", default_value = "claude")]
    pub claude_path: String,

    /// Model for the claude executor
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum agent turns per task
    #[arg(long, default_value = "10")]
    pub max_turns: u32,

    /// Permission mode for the claude executor
    #[arg(long, default_value = "bypassPermissions")]
    pub permission_mode: PermissionMode,

    /// Use the agent's final answer when it writes no output file
    #[arg(long)]
    pub capture_final_result: bool,

    /// Per-task timeout in seconds (0 disables)
    #[arg(long)]
    pub task_timeout_secs: Option<u64>,

    /// Treat raised executor errors containing this text as completion
    #[arg(long)]
    pub completion_sentinel: Option<String>,

    /// Directory for per-task workspaces
    #[arg(long, default_value = "batchrun_workspace")]
    pub workspace_root: PathBuf,

    /// Keep task workspaces after the batch
    #[arg(long)]
    pub keep_workspaces: bool,

    /// Google OAuth bearer token for Cloud Storage and Sheets
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub google_token: Option<String>,

    /// Emit JSON events on stdout
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Program and arguments for the command executor
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutorKind {
    Claude,
    Command,
}

/// Invalid option combinations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No source given: use --source-csv, --spreadsheet-id or --rows-csv")]
    MissingSource,

    #[error("--end-row is required for a row-store source")]
    MissingEndRow,

    #[error("--output-column requires a row-store source")]
    RowSinkWithoutRows,

    #[error("--output-size must be at least 1")]
    InvalidOutputSize,

    #[error("The command executor needs a program after `--`")]
    MissingCommand,

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Backend of a row-addressed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowBackend {
    Sheets { spreadsheet_id: String },
    LocalCsv { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSinkSpec {
    pub column: Column,
    pub output_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorSpec {
    Claude {
        claude_path: String,
        model: Option<String>,
        max_turns: u32,
        permission_mode: PermissionMode,
        capture_final_result: bool,
    },
    Command {
        program: String,
        args: Vec<String>,
    },
}

/// Validated configuration for one batch.
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: Option<String>,
    pub google_token: Option<String>,
    pub template_path: String,
    pub placeholder: String,
    pub source: SourceSpec,
    pub rows: Option<RowBackend>,
    pub output_path: String,
    pub row_sink: Option<RowSinkSpec>,
    pub executor: ExecutorSpec,
    pub task_timeout: Option<Duration>,
    pub completion_sentinel: Option<CompletionSentinel>,
    pub workspace_root: PathBuf,
    pub keep_workspaces: bool,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let rows = match (cli.spreadsheet_id, cli.rows_csv) {
            (Some(spreadsheet_id), _) => Some(RowBackend::Sheets { spreadsheet_id }),
            (None, Some(path)) => Some(RowBackend::LocalCsv { path }),
            (None, None) => None,
        };

        let source = match (cli.source_csv, &rows) {
            (Some(path), _) => SourceSpec::Delimited { path },
            (None, Some(_)) => {
                let end_row = cli.end_row.ok_or(ConfigError::MissingEndRow)?;
                let column: Column = cli.column.parse()?;
                let range = RowRange::new(cli.sheet.clone(), column, cli.start_row, end_row)?;
                SourceSpec::Range { range }
            }
            (None, None) => return Err(ConfigError::MissingSource),
        };

        let row_sink = match cli.output_column {
            Some(column) => {
                if !matches!(source, SourceSpec::Range { .. }) {
                    return Err(ConfigError::RowSinkWithoutRows);
                }
                let output_size = cli.output_size.unwrap_or(0);
                if output_size == 0 {
                    return Err(ConfigError::InvalidOutputSize);
                }
                Some(RowSinkSpec {
                    column: column.parse()?,
                    output_size,
                })
            }
            None => None,
        };

        let executor = match cli.executor {
            ExecutorKind::Claude => ExecutorSpec::Claude {
                claude_path: cli.claude_path,
                model: cli.model,
                max_turns: cli.max_turns,
                permission_mode: cli.permission_mode,
                capture_final_result: cli.capture_final_result,
            },
            ExecutorKind::Command => {
                let mut command = cli.command.into_iter();
                let program = command.next().ok_or(ConfigError::MissingCommand)?;
                ExecutorSpec::Command {
                    program,
                    args: command.collect(),
                }
            }
        };

        Ok(Self {
            bucket: cli.bucket,
            google_token: cli.google_token,
            template_path: cli.template,
            placeholder: cli.placeholder,
            source,
            rows,
            output_path: cli.output,
            row_sink,
            executor,
            task_timeout: cli
                .task_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            completion_sentinel: cli
                .completion_sentinel
                .as_deref()
                .and_then(CompletionSentinel::new),
            workspace_root: cli.workspace_root,
            keep_workspaces: cli.keep_workspaces,
            json: cli.json,
            verbose: cli.verbose,
        })
    }

    /// Sheet name for row writes, shared with the source range.
    pub fn sheet(&self) -> Option<String> {
        match &self.source {
            SourceSpec::Range { range } => range.sheet.clone(),
            SourceSpec::Delimited { .. } => None,
        }
    }
}
