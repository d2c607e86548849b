//! BatchRun driver.
//!
//! Reads a list of work items, runs one agent task per item in an isolated
//! workspace, and writes every captured result line to a single aggregate
//! document (and optionally back into the source rows).

use std::error::Error;
use std::sync::Arc;

use batchrun_core::{BatchId, PromptTemplate};
use batchrun_storage::{
    BlobStore, CsvRowStore, GcsBlobStore, LocalBlobStore, RowStore, SheetsRowStore,
};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod channel;
mod command;
mod config;
mod driver;
mod error;
mod executor;
mod json_output;
mod report;
mod sink;
mod source;

use channel::IsolatedWorkspaces;
use config::{Cli, Config, RowBackend};
use driver::Driver;
use error::DriverError;
use json_output::EventEmitter;
use report::BatchReport;
use sink::{AggregateSink, RowSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for JSON events
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_cli(cli)?;
    let events = EventEmitter::new(config.json);

    info!(
        bucket = ?config.bucket,
        template = %config.template_path,
        output = %config.output_path,
        "Starting BatchRun"
    );

    match run(config, events).await {
        Ok(report) => {
            info!(
                batch_id = %report.batch_id,
                recorded = report.recorded,
                completed = report.completed,
                failed = report.failed,
                destination = %report.destination,
                "Batch complete"
            );
            events.batch_flushed(&report);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Batch failed");
            events.batch_failed(&e.to_string());
            Err(e.into())
        }
    }
}

async fn run(config: Config, events: EventEmitter) -> Result<BatchReport, DriverError> {
    let blobs: Arc<dyn BlobStore> = match &config.bucket {
        Some(bucket) => Arc::new(GcsBlobStore::new(bucket, config.google_token.clone())),
        None => Arc::new(LocalBlobStore::new()),
    };
    let rows: Option<Arc<dyn RowStore>> = config.rows.as_ref().map(|backend| match backend {
        RowBackend::Sheets { spreadsheet_id } => Arc::new(SheetsRowStore::new(
            spreadsheet_id,
            config.google_token.clone(),
        )) as Arc<dyn RowStore>,
        RowBackend::LocalCsv { path } => Arc::new(CsvRowStore::new(path)) as Arc<dyn RowStore>,
    });

    let text = blobs
        .read_text(&config.template_path)
        .await
        .map_err(DriverError::TemplateUnavailable)?;
    let template = PromptTemplate::new(text, config.placeholder.as_str())?;

    let batch = source::read_source(&config.source, blobs.as_ref(), rows.as_deref()).await?;

    let batch_id = BatchId::generate();
    let workspaces = Arc::new(IsolatedWorkspaces::new(
        config.workspace_root.join(batch_id.short()),
        config.keep_workspaces,
    ));
    info!(
        batch_id = %batch_id,
        items = batch.len(),
        workspaces = %workspaces.root().display(),
        "Source loaded"
    );

    let mut driver = Driver::new(
        batch_id,
        template,
        executor::build(&config.executor),
        workspaces.clone(),
    )
    .with_completion_sentinel(config.completion_sentinel.clone())
    .with_task_timeout(config.task_timeout)
    .with_events(events);

    if let (Some(spec), Some(store)) = (&config.row_sink, &rows) {
        let row_sink = RowSink::new(store.clone(), config.sheet(), spec.column, spec.output_size);
        info!(
            column = %spec.column,
            output_size = row_sink.output_size(),
            "Writing results back to source rows"
        );
        driver = driver.with_row_sink(row_sink);
    }

    let sink = AggregateSink::new(blobs, config.output_path.clone());
    let result = driver.run(batch, sink).await;
    workspaces.close().await;
    result
}
