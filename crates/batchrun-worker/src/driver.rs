//! The batch driver.
//!
//! Runs one task per work item, strictly in source order, and turns every
//! item into exactly one result record whatever the executor does. Only the
//! final aggregate flush can fail the batch.

use std::sync::Arc;
use std::time::Duration;

use batchrun_core::{
    BatchId, CompletionSentinel, ItemPhase, PromptTemplate, ResultRecord, RowCursor, TaskOutcome,
    WorkItem,
};
use tracing::{debug, info, trace, warn};

use crate::channel::ChannelProvider;
use crate::error::DriverError;
use crate::executor::{ExecutorError, TaskContext, TaskExecutor};
use crate::json_output::EventEmitter;
use crate::report::BatchReport;
use crate::sink::{AggregateSink, RowSink};
use crate::source::SourceBatch;

/// Sequential batch driver.
pub struct Driver {
    batch_id: BatchId,
    template: PromptTemplate,
    executor: Arc<dyn TaskExecutor>,
    channels: Arc<dyn ChannelProvider>,
    row_sink: Option<RowSink>,
    sentinel: Option<CompletionSentinel>,
    task_timeout: Option<Duration>,
    events: EventEmitter,
}

impl Driver {
    pub fn new(
        batch_id: BatchId,
        template: PromptTemplate,
        executor: Arc<dyn TaskExecutor>,
        channels: Arc<dyn ChannelProvider>,
    ) -> Self {
        Self {
            batch_id,
            template,
            executor,
            channels,
            row_sink: None,
            sentinel: None,
            task_timeout: None,
            events: EventEmitter::default(),
        }
    }

    /// Also write each result into the source row.
    pub fn with_row_sink(mut self, sink: RowSink) -> Self {
        self.row_sink = Some(sink);
        self
    }

    /// Treat raised errors containing `sentinel` as completion.
    pub fn with_completion_sentinel(mut self, sentinel: Option<CompletionSentinel>) -> Self {
        self.sentinel = sentinel;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Process every item of `batch`, then flush `sink` once.
    pub async fn run(
        &self,
        batch: SourceBatch,
        mut sink: AggregateSink,
    ) -> Result<BatchReport, DriverError> {
        let destination = sink.destination();
        let mut report = BatchReport::start(self.batch_id.clone(), batch.len(), &destination);
        let mut cursor = batch.first_row.map(RowCursor::new);

        info!(
            batch_id = %self.batch_id,
            items = batch.len(),
            executor = self.executor.name(),
            destination = %destination,
            "Starting batch"
        );
        self.events
            .batch_started(self.batch_id.as_str(), batch.len(), &destination);

        if batch.is_empty() {
            info!("Source is empty; writing an empty document");
        }
        if self.row_sink.is_some() && cursor.is_none() {
            warn!("Row sink configured but the source has no row addresses; row writes disabled");
        }

        for (position, item) in batch.items.iter().enumerate() {
            let mut phase = ItemPhase::default();

            let (outcome, raw_line) = if item.is_blank() {
                debug!(position, row = ?item.row_index(), "Blank row, recording without invocation");
                report.skipped += 1;
                (None, String::new())
            } else {
                self.events
                    .item_started(position, item.identifier(), item.row_index());
                enter(&mut phase, ItemPhase::Invoking, item);
                let (outcome, line) = self.invoke(position, item).await;
                report.count_outcome(&outcome);
                (Some(outcome), line)
            };
            enter(&mut phase, ItemPhase::Captured, item);

            let record = sink.append(ResultRecord::new(item.identifier(), raw_line));
            enter(&mut phase, ItemPhase::Recorded, item);
            report.recorded += 1;
            if record.has_payload() {
                report.with_payload += 1;
            }

            let label = outcome.as_ref().map_or("skipped", TaskOutcome::label);
            info!(
                position,
                item = %item.identifier(),
                outcome = label,
                payload = record.has_payload(),
                "Item recorded"
            );
            self.events
                .item_recorded(position, item.identifier(), label, &record.raw_line);

            if let Some(cursor) = cursor.as_mut() {
                let row = cursor.advance();
                if item.is_blank() {
                    continue;
                }
                if let Some(row_sink) = &self.row_sink {
                    match row_sink.write(row, record).await {
                        Ok(_) => report.row_writes += 1,
                        Err(e) => {
                            warn!(row, item = %item.identifier(), error = %e, "Row write failed");
                            self.events
                                .row_write_failed(row, item.identifier(), &e.to_string());
                            report.row_write_failures += 1;
                        }
                    }
                }
            }
        }

        report.next_row = cursor.map(|c| c.current());

        let records = sink.len();
        let bytes = sink.flush().await.map_err(DriverError::SinkWrite)?;
        report.finish(bytes);

        info!(
            batch_id = %self.batch_id,
            records,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            row_write_failures = report.row_write_failures,
            duration_ms = ?report.duration_ms(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Run one item and capture its result line. Never fails.
    async fn invoke(&self, position: usize, item: &WorkItem) -> (TaskOutcome, String) {
        let identifier = item.identifier();

        let slot = match self.channels.open(position, item).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(item = %identifier, error = %e, "Could not prepare task workspace");
                return (
                    TaskOutcome::failed(format!("workspace unavailable: {}", e)),
                    String::new(),
                );
            }
        };

        if let Err(e) = slot.channel.reset().await {
            warn!(item = %identifier, error = %e, "Could not reset output channel");
            self.channels.discard(slot).await;
            return (
                TaskOutcome::failed(format!("output channel unavailable: {}", e)),
                String::new(),
            );
        }

        let spec = self.template.render(identifier);
        let ctx = TaskContext {
            item,
            spec: &spec,
            workspace: &slot.workspace,
            channel: slot.channel.as_ref(),
        };

        let result = match self.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.executor.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(ExecutorError::TimedOut(limit)),
            },
            None => self.executor.execute(ctx).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(ExecutorError::TimedOut(limit)) => {
                warn!(item = %identifier, timeout = ?limit, "Task timed out");
                TaskOutcome::failed(format!("timed out after {:?}", limit))
            }
            Err(e) => {
                let outcome = CompletionSentinel::classify(self.sentinel.as_ref(), &e.to_string());
                if outcome.is_completed() {
                    debug!(item = %identifier, error = %e, "Raised error matched completion sentinel");
                } else {
                    warn!(item = %identifier, error = %e, "Task execution failed");
                }
                outcome
            }
        };

        if let TaskOutcome::Failed(reason) = &outcome {
            debug!(item = %identifier, reason = %reason, "Task reported failure");
        }

        let line = slot.channel.read_first_line().await;
        self.channels.discard(slot).await;
        (outcome, line)
    }
}

fn enter(phase: &mut ItemPhase, to: ItemPhase, item: &WorkItem) {
    match phase.transition(to) {
        Ok(()) => trace!(item = %item.identifier(), phase = %to, "Item phase"),
        Err(e) => warn!(item = %item.identifier(), error = %e, "Unexpected item phase change"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::{BrokenProvider, MemoryChannel, SharedChannelProvider};
    use crate::channel::IsolatedWorkspaces;
    use async_trait::async_trait;
    use batchrun_core::Column;
    use batchrun_storage::{MemoryBlobStore, MemoryRowStore};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    enum Step {
        /// Write a line and complete.
        Answer(&'static str),
        /// Complete without writing anything.
        Silent,
        /// Report failure after writing a partial line.
        Fail(&'static str, &'static str),
        /// Raise an error with this message.
        Raise(&'static str),
        Hang,
    }

    /// Executor following a per-identifier script.
    struct ScriptedExecutor {
        steps: HashMap<&'static str, Step>,
        /// (identifier, channel content at start, specification)
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedExecutor {
        fn new(steps: &[(&'static str, Step)]) -> Arc<Self> {
            Arc::new(Self {
                steps: steps.iter().cloned().collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, ctx: TaskContext<'_>) -> Result<TaskOutcome, ExecutorError> {
            let seen = ctx.channel.read_first_line().await;
            self.calls.lock().await.push((
                ctx.item.identifier().to_string(),
                seen,
                ctx.spec.to_string(),
            ));

            match self.steps.get(ctx.item.identifier()).cloned() {
                Some(Step::Answer(line)) => {
                    ctx.channel.write_line(line).await?;
                    Ok(TaskOutcome::Completed)
                }
                Some(Step::Silent) => Ok(TaskOutcome::Completed),
                Some(Step::Fail(partial, reason)) => {
                    ctx.channel.write_line(partial).await?;
                    Ok(TaskOutcome::failed(reason))
                }
                Some(Step::Raise(message)) => Err(ExecutorError::Raised(message.to_string())),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(TaskOutcome::Completed)
                }
                None => Err(ExecutorError::Raised("unscripted item".to_string())),
            }
        }
    }

    fn template() -> PromptTemplate {
        PromptTemplate::with_default_placeholder("Research {company_name} and report.").unwrap()
    }

    fn items(ids: &[&str]) -> SourceBatch {
        SourceBatch {
            items: ids.iter().map(|id| WorkItem::new(*id)).collect(),
            first_row: None,
        }
    }

    fn rows(ids: &[&str], first_row: u32) -> SourceBatch {
        SourceBatch {
            items: ids
                .iter()
                .zip(first_row..)
                .map(|(id, row)| WorkItem::at_row(*id, row))
                .collect(),
            first_row: Some(first_row),
        }
    }

    fn driver(executor: Arc<ScriptedExecutor>, channels: Arc<dyn ChannelProvider>) -> Driver {
        Driver::new(BatchId::new("batch-test"), template(), executor, channels)
    }

    fn shared() -> Arc<SharedChannelProvider> {
        Arc::new(SharedChannelProvider::new(MemoryChannel::default()))
    }

    async fn output(blobs: &MemoryBlobStore) -> String {
        blobs.get_text("results.tsv").await.unwrap()
    }

    #[tokio::test]
    async fn test_all_items_succeed() {
        let executor = ScriptedExecutor::new(&[
            ("Acme", Step::Answer("yes\tanvils")),
            ("Globex", Step::Answer("no\tnothing")),
            ("Initech", Step::Answer("yes\tTPS reports")),
        ]);
        let blobs = Arc::new(MemoryBlobStore::new());
        let sink = AggregateSink::new(blobs.clone(), "results.tsv");

        let report = driver(executor.clone(), shared())
            .run(items(&["Acme", "Globex", "Initech"]), sink)
            .await
            .unwrap();

        assert_eq!(
            output(&blobs).await,
            "Acme\tyes\tanvils\nGlobex\tno\tnothing\nInitech\tyes\tTPS reports\n"
        );
        assert_eq!((report.recorded, report.completed, report.failed), (3, 3, 0));
        assert_eq!(report.with_payload, 3);
        assert_eq!(blobs.write_count().await, 1);

        let calls = executor.calls().await;
        assert_eq!(calls[1].2, "Research Globex and report.");
    }

    #[tokio::test]
    async fn test_raised_error_gives_empty_payload() {
        let executor = ScriptedExecutor::new(&[("Acme", Step::Raise("connection reset by peer"))]);
        let blobs = Arc::new(MemoryBlobStore::new());
        let sink = AggregateSink::new(blobs.clone(), "results.tsv");

        let report = driver(executor, shared())
            .run(items(&["Acme"]), sink)
            .await
            .unwrap();

        assert_eq!(output(&blobs).await, "Acme\t\n");
        assert_eq!(report.failed, 1);
        assert_eq!(report.with_payload, 0);
    }

    #[tokio::test]
    async fn test_empty_source_still_writes() {
        let executor = ScriptedExecutor::new(&[]);
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.insert("results.tsv", "previous run\n").await;
        let sink = AggregateSink::new(blobs.clone(), "results.tsv");

        let report = driver(executor.clone(), shared())
            .run(SourceBatch::default(), sink)
            .await
            .unwrap();

        assert_eq!(output(&blobs).await, "");
        assert_eq!(report.recorded, 0);
        assert_eq!(report.bytes_written, 0);
        assert!(executor.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_row_write_truncates_to_output_size() {
        let executor = ScriptedExecutor::new(&[("Acme", Step::Answer("a\tb\tc\td\te"))]);
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(MemoryRowStore::from_column(&["Company", "Acme"]));
        let row_sink = RowSink::new(store.clone(), None, Column::from_index(1), 3);

        let report = driver(executor, shared())
            .with_row_sink(row_sink)
            .run(rows(&["Acme"], 2), AggregateSink::new(blobs.clone(), "results.tsv"))
            .await
            .unwrap();

        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0.to_string(), "B2");
        assert_eq!(writes[0].1, ["a", "b", "c"]);
        assert_eq!(output(&blobs).await, "Acme\ta\tb\tc\td\te\n");
        assert_eq!(report.row_writes, 1);
    }

    #[tokio::test]
    async fn test_stale_channel_content_is_never_captured() {
        let channels = Arc::new(SharedChannelProvider::new(MemoryChannel::seeded(
            "stale\tfrom last run\n",
        )));
        let executor = ScriptedExecutor::new(&[
            ("Acme", Step::Silent),
            ("Globex", Step::Answer("fresh")),
            ("Initech", Step::Silent),
        ]);
        let blobs = Arc::new(MemoryBlobStore::new());

        driver(executor.clone(), channels.clone())
            .run(
                items(&["Acme", "Globex", "Initech"]),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();

        assert_eq!(output(&blobs).await, "Acme\t\nGlobex\tfresh\nInitech\t\n");
        assert!(executor.calls().await.iter().all(|(_, seen, _)| seen.is_empty()));
        assert_eq!(channels.channel.resets().await, 3);
    }

    #[tokio::test]
    async fn test_cursor_advances_past_failures_and_blanks() {
        let executor = ScriptedExecutor::new(&[
            ("Acme", Step::Answer("one")),
            ("Globex", Step::Raise("boom")),
            ("Initech", Step::Fail("half", "gave up")),
            ("Umbrella", Step::Answer("four")),
        ]);
        let store = Arc::new(MemoryRowStore::from_column(&[
            "Company", "Acme", "Globex", "", "Initech", "Umbrella",
        ]));
        let row_sink = RowSink::new(store.clone(), None, Column::from_index(1), 1);
        let blobs = Arc::new(MemoryBlobStore::new());

        let report = driver(executor.clone(), shared())
            .with_row_sink(row_sink)
            .run(
                rows(&["Acme", "Globex", "", "Initech", "Umbrella"], 2),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();

        assert_eq!(report.next_row, Some(7));
        assert_eq!(report.skipped, 1);
        assert_eq!((report.completed, report.failed), (2, 2));
        assert_eq!(executor.calls().await.len(), 4);

        let written: Vec<_> = store
            .writes()
            .await
            .into_iter()
            .map(|(addr, fields)| (addr.row, fields))
            .collect();
        assert_eq!(
            written,
            [
                (2, vec!["one".to_string()]),
                (3, vec![String::new()]),
                (5, vec!["half".to_string()]),
                (6, vec!["four".to_string()]),
            ]
        );
        assert_eq!(
            output(&blobs).await,
            "Acme\tone\nGlobex\t\n\t\nInitech\thalf\nUmbrella\tfour\n"
        );
    }

    #[tokio::test]
    async fn test_row_sink_failure_is_not_fatal() {
        let executor = ScriptedExecutor::new(&[
            ("Acme", Step::Answer("x\ty")),
            ("Globex", Step::Answer("z")),
        ]);
        let store = Arc::new(MemoryRowStore::from_column(&["Company"]).with_failing_writes());
        let row_sink = RowSink::new(store, None, Column::from_index(2), 2);
        let blobs = Arc::new(MemoryBlobStore::new());

        let report = driver(executor, shared())
            .with_row_sink(row_sink)
            .run(
                rows(&["Acme", "Globex"], 2),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();

        assert_eq!(report.row_write_failures, 2);
        assert_eq!(report.row_writes, 0);
        assert_eq!(report.next_row, Some(4));
        assert_eq!(output(&blobs).await, "Acme\tx\ty\nGlobex\tz\n");
    }

    #[tokio::test]
    async fn test_flush_failure_is_fatal() {
        let executor = ScriptedExecutor::new(&[("Acme", Step::Answer("x"))]);
        let blobs = Arc::new(MemoryBlobStore::failing_writes());

        let err = driver(executor, shared())
            .run(items(&["Acme"]), AggregateSink::new(blobs, "results.tsv"))
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::SinkWrite(_)));
    }

    #[tokio::test]
    async fn test_sentinel_reclassifies_raised_errors() {
        let steps = [
            ("Acme", Step::Raise("Agent stopped: SUCCESS")),
            ("Globex", Step::Raise("rate limited")),
        ];
        let blobs = Arc::new(MemoryBlobStore::new());

        // Off by default
        let report = driver(ScriptedExecutor::new(&steps), shared())
            .run(
                items(&["Acme", "Globex"]),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();
        assert_eq!((report.completed, report.failed), (0, 2));

        let report = driver(ScriptedExecutor::new(&steps), shared())
            .with_completion_sentinel(CompletionSentinel::new("success"))
            .run(
                items(&["Acme", "Globex"]),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();
        assert_eq!((report.completed, report.failed), (1, 1));
    }

    #[tokio::test]
    async fn test_workspace_failure_records_empty_payload() {
        let executor = ScriptedExecutor::new(&[("Acme", Step::Answer("x"))]);
        let blobs = Arc::new(MemoryBlobStore::new());

        let report = driver(executor.clone(), Arc::new(BrokenProvider))
            .run(items(&["Acme"]), AggregateSink::new(blobs.clone(), "results.tsv"))
            .await
            .unwrap();

        assert_eq!(output(&blobs).await, "Acme\t\n");
        assert_eq!(report.failed, 1);
        assert!(executor.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_item_and_moves_on() {
        let executor = ScriptedExecutor::new(&[
            ("Acme", Step::Hang),
            ("Globex", Step::Answer("done")),
        ]);
        let blobs = Arc::new(MemoryBlobStore::new());

        let report = driver(executor, shared())
            .with_task_timeout(Some(Duration::from_secs(30)))
            .run(
                items(&["Acme", "Globex"]),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();

        assert_eq!(output(&blobs).await, "Acme\t\nGlobex\tdone\n");
        assert_eq!((report.completed, report.failed), (1, 1));
    }

    #[tokio::test]
    async fn test_isolated_workspaces_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let workspaces = Arc::new(IsolatedWorkspaces::new(temp.path().join("batch"), false));
        let executor = ScriptedExecutor::new(&[
            ("Acme", Step::Answer("yes")),
            ("Globex", Step::Silent),
        ]);
        let blobs = Arc::new(MemoryBlobStore::new());

        driver(executor, workspaces.clone())
            .run(
                items(&["Acme", "Globex"]),
                AggregateSink::new(blobs.clone(), "results.tsv"),
            )
            .await
            .unwrap();
        workspaces.close().await;

        assert_eq!(output(&blobs).await, "Acme\tyes\nGlobex\t\n");
        assert!(!temp.path().join("batch").exists());
    }
}
