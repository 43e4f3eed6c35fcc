use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::BatchRun;
use crate::cli::OutputFormat;
use crate::extractors::TranscriptExtractor;
use crate::BatchError;

/// Drives a [`BatchRun`] one item at a time.
///
/// Every state change is handed to the observer before the processor moves
/// on, so the observer sees an item in `Processing` before its extraction
/// is awaited. Cancellation is only looked at between items.
pub struct BatchProcessor {
    extractor: Arc<dyn TranscriptExtractor>,
}

impl BatchProcessor {
    pub fn new(extractor: Arc<dyn TranscriptExtractor>) -> Self {
        Self { extractor }
    }

    /// Process every pending item of `run` in input order
    pub async fn process<F>(
        &self,
        mut run: BatchRun,
        cancel: &CancellationToken,
        mut observe: F,
    ) -> Result<BatchRun, BatchError>
    where
        F: FnMut(&BatchRun),
    {
        tracing::info!(
            "Starting batch of {} links with {} extractor",
            run.progress().total,
            self.extractor.name()
        );
        observe(&run);

        while let Some(index) = run.next_index() {
            if cancel.is_cancelled() {
                run = run.cancel();
                observe(&run);
                tracing::info!("Batch cancelled before item {}", index);
                return Ok(run);
            }

            run = run.begin_item(index)?;
            observe(&run);

            let url = run.items()[index].url.clone();
            tracing::debug!("Processing item {}: {}", index, url);
            let outcome = self.extractor.extract(&url, index).await;

            if cancel.is_cancelled() {
                tracing::warn!(
                    "Discarding result for item {} that arrived after cancellation",
                    index
                );
                run = run.cancel();
                observe(&run);
                return Ok(run);
            }

            run = run.complete_item(index, outcome)?;
            tracing::debug!(
                "Item {} finished as {} ({})",
                index,
                run.items()[index].status.label(),
                run.progress()
            );
            observe(&run);
        }

        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            run.successes().count(),
            run.failure_count()
        );
        Ok(run)
    }

    /// Retry one failed item of a completed run
    pub async fn retry<F>(
        &self,
        run: BatchRun,
        index: usize,
        cancel: &CancellationToken,
        observe: F,
    ) -> Result<BatchRun, BatchError>
    where
        F: FnMut(&BatchRun),
    {
        tracing::info!("Retrying item {}", index);
        let run = run.retry_item(index)?;
        self.process(run, cancel, observe).await
    }

    /// Validate the input and process it on a background task
    pub fn spawn(&self, input: &str, format: OutputFormat) -> Result<BatchHandle, BatchError> {
        let run = BatchRun::from_input(input, format)?;
        Ok(self.spawn_run(run))
    }

    /// Process an already started run on a background task
    pub fn spawn_run(&self, run: BatchRun) -> BatchHandle {
        let cancel = CancellationToken::new();
        let (updates, receiver) = watch::channel(run.clone());
        let processor = BatchProcessor {
            extractor: Arc::clone(&self.extractor),
        };
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            processor
                .process(run, &token, |snapshot| {
                    updates.send_replace(snapshot.clone());
                })
                .await
        });

        BatchHandle {
            cancel,
            updates: receiver,
            task,
        }
    }
}

/// Handle to a batch running in the background
pub struct BatchHandle {
    cancel: CancellationToken,
    updates: watch::Receiver<BatchRun>,
    task: JoinHandle<Result<BatchRun, BatchError>>,
}

impl BatchHandle {
    /// Request cancellation. Takes effect at the next item boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this batch when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver of published snapshots
    pub fn subscribe(&self) -> watch::Receiver<BatchRun> {
        self.updates.clone()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> BatchRun {
        self.updates.borrow().clone()
    }

    /// Wait for the batch to finish and return its final state
    pub async fn finish(self) -> Result<BatchRun> {
        let run = self.task.await.context("Batch task panicked")??;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ItemStatus, RunState};
    use crate::extractors::{ExtractionOutcome, FnExtractor, MockTranscriptExtractor};
    use futures_util::FutureExt;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn scripted(outcomes: Vec<ExtractionOutcome>) -> Arc<dyn TranscriptExtractor> {
        let outcomes = Arc::new(outcomes);
        Arc::new(FnExtractor::new(move |_url, index| {
            let outcome = outcomes[index].clone();
            async move { outcome }.boxed()
        }))
    }

    fn ok(n: usize) -> ExtractionOutcome {
        ExtractionOutcome::success(format!("title {n}"), format!("id-{n}"))
    }

    #[tokio::test]
    async fn test_every_item_reaches_terminal_state() {
        let processor = BatchProcessor::new(scripted(vec![
            ok(0),
            ExtractionOutcome::failure("bad"),
            ok(2),
        ]));
        let run = BatchRun::from_input("A\nB\nC", OutputFormat::Markdown).unwrap();

        let run = processor
            .process(run, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(run.state(), RunState::Completed);
        assert!(run.items().iter().all(|item| item.is_terminal()));
        assert_eq!(run.item(1).unwrap().error(), Some("bad"));
        assert_eq!(run.progress().processed, 3);
    }

    #[tokio::test]
    async fn test_items_are_processed_strictly_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        let extractor = Arc::new(FnExtractor::new(move |url, index| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("start {url}"));
                tokio::task::yield_now().await;
                log.lock().unwrap().push(format!("end {url}"));
                ok(index)
            }
            .boxed()
        }));
        let processor = BatchProcessor::new(extractor);
        let run = BatchRun::from_input("A\nB\nC", OutputFormat::Plain).unwrap();

        let mut snapshots = Vec::new();
        processor
            .process(run, &CancellationToken::new(), |run| snapshots.push(run.clone()))
            .await
            .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["start A", "end A", "start B", "end B", "start C", "end C"]
        );

        // item[i+1] never processing before item[i] is terminal
        for snapshot in &snapshots {
            let items = snapshot.items();
            for i in 1..items.len() {
                if items[i].status != ItemStatus::Pending {
                    assert!(items[i - 1].is_terminal());
                }
            }
            let in_flight = items
                .iter()
                .filter(|item| item.status == ItemStatus::Processing)
                .count();
            assert!(in_flight <= 1);
        }
    }

    #[tokio::test]
    async fn test_processing_is_published_before_outcome() {
        let processor = BatchProcessor::new(scripted(vec![ok(0)]));
        let run = BatchRun::from_input("https://youtube.com/watch?v=1", OutputFormat::Markdown).unwrap();

        let mut statuses = Vec::new();
        processor
            .process(run, &CancellationToken::new(), |run| {
                statuses.push(run.items()[0].status.label())
            })
            .await
            .unwrap();

        assert_eq!(statuses, vec!["Pending", "Processing", "Success"]);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_matches_terminal_items() {
        let processor = BatchProcessor::new(scripted(vec![
            ok(0),
            ExtractionOutcome::failure("x"),
            ok(2),
            ok(3),
        ]));
        let run = BatchRun::from_input("A\nB\nC\nD", OutputFormat::Markdown).unwrap();

        let mut last = 0;
        processor
            .process(run, &CancellationToken::new(), |run| {
                let progress = run.progress();
                assert!(progress.processed >= last);
                last = progress.processed;
                let terminal = run.items().iter().filter(|item| item.is_terminal()).count();
                assert_eq!(progress.processed, terminal);
            })
            .await
            .unwrap();

        assert_eq!(last, 4);
    }

    #[tokio::test]
    async fn test_cancel_during_item_discards_late_result() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let started = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&started);
        let extractor = Arc::new(FnExtractor::new(move |url, index| {
            let token = token.clone();
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(url);
                if index == 1 {
                    // user cancels while item 1 is still in flight
                    token.cancel();
                }
                ok(index)
            }
            .boxed()
        }));
        let processor = BatchProcessor::new(extractor);
        let run = BatchRun::from_input("A\nB\nC", OutputFormat::Markdown).unwrap();

        let run = processor.process(run, &cancel, |_| {}).await.unwrap();

        assert_eq!(run.state(), RunState::Cancelled);
        assert_eq!(run.item(0).unwrap().title(), Some("title 0"));
        assert_eq!(run.item(1).unwrap().status, ItemStatus::Processing);
        assert_eq!(run.item(1).unwrap().title(), None);
        assert_eq!(run.item(2).unwrap().status, ItemStatus::Pending);
        assert_eq!(*started.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(run.progress().processed, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_touches_nothing() {
        let mut extractor = MockTranscriptExtractor::new();
        extractor.expect_extract().never();
        extractor.expect_name().return_const("mock");
        let processor = BatchProcessor::new(Arc::new(extractor));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = BatchRun::from_input("A\nB", OutputFormat::Markdown).unwrap();
        let run = processor.process(run, &cancel, |_| {}).await.unwrap();

        assert_eq!(run.state(), RunState::Cancelled);
        assert!(run.items().iter().all(|item| item.status == ItemStatus::Pending));
    }

    #[tokio::test]
    async fn test_extractor_called_once_per_link_with_index() {
        let mut extractor = MockTranscriptExtractor::new();
        extractor.expect_name().return_const("mock");
        let mut seq = mockall::Sequence::new();
        for (index, url) in ["A", "B"].into_iter().enumerate() {
            extractor
                .expect_extract()
                .withf(move |u, i| u == url && *i == index)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, i| ok(i));
        }
        let processor = BatchProcessor::new(Arc::new(extractor));
        let run = BatchRun::from_input("A\nB", OutputFormat::Markdown).unwrap();

        let run = processor
            .process(run, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(run.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_retry_reprocesses_only_failed_item() {
        let attempts = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&attempts);
        let extractor = Arc::new(FnExtractor::new(move |_url, index| {
            let counter = Arc::clone(&counter);
            async move {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                if index == 1 && *calls == 2 {
                    ExtractionOutcome::failure("flaky")
                } else {
                    ok(index)
                }
            }
            .boxed()
        }));
        let processor = BatchProcessor::new(extractor);
        let cancel = CancellationToken::new();
        let run = BatchRun::from_input("A\nB\nC", OutputFormat::Markdown).unwrap();

        let run = processor.process(run, &cancel, |_| {}).await.unwrap();
        assert_eq!(run.failure_count(), 1);

        let run = processor.retry(run, 1, &cancel, |_| {}).await.unwrap();
        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.failure_count(), 0);
        assert_eq!(run.item(1).unwrap().title(), Some("title 1"));
        assert_eq!(*attempts.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_spawned_batch_cancels_at_item_boundary() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let extractor = Arc::new(FnExtractor::new(move |_url, index| {
            let release = Arc::clone(&release);
            async move {
                if index == 1 {
                    release.notified().await;
                }
                ok(index)
            }
            .boxed()
        }));
        let processor = BatchProcessor::new(extractor);

        let handle = processor.spawn("A\nB\nC", OutputFormat::Markdown).unwrap();
        let mut updates = handle.subscribe();
        updates
            .wait_for(|run| run.item(1).map(|item| item.status == ItemStatus::Processing).unwrap_or(false))
            .await
            .unwrap();

        handle.cancel();
        gate.notify_one();
        let run = handle.finish().await.unwrap();

        assert_eq!(run.state(), RunState::Cancelled);
        assert_eq!(run.item(1).unwrap().status, ItemStatus::Processing);
        assert_eq!(run.item(2).unwrap().status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_input() {
        let processor = BatchProcessor::new(scripted(Vec::new()));
        let too_many = (0..21).map(|i| format!("link {i}")).collect::<Vec<_>>().join("\n");

        assert_eq!(
            processor.spawn(&too_many, OutputFormat::Markdown).err(),
            Some(BatchError::TooManyLinks { count: 21, max: 20 })
        );
        assert_eq!(
            processor.spawn("\n\n", OutputFormat::Markdown).err(),
            Some(BatchError::NoLinks)
        );
    }
}
