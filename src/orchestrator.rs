use crate::browser::Session;
use crate::config::ExportPolicy;
use crate::exporter::Exporter;
use crate::limiter::Limiter;
use crate::model::{Item, ItemOutcome, RunSummary, Tally};
use crate::progress::ProgressStore;
use crate::report::{ProgressEvent, Reporter};
use crate::writer::{ExportLog, ResultWriter};
use crate::Error;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "tracing")]
use tracing::{info, instrument, warn};

/// Outcome of one submitted item
#[derive(Debug)]
pub struct ItemResult {
    pub title_id: String,
    pub outcome: ItemOutcome,
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Submitted items, in submission order
    pub results: Vec<ItemResult>,
}

/// Runs one export pass over the timeline items
pub struct Orchestrator {
    store: Arc<dyn ProgressStore>,
    writer: ResultWriter,
    policy: ExportPolicy,
    max_concurrent: usize,
    reporter: Arc<dyn Reporter>,
    export_log: Option<ExportLog>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        writer: ResultWriter,
        policy: ExportPolicy,
        max_concurrent: usize,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            writer,
            policy,
            max_concurrent,
            reporter,
            export_log: None,
        }
    }

    pub fn with_export_log(mut self, log: ExportLog) -> Self {
        self.export_log = Some(log);
        self
    }

    /// Export every item not yet in the progress store.
    ///
    /// `open_session` is only called when something is pending, and the
    /// session it returns is closed exactly once before returning. Item
    /// failures are reported, never returned as errors.
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(items = items.len())))]
    pub async fn run<F, Fut>(&self, items: &[Item], open_session: F) -> Result<RunReport, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Session>, Error>>,
    {
        let done = self.store.load().await?;
        let pending: Vec<Item> = items
            .iter()
            .filter(|item| !done.contains(&item.title_id))
            .cloned()
            .collect();

        let mut summary = RunSummary {
            total: items.len(),
            already_done: items.len() - pending.len(),
            pending: pending.len(),
            tally: Tally::default(),
        };
        self.reporter.report(&ProgressEvent::Started {
            total: summary.total,
            already_done: summary.already_done,
            pending: summary.pending,
        });

        if pending.is_empty() {
            self.reporter.report(&ProgressEvent::NothingPending);
            return Ok(RunReport {
                summary,
                results: Vec::new(),
            });
        }

        let limiter = Limiter::new(self.max_concurrent)?;
        let session = open_session().await?;
        info!(
            "Session open, exporting {} item(s) with up to {} in flight",
            summary.pending,
            limiter.max_concurrent()
        );

        let mut exporter = Exporter::new(
            Arc::clone(&session),
            Arc::clone(&self.store),
            self.writer.clone(),
            self.policy,
            Arc::clone(&self.reporter),
        );
        if let Some(log) = &self.export_log {
            exporter = exporter.with_export_log(log.clone());
        }
        let exporter = Arc::new(exporter);
        let tally = Arc::new(Mutex::new(Tally::default()));

        let submissions: Vec<_> = pending
            .iter()
            .cloned()
            .map(|item| {
                let exporter = Arc::clone(&exporter);
                let tally = Arc::clone(&tally);
                let reporter = Arc::clone(&self.reporter);
                let pending_count = summary.pending;
                limiter.submit(move || async move {
                    let outcome = exporter.export_item(&item).await;
                    let snapshot = record(&tally, &outcome);
                    reporter.report(&ProgressEvent::ItemFinished {
                        title: &item.title,
                        outcome: &outcome,
                        tally: snapshot,
                        pending: pending_count,
                    });
                    outcome
                })
            })
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for (item, submission) in pending.iter().zip(futures::future::join_all(submissions).await) {
            let outcome = match submission {
                Ok(outcome) => outcome,
                Err(error) => {
                    // The pipeline panicked before it could tally itself.
                    let outcome = ItemOutcome::Failed { attempts: 0, error };
                    let snapshot = record(&tally, &outcome);
                    self.reporter.report(&ProgressEvent::ItemFinished {
                        title: &item.title,
                        outcome: &outcome,
                        tally: snapshot,
                        pending: summary.pending,
                    });
                    outcome
                }
            };
            results.push(ItemResult {
                title_id: item.title_id.clone(),
                outcome,
            });
        }

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {}", e);
        }

        summary.tally = *tally.lock().unwrap_or_else(PoisonError::into_inner);
        self.reporter.report(&ProgressEvent::Finished(summary));
        Ok(RunReport { summary, results })
    }
}

fn record(tally: &Mutex<Tally>, outcome: &ItemOutcome) -> Tally {
    let mut tally = tally.lock().unwrap_or_else(PoisonError::into_inner);
    tally.record(outcome);
    *tally
}
