use crate::browser::{
    ExportFlow, ExportPage, Session, Step, JOURNEY_FLOW, SYNC_FLOW, SYNC_URL, TIMELINE_FLOW,
    TIMELINE_URL,
};
use crate::config::ExportPolicy;
use crate::model::{ExportPayload, ExportState, ExportUrl, Item, ItemOutcome};
use crate::progress::ProgressStore;
use crate::report::{ProgressEvent, Reporter};
use crate::writer::{ExportLog, ResultWriter};
use crate::Error;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[cfg(feature = "tracing")]
use tracing::{debug, info, instrument, warn};

const DESTINATION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Payload captured by a completed flow
#[derive(Debug, Clone)]
pub struct Fetched {
    pub payload: ExportPayload,
    /// URL the payload was fetched from
    pub destination: String,
}

/// A flow that ran out of attempts or hit a terminal error
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub error: Error,
}

/// Drives export flows on a shared browser session
pub struct Exporter {
    session: Arc<dyn Session>,
    store: Arc<dyn ProgressStore>,
    writer: ResultWriter,
    policy: ExportPolicy,
    reporter: Arc<dyn Reporter>,
    export_log: Option<ExportLog>,
}

impl Exporter {
    pub fn new(
        session: Arc<dyn Session>,
        store: Arc<dyn ProgressStore>,
        writer: ResultWriter,
        policy: ExportPolicy,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            session,
            store,
            writer,
            policy,
            reporter,
            export_log: None,
        }
    }

    pub fn with_export_log(mut self, log: ExportLog) -> Self {
        self.export_log = Some(log);
        self
    }

    /// Export one item's reading journey.
    ///
    /// Never fails past the item: every error ends up in the outcome. The
    /// identifier is recorded only after the output file is written.
    #[cfg_attr(feature = "tracing", instrument(skip(self, item), fields(title_id = %item.title_id)))]
    pub async fn export_item(&self, item: &Item) -> ItemOutcome {
        let url = match item.export_url() {
            ExportUrl::Ready(url) => url,
            ExportUrl::Unresolved(url) => {
                info!("Skipping, export URL has an unresolved placeholder: {}", url);
                return ItemOutcome::Skipped {
                    reason: format!("unresolved export URL {url}"),
                };
            }
        };

        let (fetched, attempts) = match self.run_flow(&JOURNEY_FLOW, &url, &item.title).await {
            Ok(done) => done,
            Err(Exhausted { attempts, error }) => {
                warn!("Giving up after {} attempt(s): {}", attempts, error);
                return ItemOutcome::Failed { attempts, error };
            }
        };

        match self.persist(item, &fetched).await {
            Ok(path) => ItemOutcome::Exported { path, attempts },
            Err(error) => ItemOutcome::Failed { attempts, error },
        }
    }

    /// Sync the timeline with the server, export it and save it to `dest`.
    #[cfg_attr(feature = "tracing", instrument(skip(self)))]
    pub async fn refresh_timeline(&self, dest: &Path) -> Result<PathBuf, Error> {
        self.retrying("timeline sync", || self.sync_attempt())
            .await
            .map_err(|exhausted| exhausted.error)?;
        debug!("Timeline synced");

        let (fetched, _) = self
            .run_flow(&TIMELINE_FLOW, TIMELINE_URL, "timeline")
            .await
            .map_err(|exhausted| exhausted.error)?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(fetched.payload.as_value())?;
        tokio::fs::write(dest, json).await?;
        self.log_destination(&fetched.destination).await;

        info!("Timeline saved to {}", dest.display());
        Ok(dest.to_path_buf())
    }

    /// Run `flow` from `url` with the bounded retry policy.
    ///
    /// Every attempt starts over on a fresh page. Returns the payload and the
    /// number of attempts it took.
    pub async fn run_flow(
        &self,
        flow: &ExportFlow,
        url: &str,
        label: &str,
    ) -> Result<(Fetched, u32), Exhausted> {
        self.retrying(label, || self.attempt(flow, url)).await
    }

    async fn retrying<T, F, Fut>(
        &self,
        label: &str,
        mut attempt_once: F,
    ) -> Result<(T, u32), Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_once().await {
                Ok(done) => return Ok((done, attempt)),
                Err(error) if error.is_retryable() && attempt < self.policy.max_attempts => {
                    self.reporter.report(&ProgressEvent::Retry {
                        title: label,
                        attempt,
                        max_attempts: self.policy.max_attempts,
                        reason: error.to_string(),
                    });
                    sleep(self.policy.retry_delay(attempt)).await;
                }
                Err(error) => {
                    return Err(Exhausted {
                        attempts: attempt,
                        error,
                    })
                }
            }
        }
    }

    async fn attempt(&self, flow: &ExportFlow, url: &str) -> Result<Fetched, Error> {
        let page = self.session.open_page().await?;
        let mut state = ExportState::NotStarted;

        let result = self.drive(page.as_ref(), flow, url, &mut state).await;

        release(page).await;
        if let Err(e) = &result {
            debug!("Attempt stopped after '{}': {}", state, e);
        }
        result
    }

    async fn sync_attempt(&self) -> Result<(), Error> {
        let page = self.session.open_page().await?;

        let result = async {
            page.navigate(SYNC_URL, self.policy.navigation_timeout).await?;
            for step in SYNC_FLOW {
                self.perform(page.as_ref(), step).await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        release(page).await;
        result
    }

    async fn drive(
        &self,
        page: &dyn ExportPage,
        flow: &ExportFlow,
        url: &str,
        state: &mut ExportState,
    ) -> Result<Fetched, Error> {
        page.navigate(url, self.policy.navigation_timeout).await?;
        *state = ExportState::Navigated;

        for step in flow.steps {
            self.perform(page, step).await?;
        }
        *state = ExportState::ActionsTriggered;

        let destination = self.await_destination(page, flow).await?;
        *state = ExportState::NavigatedToExport;

        let value = page.fetch_json(&destination).await?;
        *state = ExportState::PayloadFetched;

        Ok(Fetched {
            payload: ExportPayload::new(value),
            destination,
        })
    }

    /// Wait, hover, click, settle. One delayed click retry on failure.
    async fn perform(&self, page: &dyn ExportPage, step: &Step) -> Result<(), Error> {
        let first = async {
            page.wait_for(&step.target, self.policy.element_timeout).await?;
            page.hover(&step.target).await?;
            page.click(&step.target).await
        }
        .await;

        if let Err(original) = first {
            debug!("Step '{}' failed, retrying click: {}", step.name, original);
            sleep(self.policy.recovery_wait).await;
            if page.click(&step.target).await.is_err() {
                return Err(attribute(step, original));
            }
        }

        sleep(self.policy.settle_pause).await;
        Ok(())
    }

    async fn await_destination(
        &self,
        page: &dyn ExportPage,
        flow: &ExportFlow,
    ) -> Result<String, Error> {
        let deadline = Instant::now() + self.policy.redirect_timeout;
        loop {
            let current = page.current_url().await?;
            if let Some(url) = current.as_deref().filter(|u| flow.accepts_destination(u)) {
                return Ok(url.to_string());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::WrongDestination(
                    current.unwrap_or_else(|| "no navigation".to_string()),
                ));
            }
            sleep(DESTINATION_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn persist(&self, item: &Item, fetched: &Fetched) -> Result<PathBuf, Error> {
        let path = self.writer.write(&fetched.payload).await?;
        if let Err(e) = self.store.record(&item.title_id).await {
            // An unrecorded item must not leave its file behind.
            if let Err(remove) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove {}: {}", path.display(), remove);
            }
            return Err(e);
        }
        self.log_destination(&fetched.destination).await;
        Ok(path)
    }

    async fn log_destination(&self, url: &str) {
        if let Some(log) = &self.export_log {
            if let Err(e) = log.append(url).await {
                warn!("Failed to append to export log: {}", e);
            }
        }
    }
}

async fn release(page: Box<dyn ExportPage>) {
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
}

fn attribute(step: &Step, error: Error) -> Error {
    let reason = match error {
        Error::Interaction { reason, .. } => reason,
        other => other.to_string(),
    };
    Error::Interaction {
        step: step.name,
        reason,
    }
}
