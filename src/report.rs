use crate::model::{ItemOutcome, RunSummary, Tally};
use std::fmt;

/// User-facing progress of a run
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    Started {
        total: usize,
        already_done: usize,
        pending: usize,
    },
    NothingPending,
    Retry {
        title: &'a str,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    ItemFinished {
        title: &'a str,
        outcome: &'a ItemOutcome,
        tally: Tally,
        pending: usize,
    },
    Finished(RunSummary),
}

impl fmt::Display for ProgressEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                total,
                already_done,
                pending,
            } => write!(
                f,
                "Total: {total}\nAlready downloaded: {already_done}\nTo download: {pending}"
            ),
            Self::NothingPending => f.write_str("Nothing to download."),
            Self::Retry {
                title,
                attempt,
                max_attempts,
                reason,
            } => write!(f, "RETRY {title} (attempt {attempt}/{max_attempts}): {reason}"),
            Self::ItemFinished {
                title,
                outcome,
                tally,
                pending,
            } => {
                match outcome {
                    ItemOutcome::Exported { path, .. } => {
                        let file = path.file_name().unwrap_or(path.as_os_str());
                        write!(f, "OK {title} -> {}", file.to_string_lossy())?
                    }
                    ItemOutcome::Skipped { reason } => write!(f, "SKIP {title}: {reason}")?,
                    ItemOutcome::Failed { attempts, error } => {
                        write!(f, "FAIL {title} after {attempts} attempt(s): {error}")?
                    }
                }
                write!(
                    f,
                    "\n[{}/{pending}] ok: {}, failed: {}, skipped: {}",
                    tally.completed(),
                    tally.succeeded,
                    tally.failed,
                    tally.skipped
                )
            }
            Self::Finished(summary) => write!(
                f,
                "Done. {}/{} succeeded, {} failed, {} skipped.",
                summary.tally.succeeded,
                summary.pending,
                summary.tally.failed,
                summary.tally.skipped
            ),
        }
    }
}

/// Sink for progress lines
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ProgressEvent<'_>);
}

/// Prints progress to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent<'_>) {
        println!("{event}");
    }
}
