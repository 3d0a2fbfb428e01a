//! journey-export - resumable, browser-driven export of Libby reading journeys
//!
//! Libby has no public API for reading-journey data, but every title's journey
//! page has an export action that redirects to a JSON document. This crate
//! drives a logged-in Chromium profile through that flow for each title in a
//! timeline export, with a bounded number of pages in flight, per-item retry,
//! and an append-only progress file so interrupted runs resume where they
//! stopped.
//!
//! # Example
//!
//! The session is usually a `ChromiumSession` (behind the `chromium`
//! feature); any [`Session`] implementation works.
//!
//! ```no_run
//! use journey_export::{
//!     ConsoleReporter, ExportPolicy, FileProgressStore, Orchestrator, ResultWriter, Session,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example(session: Arc<dyn Session>) -> Result<(), journey_export::Error> {
//! let items = journey_export::timeline::load_items(Path::new("libbytimeline-activities.json")).await?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(FileProgressStore::new("downloaded-title-ids.txt")),
//!     ResultWriter::new("books"),
//!     ExportPolicy::default(),
//!     5,
//!     Arc::new(ConsoleReporter),
//! );
//!
//! let report = orchestrator.run(&items, || async { Ok(session) }).await?;
//! println!("{} exported", report.summary.tally.succeeded);
//! # Ok(())
//! # }
//! ```

// No-op macros when tracing is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($tt:tt)*) => {{}};
}

pub mod browser;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod config;
pub mod error;
pub mod exporter;
pub mod limiter;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod timeline;
pub mod writer;

// Re-export commonly used types
pub use browser::{ExportFlow, ExportPage, Session, Step, Target, JOURNEY_FLOW, TIMELINE_FLOW};
#[cfg(feature = "chromium")]
pub use chromium::ChromiumSession;
pub use config::{Config, ExportPolicy, FileConfig};
pub use error::Error;
pub use exporter::{Exhausted, Exporter, Fetched};
pub use limiter::{Limiter, Submission};
pub use model::{ExportPayload, ExportState, ExportUrl, Item, ItemOutcome, RunSummary, Tally};
pub use orchestrator::{ItemResult, Orchestrator, RunReport};
pub use progress::{FileProgressStore, ProgressStore};
pub use report::{ConsoleReporter, ProgressEvent, Reporter};
pub use writer::{ExportLog, ResultWriter};
