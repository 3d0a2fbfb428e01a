use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Trigger URL used when the timeline does not carry one for the item.
pub const JOURNEY_URL_TEMPLATE: &str = "https://libbyapp.com/shelf/journey/{library}/{titleId}";

/// One reading-journey entry to export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Durable dedup key across runs
    pub title_id: String,
    pub title: String,
    /// Library key used to build the journey URL (e.g. `lapl`)
    pub library_key: Option<String>,
    pub library_name: Option<String>,
    /// Precomputed export-trigger URL, if the timeline carries one
    pub journey_url: Option<String>,
}

/// Result of resolving an item's export-trigger URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportUrl {
    Ready(String),
    /// A `{placeholder}` survived substitution
    Unresolved(String),
}

impl Item {
    pub fn new(title_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title_id: title_id.into(),
            title: title.into(),
            library_key: None,
            library_name: None,
            journey_url: None,
        }
    }

    pub fn with_library(mut self, key: impl Into<String>) -> Self {
        self.library_key = Some(key.into());
        self
    }

    pub fn with_library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = Some(name.into());
        self
    }

    pub fn with_journey_url(mut self, url: impl Into<String>) -> Self {
        self.journey_url = Some(url.into());
        self
    }

    pub fn export_url(&self) -> ExportUrl {
        let url = match self.journey_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => {
                let mut url = JOURNEY_URL_TEMPLATE.replace("{titleId}", &self.title_id);
                if let Some(key) = self.library_key.as_deref().filter(|k| !k.is_empty()) {
                    url = url.replace("{library}", key);
                }
                url
            }
        };

        if has_placeholder(&url) {
            ExportUrl::Unresolved(url)
        } else {
            ExportUrl::Ready(url)
        }
    }
}

/// True when `url` contains a `{name}` token.
pub fn has_placeholder(url: &str) -> bool {
    let mut rest = url;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                if !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return true;
                }
                rest = &after[close + 1..];
            }
            None => return false,
        }
    }
    false
}

/// JSON document returned by the export endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPayload(Value);

/// The fields an output filename is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFields {
    /// Latest circulation activity
    pub loaned_at: DateTime<Utc>,
    pub title: String,
    pub author: String,
    pub format: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadHeader {
    reading_journey: Option<JourneyHeader>,
    #[serde(default)]
    circulation: Vec<CirculationEntry>,
}

#[derive(Deserialize)]
struct JourneyHeader {
    title: Option<TitleHeader>,
    author: Option<String>,
    cover: Option<CoverHeader>,
}

#[derive(Deserialize)]
struct TitleHeader {
    text: Option<String>,
}

#[derive(Deserialize)]
struct CoverHeader {
    format: Option<String>,
}

#[derive(Deserialize)]
struct CirculationEntry {
    timestamp: Option<i64>,
}

impl ExportPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Extract the filename fields. Any missing field is fatal for the item.
    pub fn book_fields(&self) -> Result<BookFields, Error> {
        let header = PayloadHeader::deserialize(&self.0)?;

        let loaned_at = header
            .circulation
            .iter()
            .filter_map(|c| c.timestamp)
            .max()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or(Error::MissingField("circulation[].timestamp"))?;

        let journey = header
            .reading_journey
            .ok_or(Error::MissingField("readingJourney"))?;
        let title = journey
            .title
            .and_then(|t| t.text)
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingField("readingJourney.title.text"))?;
        let author = journey
            .author
            .filter(|a| !a.is_empty())
            .ok_or(Error::MissingField("readingJourney.author"))?;
        let format = journey
            .cover
            .and_then(|c| c.format)
            .filter(|f| !f.is_empty())
            .ok_or(Error::MissingField("readingJourney.cover.format"))?;

        Ok(BookFields {
            loaned_at,
            title,
            author,
            format,
        })
    }
}

/// Progress of one export attempt through the UI flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    NotStarted,
    Navigated,
    ActionsTriggered,
    NavigatedToExport,
    PayloadFetched,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Navigated => "navigated",
            Self::ActionsTriggered => "actions triggered",
            Self::NavigatedToExport => "navigated to export",
            Self::PayloadFetched => "payload fetched",
        };
        f.write_str(name)
    }
}

/// Final outcome of one item's pipeline
#[derive(Debug)]
pub enum ItemOutcome {
    Exported { path: PathBuf, attempts: u32 },
    /// Not attempted; neither a success nor a failure
    Skipped { reason: String },
    Failed { attempts: u32, error: Error },
}

impl ItemOutcome {
    pub fn is_exported(&self) -> bool {
        matches!(self, Self::Exported { .. })
    }
}

/// Running counters over completed items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Exported { .. } => self.succeeded += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Aggregate result of one orchestrator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub already_done: usize,
    pub pending: usize,
    pub tally: Tally,
}
