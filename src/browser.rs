use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Where exports land once the UI flow completes
pub const EXPORT_DESTINATION_PREFIX: &str = "https://share.libbyapp.com/data/";

/// Page whose UI flow exports the whole timeline
pub const TIMELINE_URL: &str = "https://libbyapp.com/shelf/timeline/all,loans,all";

/// Activity page whose actions menu pulls the latest timeline from the server
pub const SYNC_URL: &str = "https://libbyapp.com/timeline/activities";

/// How a step locates its element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Css(&'static str),
    XPath(&'static str),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css={selector}"),
            Self::XPath(expr) => write!(f, "xpath={expr}"),
        }
    }
}

/// One named UI interaction in an export flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub target: Target,
}

impl Step {
    pub const fn new(name: &'static str, target: Target) -> Self {
        Self { name, target }
    }
}

/// Ordered UI steps plus the URL prefix the last step must navigate to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFlow {
    pub steps: &'static [Step],
    pub destination_prefix: &'static str,
}

impl ExportFlow {
    pub fn accepts_destination(&self, url: &str) -> bool {
        url.starts_with(self.destination_prefix) && url.len() > self.destination_prefix.len()
    }
}

/// Reading journey: actions → export → JSON data
pub const JOURNEY_FLOW: ExportFlow = ExportFlow {
    steps: &[
        Step::new("open actions menu", Target::XPath("//button[.//span[text()='Actions']]")),
        Step::new(
            "open export submenu",
            Target::XPath("//span[text()='Export Reading Journey']"),
        ),
        Step::new(
            "select JSON export",
            Target::XPath("//a[.//span[text()='Data']]"),
        ),
    ],
    destination_prefix: EXPORT_DESTINATION_PREFIX,
};

/// Timeline shelf: actions pill → export timeline → JSON data
pub const TIMELINE_FLOW: ExportFlow = ExportFlow {
    steps: &[
        Step::new("open actions menu", Target::Css("[id^='shelf-actions-pill'] > span")),
        Step::new(
            "open export submenu",
            Target::XPath("//span[text()='Export Timeline']"),
        ),
        Step::new(
            "select JSON export",
            Target::Css("a:nth-of-type(3) > span:nth-of-type(1)"),
        ),
    ],
    destination_prefix: EXPORT_DESTINATION_PREFIX,
};

/// Timeline activities: actions pill → sync. Navigates nowhere, fetches nothing.
pub const SYNC_FLOW: &[Step] = &[
    Step::new("open actions menu", Target::Css("#shelf-actions-pill-0001 > span")),
    Step::new(
        "sync timeline",
        Target::Css("div.arena-overlay a:nth-of-type(1)"),
    ),
];

/// A browser session shared by every item pipeline in a run
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a fresh page. Each attempt gets its own.
    async fn open_page(&self) -> Result<Box<dyn ExportPage>, Error>;

    /// Shut the session down. Called once, at the end of a run.
    async fn close(&self) -> Result<(), Error>;
}

/// The page operations an export flow needs
#[async_trait]
pub trait ExportPage: Send + Sync {
    /// Navigate and wait until network activity is idle, within `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), Error>;

    /// Wait until `target` is present in the DOM.
    async fn wait_for(&self, target: &Target, timeout: Duration) -> Result<(), Error>;

    async fn hover(&self, target: &Target) -> Result<(), Error>;

    /// Invoke the element's click handler.
    async fn click(&self, target: &Target) -> Result<(), Error>;

    async fn current_url(&self) -> Result<Option<String>, Error>;

    /// Fetch `url` as JSON with the page's cookies.
    async fn fetch_json(&self, url: &str) -> Result<Value, Error>;

    async fn close(self: Box<Self>) -> Result<(), Error>;
}
