#![allow(dead_code)]

use async_trait::async_trait;
use journey_export::{
    Error, ExportPage, ExportPolicy, Item, ProgressEvent, Reporter, Session, Target, JOURNEY_FLOW,
    TIMELINE_FLOW,
};
use journey_export::browser::SYNC_FLOW;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one attempt on a scripted URL does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Succeed,
    NavigationTimeout,
    /// The named step's element never shows up and its click fails
    MissingElement(&'static str),
    /// The named step's first click fails; the recovery click works
    FlakyClick(&'static str),
    /// The final click lands somewhere other than the export destination
    WrongRedirect,
}

struct Script {
    plans: VecDeque<Plan>,
    last: Plan,
    destination: String,
}

#[derive(Default)]
pub struct FakeState {
    scripts: Mutex<HashMap<String, Script>>,
    payloads: Mutex<HashMap<String, Value>>,
    pub navigations: Mutex<Vec<String>>,
    /// Step names in the order their elements were waited for
    pub waits: Mutex<Vec<&'static str>>,
    /// Step names in the order they were clicked, failed clicks included
    pub clicks: Mutex<Vec<&'static str>>,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub live_pages: AtomicUsize,
    pub max_live_pages: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub fail_page_close: AtomicBool,
    /// Simulated page load time
    pub load_delay_ms: AtomicUsize,
}

/// In-memory browser session that follows per-URL scripts
#[derive(Clone, Default)]
pub struct FakeSession {
    pub state: Arc<FakeState>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `url`: attempts follow `plans` in order, then repeat the last one.
    pub fn script(&self, url: &str, plans: &[Plan], payload: Value) {
        let destination = format!(
            "https://share.libbyapp.com/data/{}/libbyjourney.json",
            self.state.scripts.lock().unwrap().len()
        );
        self.state
            .payloads
            .lock()
            .unwrap()
            .insert(destination.clone(), payload);
        self.state.scripts.lock().unwrap().insert(
            url.to_string(),
            Script {
                plans: plans.iter().copied().collect(),
                last: plans.last().copied().unwrap_or(Plan::Succeed),
                destination,
            },
        );
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.navigations.lock().unwrap().clone()
    }

    pub fn waits(&self) -> Vec<&'static str> {
        self.state.waits.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<&'static str> {
        self.state.clicks.lock().unwrap().clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.state.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.state.pages_closed.load(Ordering::SeqCst)
    }

    pub fn max_live_pages(&self) -> usize {
        self.state.max_live_pages.load(Ordering::SeqCst)
    }

    pub fn session_closes(&self) -> usize {
        self.state.session_closes.load(Ordering::SeqCst)
    }

    pub fn as_session(&self) -> Arc<dyn Session> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn open_page(&self) -> Result<Box<dyn ExportPage>, Error> {
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live_pages.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            state: Arc::clone(&self.state),
            inner: Mutex::new(PageInner::default()),
        }))
    }

    async fn close(&self) -> Result<(), Error> {
        self.state.session_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct PageInner {
    url: Option<String>,
    plan: Option<Plan>,
    destination: Option<String>,
    failed_clicks: HashSet<&'static str>,
}

struct FakePage {
    state: Arc<FakeState>,
    inner: Mutex<PageInner>,
}

fn step_name(target: &Target) -> &'static str {
    JOURNEY_FLOW
        .steps
        .iter()
        .chain(TIMELINE_FLOW.steps.iter())
        .chain(SYNC_FLOW.iter())
        .find(|step| step.target == *target)
        .map(|step| step.name)
        .unwrap_or("unknown")
}

#[async_trait]
impl ExportPage for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), Error> {
        self.state.navigations.lock().unwrap().push(url.to_string());
        let delay = self.state.load_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let (plan, destination) = {
            let mut scripts = self.state.scripts.lock().unwrap();
            let script = scripts.get_mut(url).ok_or_else(|| Error::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })?;
            let plan = script.plans.pop_front().unwrap_or(script.last);
            (plan, script.destination.clone())
        };

        if plan == Plan::NavigationTimeout {
            return Err(Error::NavigationTimeout(url.to_string()));
        }

        let mut inner = self.inner.lock().unwrap();
        inner.url = Some(url.to_string());
        inner.plan = Some(plan);
        inner.destination = Some(destination);
        Ok(())
    }

    async fn wait_for(&self, target: &Target, _timeout: Duration) -> Result<(), Error> {
        let name = step_name(target);
        self.state.waits.lock().unwrap().push(name);
        let inner = self.inner.lock().unwrap();
        match inner.plan {
            Some(Plan::MissingElement(missing)) if missing == name => {
                Err(Error::Browser(format!("timed out waiting for {target}")))
            }
            _ => Ok(()),
        }
    }

    async fn hover(&self, _target: &Target) -> Result<(), Error> {
        Ok(())
    }

    async fn click(&self, target: &Target) -> Result<(), Error> {
        let name = step_name(target);
        self.state.clicks.lock().unwrap().push(name);
        let mut inner = self.inner.lock().unwrap();
        let plan = inner.plan;
        match plan {
            Some(Plan::MissingElement(missing)) if missing == name => {
                return Err(Error::Browser(format!("no node for {target}")));
            }
            Some(Plan::FlakyClick(flaky)) if flaky == name && inner.failed_clicks.insert(name) => {
                return Err(Error::Browser(format!("click {target}: detached")));
            }
            _ => {}
        }

        if name == "select JSON export" {
            inner.url = match plan {
                Some(Plan::WrongRedirect) => Some("https://libbyapp.com/shelf".to_string()),
                _ => inner.destination.clone(),
            };
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, Error> {
        Ok(self.inner.lock().unwrap().url.clone())
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, Error> {
        self.state
            .payloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("HTTP 404 for {url}")))
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        self.state.live_pages.fetch_sub(1, Ordering::SeqCst);
        if self.state.fail_page_close.load(Ordering::SeqCst) {
            return Err(Error::Browser("target already closed".to_string()));
        }
        Ok(())
    }
}

/// Collects progress lines for assertions
#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &ProgressEvent<'_>) {
        let mut lines = self.lines.lock().unwrap();
        lines.extend(event.to_string().lines().map(str::to_string));
    }
}

pub fn fast_policy() -> ExportPolicy {
    ExportPolicy {
        navigation_timeout: Duration::from_secs(1),
        element_timeout: Duration::from_millis(50),
        settle_pause: Duration::from_millis(1),
        recovery_wait: Duration::from_millis(1),
        redirect_timeout: Duration::from_millis(50),
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(1),
    }
}

pub fn item(id: &str, title: &str) -> Item {
    Item::new(id, title).with_library("lapl")
}

pub fn journey_url(id: &str) -> String {
    format!("https://libbyapp.com/shelf/journey/lapl/{id}")
}

pub fn payload(id: &str, title: &str) -> Value {
    json!({
        "version": 1,
        "readingJourney": {
            "title": { "text": title, "titleId": id },
            "author": "Test Author",
            "publisher": "Test House",
            "cover": { "format": "ebook", "color": "#123456" },
            "percent": 0.42
        },
        "circulation": [
            { "activity": "Borrowed", "timestamp": 1_700_000_000_000_i64, "library": { "text": "LA Public", "key": "lapl" } }
        ],
        "highlights": [
            { "timestamp": 1_700_000_100_000_i64, "quote": "A line worth keeping." }
        ],
        "bookmarks": []
    })
}

pub fn json_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(_) => Vec::new(),
    }
}
