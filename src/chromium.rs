use crate::browser::{ExportPage, Session, Target};
use crate::Error;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Chromium driven over CDP, backed by a persistent profile directory
pub struct ChromiumSession {
    browser: RwLock<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumSession {
    /// Launch Chromium on `profile` so its existing login is reused.
    pub async fn launch(profile: &Path, headless: bool) -> Result<Self, Error> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile)
            .arg(format!("--user-agent={USER_AGENT}"));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        info!("Chromium launched with profile {}", profile.display());
        Ok(Self {
            browser: RwLock::new(browser),
            handler: Mutex::new(Some(handler)),
        })
    }
}

#[async_trait]
impl Session for ChromiumSession {
    async fn open_page(&self) -> Result<Box<dyn ExportPage>, Error> {
        let page = self
            .browser
            .read()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;
        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), Error> {
        let mut browser = self.browser.write().await;
        let closed = browser
            .close()
            .await
            .map_err(|e| Error::Browser(e.to_string()));
        let _ = browser.wait().await;

        let handler = self
            .handler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handler) = handler {
            handler.abort();
        }
        closed.map(|_| ())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn find(&self, target: &Target) -> Result<Element, Error> {
        let found = match target {
            Target::Css(selector) => self.page.find_element(*selector).await,
            Target::XPath(expr) => self.page.find_xpath(*expr).await,
        };
        found.map_err(|e| Error::Browser(format!("{target}: {e}")))
    }
}

#[async_trait]
impl ExportPage for ChromiumPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), Error> {
        let mut lifecycle = self
            .page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        let settled = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| Error::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            while let Some(event) = lifecycle.next().await {
                if event.name == "networkIdle" {
                    break;
                }
            }
            Ok::<(), Error>(())
        };

        tokio::time::timeout(timeout, settled)
            .await
            .map_err(|_| Error::NavigationTimeout(url.to_string()))?
    }

    async fn wait_for(&self, target: &Target, timeout: Duration) -> Result<(), Error> {
        let appeared = async {
            loop {
                if self.find(target).await.is_ok() {
                    return;
                }
                tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, appeared)
            .await
            .map_err(|_| Error::Browser(format!("timed out waiting for {target}")))
    }

    async fn hover(&self, target: &Target) -> Result<(), Error> {
        self.find(target)
            .await?
            .hover()
            .await
            .map_err(|e| Error::Browser(format!("hover {target}: {e}")))?;
        Ok(())
    }

    async fn click(&self, target: &Target) -> Result<(), Error> {
        self.find(target)
            .await?
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| Error::Browser(format!("click {target}: {e}")))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, Error> {
        self.page
            .url()
            .await
            .map_err(|e| Error::Browser(e.to_string()))
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, Error> {
        let script = format!(
            "fetch({}, {{ credentials: 'include' }}).then(r => {{ \
                if (!r.ok) throw new Error('HTTP ' + r.status); \
                return r.json(); \
            }})",
            serde_json::to_string(url)?
        );
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(Error::Fetch)?;

        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?
            .into_value::<Value>()
            .map_err(|e| Error::Fetch(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        self.page
            .close()
            .await
            .map_err(|e| Error::Browser(e.to_string()))
    }
}
