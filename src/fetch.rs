use std::future::Future;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;

const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(250);
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Loads a locator and returns the rendered markup once the page's marker
/// element is present.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, ScrapeError>>;
}

/// What the fetcher waits for and for how long.
#[derive(Debug, Clone)]
pub struct WaitFor {
    /// Element id that marks a loaded review list.
    pub marker_id: String,
    pub timeout: Duration,
}

impl WaitFor {
    fn timed_out(&self, url: &str) -> ScrapeError {
        ScrapeError::FetchTimeout {
            url: url.to_string(),
            marker: self.marker_id.clone(),
            timeout: self.timeout,
        }
    }
}

fn fetch_error(url: &str, e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    }
}

// ── Headless browser ──

/// One headless Chrome instance and tab, reused for every page of a run.
pub struct BrowserFetcher {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    wait: WaitFor,
}

impl BrowserFetcher {
    pub async fn launch(wait: WaitFor) -> anyhow::Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_secs(30))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={USER_AGENT}"))
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Launched headless browser");

        Ok(Self {
            browser,
            page,
            handler,
            wait,
        })
    }

    /// Shut the browser down. Call on every exit path of a run.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        info!("Browser closed");
    }

    async fn wait_for_marker(&self, url: &str) -> Result<(), ScrapeError> {
        let selector = format!("#{}", self.wait.marker_id);
        let deadline = Instant::now() + self.wait.timeout;
        loop {
            if self.page.find_element(selector.as_str()).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(self.wait.timed_out(url));
            }
            tokio::time::sleep(MARKER_POLL_INTERVAL).await;
        }
    }
}

impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        self.page.goto(url).await.map_err(|e| fetch_error(url, e))?;
        self.wait_for_marker(url).await?;
        self.page.content().await.map_err(|e| fetch_error(url, e))
    }
}

// ── Plain HTTP ──

/// Fetches server-rendered markup without a browser. The marker must be in
/// the response body.
pub struct HttpFetcher {
    client: reqwest::Client,
    wait: WaitFor,
}

impl HttpFetcher {
    pub fn new(wait: WaitFor) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(wait.timeout)
            .build()?;
        Ok(Self { client, wait })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                self.wait.timed_out(url)
            } else {
                fetch_error(url, e)
            }
        })?;
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                self.wait.timed_out(url)
            } else {
                fetch_error(url, e)
            }
        })?;
        if has_marker(&body, &self.wait.marker_id) {
            Ok(body)
        } else {
            Err(self.wait.timed_out(url))
        }
    }
}

fn has_marker(body: &str, marker_id: &str) -> bool {
    body.contains(&format!("id=\"{marker_id}\"")) || body.contains(&format!("id='{marker_id}'"))
}

/// Either fetcher, picked at run time.
pub enum AnyFetcher {
    Browser(BrowserFetcher),
    Http(HttpFetcher),
}

impl AnyFetcher {
    pub async fn close(self) {
        if let AnyFetcher::Browser(browser) = self {
            browser.close().await;
        }
    }
}

impl PageFetcher for AnyFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        match self {
            AnyFetcher::Browser(f) => f.fetch(url).await,
            AnyFetcher::Http(f) => f.fetch(url).await,
        }
    }
}
