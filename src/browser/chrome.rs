//! CDP-backed form session over chromiumoxide.
//!
//! One `ChromeSession` is one browser process with one page. The event
//! handler stream must be polled for the connection to make progress, so
//! each session spawns its own handler task and aborts it on close.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use chrono::Weekday;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::google;
use super::{FormEntries, FormError, FormSession, SessionFactory};

const FORM_READY_TIMEOUT: Duration = Duration::from_secs(15);
const URL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLICK_SETTLE: Duration = Duration::from_millis(50);
const CLICK_RETRY_SETTLE: Duration = Duration::from_millis(500);

/// Launches one fresh Chromium per session.
pub struct ChromeFactory {
    headless: bool,
}

impl ChromeFactory {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl SessionFactory for ChromeFactory {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession, FormError> {
        ChromeSession::launch(self.headless).await
    }
}

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    pub async fn launch(headless: bool) -> Result<Self, FormError> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(FormError::Session)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FormError::Session(format!("launch: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FormError::Session(format!("new page: {e}")))?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Evaluate a script expected to yield a boolean.
    async fn eval_bool(&self, script: &str) -> Result<bool, FormError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| FormError::Interaction(format!("evaluate: {e}")))?;
        result
            .into_value::<bool>()
            .map_err(|e| FormError::Interaction(format!("evaluate result: {e}")))
    }

    /// Poll `expression` until it is true or the timeout elapses.
    async fn wait_for(&self, expression: &str, timeout: Duration, what: &str) -> Result<(), FormError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval_bool(expression).await.unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FormError::Interaction(format!(
                    "timed out after {}s waiting for {what}",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(URL_POLL_INTERVAL).await;
        }
    }

    /// Click + type into the first selector of the ladder that matches.
    async fn type_into_first(&self, selectors: &[&str], text: &str) -> Result<(), FormError> {
        for selector in selectors {
            if let Ok(element) = self.page.find_element(*selector).await {
                let typed = async {
                    element.click().await?;
                    element.type_str(text).await
                }
                .await;
                match typed {
                    Ok(_) => return Ok(()),
                    Err(e) => {
                        debug!(selector, error = %e, "selector matched but input failed");
                        continue;
                    }
                }
            }
        }
        Err(FormError::Interaction(format!(
            "no input matched any of {selectors:?}"
        )))
    }

    async fn fill_name(&self, name: &str) -> Result<(), FormError> {
        self.type_into_first(&google::NAME_SELECTORS, name)
            .await
            .map_err(|_| FormError::Interaction("name input not found".to_string()))
    }

    /// Select the 休假 radio, verifying `aria-checked` took, with a native
    /// click first and a scripted click as fallback.
    async fn check_leave_radio(&self, day: Weekday) -> Result<(), FormError> {
        let sunday = day == Weekday::Sun;

        if !sunday {
            if let Ok(element) = self.page.find_element(google::LEAVE_RADIO_SELECTOR).await {
                if element.click().await.is_ok() {
                    tokio::time::sleep(CLICK_SETTLE).await;
                    if let Ok(Some(checked)) = element.attribute("aria-checked").await {
                        if checked == "true" {
                            return Ok(());
                        }
                    }
                }
            }
        }

        // Scripted path: also the primary path for the Sunday variant.
        let script = google::click_leave_radio_script(sunday);
        if self.eval_bool(&script).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::time::sleep(CLICK_RETRY_SETTLE).await;
        if self.eval_bool(&script).await.unwrap_or(false) {
            return Ok(());
        }

        Err(FormError::Interaction(
            "leave radio did not register as checked".to_string(),
        ))
    }

    /// Fill the reason textarea. Missing field is tolerated; some weekday
    /// forms simply do not carry one.
    async fn fill_reason(&self, reason: &str) -> Result<(), FormError> {
        for selector in google::REASON_SELECTORS {
            if let Ok(elements) = self.page.find_elements(selector).await {
                if let Some(element) = elements.into_iter().last() {
                    let typed = async {
                        element.click().await?;
                        element.type_str(reason).await
                    }
                    .await;
                    if typed.is_ok() {
                        return Ok(());
                    }
                }
            }
        }
        warn!("reason field not found, continuing without it");
        Ok(())
    }
}

#[async_trait]
impl FormSession for ChromeSession {
    async fn open(&mut self, url: &str) -> Result<(), FormError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| FormError::Interaction(format!("navigation: {e}")))?;
        self.wait_for(google::form_ready_expression(), FORM_READY_TIMEOUT, "form body")
            .await
    }

    async fn fill(&mut self, entries: &FormEntries) -> Result<(), FormError> {
        self.fill_name(&entries.name).await?;
        self.check_leave_radio(entries.day).await?;
        if let Some(reason) = entries.reason.as_deref() {
            if !reason.is_empty() {
                self.fill_reason(reason).await?;
            }
        }
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), FormError> {
        if self.eval_bool(google::click_submit_script()).await? {
            Ok(())
        } else {
            Err(FormError::Interaction("submit button not found".to_string()))
        }
    }

    async fn confirmed(&mut self, window: Duration) -> Result<bool, FormError> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let url = self
                .page
                .url()
                .await
                .map_err(|e| FormError::Interaction(format!("read url: {e}")))?;
            if url.as_deref().is_some_and(google::is_confirmation_url) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(URL_POLL_INTERVAL).await;
        }
    }

    async fn closed_notice(&mut self) -> bool {
        match self.page.content().await {
            Ok(html) => {
                if let Some(phrase) = google::closed_phrase_in(&html) {
                    debug!(%phrase, "closed-form notice detected");
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    async fn capture(&mut self, path: &Path) -> Result<(), FormError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .map(|_| ())
            .map_err(|e| FormError::Interaction(format!("screenshot: {e}")))
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "browser close");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}
