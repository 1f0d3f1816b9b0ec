//! Submission controller: drives every form target through fill and submit
//! inside its own browser session, retries retryable failures up to a fixed
//! cap, and aggregates the outcome of the whole pass.
//!
//! Per-target lifecycle:
//! pending -> filling -> awaiting-submit-window -> submitting, ending in
//! succeeded, closed (terminal, never retried), or exhausted once the retry
//! cap is spent. A retryable failure loops back to filling in a fresh
//! session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts;
use crate::browser::{FormEntries, FormError, FormSession, SessionFactory};
use crate::config::FormTarget;
use crate::notify::{Event, Notifier};
use crate::schedule;

/// Retries allowed after the initial attempt.
pub const MAX_RETRIES: u32 = 2;

/// Backoff before each retry.
const RETRY_BACKOFF: [Duration; MAX_RETRIES as usize] =
    [Duration::from_secs(5), Duration::from_secs(15)];

/// Post-submit window before a timeout warning is raised.
const CONFIRM_WINDOW: Duration = Duration::from_secs(10);
/// Grace window after the warning before the attempt is failed.
const CONFIRM_GRACE: Duration = Duration::from_secs(10);

/// When the submit click fires relative to filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTiming {
    /// Submit as soon as the form is filled.
    Immediate,
    /// Prefill, then hold the submit until this instant.
    At(DateTime<FixedOffset>),
}

/// Where a form currently is in its lifecycle. Used for logging and for
/// reporting where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Filling,
    AwaitingSubmitWindow,
    Submitting,
    Succeeded,
    FailedRetryable,
    Closed,
    ExhaustedFailed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Pending => "pending",
            Phase::Filling => "filling",
            Phase::AwaitingSubmitWindow => "awaiting-submit-window",
            Phase::Submitting => "submitting",
            Phase::Succeeded => "succeeded",
            Phase::FailedRetryable => "failed-retryable",
            Phase::Closed => "closed",
            Phase::ExhaustedFailed => "exhausted-failed",
        };
        write!(f, "{s}")
    }
}

/// Terminal outcome of one form target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Succeeded,
    /// The form stopped accepting responses; never retried.
    Closed,
    /// Retry cap spent without a successful submit.
    Exhausted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Closed => write!(f, "closed"),
            Outcome::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Final record for one form target.
#[derive(Debug, Clone, Serialize)]
pub struct FormReport {
    /// Day token (一..日).
    pub day: String,
    pub url: String,
    pub outcome: Outcome,
    pub attempts: u32,
    pub screenshot: Option<PathBuf>,
    pub error: Option<String>,
    /// Lateness of the exact-time submit in ms, when one was raced.
    pub submit_skew_ms: Option<i64>,
}

impl FormReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

/// Aggregate of one full pass over the configured targets.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<FixedOffset>,
    pub finished_at: DateTime<FixedOffset>,
    pub reports: Vec<FormReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }
}

struct AttemptFailure {
    error: FormError,
    screenshot: Option<PathBuf>,
}

/// Drives all targets of a run. One instance per run, shared by the
/// per-target tasks; holds only read-only state.
pub struct SubmitEngine<F: SessionFactory> {
    factory: F,
    notifier: Arc<dyn Notifier>,
    user_name: String,
    screenshot_dir: PathBuf,
    offset: FixedOffset,
}

impl<F: SessionFactory> SubmitEngine<F> {
    pub fn new(
        factory: F,
        notifier: Arc<dyn Notifier>,
        user_name: String,
        screenshot_dir: PathBuf,
        offset: FixedOffset,
    ) -> Self {
        Self {
            factory,
            notifier,
            user_name,
            screenshot_dir,
            offset,
        }
    }

    /// Run every target in its own task and collect the reports. A panic in
    /// one task is contained and reported; siblings are unaffected.
    pub async fn run_all(
        self: Arc<Self>,
        targets: Vec<FormTarget>,
        timing: SubmitTiming,
    ) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = schedule::now_in(self.offset);
        info!(%run_id, targets = targets.len(), "submission pass started");

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let engine = Arc::clone(&self);
            let label = (target.token().to_string(), target.url.clone());
            handles.push((
                label,
                tokio::spawn(async move { engine.run_target(target, timing).await }),
            ));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for ((day, url), handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(%day, error = %e, "form task aborted");
                    reports.push(FormReport {
                        day,
                        url,
                        outcome: Outcome::Exhausted,
                        attempts: 0,
                        screenshot: None,
                        error: Some(format!("task aborted: {e}")),
                        submit_skew_ms: None,
                    });
                }
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: schedule::now_in(self.offset),
            reports,
        };
        info!(
            %run_id,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "submission pass finished"
        );
        summary
    }

    /// Full lifecycle of one target: attempt, retry on retryable failure up
    /// to the cap, notify on the first failure, stop dead on closed forms.
    async fn run_target(&self, target: FormTarget, timing: SubmitTiming) -> FormReport {
        let day = target.token();
        let mut attempts = 0u32;
        let mut first_screenshot: Option<PathBuf> = None;
        let mut last_error: Option<String> = None;
        let mut submit_skew_ms: Option<i64> = None;

        self.transition(day, Phase::Pending);

        for retry in 0..=MAX_RETRIES {
            if retry > 0 {
                let backoff = RETRY_BACKOFF[(retry - 1) as usize];
                info!(%day, retry, "waiting {}s before retry", backoff.as_secs());
                tokio::time::sleep(backoff).await;
            }
            attempts += 1;

            match self.attempt(&target, timing).await {
                Ok(skew) => {
                    if submit_skew_ms.is_none() {
                        submit_skew_ms = skew;
                    }
                    self.transition(day, Phase::Succeeded);
                    info!(%day, attempts, "form submitted");
                    return FormReport {
                        day: day.to_string(),
                        url: target.url,
                        outcome: Outcome::Succeeded,
                        attempts,
                        screenshot: first_screenshot,
                        error: None,
                        submit_skew_ms,
                    };
                }
                Err(failure) => {
                    warn!(%day, attempts, error = %failure.error, "attempt failed");

                    if failure.error.is_terminal() {
                        self.transition(day, Phase::Closed);
                        return FormReport {
                            day: day.to_string(),
                            url: target.url,
                            outcome: Outcome::Closed,
                            attempts,
                            screenshot: failure.screenshot.or(first_screenshot),
                            error: Some(failure.error.to_string()),
                            submit_skew_ms,
                        };
                    }

                    self.transition(day, Phase::FailedRetryable);
                    last_error = Some(failure.error.to_string());
                    if attempts == 1 {
                        self.notify_first_failure(&target, &failure).await;
                        first_screenshot = failure.screenshot;
                    }
                }
            }
        }

        self.transition(day, Phase::ExhaustedFailed);
        FormReport {
            day: day.to_string(),
            url: target.url,
            outcome: Outcome::Exhausted,
            attempts,
            screenshot: first_screenshot,
            error: last_error,
            submit_skew_ms,
        }
    }

    /// One attempt inside one fresh session. On failure the page is checked
    /// for a closed-form notice (upgrading the error to terminal) and a
    /// screenshot is captured while the session is still alive.
    async fn attempt(
        &self,
        target: &FormTarget,
        timing: SubmitTiming,
    ) -> Result<Option<i64>, AttemptFailure> {
        let mut session = self.factory.launch().await.map_err(|error| AttemptFailure {
            error,
            screenshot: None,
        })?;

        match self.drive(&mut session, target, timing).await {
            Ok(skew) => {
                session.close().await;
                Ok(skew)
            }
            Err(error) => {
                let error = if !error.is_terminal() && session.closed_notice().await {
                    FormError::Closed
                } else {
                    error
                };
                let screenshot = self.capture_failure(&mut session, target).await;
                session.close().await;
                Err(AttemptFailure { error, screenshot })
            }
        }
    }

    /// The fill -> (hold) -> submit -> confirm sequence on an open session.
    async fn drive(
        &self,
        session: &mut F::Session,
        target: &FormTarget,
        timing: SubmitTiming,
    ) -> Result<Option<i64>, FormError> {
        let day = target.token();
        let entries = FormEntries {
            name: self.user_name.clone(),
            day: target.day,
            reason: target.reason.clone(),
        };

        self.transition(day, Phase::Filling);
        session.open(&target.url).await?;
        session.fill(&entries).await?;

        let mut skew = None;
        if let SubmitTiming::At(instant) = timing {
            self.transition(day, Phase::AwaitingSubmitWindow);
            let late_ms = schedule::sleep_until(instant).await;
            skew = Some(late_ms);
            debug!(%day, late_ms, "submit window reached");
        }

        self.transition(day, Phase::Submitting);
        session.submit().await?;

        if session.confirmed(CONFIRM_WINDOW).await? {
            return Ok(skew);
        }

        warn!(%day, "no confirmation redirect after {}s", CONFIRM_WINDOW.as_secs());
        self.notify(Event::TimeoutWarning {
            day: day.to_string(),
        })
        .await;

        if session.confirmed(CONFIRM_GRACE).await? {
            info!(%day, "confirmation arrived during the grace window");
            return Ok(skew);
        }

        Err(FormError::SubmitTimeout {
            waited_secs: (CONFIRM_WINDOW + CONFIRM_GRACE).as_secs(),
        })
    }

    async fn capture_failure(&self, session: &mut F::Session, target: &FormTarget) -> Option<PathBuf> {
        if let Err(e) = artifacts::ensure_dir(&self.screenshot_dir) {
            warn!(error = %e, "could not create screenshot directory");
            return None;
        }
        let path = artifacts::screenshot_path(
            &self.screenshot_dir,
            schedule::now_in(self.offset),
            target.day,
        );
        match session.capture(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "failure screenshot saved");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "screenshot capture failed");
                None
            }
        }
    }

    async fn notify_first_failure(&self, target: &FormTarget, failure: &AttemptFailure) {
        self.notify(Event::FirstFailure {
            day: target.token().to_string(),
            url: target.url.clone(),
            error: failure.error.to_string(),
            screenshot: failure.screenshot.clone(),
        })
        .await;
    }

    /// Deliver an event, logging delivery problems instead of surfacing
    /// them; notification must never change a run's outcome.
    async fn notify(&self, event: Event) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!(error = %e, "notification delivery failed");
        }
    }

    fn transition(&self, day: &str, phase: Phase) {
        debug!(%day, %phase, "phase");
    }
}
