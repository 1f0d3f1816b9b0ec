//! formpilot -- deadline-precise Google Forms auto-fill and submission.
//!
//! This crate wires a precision scheduler to a per-form submission engine:
//! it computes the weekly target instant, waits on it with millisecond
//! accuracy, prefills every configured form in its own browser session, and
//! fires the submit clicks exactly on the deadline, reporting the outcome
//! over email.

pub mod artifacts;
pub mod browser;
pub mod config;
pub mod notify;
pub mod schedule;
pub mod submit;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::browser::chrome::ChromeFactory;
use crate::config::AppConfig;
use crate::notify::{email::Mailer, Event, NoopNotifier, Notifier};
use crate::schedule::RunMode;
use crate::submit::{RunSummary, SubmitEngine, SubmitTiming};

/// How far ahead of the target the reminder goes out.
const REMINDER_LEAD_MINUTES: i64 = 5;

/// Run the full pipeline: validate config, wait out the chosen mode, drive
/// every form target, and deliver the summary.
pub async fn execute(config: AppConfig, mode: RunMode) -> Result<RunSummary> {
    config.validate().context("invalid configuration")?;

    let offset = config.run.utc_offset()?;
    let submit_day = config.run.submit_day()?;
    let submit_at = config.run.submit_time_of_day()?;
    let targets = config.resolve_targets()?;
    info!(
        targets = targets.len(),
        mode = ?mode,
        "configuration resolved"
    );

    // Construct the notifier up front so credential problems abort the run
    // before any waiting or browser work.
    let notifier: Arc<dyn Notifier> = if config.email.enabled {
        Arc::new(Mailer::from_config(&config.email, offset).context("email setup failed")?)
    } else {
        info!("email notifications disabled");
        Arc::new(NoopNotifier)
    };

    let timing = match mode {
        RunMode::Immediate => {
            info!("running immediately");
            SubmitTiming::Immediate
        }
        RunMode::DelayMinutes(minutes) => {
            let target = schedule::now_in(offset) + ChronoDuration::minutes(i64::from(minutes));
            info!(
                minutes,
                until = %target.format("%Y-%m-%d %H:%M:%S"),
                "delaying before an immediate run"
            );
            schedule::sleep_until(target).await;
            SubmitTiming::Immediate
        }
        RunMode::WaitUntilTarget => {
            let now = schedule::now_in(offset);
            let target = schedule::next_occurrence(now, submit_day, submit_at);
            let prefill_at = target - config.run.prefill_lead();
            info!(
                target = %target.format("%Y-%m-%d %H:%M:%S"),
                prefill = %prefill_at.format("%H:%M:%S"),
                "waiting for the submission slot"
            );

            let reminder_at = target - ChronoDuration::minutes(REMINDER_LEAD_MINUTES);
            if reminder_at > now {
                schedule::sleep_until(reminder_at).await;
                if let Err(e) = notifier
                    .notify(Event::Reminder {
                        target,
                        targets: targets.clone(),
                    })
                    .await
                {
                    warn!(error = %e, "reminder delivery failed");
                }
            }

            schedule::sleep_until(prefill_at).await;
            SubmitTiming::At(target)
        }
    };

    schedule::log_execution_clock(offset, submit_day, submit_at);

    let engine = Arc::new(SubmitEngine::new(
        ChromeFactory::new(config.run.headless),
        Arc::clone(&notifier),
        config.user.name.clone(),
        config.run.screenshot_dir.clone(),
        offset,
    ));
    let summary = engine.run_all(targets, timing).await;

    if let Err(e) = notifier.notify(Event::Summary(summary.clone())).await {
        warn!(error = %e, "summary delivery failed");
    }

    Ok(summary)
}
