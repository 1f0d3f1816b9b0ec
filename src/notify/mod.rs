//! Notification boundary: lifecycle events delivered out of band.
//!
//! The pipeline only sees the `Notifier` trait; delivery failures are the
//! implementation's problem to report (log), never the run's.

pub mod email;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::config::FormTarget;
use crate::submit::RunSummary;

/// Lifecycle events the pipeline emits.
#[derive(Debug, Clone)]
pub enum Event {
    /// Sent five minutes ahead of the submission slot.
    Reminder {
        target: DateTime<FixedOffset>,
        targets: Vec<FormTarget>,
    },
    /// Submit fired but no confirmation redirect arrived in the first window.
    TimeoutWarning { day: String },
    /// First failure of a target, before its first retry.
    FirstFailure {
        day: String,
        url: String,
        error: String,
        screenshot: Option<PathBuf>,
    },
    /// End-of-run aggregate.
    Summary(RunSummary),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: Event) -> anyhow::Result<()>;
}

/// Used when email is disabled in the configuration.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: Event) -> anyhow::Result<()> {
        Ok(())
    }
}
