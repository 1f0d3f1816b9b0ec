//! Browser boundary: a session trait the submission controller drives, and
//! the CDP-backed implementation.
//!
//! Each session owns one browser process and one page; nothing is shared
//! between sessions, so a wedged or crashed form cannot touch its siblings.

pub mod chrome;
pub mod google;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Weekday;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("browser session failed: {0}")]
    Session(String),

    #[error("form interaction failed: {0}")]
    Interaction(String),

    #[error("no confirmation redirect within {waited_secs}s of submit")]
    SubmitTimeout { waited_secs: u64 },

    #[error("form is no longer accepting responses")]
    Closed,
}

impl FormError {
    /// Terminal errors are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FormError::Closed)
    }
}

/// Everything that goes into a form before the submit click.
#[derive(Debug, Clone)]
pub struct FormEntries {
    pub name: String,
    pub day: Weekday,
    pub reason: Option<String>,
}

/// One isolated fill/submit session. The controller sequences these calls;
/// implementations only talk to their own page.
#[async_trait]
pub trait FormSession: Send {
    /// Navigate to the form and wait until its fields are present.
    async fn open(&mut self, url: &str) -> Result<(), FormError>;

    /// Fill every field without submitting.
    async fn fill(&mut self, entries: &FormEntries) -> Result<(), FormError>;

    /// Fire the submit action.
    async fn submit(&mut self) -> Result<(), FormError>;

    /// Wait up to `window` for the post-submit confirmation redirect.
    /// Returns false when the window elapses without one.
    async fn confirmed(&mut self, window: Duration) -> Result<bool, FormError>;

    /// Whether the page currently shows a known closed-form notice.
    async fn closed_notice(&mut self) -> bool;

    /// Capture a full-page screenshot to `path`.
    async fn capture(&mut self, path: &Path) -> Result<(), FormError>;

    /// Tear the session down. Best effort; never fails the run.
    async fn close(&mut self);
}

/// Launches fresh sessions. One launch per attempt keeps attempts isolated
/// from each other as well.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: FormSession;

    async fn launch(&self) -> Result<Self::Session, FormError>;
}
