//! Failure screenshot artifacts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Weekday};

use crate::schedule::weekday;

/// Create the screenshot directory if it does not exist yet.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Screenshot path for a day: `<dir>/YYYY-MM-DD-<EnglishDay>.png`.
pub fn screenshot_path(dir: &Path, now: DateTime<FixedOffset>, day: Weekday) -> PathBuf {
    dir.join(format!(
        "{}-{}.png",
        now.format("%Y-%m-%d"),
        weekday::english(day)
    ))
}
