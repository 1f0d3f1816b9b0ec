//! Target-instant computation and deadline-precise waiting.
//!
//! The wait converges in layers: coarse sleeps while more than a minute out,
//! a single sleep into the final second, then millisecond steps and a yield
//! loop for the last instants. Wall-clock time is re-read every layer so a
//! suspended or slow host cannot drift the wakeup.

pub mod weekday;

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, Timelike, Utc, Weekday,
};
use std::time::Duration;
use tracing::{info, warn};

/// How a run decides when to submit. Chosen once, before the pipeline
/// starts; there is no interactive decision point after this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Wait for the next configured weekday/time occurrence.
    WaitUntilTarget,
    /// Fill and submit right away.
    Immediate,
    /// Wait a fixed number of minutes, then fill and submit.
    DelayMinutes(u32),
}

/// Current wall-clock time in the configured offset.
pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Next occurrence of `day` at `at`, strictly after `now`. An occurrence
/// earlier today (or exactly now) rolls over to the following week.
pub fn next_occurrence(
    now: DateTime<FixedOffset>,
    day: Weekday,
    at: NaiveTime,
) -> DateTime<FixedOffset> {
    let days_ahead = i64::from(day.num_days_from_monday())
        - i64::from(now.weekday().num_days_from_monday());
    let date = now.date_naive() + ChronoDuration::days(days_ahead.rem_euclid(7));

    let naive = date.and_time(at);
    // A fixed offset maps every local time to exactly one instant.
    let mut target = naive
        .and_local_timezone(now.timezone())
        .single()
        .expect("fixed offset local time is unambiguous");

    if target <= now {
        target += ChronoDuration::days(7);
    }
    target
}

/// Sleep until `target`, returning the observed wakeup skew in whole
/// milliseconds (0 when the target is already past or we land inside the
/// same millisecond).
pub async fn sleep_until(target: DateTime<FixedOffset>) -> i64 {
    loop {
        let now = now_in(target.timezone());
        let remaining_ms = (target - now).num_milliseconds();

        if remaining_ms <= 0 {
            return -remaining_ms;
        }

        if remaining_ms > 60_000 {
            // Coarse: land 60s short, at most 5 minutes per step.
            let step = (remaining_ms - 60_000).min(300_000) as u64;
            tokio::time::sleep(Duration::from_millis(step)).await;
        } else if remaining_ms > 1_000 {
            tokio::time::sleep(Duration::from_millis((remaining_ms - 1_000) as u64)).await;
        } else if remaining_ms > 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        } else {
            // Final couple of milliseconds: spin on the clock.
            tokio::task::yield_now().await;
        }
    }
}

/// Log the clock at execution start and flag a mismatch against the
/// configured submission slot.
pub fn log_execution_clock(offset: FixedOffset, expected_day: Weekday, expected_at: NaiveTime) {
    let now = now_in(offset);
    info!(
        now = %now.format("%Y-%m-%d %H:%M:%S"),
        day = %weekday::token(now.weekday()),
        "starting submission pass"
    );
    if now.weekday() != expected_day {
        warn!(
            expected = %weekday::token(expected_day),
            "today is not the configured submission weekday"
        );
    }
    if now.hour() != expected_at.hour() || now.minute() != expected_at.minute() {
        warn!(
            expected = %expected_at.format("%H:%M:%S"),
            "current time is outside the configured submission minute"
        );
    }
}
