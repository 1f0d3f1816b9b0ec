//! JSON configuration: who submits, which forms, when, and how failures
//! are reported.
//!
//! The configuration is loaded once, validated, and passed to components as
//! an immutable value. Resolution order for the file path: `--config` flag,
//! `FORMPILOT_CONFIG` environment variable, `./config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::schedule::weekday;

/// Number of form URLs a configuration must carry (Monday..Sunday).
pub const FORM_URL_COUNT: usize = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected {expected} form URLs (Monday through Sunday), got {actual}")]
    UrlCount { expected: usize, actual: usize },

    #[error("form URL for 星期{day} is not http(s): {url}")]
    MalformedUrl { day: String, url: String },

    #[error("unknown weekday token: {0:?}")]
    UnknownWeekday(String),

    #[error("no submission weekdays configured")]
    NoWeekdays,

    #[error("星期{day} requires a reason but none is configured")]
    MissingReason { day: String },

    #[error(
        "reason for 星期{day} is too short: {have} non-whitespace characters, minimum {need}"
    )]
    ReasonTooShort {
        day: String,
        have: usize,
        need: usize,
    },

    #[error("invalid submit_time {0:?}, expected HH:MM:SS")]
    BadSubmitTime(String),

    #[error("utc_offset_hours {0} outside -12..=14")]
    BadUtcOffset(i32),
}

/// One form to fill: URL, day, and the reason text that goes with it.
/// Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct FormTarget {
    pub day: Weekday,
    pub url: String,
    pub reason: Option<String>,
}

impl FormTarget {
    pub fn token(&self) -> &'static str {
        weekday::token(self.day)
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a submission run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub user: UserConfig,
    pub email: EmailConfig,
    pub forms: FormsConfig,
    pub run: RunConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the config path from, in order: an explicit flag value, the
    /// `FORMPILOT_CONFIG` environment variable, `./config.json`.
    pub fn resolve_path(flag: Option<&Path>) -> PathBuf {
        if let Some(p) = flag {
            return p.to_path_buf();
        }
        if let Ok(env_path) = std::env::var("FORMPILOT_CONFIG") {
            return PathBuf::from(env_path);
        }
        PathBuf::from("config.json")
    }

    /// Validate every field that can fail before any browser work starts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.run.utc_offset()?;
        self.run.submit_time_of_day()?;
        self.run.submit_day()?;
        self.resolve_targets().map(|_| ())
    }

    /// Build the per-day form targets this run will submit: parse and
    /// deduplicate the requested weekday tokens, attach URLs and reasons,
    /// and enforce the reason-length floor for days that require one.
    pub fn resolve_targets(&self) -> Result<Vec<FormTarget>, ValidationError> {
        if self.forms.urls.len() != FORM_URL_COUNT {
            return Err(ValidationError::UrlCount {
                expected: FORM_URL_COUNT,
                actual: self.forms.urls.len(),
            });
        }
        if self.forms.weekdays.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }

        let mut days: Vec<Weekday> = Vec::new();
        for token in &self.forms.weekdays {
            let day = weekday::from_token(token)
                .ok_or_else(|| ValidationError::UnknownWeekday(token.clone()))?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        days.sort_by_key(|d| d.num_days_from_monday());

        let mut targets = Vec::with_capacity(days.len());
        for day in days {
            let token = weekday::token(day);
            let url = self.forms.urls[day.num_days_from_monday() as usize].clone();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::MalformedUrl {
                    day: token.to_string(),
                    url,
                });
            }

            let reason = self.forms.reasons.get(token).cloned();
            if weekday::reason_required(day) {
                let text = reason.as_deref().ok_or_else(|| ValidationError::MissingReason {
                    day: token.to_string(),
                })?;
                let have = non_whitespace_len(text);
                if have < self.run.min_reason_length {
                    return Err(ValidationError::ReasonTooShort {
                        day: token.to_string(),
                        have,
                        need: self.run.min_reason_length,
                    });
                }
            }

            targets.push(FormTarget { day, url, reason });
        }

        Ok(targets)
    }
}

/// Count of characters that are not whitespace (covers ASCII space and
/// full-width U+3000 alike).
pub fn non_whitespace_len(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// The person the forms are submitted for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Name typed into each form's 姓名 field.
    pub name: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// SMTP notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Master switch; when off, no mail is sent at any point in the run.
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Account used both for authentication and as the From address.
    pub account: String,
    pub recipient: String,
    pub sender_name: String,
    /// Single-line `KEY=value` file holding the SMTP app password.
    pub app_password_file: PathBuf,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            account: String::new(),
            recipient: String::new(),
            sender_name: "formpilot".to_string(),
            app_password_file: PathBuf::from("mail_key.env"),
        }
    }
}

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

/// The fixed set of form URLs and the days to submit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormsConfig {
    /// Exactly seven URLs, Monday through Sunday.
    pub urls: Vec<String>,
    /// Day tokens (一二三四五六日) to submit this run. Duplicates are folded.
    pub weekdays: Vec<String>,
    /// Reason text per day token. Mandatory for Saturday and Sunday targets.
    pub reasons: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Scheduling and browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Run the browser headless.
    pub headless: bool,
    /// Minimum non-whitespace character count for mandatory reasons.
    pub min_reason_length: usize,
    /// Fixed UTC offset the schedule is expressed in.
    pub utc_offset_hours: i32,
    /// Day token of the weekly submission slot.
    pub submit_weekday: String,
    /// Time of day of the submission slot, `HH:MM:SS`.
    pub submit_time: String,
    /// How far ahead of the slot prefilling starts.
    pub prefill_lead_secs: u64,
    /// Where failure screenshots are written.
    pub screenshot_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            headless: true,
            min_reason_length: 15,
            utc_offset_hours: 8,
            submit_weekday: "三".to_string(),
            submit_time: "14:00:00".to_string(),
            prefill_lead_secs: 30,
            screenshot_dir: PathBuf::from("fail_img"),
        }
    }
}

impl RunConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset, ValidationError> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ValidationError::BadUtcOffset(self.utc_offset_hours));
        }
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or(ValidationError::BadUtcOffset(self.utc_offset_hours))
    }

    pub fn submit_time_of_day(&self) -> Result<NaiveTime, ValidationError> {
        NaiveTime::parse_from_str(&self.submit_time, "%H:%M:%S")
            .map_err(|_| ValidationError::BadSubmitTime(self.submit_time.clone()))
    }

    pub fn submit_day(&self) -> Result<Weekday, ValidationError> {
        weekday::from_token(&self.submit_weekday)
            .ok_or_else(|| ValidationError::UnknownWeekday(self.submit_weekday.clone()))
    }

    pub fn prefill_lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.prefill_lead_secs as i64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seven_urls() -> Vec<String> {
        (0..7)
            .map(|i| format!("https://docs.google.com/forms/d/e/example{i}/viewform"))
            .collect()
    }

    fn valid_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.user.name = "王小明".to_string();
        cfg.forms.urls = seven_urls();
        cfg.forms.weekdays = vec!["三".to_string()];
        cfg
    }

    #[test]
    fn test_defaults_are_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.email.enabled);
        assert_eq!(cfg.email.smtp_host, "smtp.gmail.com");
        assert_eq!(cfg.email.smtp_port, 587);
        assert!(cfg.run.headless);
        assert_eq!(cfg.run.min_reason_length, 15);
        assert_eq!(cfg.run.utc_offset_hours, 8);
        assert_eq!(cfg.run.submit_weekday, "三");
        assert_eq!(cfg.run.submit_time, "14:00:00");
        assert_eq!(cfg.run.prefill_lead_secs, 30);
        assert_eq!(cfg.run.screenshot_dir, PathBuf::from("fail_img"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{ "user": { "name": "test" }, "run": { "headless": false } }"#,
        )
        .unwrap();
        assert_eq!(cfg.user.name, "test");
        assert!(!cfg.run.headless);
        assert_eq!(cfg.run.min_reason_length, 15);
        assert_eq!(cfg.email.smtp_port, 587);
    }

    #[test]
    fn test_six_urls_rejected() {
        let mut cfg = valid_config();
        cfg.forms.urls.pop();
        match cfg.resolve_targets() {
            Err(ValidationError::UrlCount { expected, actual }) => {
                assert_eq!(expected, 7);
                assert_eq!(actual, 6);
            }
            other => panic!("expected UrlCount error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_weekday_rejected() {
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec!["月".to_string()];
        assert_eq!(
            cfg.resolve_targets().unwrap_err(),
            ValidationError::UnknownWeekday("月".to_string())
        );
    }

    #[test]
    fn test_no_weekdays_rejected() {
        let mut cfg = valid_config();
        cfg.forms.weekdays.clear();
        assert_eq!(cfg.resolve_targets().unwrap_err(), ValidationError::NoWeekdays);
    }

    #[test]
    fn test_malformed_url_rejected() {
        let mut cfg = valid_config();
        cfg.forms.urls[2] = "docs.google.com/forms/whatever".to_string();
        assert!(matches!(
            cfg.resolve_targets().unwrap_err(),
            ValidationError::MalformedUrl { .. }
        ));
    }

    #[test]
    fn test_short_weekend_reason_rejected_with_both_counts() {
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec!["六".to_string()];
        cfg.forms
            .reasons
            .insert("六".to_string(), "家庭因素".to_string());

        let err = cfg.resolve_targets().unwrap_err();
        assert_eq!(
            err,
            ValidationError::ReasonTooShort {
                day: "六".to_string(),
                have: 4,
                need: 15,
            }
        );
        let msg = err.to_string();
        assert!(msg.contains('4'), "message must report the actual count: {msg}");
        assert!(msg.contains("15"), "message must report the minimum: {msg}");
    }

    #[test]
    fn test_whitespace_not_counted_toward_reason_length() {
        // 14 non-whitespace characters padded with spaces: still short.
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec!["日".to_string()];
        cfg.forms
            .reasons
            .insert("日".to_string(), "一 二 三 四 五 六 七 八 九 十 壹 貳 參 肆".to_string());
        assert!(matches!(
            cfg.resolve_targets().unwrap_err(),
            ValidationError::ReasonTooShort { have: 14, .. }
        ));
    }

    #[test]
    fn test_weekend_reason_at_minimum_accepted() {
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec!["六".to_string()];
        cfg.forms.reasons.insert(
            "六".to_string(),
            "家中臨時有要事需要本人親自處理".to_string(),
        );
        let targets = cfg.resolve_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert!(targets[0].reason.is_some());
    }

    #[test]
    fn test_missing_weekend_reason_rejected() {
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec!["日".to_string()];
        assert_eq!(
            cfg.resolve_targets().unwrap_err(),
            ValidationError::MissingReason {
                day: "日".to_string()
            }
        );
    }

    #[test]
    fn test_weekday_without_reason_is_fine() {
        let cfg = valid_config();
        let targets = cfg.resolve_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].token(), "三");
        assert!(targets[0].reason.is_none());
    }

    #[test]
    fn test_targets_deduplicated_and_ordered() {
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec![
            "五".to_string(),
            "一".to_string(),
            "五".to_string(),
            "三".to_string(),
        ];
        let targets = cfg.resolve_targets().unwrap();
        let tokens: Vec<_> = targets.iter().map(|t| t.token()).collect();
        assert_eq!(tokens, vec!["一", "三", "五"]);
    }

    #[test]
    fn test_target_url_matches_day_index() {
        let mut cfg = valid_config();
        cfg.forms.weekdays = vec!["日".to_string()];
        cfg.forms.reasons.insert(
            "日".to_string(),
            "週日需返鄉探望家中長輩並協助處理事務".to_string(),
        );
        let targets = cfg.resolve_targets().unwrap();
        assert_eq!(targets[0].url, cfg.forms.urls[6]);
    }

    #[test]
    fn test_non_whitespace_len() {
        assert_eq!(non_whitespace_len("家庭因素"), 4);
        assert_eq!(non_whitespace_len("家 庭　因 素"), 4); // half- and full-width spaces
        assert_eq!(non_whitespace_len(""), 0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "user": { "name": "載入測試" }, "run": { "utc_offset_hours": 9 } }"#,
        )
        .unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.user.name, "載入測試");
        assert_eq!(cfg.run.utc_offset_hours, 9);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = AppConfig::load(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_json_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_bad_submit_time_rejected() {
        let mut cfg = valid_config();
        cfg.run.submit_time = "14:00".to_string();
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ValidationError::BadSubmitTime(_)
        ));
    }

    #[test]
    fn test_bad_offset_rejected() {
        let mut cfg = valid_config();
        cfg.run.utc_offset_hours = 20;
        assert_eq!(
            cfg.validate().unwrap_err(),
            ValidationError::BadUtcOffset(20)
        );
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }
}
