//! SMTP delivery for notification events.
//!
//! Credentials come from the configured account plus an app password kept in
//! a single-line `KEY=value` file outside the main configuration. Failure
//! screenshots ride along as PNG attachments on first-failure mail.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::{EmailConfig, FormTarget};
use crate::schedule;
use crate::submit::RunSummary;

use super::{Event, Notifier};

pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    offset: FixedOffset,
}

impl Mailer {
    pub fn from_config(config: &EmailConfig, offset: FixedOffset) -> Result<Self> {
        let password = load_app_password(&config.app_password_file)?;
        let credentials = Credentials::new(config.account.clone(), password);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .context("SMTP relay setup failed")?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        let from: Mailbox = format!("{} <{}>", config.sender_name, config.account)
            .parse()
            .with_context(|| format!("invalid sender address: {}", config.account))?;
        let to: Mailbox = config
            .recipient
            .parse()
            .with_context(|| format!("invalid recipient address: {}", config.recipient))?;

        Ok(Self {
            transport,
            from,
            to,
            offset,
        })
    }

    async fn send_plain(&self, subject: &str, body: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;
        info!(%subject, "notification email sent");
        Ok(())
    }

    async fn send_with_screenshot(
        &self,
        subject: &str,
        body: String,
        screenshot: &Path,
    ) -> Result<()> {
        let bytes = std::fs::read(screenshot)
            .with_context(|| format!("failed to read screenshot {}", screenshot.display()))?;
        let filename = screenshot
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "screenshot.png".to_string());
        let attachment = Attachment::new(filename).body(
            bytes,
            ContentType::parse("image/png").context("png content type")?,
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(attachment),
            )
            .context("failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;
        info!(%subject, screenshot = %screenshot.display(), "notification email sent with attachment");
        Ok(())
    }

    fn now_stamp(&self) -> String {
        schedule::now_in(self.offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

#[async_trait]
impl Notifier for Mailer {
    async fn notify(&self, event: Event) -> Result<()> {
        match event {
            Event::Reminder { target, targets } => {
                let body = reminder_body(&self.now_stamp(), target, &targets);
                self.send_plain("Scheduled form submission in 5 minutes", body)
                    .await
            }
            Event::TimeoutWarning { day } => {
                let subject = format!("Warning: 星期{day} submit confirmation delayed");
                self.send_plain(&subject, timeout_body(&self.now_stamp(), &day))
                    .await
            }
            Event::FirstFailure {
                day,
                url,
                error,
                screenshot,
            } => {
                let subject = format!("Form submission failed - 星期{day}");
                let body = first_failure_body(&self.now_stamp(), &day, &url, &error);
                match screenshot {
                    Some(path) => self.send_with_screenshot(&subject, body, &path).await,
                    None => self.send_plain(&subject, body).await,
                }
            }
            Event::Summary(summary) => {
                let subject = summary_subject(&summary);
                self.send_plain(&subject, summary_body(&summary)).await
            }
        }
    }
}

/// Read the app password from a `KEY=value` single-line file. Whitespace
/// inside the value is stripped (app passwords are shown grouped in fours).
pub fn load_app_password(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!(
            "app password file not found: {} (create it with KEY=your_app_password)",
            path.display()
        );
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let content = content.trim();

    let Some((_, value)) = content.split_once('=') else {
        bail!(
            "{} is malformed, expected a single KEY=value line",
            path.display()
        );
    };
    let password: String = value.chars().filter(|c| !c.is_whitespace()).collect();

    if password.len() != 16 {
        warn!(
            length = password.len(),
            "app password length is unusual, expected 16 characters"
        );
    }
    Ok(password)
}

fn reminder_body(stamp: &str, target: DateTime<FixedOffset>, targets: &[FormTarget]) -> String {
    let days = targets
        .iter()
        .map(|t| format!("星期{}", t.token()))
        .collect::<Vec<_>>()
        .join("、");

    let mut reasons = String::new();
    for t in targets {
        if let Some(reason) = t.reason.as_deref() {
            reasons.push_str(&format!("  星期{}: {}\n", t.token(), reason));
        }
    }
    let reason_section = if reasons.is_empty() {
        String::new()
    } else {
        format!("\nConfigured reasons:\n{reasons}")
    };

    format!(
        "Form submission reminder\n\n\
         Sent at: {stamp}\n\
         Scheduled for: {}\n\n\
         Forms to submit:\n  {days}\n{reason_section}\n\
         Submission starts automatically in 5 minutes.\n",
        target.format("%Y-%m-%d %H:%M:%S"),
    )
}

fn timeout_body(stamp: &str, day: &str) -> String {
    format!(
        "Form submission warning\n\n\
         Time: {stamp}\n\
         Form: 星期{day}\n\n\
         The submit click fired but no confirmation redirect arrived within\n\
         10 seconds. A 10 second grace window is still running; if it also\n\
         elapses the attempt is marked failed.\n\n\
         Likely causes: slow network, slow server response, or a misbehaving\n\
         form. Watch for the final summary mail.\n",
    )
}

fn first_failure_body(stamp: &str, day: &str, url: &str, error: &str) -> String {
    format!(
        "Form submission failure\n\n\
         Time: {stamp}\n\
         Form: 星期{day}\n\
         URL: {url}\n\n\
         Error:\n  {error}\n\n\
         A retry is about to run; watch for the final summary mail.\n",
    )
}

fn summary_subject(summary: &RunSummary) -> String {
    let total = summary.reports.len();
    let failed = summary.failed();
    if failed == 0 {
        format!("Form run complete: all {total} succeeded")
    } else {
        format!(
            "Form run complete: {} succeeded, {failed} failed",
            summary.succeeded()
        )
    }
}

fn summary_body(summary: &RunSummary) -> String {
    let mut lines = String::new();
    for report in &summary.reports {
        lines.push_str(&format!(
            "  星期{}: {} ({} attempt{})\n",
            report.day,
            report.outcome,
            report.attempts,
            if report.attempts == 1 { "" } else { "s" },
        ));
        if let Some(error) = report.error.as_deref() {
            lines.push_str(&format!("    error: {error}\n"));
        }
        if let Some(shot) = report.screenshot.as_deref() {
            lines.push_str(&format!("    screenshot: {}\n", shot.display()));
        }
    }

    format!(
        "Form submission report\n\n\
         Run: {}\n\
         Finished at: {}\n\
         Total: {} / Succeeded: {} / Failed: {}\n\n\
         Results:\n{lines}\n",
        summary.run_id,
        summary.finished_at.format("%Y-%m-%d %H:%M:%S"),
        summary.reports.len(),
        summary.succeeded(),
        summary.failed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::{FormReport, Outcome};
    use chrono::TimeZone;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn sample_summary() -> RunSummary {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: offset.with_ymd_and_hms(2025, 10, 1, 13, 59, 30).unwrap(),
            finished_at: offset.with_ymd_and_hms(2025, 10, 1, 14, 0, 40).unwrap(),
            reports: vec![
                FormReport {
                    day: "三".to_string(),
                    url: "https://example.com/wed".to_string(),
                    outcome: Outcome::Succeeded,
                    attempts: 1,
                    screenshot: None,
                    error: None,
                    submit_skew_ms: Some(3),
                },
                FormReport {
                    day: "六".to_string(),
                    url: "https://example.com/sat".to_string(),
                    outcome: Outcome::Exhausted,
                    attempts: 3,
                    screenshot: Some(PathBuf::from("fail_img/2025-10-01-Saturday.png")),
                    error: Some("submit button not found".to_string()),
                    submit_skew_ms: None,
                },
            ],
        }
    }

    #[test]
    fn test_app_password_loaded_and_despaced() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mail_key.env");
        std::fs::write(&path, "MAIL_KEY=abcd efgh ijkl mnop\n").unwrap();
        assert_eq!(load_app_password(&path).unwrap(), "abcdefghijklmnop");
    }

    #[test]
    fn test_app_password_missing_file() {
        assert!(load_app_password(Path::new("/nonexistent/mail_key.env")).is_err());
    }

    #[test]
    fn test_app_password_without_equals_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mail_key.env");
        std::fs::write(&path, "abcdefghijklmnop").unwrap();
        assert!(load_app_password(&path).is_err());
    }

    #[test]
    fn test_summary_subject_reflects_failures() {
        let summary = sample_summary();
        assert_eq!(summary_subject(&summary), "Form run complete: 1 succeeded, 1 failed");

        let mut all_ok = summary.clone();
        all_ok.reports.truncate(1);
        assert_eq!(summary_subject(&all_ok), "Form run complete: all 1 succeeded");
    }

    #[test]
    fn test_summary_body_lists_each_form() {
        let body = summary_body(&sample_summary());
        assert!(body.contains("星期三"));
        assert!(body.contains("星期六"));
        assert!(body.contains("3 attempts"));
        assert!(body.contains("submit button not found"));
        assert!(body.contains("2025-10-01-Saturday.png"));
    }

    #[test]
    fn test_reminder_body_lists_days_and_reasons() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let target = offset.with_ymd_and_hms(2025, 10, 1, 14, 0, 0).unwrap();
        let targets = vec![
            FormTarget {
                day: chrono::Weekday::Wed,
                url: "https://example.com/wed".to_string(),
                reason: None,
            },
            FormTarget {
                day: chrono::Weekday::Sat,
                url: "https://example.com/sat".to_string(),
                reason: Some("家中臨時有要事需要本人親自處理".to_string()),
            },
        ];
        let body = reminder_body("2025-10-01 13:55:00", target, &targets);
        assert!(body.contains("星期三、星期六"));
        assert!(body.contains("家中臨時有要事需要本人親自處理"));
        assert!(body.contains("2025-10-01 14:00:00"));
    }
}
