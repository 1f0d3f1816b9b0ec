use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use formpilot::config::AppConfig;
use formpilot::schedule::{self, RunMode};
use formpilot::submit::RunSummary;

#[derive(Parser)]
#[command(
    name = "formpilot",
    about = "Deadline-precise Google Forms auto-fill and submission",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill and submit the configured forms
    Run {
        /// Submit immediately instead of waiting for the scheduled slot
        #[arg(long, conflicts_with = "delay")]
        now: bool,

        /// Wait this many minutes, then submit immediately
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        delay: Option<u32>,

        /// Config file path (default: $FORMPILOT_CONFIG, then ./config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate the configuration and print the resolved targets
    CheckConfig {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the next scheduled submission instant
    NextRun {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { now, delay, config } => {
            let mode = if now {
                RunMode::Immediate
            } else if let Some(minutes) = delay {
                RunMode::DelayMinutes(minutes)
            } else {
                RunMode::WaitUntilTarget
            };

            let config = load(config.as_deref())?;
            let summary = formpilot::execute(config, mode).await?;
            print_report(&summary);

            if summary.failed() > 0 {
                anyhow::bail!("{} of {} forms failed", summary.failed(), summary.reports.len());
            }
        }

        Commands::CheckConfig { config } => {
            let config = load(config.as_deref())?;
            config.validate()?;
            let targets = config.resolve_targets()?;

            println!("Configuration OK");
            println!("{:<10} | {:<8} | URL", "Day", "Reason");
            println!("{:-<10}-|-{:-<8}-|-{:-<50}", "", "", "");
            for target in &targets {
                let reason = if target.reason.is_some() { "yes" } else { "-" };
                println!("星期{:<8} | {:<8} | {}", target.token(), reason, target.url);
            }
        }

        Commands::NextRun { config } => {
            let config = load(config.as_deref())?;
            config.validate()?;

            let offset = config.run.utc_offset()?;
            let now = schedule::now_in(offset);
            let target =
                schedule::next_occurrence(now, config.run.submit_day()?, config.run.submit_time_of_day()?);
            let prefill = target - config.run.prefill_lead();

            println!("Now:      {}", now.format("%Y-%m-%d %H:%M:%S %:z"));
            println!("Reminder: {}", (target - chrono::Duration::minutes(5)).format("%Y-%m-%d %H:%M:%S"));
            println!("Prefill:  {}", prefill.format("%Y-%m-%d %H:%M:%S"));
            println!("Submit:   {}", target.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    Ok(())
}

fn load(flag: Option<&std::path::Path>) -> Result<AppConfig> {
    let path = AppConfig::resolve_path(flag);
    Ok(AppConfig::load(&path)?)
}

fn print_report(summary: &RunSummary) {
    println!("\nFormpilot Run Report");
    println!("{:<8} | {:<12} | {:<8} | Details", "Day", "Outcome", "Attempts");
    println!("{:-<8}-|-{:-<12}-|-{:-<8}-|-{:-<40}", "", "", "", "");
    for report in &summary.reports {
        let mut details = report.error.clone().unwrap_or_else(|| "-".to_string());
        if let Some(skew) = report.submit_skew_ms {
            details = format!("{details} (submit skew {skew}ms)");
        }
        println!(
            "星期{:<6} | {:<12} | {:<8} | {}",
            report.day, report.outcome, report.attempts, details
        );
    }
    println!(
        "\nTotal: {} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
}
