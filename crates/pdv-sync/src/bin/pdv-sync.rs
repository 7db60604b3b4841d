//! # pdv-sync
//!
//! Runs the terminal's sync engine.
//!
//! ## Usage
//! ```bash
//! # One sync, print the report, exit 1 if it failed
//! pdv-sync --once
//!
//! # Daemon: sync every [sync].interval_secs until Ctrl-C
//! pdv-sync --config ./sync.toml
//!
//! # JSON report for scripts
//! pdv-sync --once --json
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pdv_sync::{SyncAgent, SyncConfig, SyncReport};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Synchronizes the point-of-sale terminal with the backend.
#[derive(Parser)]
#[command(name = "pdv-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to sync.toml (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single sync and exit
    #[arg(long)]
    once: bool,

    /// Print the report as JSON (with --once)
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pdv=debug,sqlx=warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "pdv-sync failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = SyncConfig::load(cli.config)?;
    let mut agent = SyncAgent::open(config).await?;

    if cli.once {
        let report = agent.sync_now().await;
        print_report(&report, cli.json)?;
        return Ok(if report.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let scheduler = agent.start()?;
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received");
    };
    follow_reports(scheduler.subscribe(), ctrl_c).await;

    agent.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

/// Logs every finished run until `shutdown` resolves or the scheduler stops.
///
/// Returns how many reports were logged.
async fn follow_reports(
    mut reports: watch::Receiver<Option<SyncReport>>,
    shutdown: impl Future<Output = ()>,
) -> usize {
    tokio::pin!(shutdown);
    let mut logged = 0;

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(report) = reports.borrow_and_update().clone() {
                    info!(success = report.success, "Sync run finished\n{}", report.message);
                    logged += 1;
                }
            }
            _ = &mut shutdown => break,
        }
    }
    logged
}

fn print_report(report: &SyncReport, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.message);
        println!("{}", if report.success { "OK" } else { "FAILED" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn report(message: &str) -> Option<SyncReport> {
        Some(SyncReport {
            success: true,
            message: message.to_string(),
            phases: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_follow_reports_stops_on_shutdown_with_scheduler_alive() {
        let (report_tx, report_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let follower = tokio::spawn(follow_reports(report_rx, async move {
            let _ = stop_rx.await;
        }));

        report_tx.send_replace(report("first"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        report_tx.send_replace(report("second"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(()).unwrap();

        let logged = tokio::time::timeout(Duration::from_secs(5), follower)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logged, 2);
        // Sender still alive: the loop ended because of the shutdown future
        assert!(!report_tx.is_closed());
    }

    #[tokio::test]
    async fn test_follow_reports_stops_when_scheduler_goes_away() {
        let (report_tx, report_rx) = watch::channel(None);
        drop(report_tx);

        let logged = tokio::time::timeout(
            Duration::from_secs(5),
            follow_reports(report_rx, std::future::pending()),
        )
        .await
        .unwrap();
        assert_eq!(logged, 0);
    }
}
