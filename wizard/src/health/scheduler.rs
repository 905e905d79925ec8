//! Periodic health scans.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::scanner::{ClusterScanner, ScanError};

/// Runs a scan every `interval` until cancelled.
///
/// Scans that overrun the interval swallow the ticks they overlap; a tick that finds a scan
/// already running (for example one started over HTTP) is skipped.
#[derive(Clone)]
pub struct HealthScanScheduler {
    scanner: ClusterScanner,
    interval: Duration,
}

impl HealthScanScheduler {
    pub fn new(scanner: ClusterScanner, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = %humantime::format_duration(self.interval), "Starting health scan scheduler");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health scan scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health scan scheduler stopped during a scan");
                    return;
                }
                result = self.scanner.run_once() => match result {
                    Ok(_) => {}
                    Err(ScanError::AlreadyRunning) => debug!("Scheduled health scan skipped, one is already running"),
                    // Logged by the scanner; the next tick retries
                    Err(ScanError::Aborted(_)) => {}
                },
            }
        }
    }
}
