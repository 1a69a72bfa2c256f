//! Background sweep that expires stale challenge tokens.
//!
//! One long-lived task on an hourly cadence; both sweeps are idempotent,
//! so an overlapping retry after a missed tick is harmless. The watch
//! channel stops the task during shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::services::{EmailVerificationService, PasswordResetService};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub fn spawn(
    verification: Arc<EmailVerificationService>,
    reset: Arc<PasswordResetService>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_sweep(&verification, &reset).await;
                }
                _ = shutdown.changed() => {
                    info!("Cleanup task stopping");
                    break;
                }
            }
        }
    })
}

async fn run_sweep(verification: &EmailVerificationService, reset: &PasswordResetService) {
    match verification.cleanup_expired().await {
        Ok(cleared) if cleared > 0 => {
            info!(cleared, "Expired verification tokens cleared");
        }
        Ok(_) => debug!("No expired verification tokens"),
        Err(e) => warn!("Verification token sweep failed: {e}"),
    }

    match reset.cleanup_expired().await {
        Ok(cleared) if cleared > 0 => {
            info!(cleared, "Expired password reset tokens cleared");
        }
        Ok(_) => debug!("No expired password reset tokens"),
        Err(e) => warn!("Password reset token sweep failed: {e}"),
    }
}
