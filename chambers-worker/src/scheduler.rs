/// Reconciler scheduler
///
/// Drives the two reconciler passes on a fixed interval until shutdown.
/// The passes themselves are plain entry points in the `reconciler` module;
/// this loop is just the clock. It runs concurrently with live API traffic
/// against the same firm rows, which is safe because every counter write on
/// both sides goes through conditional updates.
///
/// # Example
///
/// ```no_run
/// use chambers_worker::scheduler::{ReconcilerScheduler, SchedulerConfig};
/// use sqlx::PgPool;
/// use std::sync::Arc;
/// use chambers_shared::notify::LogSender;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let scheduler = ReconcilerScheduler::new(pool, Arc::new(LogSender));
///
/// // Runs until the shutdown token is cancelled
/// scheduler.run().await?;
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::reconciler::{run_entitlement_pass, run_trial_alert_pass, ReconcilerConfig};
use chambers_shared::notify::NotificationSender;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between sweep runs
    pub sweep_interval_secs: u64,

    /// Pass tuning
    pub reconciler: ReconcilerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            sweep_interval_secs: 3600,
            reconciler: ReconcilerConfig::default(),
        }
    }
}

/// Timer loop invoking the reconciler passes
pub struct ReconcilerScheduler {
    pool: PgPool,
    notifier: Arc<dyn NotificationSender>,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
}

impl ReconcilerScheduler {
    /// Creates a scheduler with default configuration
    pub fn new(pool: PgPool, notifier: Arc<dyn NotificationSender>) -> Self {
        Self::with_config(pool, notifier, SchedulerConfig::default())
    }

    /// Creates a scheduler with custom configuration
    pub fn with_config(
        pool: PgPool,
        notifier: Arc<dyn NotificationSender>,
        config: SchedulerConfig,
    ) -> Self {
        ReconcilerScheduler {
            pool,
            notifier,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Gets the shutdown token
    ///
    /// Cancelling it stops the loop after the current sweep finishes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs one sweep: both passes, back to back
    pub async fn sweep(&self) {
        let now = chrono::Utc::now();

        match run_entitlement_pass(&self.pool, &self.config.reconciler, now).await {
            Ok(report) => {
                if report.firms_failed > 0 {
                    tracing::warn!(
                        firms_failed = report.firms_failed,
                        "Entitlement pass finished with per-firm failures"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Entitlement pass aborted");
            }
        }

        if let Err(e) =
            run_trial_alert_pass(&self.pool, self.notifier.as_ref(), &self.config.reconciler, now)
                .await
        {
            tracing::error!(error = %e, "Trial-alert pass aborted");
        }
    }

    /// Runs the scheduler loop until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            interval_secs = self.config.sweep_interval_secs,
            "Reconciler scheduler starting"
        );

        let mut ticker = interval(Duration::from_secs(self.config.sweep_interval_secs));
        // A sweep that overruns its slot should not cause a burst of
        // catch-up sweeps; the passes are idempotent but not free
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Reconciler scheduler shut down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sweep_interval_secs, 3600);
    }
}
