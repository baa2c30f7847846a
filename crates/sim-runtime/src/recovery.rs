//! Scheduled triggers: deadline sweep, stale-claim recovery and the job worker.

use crate::orchestrator::Orchestrator;
use crate::RuntimeError;
use chrono::{DateTime, Duration, Utc};
use persistence::{GameStore, JobStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// A `resolving` quarter claimed longer ago than this may be taken over.
    pub reclaim_after_seconds: u32,
    /// Failed attempts after which a resolution job is abandoned.
    pub max_job_attempts: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            reclaim_after_seconds: 600,
            max_job_attempts: 3,
        }
    }
}

/// Tally of one scheduled run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub resolved: usize,
    /// Lost the claim to another caller; not an error.
    pub conflicts: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record<T>(&mut self, outcome: &Result<T, RuntimeError>) {
        match outcome {
            Ok(_) => self.resolved += 1,
            Err(RuntimeError::Conflict(_)) => self.conflicts += 1,
            Err(_) => self.failed += 1,
        }
    }
}

impl<S: GameStore> Orchestrator<S> {
    /// Resolve every `active` quarter whose deadline has passed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, RuntimeError> {
        let mut report = SweepReport::default();
        for quarter in self.store().expired_quarters(now).await? {
            let outcome = self.resolve_quarter(quarter.id, now).await;
            if let Err(e) = &outcome {
                if !matches!(e, RuntimeError::Conflict(_)) {
                    warn!(quarter = %quarter.id, error = %e, "deadline resolution failed");
                }
            }
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Take over quarters stuck in `resolving` and resolve them again.
    pub async fn reclaim_stale(&self, now: DateTime<Utc>) -> Result<SweepReport, RuntimeError> {
        let cutoff = now - Duration::seconds(i64::from(self.recovery().reclaim_after_seconds));
        let mut report = SweepReport::default();
        for quarter in self.store().stale_claims(cutoff).await? {
            if !self.store().reclaim_quarter(quarter.id, cutoff, now).await? {
                report.conflicts += 1;
                continue;
            }
            warn!(quarter = %quarter.id, claimed_at = ?quarter.claimed_at, "reclaimed stale resolution");
            let outcome = self.resolve_claimed(&quarter, now).await;
            if let Err(e) = &outcome {
                warn!(quarter = %quarter.id, error = %e, "re-resolution failed");
            }
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Drain the resolution queue once.
    pub async fn run_pending_jobs(&self, now: DateTime<Utc>) -> Result<SweepReport, RuntimeError> {
        let mut report = SweepReport::default();
        for job in self.store().pending_jobs().await? {
            let outcome = self.resolve_quarter(job.quarter_id, now).await;
            match &outcome {
                Ok(_) | Err(RuntimeError::Conflict(_)) => {
                    // A job left pending is closed as a conflict on the next drain.
                    if let Err(e) = self.store().complete_job(job.id).await {
                        warn!(job = job.id.0, error = %e, "could not mark resolution job done");
                    }
                }
                Err(e) => {
                    let status = match self
                        .store()
                        .record_job_failure(job.id, &e.to_string(), self.recovery().max_job_attempts)
                        .await
                    {
                        Ok(status) => status,
                        Err(store_err) => {
                            warn!(job = job.id.0, error = %store_err, "could not record job failure");
                            JobStatus::Pending
                        }
                    };
                    warn!(
                        job = job.id.0,
                        quarter = %job.quarter_id,
                        attempt = job.attempts + 1,
                        error = %e,
                        "resolution job failed"
                    );
                    if status == JobStatus::Failed {
                        warn!(job = job.id.0, "resolution job abandoned");
                    }
                }
            }
            report.record(&outcome);
        }
        if report != SweepReport::default() {
            info!(?report, "resolution jobs processed");
        }
        Ok(report)
    }
}
