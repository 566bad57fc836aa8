//! Removes expired submission locks, idle rate limiter buckets and elapsed
//! notification cooldowns.

use domain::services::{NotificationDispatcher, SubmissionLocks};
use std::sync::Arc;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::ClientRateLimiter;

pub struct LockSweepJob {
    locks: SubmissionLocks,
    rate_limiter: Option<Arc<ClientRateLimiter>>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl LockSweepJob {
    pub fn new(
        locks: SubmissionLocks,
        rate_limiter: Option<Arc<ClientRateLimiter>>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            locks,
            rate_limiter,
            dispatcher,
        }
    }
}

#[async_trait::async_trait]
impl Job for LockSweepJob {
    fn name(&self) -> &'static str {
        "lock_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(1)
    }

    async fn execute(&self) -> Result<(), String> {
        let swept = self.locks.sweep_expired();
        metrics::gauge!("submission_locks_held").set(self.locks.len() as f64);
        if swept > 0 {
            tracing::warn!(swept, "Swept submission locks past their hold timeout");
        }

        if let Some(limiter) = &self.rate_limiter {
            let clients = limiter.shrink();
            tracing::debug!(clients, "Rate limiter buckets retained");
        }

        let cooldowns = self.dispatcher.shrink_cooldowns();
        metrics::gauge!("notification_cooldown_keys").set(cooldowns as f64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{AuditConfig, NotificationConfig};
    use domain::services::AuditTrail;
    use std::time::Duration;

    fn dispatcher() -> Arc<NotificationDispatcher> {
        NotificationDispatcher::new(
            NotificationConfig::default(),
            Arc::new(AuditTrail::new(AuditConfig::default())),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_sweeps_expired_locks() {
        let locks = SubmissionLocks::new();
        let guard = locks.try_acquire("submission:k", Duration::from_millis(1));
        assert!(guard.is_some());
        std::mem::forget(guard);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let job = LockSweepJob::new(
            locks.clone(),
            ClientRateLimiter::new(10).map(Arc::new),
            dispatcher(),
        );
        job.execute().await.unwrap();

        assert!(locks.is_empty());
    }
}
