//! In-process submission locks and the idempotency registry.
//!
//! Both tables are mutex-guarded maps whose critical sections never span an
//! `.await`. Locks are released when their [`LockGuard`] drops, or lazily once
//! their hold timeout has passed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::errors::QuoteError;

#[derive(Debug)]
struct LockEntry {
    token: Uuid,
    acquired_at: Instant,
    hold_timeout: Duration,
}

impl LockEntry {
    fn expires_at(&self) -> Instant {
        self.acquired_at + self.hold_timeout
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

#[derive(Debug, Default)]
struct LockTable {
    locks: Mutex<HashMap<String, LockEntry>>,
    released: Notify,
}

impl LockTable {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, LockEntry>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive, time-boxed, named locks.
#[derive(Debug, Clone, Default)]
pub struct SubmissionLocks {
    table: Arc<LockTable>,
}

impl SubmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free or its holder has expired; otherwise
    /// report how long until the current holder expires.
    fn try_take(&self, name: &str, hold_timeout: Duration) -> Result<LockGuard, Duration> {
        let now = Instant::now();
        let mut locks = self.table.entries();

        if let Some(existing) = locks.get(name) {
            if !existing.is_expired(now) {
                return Err(existing.expires_at() - now);
            }
            tracing::warn!(lock = %name, "Reclaiming expired submission lock");
        }

        let token = Uuid::new_v4();
        locks.insert(
            name.to_string(),
            LockEntry {
                token,
                acquired_at: now,
                hold_timeout,
            },
        );

        Ok(LockGuard {
            table: self.table.clone(),
            name: name.to_string(),
            token,
        })
    }

    /// Acquire without waiting.
    pub fn try_acquire(&self, name: &str, hold_timeout: Duration) -> Option<LockGuard> {
        self.try_take(name, hold_timeout).ok()
    }

    /// Acquire, waiting at most `wait` for the current holder to release or
    /// expire.
    pub async fn acquire(
        &self,
        name: &str,
        hold_timeout: Duration,
        wait: Duration,
    ) -> Result<LockGuard, QuoteError> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.table.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let holder_remaining = match self.try_take(name, hold_timeout) {
                Ok(guard) => return Ok(guard),
                Err(remaining) => remaining,
            };

            let now = Instant::now();
            if now >= deadline {
                metrics::counter!("submission_lock_contention_total").increment(1);
                tracing::debug!(lock = %name, "Lock acquisition timed out");
                return Err(QuoteError::LockContention {
                    lock_name: name.to_string(),
                });
            }

            let pause = holder_remaining.min(deadline - now);
            let _ = tokio::time::timeout(pause, notified).await;
        }
    }

    /// Whether `name` is held by an unexpired holder.
    pub fn is_locked(&self, name: &str) -> bool {
        let now = Instant::now();
        self.table
            .entries()
            .get(name)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Whether `name` has any entry, expired or not.
    pub fn contains(&self, name: &str) -> bool {
        self.table.entries().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries().is_empty()
    }

    /// Remove expired entries, returning how many were swept.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let swept = {
            let mut locks = self.table.entries();
            let before = locks.len();
            locks.retain(|_, entry| !entry.is_expired(now));
            before - locks.len()
        };
        if swept > 0 {
            self.table.released.notify_waiters();
        }
        swept
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    table: Arc<LockTable>,
    name: String,
    token: Uuid,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        {
            let mut locks = self.table.entries();
            // An expired lock may have been reclaimed by someone else.
            if locks.get(&self.name).is_some_and(|e| e.token == self.token) {
                locks.remove(&self.name);
            }
        }
        self.table.released.notify_waiters();
    }
}

/// Keys of submissions already processed (or being processed) by this process.
#[derive(Debug, Default)]
pub struct IdempotencyRegistry {
    marked: Mutex<HashSet<String>>,
}

impl IdempotencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check and mark `key`; false if it was already marked.
    pub fn try_mark(&self, key: &str) -> bool {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }

    pub fn unmark(&self, key: &str) {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn is_marked(&self, key: &str) -> bool {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
