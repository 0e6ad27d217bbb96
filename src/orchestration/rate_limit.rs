//! Per-user cool-down for reconciliation.
//!
//! At most one sync attempt per user inside the window. Attempts count
//! whether or not they succeed, so a failing partner cannot be hammered
//! through retries.

use crate::domain::UserId;
use crate::error::LedgerError;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// In-memory cool-down keyed by user.
#[derive(Debug)]
pub struct CooldownLimiter {
    window: Duration,
    last_attempt: RwLock<HashMap<UserId, Instant>>,
}

impl CooldownLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: RwLock::new(HashMap::new()),
        }
    }

    /// Record an attempt by `user` at `now`, or fail with `RateLimited`.
    ///
    /// # Errors
    /// `RateLimited { retry_after_secs }` when the previous attempt is inside
    /// the window. The rejected attempt does not extend the window.
    pub fn try_acquire(&self, user: &UserId, now: Instant) -> Result<(), LedgerError> {
        if self.window.is_zero() {
            return Ok(());
        }

        let mut state = self
            .last_attempt
            .write()
            .map_err(|_| LedgerError::StorageConflict("rate limiter lock poisoned".to_string()))?;

        if let Some(previous) = state.get(user) {
            let elapsed = now.saturating_duration_since(*previous);
            if elapsed < self.window {
                let remaining = self.window - elapsed;
                // Round up so a client waiting `retry_after_secs` is never early.
                let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                return Err(LedgerError::RateLimited { retry_after_secs });
            }
        }

        state.insert(user.clone(), now);
        if state.len() > 10_000 {
            let window = self.window;
            state.retain(|_, at| now.saturating_duration_since(*at) < window);
        }
        Ok(())
    }
}
