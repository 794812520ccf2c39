//! Adaptive Concurrency Governor: a process-wide permit pool with
//! circuit-breaker semantics and linear recovery (§4.3).
//!
//! An `Arc<Mutex<_>>`-guarded poll loop rather than a `tokio::sync::Semaphore`,
//! since the ceiling must be recomputed (and can shrink) on every `acquire`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::time::sleep;

/// Tunables for the Governor, sourced from configuration (§6).
#[derive(Debug, Clone, Copy)]
pub struct GovernorConfig {
    pub max_concurrency: u32,
    pub min_concurrency: u32,
    pub error_threshold: u32,
    pub cooldown: Duration,
    pub recovery_rate: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            min_concurrency: 5,
            error_threshold: 2,
            cooldown: Duration::from_secs(600),
            recovery_rate: Duration::from_secs(60),
        }
    }
}

struct GovernorState {
    active: u32,
    is_safe_mode: bool,
    consecutive_errors: u32,
    last_error_time: Option<Instant>,
}

/// Process-wide permit pool. Constructed once at startup and shared via
/// `Arc` into every Run's worker pool (§9: no ambient globals).
pub struct Governor {
    config: GovernorConfig,
    state: Mutex<GovernorState>,
    notify: Notify,
}

/// RAII guard returned by [`Governor::acquire`]. Dropping it releases the
/// permit on every exit path, including panics unwinding through a worker
/// task (§4.3, §9).
pub struct GovernorPermit {
    governor: Arc<Governor>,
}

impl Drop for GovernorPermit {
    fn drop(&mut self) {
        self.governor.release();
    }
}

impl Governor {
    #[must_use]
    pub fn new(config: GovernorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(GovernorState {
                active: 0,
                is_safe_mode: false,
                consecutive_errors: 0,
                last_error_time: None,
            }),
            notify: Notify::new(),
        })
    }

    /// Compute the current permit ceiling (§4.3).
    ///
    /// Normal mode: `max`. Safe Mode within `cooldown`: `min`. Safe Mode past
    /// `cooldown`: `min + floor((elapsed - cooldown) / recovery_rate)`,
    /// capped at `max`. Reaching `max` exits Safe Mode and resets the
    /// consecutive-error counter.
    fn current_ceiling(&self, state: &mut GovernorState) -> u32 {
        if !state.is_safe_mode {
            return self.config.max_concurrency;
        }

        let Some(last_error) = state.last_error_time else {
            return self.config.max_concurrency;
        };

        let elapsed = last_error.elapsed();
        if elapsed < self.config.cooldown {
            return self.config.min_concurrency;
        }

        let recovery_elapsed = elapsed - self.config.cooldown;
        let recovered_slots = u32::try_from(recovery_elapsed.as_secs() / self.config.recovery_rate.as_secs().max(1)).unwrap_or(u32::MAX);
        let ceiling = self.config.min_concurrency.saturating_add(recovered_slots);

        if ceiling >= self.config.max_concurrency {
            state.is_safe_mode = false;
            state.consecutive_errors = 0;
            return self.config.max_concurrency;
        }
        ceiling
    }

    /// Current ceiling, for observability/tests. Does not mutate Safe Mode
    /// state as a side effect beyond what a real `acquire` would do.
    #[must_use]
    pub fn ceiling(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.current_ceiling(&mut state)
    }

    #[must_use]
    pub fn is_safe_mode(&self) -> bool {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_safe_mode
    }

    /// Block cooperatively until `active < ceiling`, then consume a permit.
    /// Not strictly FIFO: any waiter may be granted a freed permit (§4.3).
    pub async fn acquire(self: &Arc<Self>) -> GovernorPermit {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let ceiling = self.current_ceiling(&mut state);
                if state.active < ceiling {
                    state.active += 1;
                    return GovernorPermit { governor: Arc::clone(self) };
                }
            }
            // Wait for a release or a short timeout so a shrinking ceiling
            // (entering Safe Mode) is still re-evaluated promptly.
            tokio::select! {
                () = self.notify.notified() => {}
                () = sleep(Duration::from_millis(250)) => {}
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Report a provider-call failure. Crosses `error_threshold` consecutive
    /// reports enters Safe Mode and snapshots `last_error_time`.
    pub fn report_error(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.consecutive_errors += 1;
        if !state.is_safe_mode && state.consecutive_errors >= self.config.error_threshold {
            state.is_safe_mode = true;
            state.last_error_time = Some(Instant::now());
            tracing::warn!(
                min_concurrency = self.config.min_concurrency,
                cooldown_secs = self.config.cooldown.as_secs(),
                "governor entering safe mode after consecutive errors"
            );
        }
    }

    /// Reset the consecutive-error counter after a successful provider call.
    pub fn report_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.consecutive_errors = 0;
    }

    #[must_use]
    pub fn active(&self) -> u32 {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).active
    }
}


#[cfg(test)]
mod ceiling_properties {
    use super::*;
    use proptest::prelude::*;

    // §8-5: the computed ceiling is always within [min, max], in both
    // Normal and Safe Mode, for arbitrary config and arbitrary elapsed time
    // since the last reported error.
    proptest! {
        #[test]
        fn ceiling_is_always_between_min_and_max(
            min in 1u32..10,
            max_extra in 0u32..40,
            cooldown_secs in 0u64..3600,
            recovery_secs in 1u64..120,
            elapsed_secs in 0u64..7200,
            in_safe_mode in any::<bool>(),
        ) {
            let max = min + max_extra;
            let config = GovernorConfig {
                max_concurrency: max,
                min_concurrency: min,
                error_threshold: 2,
                cooldown: Duration::from_secs(cooldown_secs),
                recovery_rate: Duration::from_secs(recovery_secs),
            };
            let gov = Governor::new(config);
            {
                let mut state = gov.state.lock().unwrap();
                state.is_safe_mode = in_safe_mode;
                state.last_error_time = Some(Instant::now() - Duration::from_secs(elapsed_secs));
            }
            let ceiling = gov.ceiling();
            prop_assert!(ceiling >= min);
            prop_assert!(ceiling <= max);
        }
    }
}
