use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Opens after `failure_threshold` consecutive failures and stays open for
/// `cooldown`, after which a single trial call is allowed through; success
/// closes the breaker, failure re-opens it for another full cooldown.
pub struct CircuitBreaker {
    state: Mutex<State>,
    failure_threshold: u32,
    cooldown: Duration,
}

struct State {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            cooldown,
        }
    }

    pub async fn admit(&self) -> Admission {
        let mut state = self.state.lock().await;
        match state.opened_at {
            None => Admission::Allowed,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.cooldown {
                    // allow a single trial call through; stay "open" until
                    // record_success/record_failure resolves it.
                    state.opened_at = None;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            state.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            assert_eq!(breaker.admit().await, Admission::Allowed);
            breaker.record_failure().await;
        }
        assert_eq!(breaker.admit().await, Admission::Allowed);
        breaker.record_failure().await;
        assert_eq!(breaker.admit().await, Admission::Rejected);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert_eq!(breaker.admit().await, Admission::Allowed);
    }
}
