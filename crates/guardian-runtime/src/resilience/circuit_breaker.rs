//! Circuit breaker to prevent cascade failures.
//!
//! When a judge fails repeatedly, its circuit opens and subsequent calls
//! fail immediately, resolving to the mode's fallback verdict.

use guardian_core::{CircuitBreakerSettings, JudgeKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all calls bypass
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// Circuit breaker with one circuit per judge kind.
pub struct CircuitBreaker {
    states: RwLock<HashMap<JudgeKind, CircuitState>>,
    config: CircuitBreakerSettings,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerSettings) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls for `kind` should be skipped.
    ///
    /// An open circuit past its recovery timeout moves to half-open and lets
    /// calls through again.
    pub fn is_open(&self, kind: JudgeKind) -> bool {
        let states = self.states.read();
        match states.get(&kind) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(kind);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, kind: JudgeKind) {
        let mut states = self.states.write();
        match states.get(&kind).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(kind, CircuitState::Closed { failures: 0 });
                    tracing::info!(kind = %kind, "Circuit closed after successful recovery");
                } else {
                    states.insert(kind, CircuitState::HalfOpen {
                        successes: successes + 1,
                    });
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(kind, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, kind: JudgeKind) {
        let mut states = self.states.write();
        let failures = match states.get(&kind).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(kind, CircuitState::Open {
                    opened_at: Instant::now(),
                });
                tracing::warn!(kind = %kind, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(kind, CircuitState::Open {
                opened_at: Instant::now(),
            });
            tracing::warn!(kind = %kind, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(kind, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, kind: JudgeKind) {
        let mut states = self.states.write();
        if matches!(states.get(&kind), Some(CircuitState::Open { .. })) {
            states.insert(kind, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(kind = %kind, "Circuit half-open, allowing recovery test");
        }
    }

    /// Current state of a circuit.
    pub fn state(&self, kind: JudgeKind) -> CircuitState {
        self.states
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: u32, recovery_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerSettings {
            failure_threshold,
            recovery_timeout,
            success_threshold: 1,
        })
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(JudgeKind::Toxicity));
        assert_eq!(cb.state(JudgeKind::Toxicity), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = breaker(2, Duration::from_secs(30));
        cb.record_failure(JudgeKind::Tone);
        assert!(!cb.is_open(JudgeKind::Tone));
        cb.record_failure(JudgeKind::Tone);
        assert!(cb.is_open(JudgeKind::Tone));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::default();
        cb.record_failure(JudgeKind::Tone);
        cb.record_failure(JudgeKind::Tone);
        cb.record_success(JudgeKind::Tone);
        cb.record_failure(JudgeKind::Tone);
        cb.record_failure(JudgeKind::Tone);
        assert!(!cb.is_open(JudgeKind::Tone));
    }

    #[test]
    fn test_kinds_are_independent() {
        let cb = breaker(1, Duration::from_secs(30));
        cb.record_failure(JudgeKind::Hallucination);
        assert!(cb.is_open(JudgeKind::Hallucination));
        assert!(!cb.is_open(JudgeKind::Toxicity));
    }

    #[test]
    fn test_recovery_after_timeout() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure(JudgeKind::Toxicity);
        assert!(!cb.is_open(JudgeKind::Toxicity));
        assert_eq!(cb.state(JudgeKind::Toxicity), CircuitState::HalfOpen { successes: 0 });

        cb.record_success(JudgeKind::Toxicity);
        assert_eq!(cb.state(JudgeKind::Toxicity), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_failed_recovery_reopens() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure(JudgeKind::Tone);
        assert!(!cb.is_open(JudgeKind::Tone));
        cb.record_failure(JudgeKind::Tone);
        assert!(matches!(cb.state(JudgeKind::Tone), CircuitState::Open { .. }));
    }
}
