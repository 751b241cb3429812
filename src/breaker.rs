//! Per-category circuit breaker.
//!
//! ```text
//! Closed   -> Open      consecutive failures reach the threshold
//! Open     -> HalfOpen  cooldown elapsed; the next call becomes the single trial
//! HalfOpen -> Closed    trial succeeded
//! HalfOpen -> Open      trial failed or was dropped unresolved; cooldown restarts
//! ```
//!
//! Any success resets the failure counter, whatever the state. Results of
//! non-trial calls never move a circuit out of Open or HalfOpen.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct CategoryCircuit {
    consecutive_failures: u32,
    state: CircuitState,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CategoryCircuit {
    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.trial_in_flight = false;
    }
}

/// Permission to make one call, resolved with [`Admission::succeeded`] or
/// [`Admission::failed`].
///
/// Only the trial admission decides a HalfOpen circuit. A trial dropped
/// unresolved puts the circuit back to Open and restarts the cooldown.
#[must_use = "an unresolved trial reopens the circuit"]
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    category: String,
    trial: bool,
    resolved: bool,
}

impl Admission<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeeded(mut self) {
        self.resolved = true;
        self.breaker.record_success(&self.category, self.trial);
    }

    pub fn failed(mut self) {
        self.resolved = true;
        self.breaker.record_failure(&self.category, self.trial);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.trial && !self.resolved {
            self.breaker.abandon_trial(&self.category);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub consecutive_failures: u32,
    pub state: CircuitState,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    circuits: Mutex<HashMap<String, CategoryCircuit>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.config.cooldown_ms)
    }

    fn circuits(&self) -> MutexGuard<'_, HashMap<String, CategoryCircuit>> {
        // A panic cannot leave a circuit half-written.
        self.circuits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admission(&self, category: &str, trial: bool) -> Admission<'_> {
        Admission {
            breaker: self,
            category: category.to_string(),
            trial,
            resolved: false,
        }
    }

    /// Admits a call for `category` or rejects it with [`HarnessError::CircuitOpen`].
    pub fn admit(&self, category: &str) -> Result<Admission<'_>> {
        let mut circuits = self.circuits();
        let circuit = circuits.entry(category.to_string()).or_default();

        match circuit.state {
            CircuitState::Closed => Ok(self.admission(category, false)),
            CircuitState::Open => {
                let cooled = circuit
                    .opened_at
                    .is_none_or(|opened| opened.elapsed() >= self.cooldown());
                if cooled {
                    info!(category, "circuit half-open, admitting trial call");
                    circuit.state = CircuitState::HalfOpen;
                    circuit.trial_in_flight = true;
                    Ok(self.admission(category, true))
                } else {
                    Err(HarnessError::CircuitOpen(category.to_string()))
                }
            }
            CircuitState::HalfOpen if circuit.trial_in_flight => {
                Err(HarnessError::CircuitOpen(category.to_string()))
            }
            CircuitState::HalfOpen => {
                circuit.trial_in_flight = true;
                Ok(self.admission(category, true))
            }
        }
    }

    fn record_success(&self, category: &str, trial: bool) {
        let mut circuits = self.circuits();
        let circuit = circuits.entry(category.to_string()).or_default();

        circuit.consecutive_failures = 0;
        if trial && circuit.state == CircuitState::HalfOpen {
            info!(category, "trial call succeeded, circuit closed");
            circuit.state = CircuitState::Closed;
            circuit.opened_at = None;
            circuit.trial_in_flight = false;
        }
    }

    fn record_failure(&self, category: &str, trial: bool) {
        let mut circuits = self.circuits();
        let circuit = circuits.entry(category.to_string()).or_default();

        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
        match circuit.state {
            CircuitState::HalfOpen if trial => {
                warn!(category, "trial call failed, circuit reopened");
                circuit.open();
            }
            CircuitState::Closed if circuit.consecutive_failures >= self.config.failure_threshold => {
                warn!(
                    category,
                    failures = circuit.consecutive_failures,
                    "failure threshold reached, circuit opened"
                );
                circuit.open();
            }
            _ => {}
        }
    }

    fn abandon_trial(&self, category: &str) {
        let mut circuits = self.circuits();
        if let Some(circuit) = circuits.get_mut(category) {
            if circuit.state == CircuitState::HalfOpen {
                warn!(category, "trial call abandoned, circuit reopened");
                circuit.open();
            }
        }
    }

    pub fn state(&self, category: &str) -> CircuitState {
        self.snapshot(category).state
    }

    /// Categories never called report a fresh closed circuit.
    pub fn snapshot(&self, category: &str) -> CircuitSnapshot {
        let circuits = self.circuits();
        circuits
            .get(category)
            .map(|circuit| CircuitSnapshot {
                consecutive_failures: circuit.consecutive_failures,
                state: circuit.state,
            })
            .unwrap_or(CircuitSnapshot {
                consecutive_failures: 0,
                state: CircuitState::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown_ms: 1_000,
        })
    }

    fn fail(breaker: &CircuitBreaker, category: &str) {
        breaker.admit(category).unwrap().failed();
    }

    #[test]
    fn opens_at_threshold() {
        let breaker = breaker(3);
        for _ in 0..2 {
            fail(&breaker, "purge");
        }
        assert_eq!(breaker.state("purge"), CircuitState::Closed);

        fail(&breaker, "purge");
        assert_eq!(breaker.state("purge"), CircuitState::Open);
        assert!(matches!(breaker.admit("purge"), Err(HarnessError::CircuitOpen(c)) if c == "purge"));
    }

    #[test]
    fn categories_are_independent() {
        let breaker = breaker(1);
        fail(&breaker, "purge");
        assert_eq!(breaker.state("purge"), CircuitState::Open);
        assert!(breaker.admit("domains").is_ok());
        assert_eq!(breaker.state("domains"), CircuitState::Closed);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = breaker(3);
        fail(&breaker, "a");
        fail(&breaker, "a");
        breaker.admit("a").unwrap().succeeded();
        assert_eq!(breaker.snapshot("a").consecutive_failures, 0);

        fail(&breaker, "a");
        fail(&breaker, "a");
        assert_eq!(breaker.state("a"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_a_single_trial() {
        let breaker = breaker(1);
        fail(&breaker, "a");
        assert!(breaker.admit("a").is_err());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let trial = breaker.admit("a").unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state("a"), CircuitState::HalfOpen);
        assert!(breaker.admit("a").is_err(), "second caller must wait for the trial");

        trial.succeeded();
        assert_eq!(breaker.state("a"), CircuitState::Closed);
        assert!(!breaker.admit("a").unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_restarts_cooldown() {
        let breaker = breaker(1);
        fail(&breaker, "a");
        tokio::time::advance(Duration::from_millis(1_000)).await;
        fail(&breaker, "a");
        assert_eq!(breaker.state("a"), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(breaker.admit("a").is_err());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(breaker.admit("a").unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_reopens_and_restarts_cooldown() {
        let breaker = breaker(1);
        fail(&breaker, "a");
        tokio::time::advance(Duration::from_millis(1_000)).await;

        drop(breaker.admit("a").unwrap());
        assert_eq!(breaker.state("a"), CircuitState::Open);
        assert!(breaker.admit("a").is_err());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let trial = breaker.admit("a").unwrap();
        assert!(trial.is_trial());
        trial.succeeded();
        assert_eq!(breaker.state("a"), CircuitState::Closed);
    }

    #[test]
    fn dropped_regular_admission_changes_nothing() {
        let breaker = breaker(1);
        drop(breaker.admit("a").unwrap());
        let snapshot = breaker.snapshot("a");
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[test]
    fn late_success_while_open_resets_count_but_stays_open() {
        let breaker = breaker(1);
        let early = breaker.admit("a").unwrap();
        fail(&breaker, "a");

        early.succeeded();
        let snapshot = breaker.snapshot("a");
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_trial_decides_half_open() {
        let breaker = breaker(1);
        let early_ok = breaker.admit("a").unwrap();
        let early_err = breaker.admit("a").unwrap();
        fail(&breaker, "a");
        tokio::time::advance(Duration::from_millis(1_000)).await;
        let trial = breaker.admit("a").unwrap();

        early_ok.succeeded();
        assert_eq!(breaker.state("a"), CircuitState::HalfOpen);
        early_err.failed();
        assert_eq!(breaker.state("a"), CircuitState::HalfOpen);
        assert!(breaker.admit("a").is_err());

        trial.succeeded();
        assert_eq!(breaker.state("a"), CircuitState::Closed);
    }
}
