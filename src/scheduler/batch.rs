use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use crate::error::{HarnessError, Result};
use crate::models::{ApiCall, CallRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    /// Admission pause after any call in the batch is rate limited.
    pub rate_limit_cooldown_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            rate_limit_cooldown_ms: 1_000,
        }
    }
}

/// Runs batches of calls through a [`Dispatcher`] with bounded concurrency.
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    rate_limit_cooldown: Duration,
    paused_until: Arc<Mutex<Option<Instant>>>,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &SchedulerConfig) -> Self {
        Self {
            dispatcher,
            rate_limit_cooldown: Duration::from_millis(config.rate_limit_cooldown_ms),
            paused_until: Arc::new(Mutex::new(None)),
        }
    }

    /// Dispatches every call with at most `max_concurrent` in flight.
    ///
    /// Records come back in the order of `calls`, whatever order they finish in.
    pub async fn run_batch(&self, calls: Vec<ApiCall>, max_concurrent: usize) -> Result<Vec<CallRecord>> {
        let total = calls.len();
        let max_concurrent = max_concurrent.max(1);
        info!(total, max_concurrent, "starting batch");

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut tasks = JoinSet::new();

        for (index, call) in calls.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| HarnessError::Task(e.to_string()))?;
            wait_for_gate(&self.paused_until).await;

            let dispatcher = self.dispatcher.clone();
            let paused_until = self.paused_until.clone();
            let cooldown = self.rate_limit_cooldown;
            tasks.spawn(async move {
                let record = dispatcher.dispatch(&call).await;
                if record.saw_rate_limit() {
                    pause_admissions(&paused_until, cooldown);
                }
                drop(permit);
                (index, record)
            });
        }

        let mut slots: Vec<Option<CallRecord>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, record) = joined.map_err(|e| HarnessError::Task(e.to_string()))?;
            slots[index] = Some(record);
        }

        info!(total, "batch finished");
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or_else(|| HarnessError::Task(format!("call {index} produced no record"))))
            .collect()
    }
}

fn pause_admissions(paused_until: &Mutex<Option<Instant>>, cooldown: Duration) {
    let until = Instant::now() + cooldown;
    let mut gate = paused_until.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if (*gate).is_none_or(|current| current < until) {
        warn!(?cooldown, "rate limited, pausing admission of new calls");
        *gate = Some(until);
    }
}

async fn wait_for_gate(paused_until: &Mutex<Option<Instant>>) {
    loop {
        let until = *paused_until.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match until {
            Some(until) if until > Instant::now() => tokio::time::sleep_until(until).await,
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::models::Outcome;
    use crate::retry::RetryPolicy;
    use crate::testing::{ScriptedTransport, Step, call};

    fn scheduler(transport: &Arc<ScriptedTransport>, cooldown_ms: u64) -> Scheduler {
        let dispatcher = Dispatcher::new(
            transport.clone(),
            RetryPolicy {
                max_attempts: 1,
                jitter_ratio: 0.0,
                ..RetryPolicy::default()
            },
            BreakerConfig::default(),
        );
        Scheduler::new(
            Arc::new(dispatcher),
            &SchedulerConfig {
                max_concurrent: 1,
                rate_limit_cooldown_ms: cooldown_ms,
            },
        )
    }

    fn staggered() -> ScriptedTransport {
        ScriptedTransport::new()
            .on("/c1", vec![Step::status(200).after_ms(300)])
            .on("/c2", vec![Step::status(201).after_ms(200)])
            .on("/c3", vec![Step::status(202).after_ms(10)])
    }

    fn batch() -> Vec<ApiCall> {
        vec![call("/c1", "a"), call("/c2", "a"), call("/c3", "a")]
    }

    fn paths(records: &[CallRecord]) -> Vec<&str> {
        records.iter().map(|r| r.endpoint.path.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn serial_batch_preserves_input_order() {
        let transport = Arc::new(staggered());
        let records = scheduler(&transport, 0).run_batch(batch(), 1).await.unwrap();

        assert_eq!(paths(&records), vec!["/c1", "/c2", "/c3"]);
        let statuses: Vec<_> = records.iter().map(CallRecord::final_status).collect();
        assert_eq!(statuses, vec![Some(200), Some(201), Some(202)]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_batch_preserves_input_order() {
        let transport = Arc::new(staggered());
        let records = scheduler(&transport, 0).run_batch(batch(), 3).await.unwrap();

        assert_eq!(transport.completion_order(), vec!["/c3", "/c2", "/c1"]);
        assert_eq!(paths(&records), vec!["/c1", "/c2", "/c3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let transport = Arc::new((0..8).fold(ScriptedTransport::new(), |t, i| {
            t.on(&format!("/n/{i}"), vec![Step::status(200).after_ms(100)])
        }));
        let calls = (0..8).map(|i| call(&format!("/n/{i}"), "n")).collect();
        let records = scheduler(&transport, 0).run_batch(calls, 2).await.unwrap();

        assert_eq!(records.len(), 8);
        assert_eq!(transport.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_pauses_admission() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("/limited", vec![Step::status(429)])
                .on("/next", vec![Step::status(200)]),
        );
        let started = Instant::now();
        let records = scheduler(&transport, 1_000)
            .run_batch(vec![call("/limited", "a"), call("/next", "a")], 1)
            .await
            .unwrap();

        assert_eq!(records[0].outcome, Outcome::ExhaustedRetries);
        assert_eq!(records[1].outcome, Outcome::Success);
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_empty() {
        let transport = Arc::new(ScriptedTransport::new());
        let records = scheduler(&transport, 0).run_batch(Vec::new(), 4).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(transport.calls(), 0);
    }
}
