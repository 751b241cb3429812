//! Scripted transport used by the unit tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::client::Transport;
use crate::error::{HarnessError, Result};
use crate::models::{ApiCall, ApiResponse, EndpointDescriptor, Method};

#[derive(Debug, Clone)]
enum Reply {
    Status(u16, BTreeMap<String, String>),
    Network,
    Protocol,
}

#[derive(Debug, Clone)]
pub struct Step {
    reply: Reply,
    delay: Duration,
}

impl Step {
    pub fn status(status: u16) -> Self {
        Self {
            reply: Reply::Status(status, BTreeMap::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn network() -> Self {
        Self {
            reply: Reply::Network,
            delay: Duration::ZERO,
        }
    }

    pub fn protocol() -> Self {
        Self {
            reply: Reply::Protocol,
            delay: Duration::ZERO,
        }
    }

    pub fn after_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Reply::Status(_, headers) = &mut self.reply {
            headers.insert(name.to_ascii_lowercase(), value.to_string());
        }
        self
    }
}

/// Replies per path from a queue; the last step of a queue repeats. Unknown paths get 200.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, path: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), steps.into_iter().collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Paths in the order their replies were produced.
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    fn next_step(&self, path: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Step::status(200)),
            None => Step::status(200),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, call: &ApiCall) -> Result<ApiResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let step = self.next_step(&call.endpoint.path);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(call.endpoint.path.clone());

        match step.reply {
            Reply::Status(status, headers) => Ok(ApiResponse {
                status,
                headers,
                body: if status < 400 {
                    json!({"data": {"path": call.endpoint.path}})
                } else {
                    Value::Null
                },
                duration_ms: step.delay.as_millis() as u64,
            }),
            Reply::Network => Err(HarnessError::Network("connection refused".into())),
            Reply::Protocol => Err(HarnessError::Protocol("invalid JSON".into())),
        }
    }
}

pub fn call(path: &str, category: &str) -> ApiCall {
    ApiCall::new(EndpointDescriptor::new(Method::Get, path, category))
}
