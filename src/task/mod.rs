//! Task completion polling
//!
//! Asynchronous operations answer with a `task_id`; the result is fetched by
//! polling `GET {base}/main/task_result/{task_id}` until it answers 200 with a
//! `result` field, or the attempt budget runs out. No sleep follows the last
//! attempt, so the worst-case wait is `(max_attempts - 1) * interval` plus
//! request time.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::auth::{CredentialError, CredentialProvider};
use crate::config::{ClientConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_SECS};
use crate::transport::{ApiRequest, ApiResponse, HttpMethod, Transport, TransportError};

/// Statuses that mean "not finished yet" under strict polling
pub const PENDING_STATUSES: [u16; 5] = [202, 429, 502, 503, 504];

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task {task_id} did not complete after {attempts} attempts")]
    TimedOut { task_id: String, attempts: u32 },

    #[error("Task {task_id} failed with status {status}: {body}")]
    Failed {
        task_id: String,
        status: u16,
        body: Value,
    },

    #[error("Transport error while polling: {0}")]
    Transport(#[from] TransportError),

    #[error("Credential error while polling: {0}")]
    Credential(#[from] CredentialError),
}

/// Attempt budget and pacing for one wait
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Distinguish pending statuses from hard failures
    pub strict: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            strict: true,
        }
    }
}

impl PollSettings {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_attempts, config.poll_interval()).with_strict(config.strict_polling)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Longest time a wait with these settings sleeps
    pub fn worst_case(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// What a single poll response means
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(Value),
    Pending,
    Failed { status: u16, body: Value },
}

/// Classify a task-result response (pure)
pub fn classify_response(response: ApiResponse, strict: bool) -> PollOutcome {
    let ApiResponse { status, body } = response;
    if status == 200 {
        return match body {
            Value::Object(mut fields) if fields.contains_key("result") => {
                PollOutcome::Ready(fields.remove("result").unwrap_or(Value::Null))
            }
            _ => PollOutcome::Pending,
        };
    }
    if !strict || PENDING_STATUSES.contains(&status) {
        PollOutcome::Pending
    } else {
        PollOutcome::Failed { status, body }
    }
}

/// Polls task results on behalf of the facade
#[derive(Clone)]
pub struct TaskPoller {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
}

impl TaskPoller {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn task_result_url(&self, task_id: &str) -> String {
        format!("{}/main/task_result/{}", self.base_url, task_id)
    }

    /// Poll until the task completes and return its `result` value.
    ///
    /// Attempts are strictly sequential and each one fetches a fresh token.
    /// No sleep follows the final attempt.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        settings: &PollSettings,
    ) -> Result<Value, TaskError> {
        let url = self.task_result_url(task_id);
        let mut attempts = 0;
        debug!(
            task_id,
            max_attempts = settings.max_attempts,
            worst_case = ?settings.worst_case(),
            "Waiting for task"
        );

        while attempts < settings.max_attempts {
            attempts += 1;
            let token = self.credentials.token().await?;
            trace!(task_id, attempt = attempts, "Polling task result");

            match self
                .transport
                .send(ApiRequest::new(HttpMethod::Get, &url, token))
                .await
            {
                Ok(response) => match classify_response(response, settings.strict) {
                    PollOutcome::Ready(result) => {
                        debug!(task_id, attempts, "Task completed");
                        return Ok(result);
                    }
                    PollOutcome::Pending => {}
                    PollOutcome::Failed { status, body } => {
                        return Err(TaskError::Failed {
                            task_id: task_id.to_string(),
                            status,
                            body,
                        });
                    }
                },
                Err(e) if !settings.strict => {
                    warn!(task_id, attempt = attempts, "Task poll failed, retrying: {}", e);
                }
                Err(e) => return Err(e.into()),
            }

            if attempts < settings.max_attempts {
                tokio::time::sleep(settings.interval).await;
            }
        }

        Err(TaskError::TimedOut {
            task_id: task_id.to_string(),
            attempts,
        })
    }
}
