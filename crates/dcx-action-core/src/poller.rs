//! Result poller for the asynchronous AI analysis.
//!
//! Fixed-delay, bounded polling: wait, check, repeat up to `max_attempts`
//! times. Running out of attempts yields [`PollOutcome::TimedOut`], which is
//! inconclusive rather than an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::vars;
use crate::error::BootstrapError;
use crate::http::HttpTransport;
use crate::obs;
use crate::resolver::bearer;
use crate::Result;

/// Retry policy: attempt bound and constant delay before each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        PollPolicy {
            max_attempts,
            delay,
        }
    }

    /// Longest time the poller can spend waiting, request time excluded.
    pub fn worst_case_wait(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

/// Status reported by a single check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Succeeded(Value),
    Failed(String),
}

impl PollStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PollStatus::Pending => "pending",
            PollStatus::Succeeded(_) => "succeeded",
            PollStatus::Failed(_) => "failed",
        }
    }
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Succeeded { attempts: u32, payload: Value },
    Failed { attempts: u32, reason: String },
    TimedOut { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Succeeded { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::TimedOut { attempts } => *attempts,
        }
    }
}

/// One status check against the analysis backend.
#[async_trait]
pub trait StatusCheck: Send + Sync {
    /// `attempt` is 1-based.
    async fn check(&self, attempt: u32) -> Result<PollStatus>;
}

pub struct ResultPoller {
    policy: PollPolicy,
}

impl ResultPoller {
    pub fn new(policy: PollPolicy) -> Self {
        ResultPoller { policy }
    }

    /// Poll until a terminal status or the attempt bound.
    ///
    /// A failing check (transport error, bad payload) aborts polling.
    pub async fn poll(&self, check: &dyn StatusCheck) -> Result<PollOutcome> {
        let mut attempts = 0;
        while attempts < self.policy.max_attempts {
            tokio::time::sleep(self.policy.delay).await;
            attempts += 1;

            let status = check.check(attempts).await?;
            obs::emit_poll_attempt(attempts, self.policy.max_attempts, status.label());
            match status {
                PollStatus::Pending => continue,
                PollStatus::Succeeded(payload) => {
                    return Ok(PollOutcome::Succeeded { attempts, payload })
                }
                PollStatus::Failed(reason) => return Ok(PollOutcome::Failed { attempts, reason }),
            }
        }
        Ok(PollOutcome::TimedOut { attempts })
    }
}

/// Maps status strings in a JSON body onto [`PollStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVocabulary {
    pub status_field: String,
    pub pending: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Fields searched, in order, for a failure reason
    pub reason_fields: Vec<String>,
    /// Field holding the success payload; the whole body when absent
    pub result_field: String,
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        StatusVocabulary {
            status_field: "status".to_string(),
            pending: words(&["pending", "queued", "running", "in_progress", "processing"]),
            succeeded: words(&["completed", "complete", "succeeded", "success", "done"]),
            failed: words(&["failed", "failure", "error", "cancelled", "canceled"]),
            reason_fields: words(&["error", "reason", "message"]),
            result_field: "result".to_string(),
        }
    }
}

impl StatusVocabulary {
    /// Interpret one status body.
    ///
    /// Unknown status words count as pending; the attempt bound still applies.
    pub fn interpret(&self, body: &Value) -> Result<PollStatus> {
        let status = body
            .get(&self.status_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BootstrapError::BadStatus(format!("missing string field {:?}", self.status_field))
            })?
            .trim()
            .to_ascii_lowercase();

        let is = |list: &[String]| list.iter().any(|w| *w == status);
        if is(&self.succeeded) {
            let payload = body
                .get(&self.result_field)
                .cloned()
                .unwrap_or_else(|| body.clone());
            Ok(PollStatus::Succeeded(payload))
        } else if is(&self.failed) {
            let reason = self
                .reason_fields
                .iter()
                .find_map(|f| body.get(f).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| format!("analysis reported status {status:?}"));
            Ok(PollStatus::Failed(reason))
        } else {
            if !is(&self.pending) {
                warn!(status = %status, "Unrecognised analysis status, treating as pending");
            }
            Ok(PollStatus::Pending)
        }
    }
}

/// Status check over HTTP GET.
pub struct HttpStatusCheck<'a> {
    transport: &'a dyn HttpTransport,
    url: String,
    headers: Vec<(String, String)>,
    vocabulary: StatusVocabulary,
}

impl<'a> HttpStatusCheck<'a> {
    /// `scan_id`, when known, is sent as the `scan_id` query parameter.
    pub fn new(
        transport: &'a dyn HttpTransport,
        endpoint: &str,
        api_key: Option<&str>,
        scan_id: Option<&str>,
    ) -> Result<Self> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| BootstrapError::invalid(vars::AI_ENDPOINT, endpoint, e.to_string()))?;
        if let Some(id) = scan_id {
            url.query_pairs_mut().append_pair("scan_id", id);
        }

        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(key) = api_key {
            headers.push(bearer(key));
        }

        Ok(HttpStatusCheck {
            transport,
            url: url.into(),
            headers,
            vocabulary: StatusVocabulary::default(),
        })
    }

    pub fn with_vocabulary(mut self, vocabulary: StatusVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StatusCheck for HttpStatusCheck<'_> {
    async fn check(&self, attempt: u32) -> Result<PollStatus> {
        let response = self
            .transport
            .get(&self.url, &self.headers)
            .await?
            .error_for_status(&self.url)?;

        // 202 Accepted: the job exists but has nothing to report yet.
        if response.status == 202 {
            debug!(attempt, "Analysis accepted, not started");
            return Ok(PollStatus::Pending);
        }

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| BootstrapError::BadStatus(e.to_string()))?;
        self.vocabulary.interpret(&body)
    }
}
