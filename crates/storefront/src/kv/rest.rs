//! Redis-compatible REST backend.
//!
//! Commands are posted as JSON arrays (`["SET", "key", "value"]`) to the
//! backend's root endpoint with a bearer token. Responses carry either a
//! `result` or an `error` field.

use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;

use crate::config::KvConfig;

use super::KvError;

/// REST client for an Upstash-style Redis endpoint.
#[derive(Clone)]
pub struct RestKv {
    client: reqwest::Client,
    base_url: String,
    token: secrecy::SecretString,
}

#[derive(Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RestKv {
    /// Build a client from KV credentials.
    #[must_use]
    pub fn new(config: &KvConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.rest_url.trim_end_matches('/').to_owned(),
            token: config.rest_token.clone(),
        }
    }

    /// Execute a single command and return its `result` payload.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Request`] on transport failure, [`KvError::Command`]
    /// when the backend rejects the command, and [`KvError::Response`] on an
    /// unrecognized response shape.
    pub(super) async fn command(&self, args: &[&str]) -> Result<Value, KvError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(self.token.expose_secret())
            .json(&args)
            .send()
            .await
            .map_err(|e| KvError::Request(e.to_string()))?;

        let status = response.status();
        let body: CommandResponse = response
            .json()
            .await
            .map_err(|e| KvError::Response(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(KvError::Command(error));
        }
        if !status.is_success() {
            return Err(KvError::Request(format!("KV backend returned {status}")));
        }
        body.result
            .ok_or_else(|| KvError::Response("missing result field".to_owned()))
    }

    /// Walk the SCAN cursor until exhaustion, collecting matching keys.
    pub(super) async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let mut keys = Vec::new();
        let mut cursor = "0".to_owned();
        loop {
            let result = self
                .command(&["SCAN", &cursor, "MATCH", pattern, "COUNT", "100"])
                .await?;
            // SCAN replies with [next_cursor, [keys...]]
            let Value::Array(parts) = result else {
                return Err(KvError::Response("SCAN did not return an array".to_owned()));
            };
            let mut parts = parts.into_iter();
            let next = match parts.next() {
                Some(Value::String(s)) => s,
                other => {
                    return Err(KvError::Response(format!(
                        "SCAN cursor was {other:?}"
                    )));
                }
            };
            if let Some(Value::Array(batch)) = parts.next() {
                for key in batch {
                    if let Value::String(key) = key {
                        keys.push(key);
                    }
                }
            }
            if next == "0" {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

impl std::fmt::Debug for RestKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestKv")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
