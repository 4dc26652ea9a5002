//! Key-value backend for inventory counters, carts, and the product catalog.
//!
//! Two backends sit behind [`KvClient`]: a Redis-compatible REST backend
//! (Upstash-style, command arrays over HTTPS) used in deployment, and an
//! in-process store used when no KV credentials are configured and in tests.
//! Callers only see the typed helpers here; command plumbing stays in the
//! backend modules.

pub mod memory;
pub mod rest;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::KvConfig;

pub use memory::MemoryKv;
pub use rest::RestKv;

/// Errors from the KV layer.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Transport-level failure reaching the backend.
    #[error("KV request failed: {0}")]
    Request(String),

    /// The backend rejected a command.
    #[error("KV command error: {0}")]
    Command(String),

    /// The backend answered with a shape we don't understand.
    #[error("unexpected KV response: {0}")]
    Response(String),

    /// A stored value failed to serialize or deserialize.
    #[error("KV serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value client with a REST backend and an in-memory fallback.
#[derive(Clone)]
pub enum KvClient {
    /// Redis-compatible REST backend.
    Rest(RestKv),
    /// In-process store; data does not survive a restart.
    Memory(MemoryKv),
}

impl KvClient {
    /// Build a client from optional KV credentials, falling back to the
    /// in-memory store when none are configured.
    #[must_use]
    pub fn from_config(config: Option<&KvConfig>) -> Self {
        match config {
            Some(kv) => Self::Rest(RestKv::new(kv)),
            None => {
                tracing::warn!(
                    "KV_REST_API_URL not configured, using in-memory storage \
                     (data will not persist across restarts)"
                );
                Self::Memory(MemoryKv::new())
            }
        }
    }

    /// In-memory client for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::Memory(MemoryKv::new())
    }

    /// Fetch a raw string value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
        match self {
            Self::Rest(rest) => {
                let result = rest.command(&["GET", key]).await?;
                match result {
                    Value::Null => Ok(None),
                    Value::String(s) => Ok(Some(s)),
                    other => Err(KvError::Response(format!("GET returned {other}"))),
                }
            }
            Self::Memory(mem) => Ok(mem.get(key)),
        }
    }

    /// Store a raw string value, optionally with an expiry.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        match self {
            Self::Rest(rest) => {
                match ttl {
                    Some(ttl) => {
                        let secs = ttl.as_secs().to_string();
                        rest.command(&["SET", key, value, "EX", &secs]).await?;
                    }
                    None => {
                        rest.command(&["SET", key, value]).await?;
                    }
                }
                Ok(())
            }
            Self::Memory(mem) => {
                mem.set(key, value, ttl);
                Ok(())
            }
        }
    }

    /// Fetch and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure or if the stored value is not
    /// valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value, optionally with an expiry.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure or if `value` fails to serialize.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw, ttl).await
    }

    /// Fetch an integer counter value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure or a non-integer stored value.
    pub async fn get_i64(&self, key: &str) -> Result<Option<i64>, KvError> {
        match self.get_raw(key).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| KvError::Response(format!("non-integer value at {key}: {raw}"))),
            None => Ok(None),
        }
    }

    /// Fetch several integer counters in one round trip. Missing keys come
    /// back as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn mget_i64(&self, keys: &[&str]) -> Result<Vec<Option<i64>>, KvError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Rest(rest) => {
                let mut args = Vec::with_capacity(keys.len() + 1);
                args.push("MGET");
                args.extend_from_slice(keys);
                let result = rest.command(&args).await?;
                let Value::Array(values) = result else {
                    return Err(KvError::Response(format!("MGET returned {result}")));
                };
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::String(s) => s.parse::<i64>().map(Some).map_err(|_| {
                            KvError::Response(format!("non-integer value in MGET: {s}"))
                        }),
                        other => Err(KvError::Response(format!("MGET entry {other}"))),
                    })
                    .collect()
            }
            Self::Memory(mem) => keys
                .iter()
                .map(|key| match mem.get(key) {
                    Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
                        KvError::Response(format!("non-integer value at {key}: {raw}"))
                    }),
                    None => Ok(None),
                })
                .collect(),
        }
    }

    /// Atomically add `delta` to a counter, returning the new value. A
    /// missing key counts from zero.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        match self {
            Self::Rest(rest) => {
                let delta = delta.to_string();
                let result = rest.command(&["INCRBY", key, &delta]).await?;
                result
                    .as_i64()
                    .ok_or_else(|| KvError::Response(format!("INCRBY returned {result}")))
            }
            Self::Memory(mem) => mem.incr_by(key, delta),
        }
    }

    /// Atomically subtract `delta` from a counter, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn decr_by(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        match self {
            Self::Rest(rest) => {
                let delta = delta.to_string();
                let result = rest.command(&["DECRBY", key, &delta]).await?;
                result
                    .as_i64()
                    .ok_or_else(|| KvError::Response(format!("DECRBY returned {result}")))
            }
            Self::Memory(mem) => mem.incr_by(key, -delta),
        }
    }

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn del(&self, key: &str) -> Result<(), KvError> {
        match self {
            Self::Rest(rest) => {
                rest.command(&["DEL", key]).await?;
                Ok(())
            }
            Self::Memory(mem) => {
                mem.del(key);
                Ok(())
            }
        }
    }

    /// List keys matching a glob-style pattern (only trailing-`*` prefix
    /// patterns are used here).
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable or rejects the command.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        match self {
            Self::Rest(rest) => rest.scan(pattern).await,
            Self::Memory(mem) => Ok(mem.keys_matching(pattern)),
        }
    }
}
