//! Redis-over-HTTPS cache backend (Upstash REST protocol)
//!
//! Commands are POSTed as a JSON array to the endpoint root with a bearer
//! token; the reply is `{"result": ...}` or `{"error": "..."}`. Each trait
//! operation runs as one Lua script so the server executes it atomically.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::traits::{Cache, PushOutcome};
use crate::constants::CACHE_REQUEST_TIMEOUT_SECS;
use crate::error::{GhostboxError, Result};

/// INCR, attaching the expiry only when the counter was just created
const INCR_WITH_EXPIRY_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// RPUSH unless full; -1 signals a full list. Expiry covers the whole key.
const PUSH_CAPPED_SCRIPT: &str = r#"
local len = redis.call('LLEN', KEYS[1])
if len >= tonumber(ARGV[2]) then
  return -1
end
len = redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return len
"#;

const TAKE_ALL_SCRIPT: &str = r#"
local items = redis.call('LRANGE', KEYS[1], 0, -1)
redis.call('DEL', KEYS[1])
return items
"#;

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Upstash REST client
pub struct UpstashCache {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl UpstashCache {
    pub fn new(url: String, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CACHE_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GhostboxError::Config(format!("Failed to build cache client: {}", e)))?;
        Ok(Self { client, url, token })
    }

    /// Execute one command and return its `result`
    async fn command(&self, args: Vec<String>) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let reply: Reply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(GhostboxError::Unavailable(format!(
                "cache command failed ({}): {}",
                status, error
            )));
        }
        if !status.is_success() {
            return Err(GhostboxError::Unavailable(format!(
                "cache returned status {}",
                status
            )));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    async fn eval(&self, script: &str, key: &str, args: &[String]) -> Result<Value> {
        let mut command = vec![
            "EVAL".to_string(),
            script.to_string(),
            "1".to_string(),
            key.to_string(),
        ];
        command.extend(args.iter().cloned());
        self.command(command).await
    }
}

/// Integer reply; Upstash may hand numbers back as strings
pub(crate) fn decode_integer(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| GhostboxError::Unavailable(format!("non-integer reply: {}", n))),
        Value::String(s) => s
            .parse()
            .map_err(|_| GhostboxError::Unavailable(format!("non-integer reply: {}", s))),
        other => Err(GhostboxError::Unavailable(format!(
            "unexpected reply: {}",
            other
        ))),
    }
}

pub(crate) fn decode_counter(value: &Value) -> Result<Option<u64>> {
    if value.is_null() {
        return Ok(None);
    }
    let n = decode_integer(value)?;
    u64::try_from(n)
        .map(Some)
        .map_err(|_| GhostboxError::Unavailable(format!("negative counter: {}", n)))
}

pub(crate) fn decode_push(value: &Value) -> Result<PushOutcome> {
    match decode_integer(value)? {
        n if n < 0 => Ok(PushOutcome::Full),
        n => Ok(PushOutcome::Queued(n as usize)),
    }
}

pub(crate) fn decode_list(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(GhostboxError::Unavailable(format!(
                    "unexpected list item: {}",
                    other
                ))),
            })
            .collect(),
        other => Err(GhostboxError::Unavailable(format!(
            "unexpected reply: {}",
            other
        ))),
    }
}

#[async_trait]
impl Cache for UpstashCache {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let reply = self
            .eval(
                INCR_WITH_EXPIRY_SCRIPT,
                key,
                &[ttl.as_secs().max(1).to_string()],
            )
            .await?;
        decode_counter(&reply)?
            .ok_or_else(|| GhostboxError::Unavailable("empty INCR reply".to_string()))
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let reply = self
            .command(vec!["INCR".to_string(), key.to_string()])
            .await?;
        decode_counter(&reply)?
            .ok_or_else(|| GhostboxError::Unavailable("empty INCR reply".to_string()))
    }

    async fn get_counter(&self, key: &str) -> Result<Option<u64>> {
        let reply = self
            .command(vec!["GET".to_string(), key.to_string()])
            .await?;
        decode_counter(&reply)
    }

    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<PushOutcome> {
        let reply = self
            .eval(
                PUSH_CAPPED_SCRIPT,
                key,
                &[
                    value.to_string(),
                    capacity.to_string(),
                    ttl.as_secs().max(1).to_string(),
                ],
            )
            .await?;
        decode_push(&reply)
    }

    async fn take_all(&self, key: &str) -> Result<Vec<String>> {
        let reply = self.eval(TAKE_ALL_SCRIPT, key, &[]).await?;
        decode_list(&reply)
    }

    async fn health_check(&self) -> Result<bool> {
        let reply = self.command(vec!["PING".to_string()]).await?;
        Ok(reply.as_str() == Some("PONG"))
    }
}
