use chrono::{DateTime, NaiveDate, Utc};
use reserva_core::cache::{AtomicCache, CacheError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied keys represent an explicit retry contract and survive a
/// full day; derived keys only need to absorb accidental double-submits.
const SUPPLIED_KEY_TTL_HOURS: i64 = 24;
const DERIVED_KEY_TTL_MINUTES: i64 = 2;

#[derive(Debug, Clone)]
pub struct IdempotencyDescriptor {
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyDescriptor {
    /// A supplied key is used verbatim; otherwise the key is derived
    /// deterministically from the payload so that identical requests
    /// without a header still collide on the same record.
    pub fn build(
        user_id: &str,
        resource_id: &str,
        date: NaiveDate,
        supplied_key: Option<&str>,
    ) -> Self {
        if let Some(key) = supplied_key {
            return Self {
                key: key.to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(SUPPLIED_KEY_TTL_HOURS),
            };
        }

        let fingerprint = format!("{}|{}|{}", user_id, resource_id, date.format("%Y-%m-%d"));
        let digest = Sha256::digest(fingerprint.as_bytes());
        Self {
            key: format!("auto_{digest:x}"),
            expires_at: Utc::now() + chrono::Duration::minutes(DERIVED_KEY_TTL_MINUTES),
        }
    }

    /// Remaining lifetime, floored at one second.
    pub fn ttl(&self) -> Duration {
        let remaining = (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        remaining.max(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyClaim {
    /// A completed record exists; replay its status and body verbatim.
    Cached { status_code: u16, body: Value },
    /// This request created the record and must complete it.
    Owned,
    /// Another in-flight request owns the record.
    Contended,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdempotencyRecord {
    state: RecordState,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RecordState {
    InProgress,
    Completed,
}

/// Deduplicates logically-identical create requests through the shared
/// cache. At most one in-flight request owns a record at a time; the owner
/// transfers it to `completed`, or the record expires if the owner dies.
pub struct IdempotencyCoordinator {
    cache: Arc<dyn AtomicCache>,
}

impl IdempotencyCoordinator {
    pub fn new(cache: Arc<dyn AtomicCache>) -> Self {
        Self { cache }
    }

    fn cache_key(descriptor: &IdempotencyDescriptor) -> String {
        format!("idem:{}", descriptor.key)
    }

    pub async fn claim(
        &self,
        descriptor: &IdempotencyDescriptor,
    ) -> Result<IdempotencyClaim, CacheError> {
        let key = Self::cache_key(descriptor);

        if let Some(raw) = self.cache.get(&key).await? {
            if let Some(cached) = Self::completed(&raw) {
                return Ok(cached);
            }
            // An in_progress record may have completed between reads.
            return self.reread(&key).await;
        }

        let in_progress = IdempotencyRecord {
            state: RecordState::InProgress,
            status_code: None,
            response: None,
        };
        let raw = serde_json::to_string(&in_progress)
            .map_err(|e| CacheError(e.to_string()))?;
        if self
            .cache
            .set_if_absent(&key, &raw, descriptor.ttl())
            .await?
        {
            return Ok(IdempotencyClaim::Owned);
        }

        // Lost the race to create the record; it may already be completed.
        self.reread(&key).await
    }

    /// Overwrites the record with the final outcome and a fresh TTL. Runs
    /// on failure paths too, so duplicate callers replay the stored error
    /// instead of retrying a dead operation.
    pub async fn complete(
        &self,
        descriptor: &IdempotencyDescriptor,
        status_code: u16,
        body: &Value,
    ) -> Result<(), CacheError> {
        let record = IdempotencyRecord {
            state: RecordState::Completed,
            status_code: Some(status_code),
            response: Some(body.clone()),
        };
        let raw = serde_json::to_string(&record).map_err(|e| CacheError(e.to_string()))?;
        self.cache
            .put(&Self::cache_key(descriptor), &raw, descriptor.ttl())
            .await
    }

    async fn reread(&self, key: &str) -> Result<IdempotencyClaim, CacheError> {
        if let Some(raw) = self.cache.get(key).await? {
            if let Some(cached) = Self::completed(&raw) {
                return Ok(cached);
            }
        }
        Ok(IdempotencyClaim::Contended)
    }

    fn completed(raw: &str) -> Option<IdempotencyClaim> {
        let record: IdempotencyRecord = serde_json::from_str(raw).ok()?;
        if record.state != RecordState::Completed {
            return None;
        }
        Some(IdempotencyClaim::Cached {
            status_code: record.status_code.unwrap_or(200),
            body: record.response.unwrap_or(Value::Null),
        })
    }
}
