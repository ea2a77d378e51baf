//! Persisted record types.
//!
//! Field names are camelCase and timestamps are epoch milliseconds so the
//! files under a profile directory stay readable by the web client that
//! produces the same layout.
//!
//! # Example
//!
//! ```json
//! {
//!   "id": "01927f3c-5b7e-7cc4-9f53-2a1d3c4b5e6f",
//!   "createdAt": 1760781600000,
//!   "attempts": 2,
//!   "lastAttemptAt": 1760781720000,
//!   "payload": {
//!     "clientResultId": "6f1c0d8e-2b9f-4d7e-a1f0-5c3b2e9d8a47",
//!     "userId": 42,
//!     "activityId": "memory-match",
//!     "score": 18
//!   }
//! }
//! ```

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Local queue identifier. Never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Time-ordered id for a newly queued record.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The domain event delivered to the submission endpoint.
///
/// Only `clientResultId` is interpreted here; every other field (user,
/// activity, score, timing, answer trace) is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Idempotency token the server deduplicates on.
    #[serde(
        rename = "clientResultId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    client_result_id: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl ResultPayload {
    /// Wrap opaque result fields. No idempotency token is assigned yet.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            client_result_id: None,
            fields,
        }
    }

    /// Builder-style insertion of an opaque field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The idempotency token, if one has been assigned.
    ///
    /// An empty string counts as unassigned.
    pub fn client_result_id(&self) -> Option<&str> {
        self.client_result_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Assign an idempotency token unless a non-empty one is already present.
    ///
    /// Returns the token in effect. Calling this again never changes it.
    pub fn ensure_client_result_id(&mut self) -> &str {
        if self.client_result_id().is_none() {
            self.client_result_id = Some(Uuid::new_v4().to_string());
        }
        self.client_result_id.as_deref().unwrap_or_default()
    }

    /// Opaque fields other than `clientResultId`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// One attempted-but-unconfirmed submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResult {
    pub id: RecordId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub payload: ResultPayload,
}

impl PendingResult {
    /// Wrap a payload in a fresh record, assigning its idempotency token.
    pub fn new(mut payload: ResultPayload) -> Self {
        payload.ensure_client_result_id();
        Self {
            id: RecordId::generate(),
            created_at: Utc::now().trunc_subsecs(3),
            attempts: 0,
            last_attempt_at: None,
            payload,
        }
    }

    /// The record's idempotency token.
    pub fn client_result_id(&self) -> &str {
        self.payload.client_result_id().unwrap_or_default()
    }

    /// Whether the last attempt happened less than `cooldown` before `now`.
    ///
    /// A last attempt later than `now` (clock rollback, edited file) does
    /// not hold the record back.
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.last_attempt_at.is_some_and(|last| {
            let elapsed = now.signed_duration_since(last);
            elapsed >= Duration::zero() && elapsed < cooldown
        })
    }

    pub fn attempted_after(&self, now: DateTime<Utc>) -> bool {
        self.last_attempt_at.is_some_and(|last| last > now)
    }

    /// Attempt bookkeeping: called immediately before each delivery attempt.
    ///
    /// Timestamps keep millisecond precision, matching the persisted form.
    pub fn mark_attempt(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now.trunc_subsecs(3));
    }
}

/// Cached delivery summary consumed by the UI layer.
///
/// Not a source of truth: `pending_count` is recomputed from the live
/// queue every time it is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub is_syncing: bool,
    #[serde(default)]
    pub pending_count: usize,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A record dropped after reaching the retry ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictedResult {
    pub record: PendingResult,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub evicted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_client_result_id_is_stable() {
        let mut payload = ResultPayload::default().with_field("score", 7);
        assert!(payload.client_result_id().is_none());

        let first = payload.ensure_client_result_id().to_string();
        assert!(!first.is_empty());
        assert_eq!(payload.ensure_client_result_id(), first);
    }

    #[test]
    fn test_empty_client_result_id_is_replaced() {
        let mut payload: ResultPayload =
            serde_json::from_value(json!({"clientResultId": "", "score": 3})).unwrap();
        assert!(payload.client_result_id().is_none());
        assert!(!payload.ensure_client_result_id().is_empty());
    }

    #[test]
    fn test_existing_client_result_id_is_kept() {
        let mut payload: ResultPayload =
            serde_json::from_value(json!({"clientResultId": "abc", "score": 3})).unwrap();
        assert_eq!(payload.ensure_client_result_id(), "abc");
    }

    #[test]
    fn test_payload_fields_pass_through() {
        let raw = json!({
            "clientResultId": "r-1",
            "userId": 42,
            "answers": [{"q": 1, "a": "b"}]
        });
        let payload: ResultPayload = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(payload.fields().len(), 2);
        assert_eq!(serde_json::to_value(&payload).unwrap(), raw);
    }

    #[test]
    fn test_pending_result_layout() {
        let mut record = PendingResult::new(ResultPayload::default().with_field("score", 1));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["attempts"], 0);
        assert!(value.get("lastAttemptAt").is_none());
        assert!(value["createdAt"].is_i64());
        assert!(value["payload"]["clientResultId"].is_string());

        record.mark_attempt(Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["attempts"], 1);
        assert!(value["lastAttemptAt"].is_i64());
    }

    #[test]
    fn test_in_cooldown() {
        let now = Utc::now();
        let mut record = PendingResult::new(ResultPayload::default());
        assert!(!record.in_cooldown(now, Duration::seconds(60)));

        record.last_attempt_at = Some(now - Duration::seconds(10));
        assert!(record.in_cooldown(now, Duration::seconds(60)));
        assert!(!record.in_cooldown(now, Duration::seconds(5)));
        assert!(!record.in_cooldown(now, Duration::zero()));
    }

    #[test]
    fn test_future_last_attempt_is_not_in_cooldown() {
        let now = Utc::now();
        let mut record = PendingResult::new(ResultPayload::default());
        record.last_attempt_at = Some(now + Duration::minutes(5));

        assert!(record.attempted_after(now));
        assert!(!record.in_cooldown(now, Duration::seconds(60)));
    }

    #[test]
    fn test_sync_status_defaults_from_empty_object() {
        let status: SyncStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status, SyncStatus::default());
    }
}
