//! Review policies invoked right after a submission is persisted.
//!
//! A [`ReviewPolicy`] either decides a submission on the spot or defers it
//! to an administrator. Both outcomes feed the same decision delivery
//! path in [`crate::service::RelayService`].

use std::fmt::Debug;

use super::Decision;

/// Reason attached to submissions whose message is below the minimum length.
pub const REASON_TOO_SHORT: &str = "Message too short.";

/// Reason attached to submissions the content policy accepts.
pub const REASON_ACCEPTED: &str = "Message meets all requirements.";

/// Outcome of evaluating a submission payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Decide immediately.
    Decide {
        /// The decision to record.
        decision: Decision,
        /// Human-readable reason delivered with the decision.
        reason: String,
    },
    /// Leave the submission pending for an administrator.
    Deferred,
}

/// Synchronous hook evaluated once per submission, after persistence.
pub trait ReviewPolicy: Debug + Send + Sync {
    /// Evaluates a submission payload.
    fn evaluate(&self, payload: &serde_json::Value) -> Verdict;
}

/// Defers every submission to an administrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualReview;

impl ReviewPolicy for ManualReview {
    fn evaluate(&self, _payload: &serde_json::Value) -> Verdict {
        Verdict::Deferred
    }
}

/// Auto-decides submissions from the content of their `message` field.
///
/// Rules, in order: a trimmed message shorter than `min_len` characters is
/// denied; a message containing any blocked keyword (case-insensitive) is
/// denied; anything else is approved. Payloads without a string `message`
/// field are deferred.
#[derive(Debug, Clone)]
pub struct ContentPolicy {
    min_len: usize,
    blocked_keywords: Vec<String>,
}

impl ContentPolicy {
    /// Creates a content policy. Keywords are matched case-insensitively;
    /// blank keywords are ignored.
    #[must_use]
    pub fn new(min_len: usize, blocked_keywords: impl IntoIterator<Item = String>) -> Self {
        let blocked_keywords = blocked_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            min_len,
            blocked_keywords,
        }
    }
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self::new(10, ["spam".to_string()])
    }
}

impl ReviewPolicy for ContentPolicy {
    fn evaluate(&self, payload: &serde_json::Value) -> Verdict {
        let Some(message) = payload.get("message").and_then(serde_json::Value::as_str) else {
            return Verdict::Deferred;
        };
        let message = message.trim();

        if message.chars().count() < self.min_len {
            return Verdict::Decide {
                decision: Decision::Deny,
                reason: REASON_TOO_SHORT.to_string(),
            };
        }

        let lowered = message.to_lowercase();
        if let Some(keyword) = self
            .blocked_keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
        {
            return Verdict::Decide {
                decision: Decision::Deny,
                reason: format!("Message contains blocked keyword: {keyword}"),
            };
        }

        Verdict::Decide {
            decision: Decision::Approve,
            reason: REASON_ACCEPTED.to_string(),
        }
    }
}
