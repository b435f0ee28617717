//! WebSocket message types.
//!
//! Every message is one JSON document shaped as a discriminated envelope:
//! `{"kind": "<kind>", "payload": {...}}`. Inbound messages additionally
//! accept the older `{"action": "approve", "submissionId": 7}` and bare
//! form-object shapes; see [`ClientMessage::parse`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    ClientId, Decision, PendingDecision, Role, Submission, SubmissionId, SubmissionStatus,
};
use crate::error::RelayError;

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection: the identity to present on
    /// reconnect.
    Session {
        /// Client id bound to this connection.
        client_id: ClientId,
        /// Role bound to this connection.
        role: Role,
    },
    /// A submission was stored.
    Acknowledge {
        /// Assigned submission id.
        submission_id: SubmissionId,
        /// Human-readable confirmation.
        message: String,
    },
    /// A decision on one of the client's submissions.
    Decision {
        /// Decided submission.
        submission_id: SubmissionId,
        /// New status.
        status: SubmissionStatus,
        /// Reason attached to the decision.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// Human-readable summary.
        message: String,
    },
    /// Admin feed: a new submission arrived.
    NewSubmission {
        /// Assigned submission id.
        submission_id: SubmissionId,
        /// Submitting client.
        client_id: ClientId,
        /// Submitted form data.
        data: Value,
        /// Intake timestamp.
        submitted_at: DateTime<Utc>,
    },
    /// Admin feed: a submission was decided.
    SubmissionDecided {
        /// Decided submission.
        submission_id: SubmissionId,
        /// New status.
        status: SubmissionStatus,
        /// Reason attached to the decision.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Admin feed: submissions still awaiting a decision, sent on connect.
    InitialSubmissions {
        /// Pending submissions, oldest first.
        submissions: Vec<Submission>,
    },
    /// A request from this connection failed.
    Error {
        /// Numeric error code (see [`RelayError::error_code`]).
        code: u32,
        /// Human-readable error message.
        message: String,
    },
    /// Reply to `ping`.
    Pong,
}

impl ServerMessage {
    /// Builds the decision message for a decided submission.
    #[must_use]
    pub fn decision(submission_id: SubmissionId, decision: Decision, reason: Option<String>) -> Self {
        let status = decision.status();
        Self::Decision {
            submission_id,
            status,
            reason,
            message: format!("Your form has been {status}!"),
        }
    }

    /// Builds the decision message for a held decision.
    #[must_use]
    pub fn from_pending(pending: &PendingDecision) -> Self {
        Self::decision(pending.submission_id, pending.decision, pending.reason.clone())
    }

    /// Builds the admin feed message announcing `submission`.
    #[must_use]
    pub fn new_submission(submission: &Submission) -> Self {
        Self::NewSubmission {
            submission_id: submission.id,
            client_id: submission.client_id.clone(),
            data: submission.payload.clone(),
            submitted_at: submission.submitted_at,
        }
    }

    /// Builds the error reply for `err`.
    #[must_use]
    pub fn error(err: &RelayError) -> Self {
        Self::Error {
            code: err.error_code(),
            message: err.to_string(),
        }
    }

    /// Returns the `kind` discriminator as a static string slice.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::Acknowledge { .. } => "acknowledge",
            Self::Decision { .. } => "decision",
            Self::NewSubmission { .. } => "new_submission",
            Self::SubmissionDecided { .. } => "submission_decided",
            Self::InitialSubmissions { .. } => "initial_submissions",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }
}

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit a form; the payload is the form object itself.
    Submit(Value),
    /// Approve or deny a submission (admin only).
    AdminDecision(DecisionCommand),
    /// Liveness probe.
    Ping,
}

/// Body of an admin decision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecisionCommand {
    /// Submission to decide.
    pub submission_id: SubmissionId,
    /// The decision.
    pub decision: Decision,
    /// Optional reason delivered to the submitter.
    #[serde(default)]
    pub reason: Option<String>,
    /// Expected owner of the submission, if the admin names one.
    #[serde(default)]
    pub client_id: Option<ClientId>,
}

impl ClientMessage {
    /// Parses one inbound text frame.
    ///
    /// Accepted shapes, in order:
    /// - `{"kind": ..., "payload": ...}` envelopes;
    /// - `{"action": "approve" | "deny", "submissionId": ..}` decisions;
    /// - `{"type": "submit" | "admin_decision" | "ping", ..}` messages;
    /// - any other JSON object, taken as a raw form submission.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedMessage`] when the frame is not a
    /// JSON object or a recognised shape lacks required fields.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedMessage(format!("invalid JSON: {e}")))?;
        let Some(obj) = value.as_object() else {
            return Err(RelayError::MalformedMessage(
                "expected a JSON object".to_string(),
            ));
        };

        if obj.contains_key("kind") {
            return serde_json::from_value(value)
                .map_err(|e| RelayError::MalformedMessage(e.to_string()));
        }

        if let Some(action) = obj.get("action").and_then(Value::as_str) {
            return legacy_decision(obj, action);
        }

        if let Some(kind) = obj.get("type").and_then(Value::as_str) {
            return match kind {
                "submit" => {
                    let data = obj
                        .get("data")
                        .or_else(|| obj.get("payload"))
                        .cloned()
                        .unwrap_or_else(|| {
                            let mut rest = obj.clone();
                            rest.remove("type");
                            Value::Object(rest)
                        });
                    Ok(Self::Submit(data))
                }
                "admin_decision" | "decision" => {
                    let verb = obj
                        .get("decision")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            RelayError::MalformedMessage("missing field `decision`".to_string())
                        })?;
                    legacy_decision(obj, verb)
                }
                "ping" => Ok(Self::Ping),
                other => Err(RelayError::MalformedMessage(format!(
                    "unknown message type: {other}"
                ))),
            };
        }

        Ok(Self::Submit(value))
    }
}

fn legacy_decision(obj: &Map<String, Value>, verb: &str) -> Result<ClientMessage, RelayError> {
    let decision: Decision = verb.parse().map_err(RelayError::MalformedMessage)?;
    let submission_id = obj
        .get("submissionId")
        .or_else(|| obj.get("submission_id"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .map(SubmissionId::new)
        .ok_or_else(|| RelayError::MalformedMessage("missing or invalid submissionId".to_string()))?;
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    let client_id = obj
        .get("clientId")
        .or_else(|| obj.get("client_id"))
        .and_then(Value::as_str)
        .and_then(ClientId::parse);

    Ok(ClientMessage::AdminDecision(DecisionCommand {
        submission_id,
        decision,
        reason,
        client_id,
    }))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decision_with_blank_client_id_is_malformed() {
        let result = ClientMessage::parse(
            r#"{"kind":"admin_decision","payload":{"submission_id":1,"decision":"approve","client_id":"  "}}"#,
        );
        assert!(matches!(result, Err(RelayError::MalformedMessage(_))));
    }

    #[test]
    fn decision_client_id_is_trimmed() {
        let Ok(ClientMessage::AdminDecision(cmd)) = ClientMessage::parse(
            r#"{"kind":"admin_decision","payload":{"submission_id":1,"decision":"deny","client_id":" abc "}}"#,
        ) else {
            panic!("decision should parse");
        };
        assert_eq!(cmd.client_id.as_ref().map(ClientId::as_str), Some("abc"));
    }

    #[test]
    fn parses_envelope_submit() {
        let Ok(msg) = ClientMessage::parse(r#"{"kind":"submit","payload":{"name":"A"}}"#) else {
            panic!("envelope should parse");
        };
        assert_eq!(msg, ClientMessage::Submit(json!({"name": "A"})));
    }

    #[test]
    fn parses_envelope_decision() {
        let text = r#"{"kind":"admin_decision","payload":{"submission_id":7,"decision":"approve"}}"#;
        let Ok(ClientMessage::AdminDecision(cmd)) = ClientMessage::parse(text) else {
            panic!("decision should parse");
        };
        assert_eq!(cmd.submission_id, SubmissionId::new(7));
        assert_eq!(cmd.decision, Decision::Approve);
        assert!(cmd.reason.is_none());
        assert!(cmd.client_id.is_none());
    }

    #[test]
    fn parses_envelope_ping_without_payload() {
        assert_eq!(ClientMessage::parse(r#"{"kind":"ping"}"#).ok(), Some(ClientMessage::Ping));
    }

    #[test]
    fn parses_legacy_action_decision() {
        let text = r#"{"action":"deny","submissionId":"12","reason":"nope","clientId":"X"}"#;
        let Ok(ClientMessage::AdminDecision(cmd)) = ClientMessage::parse(text) else {
            panic!("legacy decision should parse");
        };
        assert_eq!(cmd.submission_id, SubmissionId::new(12));
        assert_eq!(cmd.decision, Decision::Deny);
        assert_eq!(cmd.reason.as_deref(), Some("nope"));
        assert_eq!(cmd.client_id.as_ref().map(ClientId::as_str), Some("X"));
    }

    #[test]
    fn bare_object_is_a_submission() {
        let text = r#"{"name":"A","email":"a@x.com","message":"hello there"}"#;
        let Ok(ClientMessage::Submit(data)) = ClientMessage::parse(text) else {
            panic!("bare object should be a submission");
        };
        assert_eq!(data["email"], "a@x.com");
    }

    #[test]
    fn typed_submit_strips_discriminator() {
        let Ok(ClientMessage::Submit(data)) =
            ClientMessage::parse(r#"{"type":"submit","message":"hi"}"#)
        else {
            panic!("typed submit should parse");
        };
        assert_eq!(data, json!({"message": "hi"}));
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        for text in ["not json", "[1,2]", "42", r#"{"kind":"launch"}"#, r#"{"type":"launch"}"#] {
            let Err(err) = ClientMessage::parse(text) else {
                panic!("{text} should be rejected");
            };
            assert_eq!(err.error_code(), 1001);
        }
    }

    #[test]
    fn legacy_decision_requires_submission_id() {
        assert!(ClientMessage::parse(r#"{"action":"approve"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"action":"maybe","submissionId":1}"#).is_err());
    }

    #[test]
    fn server_messages_use_kind_payload_envelope() {
        let msg = ServerMessage::decision(SubmissionId::new(7), Decision::Approve, None);
        let value = serde_json::to_value(&msg).unwrap_or_default();
        assert_eq!(value["kind"], "decision");
        assert_eq!(value["payload"]["status"], "approved");
        assert_eq!(value["payload"]["submission_id"], 7);
        assert_eq!(value["payload"]["message"], "Your form has been approved!");
        assert_eq!(msg.kind_str(), "decision");
    }

    #[test]
    fn pong_serializes_without_payload() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap_or_default();
        assert_eq!(json, r#"{"kind":"pong"}"#);
    }
}
