//! Domain layer: client identity, submissions, sessions, and review policy.
//!
//! This module holds the server-side model: the [`SessionRegistry`] of
//! live connections, the [`Submission`] record and its decisions, and the
//! [`ReviewPolicy`] hook evaluated at intake.

pub mod client_id;
pub mod policy;
pub mod session;
pub mod session_registry;
pub mod submission;

pub use client_id::ClientId;
pub use policy::{ContentPolicy, ManualReview, ReviewPolicy, Verdict};
pub use session::{ClientSession, ConnectionId, DeliveryError, Outbound, Role, SessionHandle};
pub use session_registry::SessionRegistry;
pub use submission::{Decision, PendingDecision, Submission, SubmissionId, SubmissionStatus};
