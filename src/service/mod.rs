//! Service layer: business logic orchestration.
//!
//! [`RelayService`] coordinates submission intake, decision delivery, and
//! admin fan-out over the [`crate::domain::SessionRegistry`] and the
//! [`crate::persistence::SubmissionStore`].

pub mod relay_service;

pub use relay_service::{Connected, DecisionDelivery, DeliverySettings, RelayService};
