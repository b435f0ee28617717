//! # form-relay
//!
//! WebSocket relay for form submissions with admin review.
//!
//! Submitters send forms over a persistent connection. Each submission is
//! stored, pushed to every connected administrator, optionally decided on
//! the spot by a [`domain::ReviewPolicy`], and the approve/deny decision is
//! routed back to the submitter. A decision for a submitter that is not
//! connected is held and delivered once, on reconnect.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket /ws, HTTP /api/v1)
//!     │
//!     ├── WS Handler (ws/)
//!     ├── REST Handlers (api/)
//!     │
//!     ├── RelayService (service/)
//!     │
//!     ├── SessionRegistry, ReviewPolicy (domain/)
//!     │
//!     └── SubmissionStore (persistence/): in-memory or PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
