//! WebSocket layer: upgrade handling, per-connection loop, wire messages.
//!
//! The endpoint at `/ws` carries form submissions and admin decisions in,
//! and acknowledgments, decisions, and admin feed events out.

pub mod connection;
pub mod handler;
pub mod messages;
