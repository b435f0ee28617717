//! Request and response DTOs for the REST API.

pub mod submission_dto;

pub use submission_dto::*;
