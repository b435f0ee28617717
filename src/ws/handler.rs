//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::{ClientId, Role};
use crate::error::RelayError;

/// Query parameters accepted on `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// `admin` or `submitter` (default).
    #[serde(default)]
    pub role: Option<String>,
    /// Legacy admin switch: `?admin=true`.
    #[serde(default)]
    pub admin: Option<String>,
    /// Identifier issued on a previous connection.
    #[serde(default)]
    pub client_id: Option<String>,
}

impl ConnectParams {
    /// Resolves the requested role.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] for an unknown role name.
    pub fn role(&self) -> Result<Role, RelayError> {
        if let Some(raw) = &self.role {
            return raw.parse().map_err(RelayError::InvalidRequest);
        }
        let legacy_admin = self
            .admin
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        Ok(if legacy_admin { Role::Admin } else { Role::Submitter })
    }

    /// Resolves the presented client id, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when a client id is present
    /// but not a valid identifier.
    pub fn client_id(&self) -> Result<Option<ClientId>, RelayError> {
        self.client_id
            .as_deref()
            .map(|raw| {
                ClientId::parse(raw)
                    .ok_or_else(|| RelayError::InvalidRequest(format!("invalid client_id: {raw}")))
            })
            .transpose()
    }
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] (400) when the query names an
/// unknown role or an invalid client id.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Result<impl IntoResponse, RelayError> {
    let role = params.role()?;
    let client_id = params.client_id()?;
    let service = Arc::clone(&state.relay_service);

    Ok(ws.on_upgrade(move |socket| run_connection(socket, service, client_id, role)))
}
