//! Plain request/response endpoints and the status page.
//!
//! These sit beside the sync protocol and only touch the store through
//! `list`, `upsert` and `clear`. Nothing here broadcasts.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::AppState;
use crate::anchor::{Anchor, UpsertOutcome};

pub const INVALID_ANCHOR_MESSAGE: &str =
    "Invalid input, please provide id, latitude, longitude, and altitude.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

pub async fn get_all_anchors(State(state): State<AppState>) -> Json<Vec<Anchor>> {
    Json(state.store.list())
}

pub async fn clear_all_anchors(State(state): State<AppState>) -> Json<MessageResponse> {
    state.store.clear();
    info!("all anchors cleared");
    MessageResponse::new("All anchors have been cleared.")
}

/// Add or move one anchor. The server stamps `lastUpdated`.
pub async fn set_anchor(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<MessageResponse>) {
    let Some(anchor) = body.ok().and_then(|Json(value)| parse_anchor(value)) else {
        return (
            StatusCode::BAD_REQUEST,
            MessageResponse::new(INVALID_ANCHOR_MESSAGE),
        );
    };

    let id = anchor.id.clone();
    let outcome = state
        .store
        .upsert([anchor])
        .pop()
        .unwrap_or(UpsertOutcome::Unchanged);
    info!(anchor = %id, outcome = outcome.as_str(), "anchor set over http");

    (StatusCode::OK, MessageResponse::new(set_anchor_message(&id, outcome)))
}

fn set_anchor_message(id: &str, outcome: UpsertOutcome) -> String {
    match outcome {
        UpsertOutcome::Unchanged => format!("Anchor with ID: {id} is already up to date."),
        changed => format!("Anchor with ID: {id} {} successfully.", changed.as_str()),
    }
}

fn parse_anchor(value: Value) -> Option<Anchor> {
    let id = value.get("id")?.as_str().filter(|id| !id.is_empty())?;
    let coordinate = |key: &str| value.get(key).and_then(Value::as_f64);
    Some(Anchor::new(
        id,
        coordinate("latitude")?,
        coordinate("longitude")?,
        coordinate("altitude")?,
    ))
}

pub async fn status_page(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.registry.snapshot();
    Html(format!(
        r#"<html>
    <head>
        <meta http-equiv="refresh" content="{refresh}">
    </head>
    <body style="background-color: #0c0c0e; font-family: Arial, sans-serif; text-align: center; padding-top: 50px;">
        <h2 style="color: #f2f2f2;">The Grid WebSocket server is running</h2>
        <p style="font-size: 20px; color: {color}; font-weight: bold;">
            Connection Status: {status}
        </p>
        <p style="font-size: 20px; color: #f2f2f2; font-weight: bold;">
            Connected Clients: {count}
        </p>
    </body>
</html>
"#,
        refresh = state.status_refresh.as_secs(),
        color = snapshot.status.color(),
        status = snapshot.status,
        count = snapshot.client_count,
    ))
}
