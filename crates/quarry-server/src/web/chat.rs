// crates/quarry-server/src/web/chat.rs
// Chat endpoint: one SSE event per stream event

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use quarry_types::{ChatRequest, StreamEvent};
use std::convert::Infallible;
use tracing::{info, warn};

use crate::web::state::AppState;

/// SSE frame for an event: `event:` is the kind, `data:` the JSON payload
pub fn to_sse(event: &StreamEvent) -> Event {
    let data = match serde_json::to_value(event) {
        Ok(mut value) => value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null),
        Err(e) => {
            warn!(error = %e, "Failed to serialize event");
            serde_json::Value::Null
        }
    };
    Event::default().event(event.kind()).data(data.to_string())
}

/// POST /chat
pub async fn chat_stream(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if let Err(reason) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": reason })),
        )
            .into_response();
    }

    info!(pro = request.pro_search, "Chat request");

    let events = state.orchestrator.clone().stream(request);
    let stream = events.map(|event| Ok::<_, Infallible>(to_sse(&event)));

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
