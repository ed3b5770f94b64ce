mod new;
mod room;
mod ws;

use axum::{
    Router,
    http::{HeaderMap, header},
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    AppResult, AppState,
    appresult::AppError,
    hub::{Hub, Participant},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start-chat", post(new::start_chat))
        .route("/set-profile", post(new::set_profile))
        .route("/rooms", get(room::waiting_rooms))
        .route("/join-room", post(room::join_room))
        .route("/end-chat", post(room::end_chat))
        .route("/ws", get(ws::connect))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoomRequest {
    pub(crate) room_id: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves the bearer token to a registered participant.
pub(crate) fn authenticate(hub: &Hub, headers: &HeaderMap) -> AppResult<Participant> {
    let token = bearer_token(headers).ok_or_else(|| AppError::Unauthorized("token required".into()))?;
    hub.get_participant(token)
        .ok_or_else(|| AppError::Unauthorized("invalid token".into()))
}
