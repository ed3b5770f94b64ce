use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};

use crate::{AppResult, appresult::AppError, hub::Hub};

#[derive(Debug, Deserialize)]
pub(crate) struct StartChatRequest {
    name: String,
    content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartChatResponse {
    token: String,
    room_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetProfileRequest {
    name: String,
    language: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetProfileResponse {
    token: String,
}

/// Customer entry point: opens a waiting room seeded with the first message.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn start_chat(
    State(hub): State<Arc<Hub>>,
    Json(StartChatRequest { name, content }): Json<StartChatRequest>,
) -> AppResult<Json<StartChatResponse>> {
    let name = name.trim();
    if name.is_empty() || content.trim().is_empty() {
        return Err(AppError::BadRequest("name and content are required".into()));
    }

    let (token, room) = hub.create_room_for_customer(name, &content);
    Ok(Json(StartChatResponse {
        token,
        room_id: room.id,
    }))
}

/// Agent entry point.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_profile(
    State(hub): State<Arc<Hub>>,
    Json(SetProfileRequest { name, language }): Json<SetProfileRequest>,
) -> AppResult<Json<SetProfileResponse>> {
    let (name, language) = (name.trim(), language.trim());
    if name.is_empty() || language.is_empty() {
        return Err(AppError::BadRequest("name and language are required".into()));
    }

    let token = hub.create_participant(name, language);
    Ok(Json(SetProfileResponse { token }))
}
