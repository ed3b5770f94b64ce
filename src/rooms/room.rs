use std::sync::Arc;

use axum::{Json, debug_handler, extract::State, http::HeaderMap};

use crate::{
    AppResult,
    hub::{Hub, WaitingRoom},
    msg::ServerMessage,
};

use super::{RoomRequest, authenticate};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn waiting_rooms(State(hub): State<Arc<Hub>>) -> Json<Vec<WaitingRoom>> {
    Json(hub.list_waiting_rooms())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join_room(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Json(RoomRequest { room_id }): Json<RoomRequest>,
) -> AppResult<Json<ServerMessage>> {
    let agent = authenticate(&hub, &headers)?;
    let room = hub.join_room(&room_id, &agent.token)?;
    Ok(Json(ServerMessage::RoomJoined { room_id: room.id }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn end_chat(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Json(RoomRequest { room_id }): Json<RoomRequest>,
) -> AppResult<Json<ServerMessage>> {
    let caller = authenticate(&hub, &headers)?;
    let reason = hub.end_room(&caller.token, &room_id)?;
    Ok(Json(ServerMessage::ChatEnded { room_id, reason }))
}
