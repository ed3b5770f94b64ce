use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::Serialize;

use crate::hub::Hub;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    clients: usize,
    rooms: usize,
}

#[debug_handler]
pub async fn index() -> &'static str {
    "Server is running"
}

#[debug_handler(state = crate::AppState)]
pub async fn health(State(hub): State<Arc<Hub>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        clients: hub.participant_count(),
        rooms: hub.room_count(),
    })
}
