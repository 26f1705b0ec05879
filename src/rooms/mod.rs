mod ws;

use axum::{debug_handler, extract::State, routing::get, Json, Router};

use crate::{hub::{HubHandle, RoomSummary}, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/ws", get(ws::connect))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_rooms(State(hub): State<HubHandle>) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(hub.rooms().await?))
}
