use axum::{debug_handler, extract::{Query, State, WebSocketUpgrade}, response::{IntoResponse, Response}};
use serde::Deserialize;
use tracing::info;

use crate::{auth::AuthUser, config::WsConfig, connection, hub::{HubHandle, Subscription}, AppResult, AppState};

#[derive(Deserialize)]
pub(crate) struct ConnectQuery {
    #[serde(rename = "roomName")]
    room_name: Option<String>,
    #[serde(rename = "recvUserName")]
    recv_user_name: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn connect(
    AuthUser(user): AuthUser,
    State(hub): State<HubHandle>,
    State(config): State<WsConfig>,
    Query(ConnectQuery { room_name, recv_user_name }): Query<ConnectQuery>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let subscription = Subscription::from_params(user, room_name.as_deref(), recv_user_name.as_deref())?;
    info!(
        user = subscription.sender(),
        room = %subscription.room_key(),
        connection = %subscription.id(),
        "user connected"
    );

    Ok(ws
        .max_message_size(config.max_message_size)
        .max_frame_size(config.max_message_size)
        .on_upgrade(move |socket| connection::serve(socket, hub, subscription, config))
        .into_response())
}
