pub mod appresult;
pub mod auth;
pub mod config;
pub mod connection;
pub mod hub;
pub mod index;
pub mod res;
pub mod rooms;

use axum::{extract::FromRef, routing::get, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};

use crate::{auth::{HashCost, Tokens}, config::WsConfig, hub::HubHandle};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: HubHandle,
    pub tokens: Tokens,
    pub hash_cost: HashCost,
    pub ws: WsConfig,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .merge(auth::router())
        .merge(rooms::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
