mod token;
mod users;

use axum::{debug_handler, extract::{Query, State}, routing::get, Json, Router};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{hub::HubHandle, AppResult, AppState};

pub use token::{AuthError, AuthUser, Claims, Tokens};
pub use users::{login_or_register, migrate, HashCost, Login};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(online_users).post(login))
}

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    user: Option<String>,
    password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn online_users(State(hub): State<HubHandle>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(hub.online_users().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(tokens): State<Tokens>,
    State(cost): State<HashCost>,
    Query(LoginQuery { user, password }): Query<LoginQuery>,
) -> AppResult<String> {
    let Some(user) = user.filter(|user| !user.is_empty()) else {
        return Err("User is required")?;
    };

    let login = users::login_or_register(&db_pool, cost, &user, password.as_deref().unwrap_or("")).await?;
    let token = tokens.issue(&user)?;
    info!(user = %user, ?login, "issued token");
    Ok(token)
}
