use bubblechat::{app, auth, config::Config, hub::Hub, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bubblechat=info,tower_http=info")),
        )
        .init();

    // the secret may also be passed as the only argument
    let config = Config::from_env(std::env::args().nth(1))?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    auth::migrate(&db_pool).await?;

    let app_state = AppState {
        db_pool,
        hub: Hub::new().spawn(),
        tokens: auth::Tokens::new(config.token_secret.as_bytes(), config.token_ttl),
        hash_cost: config.hash_cost,
        ws: config.ws.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
