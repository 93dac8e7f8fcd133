#![forbid(unsafe_code)]

use std::net::SocketAddr;

use homeroom_gateway::{build_router, init_tracing, AppConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let token_secret = std::env::var("HOMEROOM_TOKEN_SECRET")
        .map_err(|_| anyhow::anyhow!("HOMEROOM_TOKEN_SECRET is required for runtime"))?;
    let database_url = std::env::var("HOMEROOM_DATABASE_URL").ok();
    if database_url.is_none() {
        tracing::warn!("HOMEROOM_DATABASE_URL not set; message log is in-memory only");
    }
    let allowed_origins: Vec<String> = std::env::var("HOMEROOM_ALLOWED_ORIGINS")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let app_config = AppConfig {
        token_secret: Some(token_secret),
        allowed_origins,
        database_url,
        ..AppConfig::default()
    };
    let app = build_router(&app_config)?;
    let addr = std::env::var("HOMEROOM_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:4000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid HOMEROOM_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "homeroom-gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
