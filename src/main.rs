//! Histobotto: binary entrypoint
//! Boots the Axum HTTP server: loads config, builds the conversation session,
//! wires the chat routes and `/metrics`.

use histobotto::{api, build_session, init_tracing, metrics::Metrics, BotConfig};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = BotConfig::load_default()?;
    tracing::info!(
        floor = %config.feed.year_floor,
        comparison = ?config.feed.year_comparison,
        order_by = ?config.feed.order_by,
        cap = config.feed.cap,
        "config loaded"
    );

    let session = build_session(config)?;
    let metrics = Metrics::init()?;

    let router = api::router(api::AppState::new(session)).merge(metrics.router());

    Ok(router.into())
}
