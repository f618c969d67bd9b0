// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod context;
pub mod conversation;
pub mod event;
pub mod feed;
pub mod message;
pub mod metrics;
pub mod session;
pub mod store;
pub mod text;
pub mod transcript;
pub mod watermark;
pub mod year;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::BotConfig;
pub use crate::context::BotContext;
pub use crate::conversation::{ConversationStateMachine, ConversationStatus};
pub use crate::event::Event;
pub use crate::feed::{select, FeedPolicy, WorkingSet};
pub use crate::session::{Session, UserReply};
pub use crate::watermark::SeenWatermark;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::store::{EventStore, FirebaseRestStore, MemoryStore};
use crate::watermark::JsonFileSettings;

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// `HISTOBOTTO_LOG_JSON=1` switches to JSON lines. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("histobotto=info,warn"));
    let json = std::env::var("HISTOBOTTO_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        // someone (e.g. the deployment runtime) got there first
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Build a session from config: hosted store when `store.base_url` is set,
/// otherwise an empty in-memory store; settings in `settings.path`.
pub fn build_session(config: BotConfig) -> Result<Session> {
    let store: Arc<dyn EventStore> = if config.store.base_url.is_empty() {
        info!(target: "store", "no store url configured, using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let s = FirebaseRestStore::from_config(&config.store)?;
        info!(target: "store", url = %config.store.base_url, auth = config.store.auth_token.is_some(), "using hosted store");
        Arc::new(s)
    };
    let settings = Arc::new(JsonFileSettings::new(config.settings.path.clone()));
    let ctx = BotContext::with_system_clock(config);
    Ok(Session::new(ctx, store, settings))
}
