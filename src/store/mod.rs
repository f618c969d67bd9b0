// src/store/mod.rs
//! External collaborators: the hosted event/message store.

pub mod firebase;
pub mod memory;

use anyhow::Result;
use serde_json::Value;

use crate::feed::OrderField;
use crate::message::{MessageKey, OutboundMessage};

pub use firebase::FirebaseRestStore;
pub use memory::MemoryStore;

/// Range query over `events/<day_key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// e.g. `March 4`.
    pub day_key: String,
    pub order_by: OrderField,
    /// `limitToFirst`, applied after ordering.
    pub limit: Option<usize>,
}

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Raw snapshot of the day's events; decoding is the caller's job so a
    /// single bad record cannot fail the whole fetch.
    async fn fetch_events(&self, query: &EventQuery) -> Result<Value>;

    /// Append a message under a fresh auto-generated key.
    async fn append_message(&self, conversation_id: &str, message: &OutboundMessage) -> Result<MessageKey>;

    fn name(&self) -> &'static str;
}
