// src/store/memory.rs
//! In-process store with the same query semantics as the hosted one.
//! Backs the demo binary and the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{EventQuery, EventStore};
use crate::message::{MessageKey, OutboundMessage};

#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<HashMap<String, Vec<(String, Value)>>>,
    messages: Mutex<HashMap<String, Vec<(MessageKey, OutboundMessage)>>>,
    next_key: AtomicUsize,
    fetches: AtomicUsize,
    failing_fetches: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a day's children (`(child key, record)`).
    pub fn with_events(mut self, day_key: &str, children: Vec<(String, Value)>) -> Self {
        self.events
            .get_mut()
            .entry(day_key.to_string())
            .or_default()
            .extend(children);
        self
    }

    /// Make the next `n` fetches fail.
    pub fn fail_next_fetches(&self, n: usize) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Number of fetch calls seen, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn messages(&self, conversation_id: &str) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .await
            .get(conversation_id)
            .map(|v| v.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }
}

/// Store ordering: children without the field first, then numbers, then
/// strings, each ascending.
fn order_key(v: &Value, field: &str) -> (u8, f64, String) {
    match v.get(field) {
        Some(Value::Number(n)) => (1, n.as_f64().unwrap_or(0.0), String::new()),
        Some(Value::String(s)) => (2, 0.0, s.clone()),
        _ => (0, 0.0, String::new()),
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn fetch_events(&self, query: &EventQuery) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            bail!("memory store: injected fetch failure");
        }

        let events = self.events.lock().await;
        let Some(children) = events.get(&query.day_key) else {
            return Ok(Value::Null);
        };

        let field = query.order_by.store_key();
        let mut sorted: Vec<&(String, Value)> = children.iter().collect();
        sorted.sort_by(|(ka, a), (kb, b)| {
            let (ta, na, sa) = order_key(a, field);
            let (tb, nb, sb) = order_key(b, field);
            ta.cmp(&tb)
                .then(na.total_cmp(&nb))
                .then(sa.cmp(&sb))
                .then(ka.cmp(kb))
        });
        if let Some(limit) = query.limit {
            sorted.truncate(limit);
        }

        let mut out = Map::new();
        for (k, v) in sorted {
            out.insert(k.clone(), v.clone());
        }
        Ok(Value::Object(out))
    }

    async fn append_message(&self, conversation_id: &str, message: &OutboundMessage) -> Result<MessageKey> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store: injected write failure");
        }
        let n = self.next_key.fetch_add(1, Ordering::SeqCst);
        let key = MessageKey(format!("-M{n:08}"));
        self.messages
            .lock()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push((key.clone(), message.clone()));
        Ok(key)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
