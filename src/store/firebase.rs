// src/store/firebase.rs
//! Hosted realtime database over its REST surface.
//!
//! - `GET  {base}/events/{day}.json?orderBy="<field>"&limitToFirst=N`
//! - `POST {base}/channels/{conversation}/messages.json` -> `{"name": "<key>"}`
//!
//! The REST response for an ordered query is a plain JSON object, so the
//! ordering is lost on the wire; the feed filter re-sorts.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::Value;

use super::{EventQuery, EventStore};
use crate::config::bot::StoreSection;
use crate::message::{MessageKey, OutboundMessage};

#[derive(Clone)]
pub struct FirebaseRestStore {
    base: Url,
    auth_token: Option<String>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl FirebaseRestStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid store url `{base_url}`"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("store url `{base_url}` cannot carry a path"));
        }
        Ok(Self {
            base,
            auth_token: None,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 1,
            backoff: Duration::from_millis(500),
        })
    }

    pub fn from_config(cfg: &StoreSection) -> Result<Self> {
        let mut s = Self::new(&cfg.base_url)?
            .with_timeout(cfg.timeout_secs)
            .with_retries(cfg.retries)
            .with_backoff_ms(cfg.backoff_ms);
        s.auth_token = cfg.auth_token.clone();
        Ok(s)
    }

    pub fn with_auth(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Extra attempts after the first failed fetch.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff_ms(mut self, ms: u64) -> Self {
        self.backoff = Duration::from_millis(ms);
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("store url cannot carry a path"))?;
            path.pop_if_empty();
            let (last, init) = segments
                .split_last()
                .ok_or_else(|| anyhow!("empty store path"))?;
            for seg in init {
                path.push(seg);
            }
            path.push(&format!("{last}.json"));
        }
        Ok(url)
    }

    pub(crate) fn events_url(&self, day_key: &str) -> Result<Url> {
        self.url(&["events", day_key])
    }

    pub(crate) fn messages_url(&self, conversation_id: &str) -> Result<Url> {
        self.url(&["channels", conversation_id, "messages"])
    }

    pub(crate) fn query_params(&self, query: &EventQuery) -> Vec<(&'static str, String)> {
        // orderBy takes a JSON string literal
        let mut params = vec![("orderBy", format!("\"{}\"", query.order_by.store_key()))];
        if let Some(limit) = query.limit {
            params.push(("limitToFirst", limit.to_string()));
        }
        if let Some(tok) = &self.auth_token {
            params.push(("auth", tok.clone()));
        }
        params
    }

    /// Send with per-attempt timeout and exponential backoff between attempts.
    async fn send_with_retry<F>(&self, what: &str, retries: u8, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = build().timeout(self.timeout).send().await;
            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(rsp) => return Ok(rsp),
                    Err(e) => anyhow!("{what}: HTTP error: {e}"),
                },
                Err(e) => anyhow!("{what}: request failed: {e}"),
            };
            if attempt > retries {
                return Err(err);
            }
            let wait = self.backoff * (1u32 << (attempt - 1).min(8));
            tracing::warn!(target: "store", attempt, ?wait, "{err:#}; retrying");
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl EventStore for FirebaseRestStore {
    async fn fetch_events(&self, query: &EventQuery) -> Result<Value> {
        let url = self.events_url(&query.day_key)?;
        let params = self.query_params(query);
        let rsp = self
            .send_with_retry("fetch events", self.max_retries, || {
                self.client.get(url.clone()).query(&params)
            })
            .await?;
        rsp.json::<Value>().await.context("decode events snapshot")
    }

    async fn append_message(&self, conversation_id: &str, message: &OutboundMessage) -> Result<MessageKey> {
        let url = self.messages_url(conversation_id)?;
        let auth: Vec<(&str, String)> = self
            .auth_token
            .iter()
            .map(|t| ("auth", t.clone()))
            .collect();
        // POST is not idempotent: one attempt, the caller logs failures
        let rsp = self
            .send_with_retry("append message", 0, || {
                self.client.post(url.clone()).query(&auth).json(message)
            })
            .await?;
        let push: PushResponse = rsp.json().await.context("decode push response")?;
        Ok(MessageKey(push.name))
    }

    fn name(&self) -> &'static str {
        "firebase-rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::OrderField;

    #[test]
    fn urls_escape_day_keys_and_keep_base_path() {
        let s = FirebaseRestStore::new("https://histobotto.example.com/").unwrap();
        assert_eq!(
            s.events_url("March 4").unwrap().as_str(),
            "https://histobotto.example.com/events/March%204.json"
        );
        assert_eq!(
            s.messages_url("-Kabc").unwrap().as_str(),
            "https://histobotto.example.com/channels/-Kabc/messages.json"
        );

        let nested = FirebaseRestStore::new("https://host.example.com/db").unwrap();
        assert_eq!(
            nested.events_url("May 1").unwrap().as_str(),
            "https://host.example.com/db/events/May%201.json"
        );
    }

    #[test]
    fn query_params_quote_order_field() {
        let s = FirebaseRestStore::new("https://h.example.com").unwrap().with_auth("tok");
        let q = EventQuery {
            day_key: "March 4".into(),
            order_by: OrderField::Popularity,
            limit: Some(30),
        };
        let p = s.query_params(&q);
        assert_eq!(p[0], ("orderBy", "\"event_pop_rank\"".to_string()));
        assert_eq!(p[1], ("limitToFirst", "30".to_string()));
        assert_eq!(p[2], ("auth", "tok".to_string()));
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(FirebaseRestStore::new("not a url").is_err());
        assert!(FirebaseRestStore::new("mailto:someone@example.com").is_err());
    }
}
