// src/watermark.rs
//! "Already seen today" watermark and its persistence.
//!
//! The watermark is the popularity rank of the most recently surfaced event.
//! Within a calendar day it only ever goes down; on a new day it is reset to a
//! large sentinel so the whole feed is eligible again.
//!
//! Known race: `load` and `save` are not transactional. A crash between the
//! day reset and its first use loses the reset, which the next launch redoes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const DEFAULT_SENTINEL: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeenWatermark(f64);

impl SeenWatermark {
    pub fn sentinel(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Ranks strictly below the watermark have not been shown yet.
    pub fn admits(self, rank: f64) -> bool {
        rank < self.0
    }

    /// Move the watermark down to `rank`. Never raises it.
    pub fn lower_to(&mut self, rank: f64) {
        if rank < self.0 {
            self.0 = rank;
        }
    }
}

impl Default for SeenWatermark {
    fn default() -> Self {
        Self(DEFAULT_SENTINEL)
    }
}

/// The two persisted settings, under their historical key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedFilter {
    /// Calendar day (`YYYY-MM-DD`) the watermark belongs to.
    #[serde(rename = "eventDateFilter")]
    pub event_date_filter: String,
    #[serde(rename = "eventSeenFilter")]
    pub event_seen_filter: f64,
}

impl PersistedFilter {
    pub fn fresh(day: &str, sentinel: f64) -> Self {
        Self {
            event_date_filter: day.to_string(),
            event_seen_filter: sentinel,
        }
    }

    pub fn watermark(&self) -> SeenWatermark {
        SeenWatermark(self.event_seen_filter)
    }
}

/// Bring stored settings up to `today`. Returns the settings to use and
/// whether a reset happened (new day, nothing stored, or a corrupt value).
pub fn reconcile(stored: Option<PersistedFilter>, today: &str, sentinel: f64) -> (PersistedFilter, bool) {
    match stored {
        Some(s) if s.event_date_filter == today && s.event_seen_filter.is_finite() => (s, false),
        _ => (PersistedFilter::fresh(today, sentinel), true),
    }
}

/// Persisted key-value settings (the device's user defaults).
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedFilter>>;
    async fn save(&self, filter: &PersistedFilter) -> Result<()>;
}

/// Settings in a small JSON file, e.g. `state/settings.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SettingsStore for JsonFileSettings {
    async fn load(&self) -> Result<Option<PersistedFilter>> {
        let s = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading settings {}", self.path.display()))
            }
        };
        match serde_json::from_str(&s) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                // treat as nothing stored; the caller resets and rewrites it
                tracing::warn!(target: "settings", path = %self.path.display(), "corrupt settings: {e:#}");
                Ok(None)
            }
        }
    }

    async fn save(&self, filter: &PersistedFilter) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating settings dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(filter).context("encoding settings")?;
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing settings {}", self.path.display()))
    }
}

/// In-process settings for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: tokio::sync::Mutex<Option<PersistedFilter>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(filter: PersistedFilter) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(Some(filter)),
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemorySettings {
    async fn load(&self) -> Result<Option<PersistedFilter>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, filter: &PersistedFilter) -> Result<()> {
        *self.inner.lock().await = Some(filter.clone());
        Ok(())
    }
}
