// src/config/bot.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::feed::{FeedPolicy, OrderField, DEFAULT_CAP, DEFAULT_YEAR_FLOOR};
use crate::watermark::DEFAULT_SENTINEL;
use crate::year::{YearComparison, YearFloor};

pub const DEFAULT_CONFIG_PATH: &str = "config/histobotto.toml";
pub const ENV_CONFIG_PATH: &str = "HISTOBOTTO_CONFIG_PATH";
pub const ENV_STORE_TOKEN: &str = "HISTOBOTTO_STORE_TOKEN";
pub const ENV_STORE_URL: &str = "HISTOBOTTO_STORE_URL";
pub const ENV_CONVERSATION_ID: &str = "HISTOBOTTO_CONVERSATION_ID";

const MAX_RETRIES: u8 = 5;

fn default_year_floor() -> String {
    DEFAULT_YEAR_FLOOR.to_string()
}
fn default_cap() -> usize {
    DEFAULT_CAP
}
fn default_sentinel() -> f64 {
    DEFAULT_SENTINEL
}
fn default_sender_id() -> String {
    "histobotto".to_string()
}
fn default_sender_name() -> String {
    "Histobotto".to_string()
}
fn default_conversation_id() -> String {
    "local".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_retries() -> u8 {
    1
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_settings_path() -> PathBuf {
    PathBuf::from("state/settings.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    /// Exclusive lower bound on event years.
    #[serde(default = "default_year_floor")]
    pub year_floor: String,
    #[serde(default)]
    pub year_comparison: YearComparison,
    #[serde(default)]
    pub order_by: OrderField,
    #[serde(default = "default_cap")]
    pub cap: usize,
    /// Optional `limitToFirst` on the store query.
    #[serde(default)]
    pub fetch_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkSection {
    #[serde(default = "default_sentinel")]
    pub sentinel: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSection {
    #[serde(default = "default_sender_id")]
    pub sender_id: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    /// Channel key the conversation's messages are appended under.
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// e.g. `https://histobotto.firebaseio.com`. Empty = in-memory store.
    #[serde(default)]
    pub base_url: String,
    /// "ENV" means: read from HISTOBOTTO_STORE_TOKEN.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u8,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSection {
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub watermark: WatermarkSection,
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub settings: SettingsSection,
}

// serde(default) on a section needs Default; keep it in step with the field defaults
impl Default for FeedSection {
    fn default() -> Self {
        Self {
            year_floor: default_year_floor(),
            year_comparison: YearComparison::default(),
            order_by: OrderField::default(),
            cap: default_cap(),
            fetch_limit: None,
        }
    }
}
impl Default for WatermarkSection {
    fn default() -> Self {
        Self {
            sentinel: default_sentinel(),
        }
    }
}
impl Default for BotSection {
    fn default() -> Self {
        Self {
            sender_id: default_sender_id(),
            sender_name: default_sender_name(),
            conversation_id: default_conversation_id(),
        }
    }
}
impl Default for StoreSection {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}
impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

impl BotConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading bot config from {}", path.display()))?;
        let cfg: BotConfig =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        cfg.finish()
    }

    /// Load using env var + fallbacks:
    /// 1) $HISTOBOTTO_CONFIG_PATH
    /// 2) config/histobotto.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from_file(&default_p);
        }
        BotConfig::default().finish()
    }

    /// Env overrides, secret resolution and sanitizing.
    fn finish(mut self) -> Result<Self> {
        if let Ok(url) = env::var(ENV_STORE_URL) {
            self.store.base_url = url;
        }
        if let Ok(id) = env::var(ENV_CONVERSATION_ID) {
            if !id.trim().is_empty() {
                self.bot.conversation_id = id.trim().to_string();
            }
        }
        self.store.base_url = self.store.base_url.trim().trim_end_matches('/').to_string();

        // Resolve auth token if "ENV"
        if let Some(tok) = &self.store.auth_token {
            if tok.trim().eq_ignore_ascii_case("env") {
                let v = env::var(ENV_STORE_TOKEN)
                    .map_err(|_| anyhow!("Missing {ENV_STORE_TOKEN} env var"))?;
                self.store.auth_token = Some(v);
            } else if tok.trim().is_empty() {
                self.store.auth_token = None;
            }
        }

        // Sanitize
        if self.feed.cap == 0 {
            self.feed.cap = default_cap();
        }
        if !self.watermark.sentinel.is_finite() || self.watermark.sentinel <= 0.0 {
            self.watermark.sentinel = default_sentinel();
        }
        self.store.retries = self.store.retries.min(MAX_RETRIES);
        if self.store.timeout_secs == 0 {
            self.store.timeout_secs = default_timeout_secs();
        }
        if !YearFloor::new(self.feed.year_floor.trim()).is_usable(self.feed.year_comparison) {
            tracing::warn!(
                target: "config",
                floor = %self.feed.year_floor,
                comparison = ?self.feed.year_comparison,
                fallback = DEFAULT_YEAR_FLOOR,
                "year floor unusable, falling back to default"
            );
            self.feed.year_floor = default_year_floor();
        }

        Ok(self)
    }

    pub fn feed_policy(&self) -> FeedPolicy {
        let mut year_floor = YearFloor::new(self.feed.year_floor.trim());
        if !year_floor.is_usable(self.feed.year_comparison) {
            tracing::warn!(target: "config", floor = year_floor.as_str(), "year floor unusable, using default");
            year_floor = YearFloor::new(DEFAULT_YEAR_FLOOR);
        }
        FeedPolicy {
            year_floor,
            comparison: self.feed.year_comparison,
            order_by: self.feed.order_by,
            cap: self.feed.cap,
        }
    }
}
