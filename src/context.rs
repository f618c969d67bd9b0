// src/context.rs
//! Explicitly passed runtime context: configuration, date formatting and clock.

use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate};

use crate::config::BotConfig;
use crate::feed::FeedPolicy;
use crate::year::HistoricalYear;

/// Wall clock, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// How dates are rendered for the store, the settings and the chat bubbles.
#[derive(Debug, Clone)]
pub struct DatePolicy {
    /// Store child key for a day's events, e.g. `March 4`.
    pub day_key_format: String,
    /// Persisted `eventDateFilter` day, e.g. `2017-03-04`.
    pub settings_day_format: String,
    /// Message timestamp, e.g. `Mar 4, 2017, 3:04:05 PM`.
    pub timestamp_format: String,
}

impl Default for DatePolicy {
    fn default() -> Self {
        Self {
            day_key_format: "%B %-d".to_string(),
            settings_day_format: "%Y-%m-%d".to_string(),
            timestamp_format: "%b %-d, %Y, %-I:%M:%S %p".to_string(),
        }
    }
}

impl DatePolicy {
    /// The store key has no year, so every year's March 4 shares one feed.
    pub fn day_key(&self, day: NaiveDate) -> String {
        day.format(&self.day_key_format).to_string()
    }

    pub fn settings_day(&self, day: NaiveDate) -> String {
        day.format(&self.settings_day_format).to_string()
    }

    pub fn timestamp(&self, at: DateTime<FixedOffset>) -> String {
        at.format(&self.timestamp_format).to_string()
    }
}

#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<BotConfig>,
    pub dates: DatePolicy,
    pub clock: Arc<dyn Clock>,
    feed_policy: FeedPolicy,
}

impl BotContext {
    pub fn new(config: BotConfig, clock: Arc<dyn Clock>) -> Self {
        let feed_policy = config.feed_policy();
        Self {
            config: Arc::new(config),
            dates: DatePolicy::default(),
            clock,
            feed_policy,
        }
    }

    pub fn with_system_clock(config: BotConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn feed_policy(&self) -> &FeedPolicy {
        &self.feed_policy
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn current_year(&self) -> HistoricalYear {
        HistoricalYear::ce(self.now().year())
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("config", &self.config)
            .field("dates", &self.dates)
            .field("now", &self.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn formats_match_store_and_bubble_conventions() {
        let p = DatePolicy::default();
        let t = at(2017, 3, 4, 15, 4, 5);
        assert_eq!(p.day_key(t.date_naive()), "March 4");
        assert_eq!(p.settings_day(t.date_naive()), "2017-03-04");
        assert_eq!(p.timestamp(t), "Mar 4, 2017, 3:04:05 PM");
    }

    #[test]
    fn context_reads_the_injected_clock() {
        let ctx = BotContext::new(BotConfig::default(), Arc::new(FixedClock(at(2026, 10, 19, 9, 0, 0))));
        assert_eq!(ctx.current_year().value(), 2026);
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }
}
