//! # Event feed filter
//! Pure selection of the day's working set from a raw event list:
//!
//! 1. drop events whose year does not pass the configured floor,
//! 2. order by the configured field (ascending) and reverse, so the most
//!    popular event comes first,
//! 3. keep at most `cap` events,
//! 4. drop events at or above the seen watermark.
//!
//! No I/O and no clock: the same inputs always give the same output.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::watermark::SeenWatermark;
use crate::year::{YearComparison, YearFloor};

pub const DEFAULT_CAP: usize = 10;
pub const DEFAULT_YEAR_FLOOR: &str = "1900";

/// Field the store query orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    #[default]
    Popularity,
    Title,
}

impl OrderField {
    /// Child key used in store queries.
    pub fn store_key(self) -> &'static str {
        match self {
            OrderField::Popularity => crate::event::fields::POP_RANK,
            OrderField::Title => crate::event::fields::TITLE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedPolicy {
    pub year_floor: YearFloor,
    pub comparison: YearComparison,
    pub order_by: OrderField,
    pub cap: usize,
}

impl Default for FeedPolicy {
    fn default() -> Self {
        Self {
            year_floor: YearFloor::new(DEFAULT_YEAR_FLOOR),
            comparison: YearComparison::Numeric,
            order_by: OrderField::Popularity,
            cap: DEFAULT_CAP,
        }
    }
}

/// Events still to be surfaced today, most popular first.
/// Only ever shrinks from the front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    events: VecDeque<Event>,
}

impl WorkingSet {
    pub fn pop_front(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn peek(&self) -> Option<&Event> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

impl From<Vec<Event>> for WorkingSet {
    fn from(v: Vec<Event>) -> Self {
        Self { events: v.into() }
    }
}

/// What each step removed; handy for logs and `/debug/state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedReport {
    pub input: usize,
    pub dropped_by_year: usize,
    pub dropped_by_cap: usize,
    pub dropped_by_watermark: usize,
    pub kept: usize,
}

pub fn select(raw: &[Event], policy: &FeedPolicy, watermark: SeenWatermark) -> WorkingSet {
    select_with_report(raw, policy, watermark).0
}

pub fn select_with_report(
    raw: &[Event],
    policy: &FeedPolicy,
    watermark: SeenWatermark,
) -> (WorkingSet, FeedReport) {
    let mut report = FeedReport {
        input: raw.len(),
        ..FeedReport::default()
    };

    // 1) Year floor
    let mut events: Vec<Event> = Vec::with_capacity(raw.len());
    for ev in raw {
        match policy.year_floor.admits(&ev.year, policy.comparison) {
            Ok(true) => events.push(ev.clone()),
            Ok(false) => report.dropped_by_year += 1,
            Err(e) => {
                tracing::debug!(
                    target: "feed",
                    id = %ev.id, floor = policy.year_floor.as_str(), error = %e,
                    "unusable year, dropping"
                );
                report.dropped_by_year += 1;
            }
        }
    }

    // 2) Ascending by order field (stable, so ties keep store order), then reverse
    match policy.order_by {
        OrderField::Popularity => events.sort_by(|a, b| {
            let ra = a.popularity_rank.unwrap_or(f64::NEG_INFINITY);
            let rb = b.popularity_rank.unwrap_or(f64::NEG_INFINITY);
            ra.total_cmp(&rb)
        }),
        OrderField::Title => events.sort_by(|a, b| a.title.cmp(&b.title)),
    }
    events.reverse();

    // 3) Cap
    if events.len() > policy.cap {
        report.dropped_by_cap = events.len() - policy.cap;
        events.truncate(policy.cap);
    }

    // 4) Watermark; unranked events cannot be compared and stay
    events.retain(|ev| match ev.popularity_rank {
        Some(rank) if !watermark.admits(rank) => {
            report.dropped_by_watermark += 1;
            false
        }
        _ => true,
    });

    report.kept = events.len();
    (WorkingSet::from(events), report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, year: &str, rank: f64) -> Event {
        Event::new(id, format!("title {id}"), "topic", year).with_rank(rank)
    }

    #[test]
    fn scenario_floor_and_order() {
        let raw = vec![ev("a", "1920", 5.0), ev("b", "1850", 2.0), ev("c", "1995", 9.0)];
        let (set, report) =
            select_with_report(&raw, &FeedPolicy::default(), SeenWatermark::sentinel(10.0));
        let ids: Vec<&str> = set.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(report.dropped_by_year, 1);
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn cap_applies_before_watermark() {
        let raw: Vec<Event> = (0..15).map(|i| ev(&i.to_string(), "1950", i as f64)).collect();
        let policy = FeedPolicy {
            cap: 10,
            ..FeedPolicy::default()
        };
        // top 10 by rank are 14..=5; watermark 12 removes 14, 13, 12
        let (set, report) = select_with_report(&raw, &policy, SeenWatermark::sentinel(12.0));
        assert_eq!(report.dropped_by_cap, 5);
        assert_eq!(report.dropped_by_watermark, 3);
        assert_eq!(set.len(), 7);
        assert_eq!(set.peek().unwrap().popularity_rank, Some(11.0));
    }

    #[test]
    fn unranked_events_skip_watermark_step() {
        let raw = vec![
            Event::new("x", "Zebra", "t", "1950"),
            Event::new("y", "Apple", "t", "1960"),
        ];
        let policy = FeedPolicy {
            order_by: OrderField::Title,
            ..FeedPolicy::default()
        };
        let set = select(&raw, &policy, SeenWatermark::sentinel(0.0));
        let titles: Vec<&str> = set.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Zebra", "Apple"]);
    }

    #[test]
    fn lexical_comparison_is_opt_in() {
        let raw = vec![ev("old", "500", 1.0)];
        let numeric = select(&raw, &FeedPolicy::default(), SeenWatermark::default());
        assert!(numeric.is_empty());

        let lexical = FeedPolicy {
            comparison: YearComparison::Lexical,
            ..FeedPolicy::default()
        };
        assert_eq!(select(&raw, &lexical, SeenWatermark::default()).len(), 1);
    }

    #[test]
    fn pop_front_shrinks() {
        let mut set = WorkingSet::from(vec![ev("a", "1950", 1.0), ev("b", "1950", 2.0)]);
        assert_eq!(set.pop_front().unwrap().id, "a");
        assert_eq!(set.len(), 1);
    }
}
