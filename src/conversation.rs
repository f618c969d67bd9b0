//! # Conversation state machine
//! Decides what the bot says after each user reply.
//!
//! Two states: `DetailRequested` (tell more about the current event) and
//! `NextRequested` (pop and announce the next event). A reply of `yes` or
//! `next` (any case) picks the state; anything else keeps it. The machine
//! runs right after the transition and never performs I/O: it returns the
//! message for the caller to write.
//!
//! The opening announcement moves the machine into `NextRequested`, so a
//! reply that is neither `yes` nor `next` keeps the events coming.
//! The last surfaced event stays `current` after the set runs dry, on purpose,
//! so a late `yes` can still describe it.

use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::feed::WorkingSet;
use crate::message::{OutboundMessage, Sender};
use crate::watermark::SeenWatermark;
use crate::year::HistoricalYear;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    DetailRequested,
    NextRequested,
}

/// What a user reply asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyIntent {
    Detail,
    Next,
    Other,
}

impl ReplyIntent {
    pub fn parse(text: &str) -> Self {
        let t = text.trim();
        if t.eq_ignore_ascii_case("yes") {
            ReplyIntent::Detail
        } else if t.eq_ignore_ascii_case("next") {
            ReplyIntent::Next
        } else {
            ReplyIntent::Other
        }
    }
}

impl ConversationStatus {
    pub fn after(self, intent: ReplyIntent) -> Self {
        match intent {
            ReplyIntent::Detail => ConversationStatus::DetailRequested,
            ReplyIntent::Next => ConversationStatus::NextRequested,
            ReplyIntent::Other => self,
        }
    }
}

/// Per-turn inputs the machine cannot know itself.
#[derive(Debug, Clone, Copy)]
pub struct TurnStamp<'a> {
    pub current_year: HistoricalYear,
    pub timestamp: &'a str,
}

#[derive(Debug, Clone)]
pub struct ConversationStateMachine {
    status: ConversationStatus,
    working_set: WorkingSet,
    current: Option<Event>,
    watermark: SeenWatermark,
    sender: Sender,
}

impl ConversationStateMachine {
    pub fn new(working_set: WorkingSet, watermark: SeenWatermark, sender: Sender) -> Self {
        Self {
            status: ConversationStatus::default(),
            working_set,
            current: None,
            watermark,
            sender,
        }
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn current(&self) -> Option<&Event> {
        self.current.as_ref()
    }

    pub fn watermark(&self) -> SeenWatermark {
        self.watermark
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    /// Opening move: announce the top event and enter `NextRequested`.
    /// An empty set says nothing and leaves the status alone.
    pub fn start_topic(&mut self, stamp: TurnStamp<'_>) -> Option<OutboundMessage> {
        let msg = self.announce_next(stamp)?;
        self.status = ConversationStatus::NextRequested;
        Some(msg)
    }

    /// Apply a user reply, then advance.
    pub fn on_reply(&mut self, reply: &str, stamp: TurnStamp<'_>) -> Option<OutboundMessage> {
        let intent = ReplyIntent::parse(reply);
        let before = self.status;
        self.status = self.status.after(intent);
        tracing::debug!(
            target: "conversation",
            ?intent, from = ?before, to = ?self.status,
            "reply transition"
        );
        self.advance(stamp)
    }

    /// Run the handler for the current status.
    pub fn advance(&mut self, stamp: TurnStamp<'_>) -> Option<OutboundMessage> {
        match self.status {
            ConversationStatus::NextRequested => self.announce_next(stamp),
            ConversationStatus::DetailRequested => self.describe_current(stamp),
        }
    }

    fn announce_next(&mut self, stamp: TurnStamp<'_>) -> Option<OutboundMessage> {
        // Empty set: the day is done. Leave `current` alone.
        let event = self.working_set.pop_front()?;

        if let Some(rank) = event.popularity_rank {
            self.watermark.lower_to(rank);
        }

        let text = match event.parsed_year() {
            Ok(year) => {
                tracing::debug!(target: "conversation", id = %event.id, %year, "announcing");
                format!(
                    "{} years ago today, {}",
                    year.years_until(stamp.current_year),
                    event.title
                )
            }
            Err(e) => {
                tracing::warn!(target: "conversation", id = %event.id, error = %e, "year not numeric, sending without age");
                format!("On this day in {}, {}", event.year, event.title)
            }
        };

        let mut msg = self.sender.says(text, stamp.timestamp);
        msg.event_year = Some(event.year.clone());
        self.current = Some(event);
        Some(msg)
    }

    fn describe_current(&self, stamp: TurnStamp<'_>) -> Option<OutboundMessage> {
        let event = self.current.as_ref()?;
        Some(self.sender.says(detail_text(event), stamp.timestamp))
    }
}

/// Follow-up text for "tell me more".
pub fn detail_text(event: &Event) -> String {
    let body = match &event.description {
        Some(d) => d.clone(),
        None => format!("{}: {}", event.event_title, event.title),
    };
    match &event.link {
        Some(link) => format!("{body}\nRead more: {link}"),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "Oct 19, 2026, 9:00:00 AM";

    fn stamp() -> TurnStamp<'static> {
        TurnStamp {
            current_year: HistoricalYear::ce(2026),
            timestamp: TS,
        }
    }

    fn machine(events: Vec<Event>) -> ConversationStateMachine {
        ConversationStateMachine::new(
            WorkingSet::from(events),
            SeenWatermark::sentinel(10_000.0),
            Sender::new("bot", "Histobotto"),
        )
    }

    fn ev(id: &str, year: &str, rank: f64) -> Event {
        Event::new(id, format!("event {id} happened."), "Topic", year).with_rank(rank)
    }

    #[test]
    fn reply_parsing_is_case_insensitive() {
        assert_eq!(ReplyIntent::parse("YES"), ReplyIntent::Detail);
        assert_eq!(ReplyIntent::parse(" Next "), ReplyIntent::Next);
        assert_eq!(ReplyIntent::parse("yes please"), ReplyIntent::Other);
        assert_eq!(
            ConversationStatus::NextRequested.after(ReplyIntent::parse("YES")),
            ConversationStatus::DetailRequested
        );
        assert_eq!(
            ConversationStatus::NextRequested.after(ReplyIntent::Other),
            ConversationStatus::NextRequested
        );
    }

    #[test]
    fn start_topic_announces_with_age_and_lowers_watermark() {
        let mut m = machine(vec![ev("a", "1969", 7.0), ev("b", "1920", 5.0)]);
        let msg = m.start_topic(stamp()).unwrap();
        assert_eq!(msg.text, "57 years ago today, event a happened.");
        assert_eq!(msg.event_year.as_deref(), Some("1969"));
        assert_eq!(msg.timestamp, TS);
        assert_eq!(m.watermark().value(), 7.0);
        assert_eq!(m.current().unwrap().id, "a");
        assert_eq!(m.status(), ConversationStatus::NextRequested);
    }

    #[test]
    fn other_reply_after_opening_announces_the_next_event() {
        let mut m = machine(vec![ev("a", "1969", 7.0), ev("b", "1920", 5.0)]);
        m.start_topic(stamp()).unwrap();
        let msg = m.on_reply("ok", stamp()).unwrap();
        assert_eq!(msg.text, "106 years ago today, event b happened.");
        assert_eq!(m.current().unwrap().id, "b");
        assert_eq!(m.watermark().value(), 5.0);
        assert!(m.working_set().is_empty());
    }

    #[test]
    fn exhausted_set_keeps_last_event_for_detail() {
        let mut m = machine(vec![ev("a", "1969", 7.0)]);
        m.start_topic(stamp()).unwrap();
        assert!(m.on_reply("next", stamp()).is_none());
        assert_eq!(m.current().unwrap().id, "a");
        let msg = m.on_reply("yes", stamp()).unwrap();
        assert_eq!(msg.text, "Topic: event a happened.");
    }

    #[test]
    fn next_pops_exactly_one() {
        let mut m = machine(vec![ev("a", "1950", 3.0), ev("b", "1950", 2.0), ev("c", "1950", 1.0)]);
        let msg = m.on_reply("next", stamp());
        assert!(msg.is_some());
        assert_eq!(m.working_set().len(), 2);
        assert_eq!(m.current().unwrap().id, "a");
    }

    #[test]
    fn next_on_empty_set_says_nothing() {
        let mut m = machine(vec![]);
        assert!(m.on_reply("next", stamp()).is_none());
        assert!(m.current().is_none());
        assert!(m.start_topic(stamp()).is_none());
    }

    #[test]
    fn detail_uses_current_event_and_does_not_consume() {
        let mut m = machine(vec![
            ev("a", "1969", 7.0).with_link("https://example.org/a"),
            ev("b", "1920", 5.0),
        ]);
        assert!(m.on_reply("yes", stamp()).is_none(), "nothing current yet");
        m.start_topic(stamp());
        assert_eq!(m.status(), ConversationStatus::NextRequested);
        let msg = m.on_reply("Yes", stamp()).unwrap();
        assert_eq!(msg.text, "Topic: event a happened.\nRead more: https://example.org/a");
        assert_eq!(m.working_set().len(), 1);

        // unknown replies keep the status and still advance
        let again = m.on_reply("cool", stamp()).unwrap();
        assert_eq!(again.text, msg.text);
    }

    #[test]
    fn non_numeric_year_degrades_gracefully() {
        let mut m = machine(vec![Event::new("x", "Something happened.", "T", "c. 1500")]);
        let msg = m.start_topic(stamp()).unwrap();
        assert_eq!(msg.text, "On this day in c. 1500, Something happened.");
        assert_eq!(m.watermark().value(), 10_000.0, "unranked events leave the watermark");
    }

    #[test]
    fn description_wins_over_title() {
        let e = Event::new("x", "t", "T", "1900").with_description("A longer story.");
        assert_eq!(detail_text(&e), "A longer story.");
    }
}
