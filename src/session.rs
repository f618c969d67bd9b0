// src/session.rs
//! One chat conversation wired to its collaborators.
//!
//! `open` is the app-foreground path: reconcile the seen watermark for today,
//! fetch the day's events (at most once per calendar day), select the working
//! set and announce the top event. `reply` records the user's message, runs
//! the state machine and writes the bot's answer.
//!
//! Store write failures never block the conversation: they are logged,
//! counted and the message is kept in the transcript as unsaved.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use metrics::{counter, gauge};
use serde::Serialize;

use crate::context::BotContext;
use crate::conversation::{ConversationStateMachine, ConversationStatus, TurnStamp};
use crate::event::decode_snapshot;
use crate::feed::{select_with_report, FeedReport};
use crate::message::{OutboundMessage, Sender};
use crate::metrics::ensure_metrics_described;
use crate::store::{EventQuery, EventStore};
use crate::transcript::{Delivery, Transcript, TranscriptEntry};
use crate::watermark::{reconcile, PersistedFilter, SettingsStore};

const TRANSCRIPT_CAP: usize = 500;

/// A message typed by the user.
#[derive(Debug, Clone)]
pub struct UserReply {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
}

/// Guards the day's fetch: one in flight at a time and none once the day
/// has been fetched successfully.
#[derive(Debug, Default, Clone)]
pub struct FetchGate {
    fetched: Option<NaiveDate>,
    in_flight: Option<NaiveDate>,
}

impl FetchGate {
    pub fn try_begin(&mut self, day: NaiveDate) -> bool {
        if self.fetched == Some(day) || self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(day);
        true
    }

    pub fn finish(&mut self, day: NaiveDate, ok: bool) {
        self.in_flight = None;
        if ok {
            self.fetched = Some(day);
        }
    }
}

/// Read-only view for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub conversation: String,
    pub day: Option<NaiveDate>,
    pub status: Option<ConversationStatus>,
    pub current_event: Option<String>,
    pub remaining: usize,
    pub watermark: Option<f64>,
    pub last_feed: Option<FeedReport>,
    pub transcript_len: usize,
}

pub struct Session {
    ctx: BotContext,
    store: Arc<dyn EventStore>,
    settings: Arc<dyn SettingsStore>,
    sender: Sender,
    machine: Option<ConversationStateMachine>,
    day: Option<NaiveDate>,
    gate: FetchGate,
    persisted: Option<PersistedFilter>,
    transcript: Transcript,
    last_report: Option<FeedReport>,
}

impl Session {
    pub fn new(ctx: BotContext, store: Arc<dyn EventStore>, settings: Arc<dyn SettingsStore>) -> Self {
        let sender = Sender::new(ctx.config.bot.sender_id.clone(), ctx.config.bot.sender_name.clone());
        Self {
            ctx,
            store,
            settings,
            sender,
            machine: None,
            day: None,
            gate: FetchGate::default(),
            persisted: None,
            transcript: Transcript::with_capacity(TRANSCRIPT_CAP),
            last_report: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.ctx.config.bot.conversation_id
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn machine(&self) -> Option<&ConversationStateMachine> {
        self.machine.as_ref()
    }

    pub fn transcript(&self, last_n: usize) -> Vec<TranscriptEntry> {
        self.transcript.snapshot_last_n(last_n)
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            conversation: anon_hash(self.conversation_id()),
            day: self.day,
            status: self.machine.as_ref().map(|m| m.status()),
            current_event: self
                .machine
                .as_ref()
                .and_then(|m| m.current())
                .map(|e| e.id.clone()),
            remaining: self.machine.as_ref().map_or(0, |m| m.working_set().len()),
            watermark: self.machine.as_ref().map(|m| m.watermark().value()),
            last_feed: self.last_report,
            transcript_len: self.transcript.len(),
        }
    }

    /// App came to the foreground. Returns the opening message when a new
    /// day's feed was loaded and it had something to say.
    pub async fn open(&mut self) -> Result<Option<OutboundMessage>> {
        ensure_metrics_described();
        let today = self.ctx.today();

        if self.machine.is_some() && self.day == Some(today) {
            tracing::debug!(target: "conversation", "already opened today");
            return Ok(None);
        }
        if !self.gate.try_begin(today) {
            tracing::debug!(target: "store", %today, "fetch already done or in flight");
            return Ok(None);
        }

        let result = self.load_day(today).await;
        self.gate.finish(today, result.is_ok());
        result?;

        let msg = self.machine_turn(|m, stamp| m.start_topic(stamp));
        if let Some(m) = &msg {
            self.deliver(m.clone(), true).await;
        } else {
            tracing::info!(target: "conversation", %today, "nothing left to surface today");
        }
        self.persist_watermark().await;
        Ok(msg)
    }

    /// A user reply. Opens the day first if needed; in that case the
    /// opening message is the answer.
    pub async fn reply(&mut self, reply: UserReply) -> Result<Option<OutboundMessage>> {
        let text = reply.text.trim();
        if text.is_empty() {
            tracing::debug!(target: "conversation", "ignoring empty reply");
            return Ok(None);
        }

        let user_msg = OutboundMessage {
            sender_id: reply.sender_id.clone(),
            sender_name: reply.sender_name.clone(),
            text: text.to_string(),
            timestamp: self.ctx.dates.timestamp(self.ctx.now()),
            event_year: None,
        };
        self.deliver(user_msg, false).await;

        if self.machine.is_none() || self.day != Some(self.ctx.today()) {
            if let Some(opening) = self.open().await? {
                return Ok(Some(opening));
            }
        }

        let text = text.to_string();
        let msg = self.machine_turn(|m, stamp| m.on_reply(&text, stamp));
        if let Some(m) = &msg {
            self.deliver(m.clone(), true).await;
        }
        self.persist_watermark().await;
        Ok(msg)
    }

    async fn load_day(&mut self, today: NaiveDate) -> Result<()> {
        let sentinel = self.ctx.config.watermark.sentinel;
        let settings_day = self.ctx.dates.settings_day(today);

        let stored = match self.settings.load().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(target: "settings", "load failed, starting fresh: {e:#}");
                None
            }
        };
        let (filter, reset) = reconcile(stored, &settings_day, sentinel);
        if reset {
            counter!("settings_watermark_resets_total").increment(1);
            tracing::info!(target: "settings", day = %settings_day, sentinel, "watermark reset for new day");
            if let Err(e) = self.settings.save(&filter).await {
                tracing::warn!(target: "settings", "save failed: {e:#}");
            }
        }
        self.persisted = Some(filter.clone());

        let query = EventQuery {
            day_key: self.ctx.dates.day_key(today),
            order_by: self.ctx.feed_policy().order_by,
            limit: self.ctx.config.feed.fetch_limit,
        };
        let snapshot = match self.store.fetch_events(&query).await {
            Ok(v) => v,
            Err(e) => {
                counter!("store_fetch_errors_total").increment(1);
                return Err(e).with_context(|| {
                    format!("fetching events for `{}` from {}", query.day_key, self.store.name())
                });
            }
        };

        let decoded = decode_snapshot(&snapshot);
        counter!("feed_records_fetched_total").increment((decoded.events.len() + decoded.skipped.len()) as u64);
        counter!("feed_records_skipped_total").increment(decoded.skipped.len() as u64);

        let (set, report) = select_with_report(&decoded.events, self.ctx.feed_policy(), filter.watermark());
        counter!("feed_events_kept_total").increment(report.kept as u64);
        gauge!("feed_working_set_len").set(report.kept as f64);
        tracing::info!(
            target: "feed",
            day = %query.day_key,
            skipped = decoded.skipped.len(),
            input = report.input,
            by_year = report.dropped_by_year,
            by_cap = report.dropped_by_cap,
            by_watermark = report.dropped_by_watermark,
            kept = report.kept,
            "working set ready"
        );

        self.last_report = Some(report);
        self.machine = Some(ConversationStateMachine::new(set, filter.watermark(), self.sender.clone()));
        self.day = Some(today);
        Ok(())
    }

    fn machine_turn<F>(&mut self, f: F) -> Option<OutboundMessage>
    where
        F: FnOnce(&mut ConversationStateMachine, TurnStamp<'_>) -> Option<OutboundMessage>,
    {
        let timestamp = self.ctx.dates.timestamp(self.ctx.now());
        let stamp = TurnStamp {
            current_year: self.ctx.current_year(),
            timestamp: &timestamp,
        };
        let machine = self.machine.as_mut()?;
        let msg = f(machine, stamp);
        gauge!("feed_working_set_len").set(machine.working_set().len() as f64);
        msg
    }

    async fn deliver(&mut self, message: OutboundMessage, from_bot: bool) {
        let delivery = match self.store.append_message(self.conversation_id(), &message).await {
            Ok(key) => {
                tracing::debug!(
                    target: "store",
                    conversation = %anon_hash(self.conversation_id()),
                    %key, from_bot,
                    "message stored"
                );
                Delivery::Stored(key)
            }
            Err(e) => {
                counter!("store_write_errors_total").increment(1);
                tracing::warn!(
                    target: "store",
                    conversation = %anon_hash(self.conversation_id()),
                    from_bot,
                    "message write failed: {e:#}"
                );
                Delivery::Unsaved
            }
        };
        if from_bot {
            counter!("conversation_messages_emitted_total").increment(1);
        }
        self.transcript.push(message, from_bot, delivery);
    }

    async fn persist_watermark(&mut self) {
        let (Some(machine), Some(day)) = (&self.machine, self.day) else {
            return;
        };
        let next = PersistedFilter {
            event_date_filter: self.ctx.dates.settings_day(day),
            event_seen_filter: machine.watermark().value(),
        };
        if self.persisted.as_ref() == Some(&next) {
            return;
        }
        match self.settings.save(&next).await {
            Ok(()) => self.persisted = Some(next),
            Err(e) => tracing::warn!(target: "settings", "watermark save failed: {e:#}"),
        }
    }
}

/// Short, stable, non-reversible id for logs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
