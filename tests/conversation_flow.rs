// tests/conversation_flow.rs
//
// End-to-end conversation over the in-memory store with a fixed clock.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeZone};
use histobotto::context::{BotContext, FixedClock};
use histobotto::conversation::ConversationStatus;
use histobotto::store::MemoryStore;
use histobotto::watermark::{MemorySettings, PersistedFilter, SettingsStore};
use histobotto::{BotConfig, Session, UserReply};
use serde_json::{json, Value};

const CONV: &str = "-Kchannel";

fn at(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(y, m, d, 9, 30, 0)
        .unwrap()
}

fn config() -> BotConfig {
    let mut cfg = BotConfig::default();
    cfg.bot.conversation_id = CONV.to_string();
    cfg
}

fn rec(year: &str, rank: f64, title: &str) -> Value {
    json!({ "event_title": "Topic", "event_year": year, "title": title, "event_pop_rank": rank })
}

fn october_19() -> Vec<(String, Value)> {
    vec![
        ("a".into(), rec("1920", 5.0, "A happened.")),
        ("b".into(), rec("1850", 2.0, "B is too old.")),
        ("c".into(), rec("1995", 9.0, "C happened.")),
        ("d".into(), rec("1969", 7.0, "D happened.")),
        ("e".into(), json!({ "event_title": "Broken", "title": "no year" })),
    ]
}

fn user(text: &str) -> UserReply {
    UserReply {
        sender_id: "device-1".into(),
        sender_name: "Ada".into(),
        text: text.into(),
    }
}

fn session_at(
    now: DateTime<FixedOffset>,
    store: &Arc<MemoryStore>,
    settings: &Arc<MemorySettings>,
) -> Session {
    let ctx = BotContext::new(config(), Arc::new(FixedClock(now)));
    Session::new(ctx, store.clone(), settings.clone())
}

#[tokio::test]
async fn open_announces_most_popular_event_and_persists_watermark() {
    let store = Arc::new(MemoryStore::new().with_events("October 19", october_19()));
    let settings = Arc::new(MemorySettings::new());
    let mut s = session_at(at(2026, 10, 19), &store, &settings);

    let msg = s.open().await.unwrap().expect("opening message");
    assert_eq!(msg.text, "31 years ago today, C happened.");
    assert_eq!(msg.sender_name, "Histobotto");
    assert_eq!(msg.timestamp, "Oct 19, 2026, 9:30:00 AM");

    let stored = store.messages(CONV).await;
    assert_eq!(stored, vec![msg]);

    let persisted = settings.load().await.unwrap().unwrap();
    assert_eq!(persisted.event_date_filter, "2026-10-19");
    assert_eq!(persisted.event_seen_filter, 9.0);

    assert_eq!(s.machine().unwrap().status(), ConversationStatus::NextRequested);

    let state = s.state();
    assert_eq!(state.remaining, 2, "D and A left");
    assert_eq!(state.last_feed.unwrap().dropped_by_year, 1);
}

#[tokio::test]
async fn replies_drive_detail_and_next() {
    let store = Arc::new(MemoryStore::new().with_events("October 19", october_19()));
    let settings = Arc::new(MemorySettings::new());
    let mut s = session_at(at(2026, 10, 19), &store, &settings);
    s.open().await.unwrap();

    let detail = s.reply(user("YES")).await.unwrap().unwrap();
    assert_eq!(detail.text, "Topic: C happened.");
    assert_eq!(s.machine().unwrap().status(), ConversationStatus::DetailRequested);
    assert_eq!(s.state().remaining, 2);

    let next = s.reply(user("next")).await.unwrap().unwrap();
    assert_eq!(next.text, "57 years ago today, D happened.");
    assert_eq!(s.state().remaining, 1);

    // any other text keeps NextRequested
    let again = s.reply(user("ok")).await.unwrap().unwrap();
    assert_eq!(again.text, "106 years ago today, A happened.");

    // nothing left
    assert!(s.reply(user("next")).await.unwrap().is_none());
    assert_eq!(settings.load().await.unwrap().unwrap().event_seen_filter, 5.0);

    // user messages are written too, verbatim
    let stored = store.messages(CONV).await;
    let from_user: Vec<&str> = stored
        .iter()
        .filter(|m| m.sender_id == "device-1")
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(from_user, vec!["YES", "next", "ok", "next"]);
}

#[tokio::test]
async fn same_day_reopen_resumes_after_watermark() {
    let store = Arc::new(MemoryStore::new().with_events("October 19", october_19()));
    let settings = Arc::new(MemorySettings::new());

    let mut first = session_at(at(2026, 10, 19), &store, &settings);
    first.open().await.unwrap();
    assert!(first.open().await.unwrap().is_none(), "second open is a no-op");
    assert_eq!(store.fetch_count(), 1);

    // app restart later the same day: C (rank 9) was seen
    let mut second = session_at(at(2026, 10, 19), &store, &settings);
    let msg = second.open().await.unwrap().unwrap();
    assert_eq!(msg.text, "57 years ago today, D happened.");
    assert_eq!(settings.load().await.unwrap().unwrap().event_seen_filter, 7.0);
}

#[tokio::test]
async fn new_day_resets_watermark() {
    let store = Arc::new(MemoryStore::new().with_events("October 20", vec![("x".into(), rec("2001", 9.5, "X happened."))]));
    let settings = Arc::new(MemorySettings::with(PersistedFilter {
        event_date_filter: "2026-10-19".into(),
        event_seen_filter: 1.0,
    }));

    let mut s = session_at(at(2026, 10, 20), &store, &settings);
    let msg = s.open().await.unwrap().expect("yesterday's watermark must not apply");
    assert_eq!(msg.text, "25 years ago today, X happened.");
    let persisted = settings.load().await.unwrap().unwrap();
    assert_eq!(persisted.event_date_filter, "2026-10-20");
    assert_eq!(persisted.event_seen_filter, 9.5);
}

#[tokio::test]
async fn write_failures_do_not_block_the_conversation() {
    let store = Arc::new(MemoryStore::new().with_events("October 19", october_19()));
    store.set_fail_writes(true);
    let settings = Arc::new(MemorySettings::new());
    let mut s = session_at(at(2026, 10, 19), &store, &settings);

    assert!(s.open().await.unwrap().is_some());
    let next = s.reply(user("next")).await.unwrap().unwrap();
    assert_eq!(next.text, "57 years ago today, D happened.");
    assert!(store.messages(CONV).await.is_empty());

    let shown = s.transcript(10);
    assert_eq!(shown.len(), 3, "bot, user, bot");
    assert!(shown
        .iter()
        .all(|e| e.delivery == histobotto::transcript::Delivery::Unsaved));
}

#[tokio::test]
async fn failed_fetch_surfaces_error_and_can_be_retried() {
    let store = Arc::new(MemoryStore::new().with_events("October 19", october_19()));
    store.fail_next_fetches(1);
    let settings = Arc::new(MemorySettings::new());
    let mut s = session_at(at(2026, 10, 19), &store, &settings);

    assert!(s.open().await.is_err());
    assert!(s.machine().is_none());
    assert!(s.open().await.unwrap().is_some());
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn reply_before_open_opens_the_day() {
    let store = Arc::new(MemoryStore::new().with_events("October 19", october_19()));
    let settings = Arc::new(MemorySettings::new());
    let mut s = session_at(at(2026, 10, 19), &store, &settings);

    let msg = s.reply(user("hello")).await.unwrap().unwrap();
    assert_eq!(msg.text, "31 years ago today, C happened.");
    assert!(s.reply(user("   ")).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_day_is_quiet() {
    let store = Arc::new(MemoryStore::new());
    let settings = Arc::new(MemorySettings::new());
    let mut s = session_at(at(2026, 10, 19), &store, &settings);

    assert!(s.open().await.unwrap().is_none());
    assert!(s.reply(user("next")).await.unwrap().is_none());
    assert_eq!(store.fetch_count(), 1, "empty day is not refetched");
}
