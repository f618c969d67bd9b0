//! Terminal chat against an in-memory store seeded with a handful of events for today.
//! Type `yes` for more about the current event, `next` for another one, `quit` to leave.

use std::sync::Arc;

use histobotto::context::BotContext;
use histobotto::store::MemoryStore;
use histobotto::watermark::MemorySettings;
use histobotto::{init_tracing, BotConfig, Session, UserReply};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = BotConfig::load_default()?;
    let ctx = BotContext::with_system_clock(config);
    let day_key = ctx.dates.day_key(ctx.today());

    let seed = vec![
        ("-Ka".to_string(), json!({ "event_id": 1, "event_title": "Space", "event_year": "1969", "event_pop_rank": 9.1,
            "title": "Apollo 11 astronauts return to Earth.", "link": "https://en.wikipedia.org/wiki/Apollo_11" })),
        ("-Kb".to_string(), json!({ "event_id": 2, "event_title": "Technology", "event_year": "1991", "event_pop_rank": 7.4,
            "title": "The first web page goes online." })),
        ("-Kc".to_string(), json!({ "event_id": 3, "event_title": "Aviation", "event_year": "1927", "event_pop_rank": 6.0,
            "title": "Charles Lindbergh lands in Paris.",
            "description": "After 33.5 hours alone over the Atlantic, Lindbergh touches down at Le Bourget." })),
        ("-Kd".to_string(), json!({ "event_id": 4, "event_title": "Politics", "event_year": "1815", "event_pop_rank": 8.0,
            "title": "Too old for the default floor." })),
        ("-Ke".to_string(), json!({ "event_title": "Broken", "title": "No year, skipped." })),
    ];
    let store = Arc::new(MemoryStore::new().with_events(&day_key, seed));
    let mut session = Session::new(ctx, store, Arc::new(MemorySettings::new()));

    let bot_name = session.context().config.bot.sender_name.clone();
    match session.open().await? {
        Some(m) => println!("{bot_name}: {}", m.text),
        None => println!("{bot_name}: nothing new today."),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().eq_ignore_ascii_case("quit") {
            break;
        }
        let reply = UserReply {
            sender_id: "demo-user".into(),
            sender_name: "You".into(),
            text: line,
        };
        match session.reply(reply).await? {
            Some(m) => println!("{bot_name}: {}", m.text),
            None => println!("{bot_name}: (no more events today)"),
        }
    }

    println!("chat-demo done");
    Ok(())
}
