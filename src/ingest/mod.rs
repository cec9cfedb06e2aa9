// src/ingest/mod.rs
pub mod cursor;
pub mod dedup;
pub mod providers;
pub mod session;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use cursor::{Cursor, JsonFileStore, MemoryStore, StateStore};
pub use dedup::dedupe;
pub use types::{FeedItem, FeedProvider, StreamSession, UserRecord};

/// One-time metrics registration (so series carry descriptions once a recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("trigger_poll_cycles_total", "Poll cycles run, by outcome.");
        describe_counter!(
            "trigger_items_emitted_total",
            "Feed items handed to the sink."
        );
        describe_counter!(
            "trigger_fetch_errors_total",
            "Provider fetch failures recovered by the trigger."
        );
        describe_counter!(
            "trigger_stream_items_total",
            "Items received from stream sessions."
        );
        describe_histogram!("trigger_fetch_ms", "Provider fetch time in milliseconds.");
        describe_gauge!(
            "trigger_last_poll_ts",
            "Unix ts of the last completed poll cycle."
        );
    });
}
