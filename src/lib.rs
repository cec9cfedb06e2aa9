// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod sink;
pub mod trigger;

// ---- Re-exports for a stable public API ----
pub use crate::error::{FetchError, ValidationError};
pub use crate::filter::{build as build_filter, QueryFilter, StreamMode};
pub use crate::ingest::{dedupe, FeedItem, FeedProvider, StreamSession};
pub use crate::sink::{EventSink, Record};
pub use crate::trigger::{activate, Activation, Driver};
