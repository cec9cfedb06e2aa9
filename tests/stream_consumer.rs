// tests/stream_consumer.rs
mod common;

use common::{ids, item, items, ScriptedProvider, ScriptedSession};
use feed_trigger::filter::{QueryFilter, StreamMode};
use feed_trigger::sink::{ChannelSink, EventSink, MemorySink, Record};
use feed_trigger::trigger::stream::MANUAL_TRIGGER_LIMIT;
use feed_trigger::trigger::{Activation, Driver, StreamConsumer, StreamEnd, StreamOptions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn hashtag_filter() -> QueryFilter {
    QueryFilter {
        include_phrase: Some("#n8n OR #automation".into()),
        ..QueryFilter::default()
    }
}

fn consumer(
    provider: Arc<ScriptedProvider>,
    sink: Arc<dyn EventSink>,
    options: StreamOptions,
) -> StreamConsumer {
    StreamConsumer::new(
        "wf-stream",
        StreamMode::Hashtags,
        hashtag_filter(),
        Duration::from_millis(500),
        options,
        provider,
        sink,
    )
}

#[tokio::test]
async fn provider_failure_ends_stream_with_one_error_record() {
    let session = ScriptedSession::new(vec![
        Ok(item("1")),
        Ok(item("2")),
        Err("connection reset".into()),
        Ok(item("3")),
    ]);
    let pulled = session.pulled.clone();
    let closed = session.closed.clone();
    let provider = Arc::new(ScriptedProvider::with_session(session));
    let sink = Arc::new(MemorySink::new());

    let end = consumer(provider, sink.clone(), StreamOptions::default())
        .run(CancellationToken::new())
        .await;

    assert_eq!(end, StreamEnd::Failed);
    let recs = sink.records();
    assert_eq!(recs.len(), 3);
    assert_eq!(ids(&recs[..2]), vec!["1", "2"]);
    assert_eq!(recs[2].event_kind(), Some("stream_error"));
    let v = serde_json::to_value(&recs[2]).unwrap();
    assert!(v["error"].as_str().unwrap().contains("connection reset"));

    assert_eq!(pulled.load(Ordering::SeqCst), 3, "nothing consumed after the failure");
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn start_marker_and_metadata_wrapping() {
    let session = ScriptedSession::new(vec![Ok(item("1"))]);
    let provider = Arc::new(ScriptedProvider::with_session(session));
    let sink = Arc::new(MemorySink::new());

    let end = consumer(
        provider,
        sink.clone(),
        StreamOptions {
            include_metadata: true,
            include_start_message: true,
        },
    )
    .run(CancellationToken::new())
    .await;
    assert_eq!(end, StreamEnd::Exhausted);

    let recs = sink.records();
    assert_eq!(recs.len(), 2);
    let start = serde_json::to_value(&recs[0]).unwrap();
    assert_eq!(start["type"], "stream_start");
    assert_eq!(start["filter"]["includePhrase"], "#n8n OR #automation");

    match &recs[1] {
        Record::Wrapped(w) => {
            assert_eq!(w.tweet.id, "1");
            assert_eq!(w.metadata.stream_type, StreamMode::Hashtags);
            assert_eq!(w.metadata.filter, hashtag_filter());
            assert_eq!(w.metadata.is_manual_trigger, None);
        }
        other => panic!("expected wrapped item, got {other:?}"),
    }
}

#[tokio::test]
async fn open_failure_reports_stream_error() {
    // no session scripted: stream() fails
    let provider = Arc::new(ScriptedProvider::default());
    let sink = Arc::new(MemorySink::new());

    let end = consumer(provider, sink.clone(), StreamOptions::default())
        .run(CancellationToken::new())
        .await;

    assert_eq!(end, StreamEnd::Failed);
    let recs = sink.records();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].event_kind(), Some("stream_error"));
}

#[tokio::test]
async fn close_releases_session_even_when_release_fails() {
    let mut session = ScriptedSession::new(vec![Ok(item("1"))]);
    session.hang_when_empty = true;
    session.fail_close = true;
    let closed = session.closed.clone();
    let provider = Arc::new(ScriptedProvider::with_session(session));
    let (sink, mut rx) = ChannelSink::channel();

    let c = consumer(provider, Arc::new(sink), StreamOptions::default());
    let activation = Activation::start(Driver::Stream(Arc::new(c)));

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first item in time")
        .expect("channel open");
    assert_eq!(ids(&first), vec!["1"]);
    assert!(!activation.is_finished());

    tokio::time::timeout(Duration::from_secs(5), activation.close())
        .await
        .expect("bounded shutdown");
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn manual_trigger_searches_with_activation_filter() {
    let provider = Arc::new(ScriptedProvider::with_pages(vec![Ok(items(&["3", "2", "1"]))]));
    let sink = Arc::new(MemorySink::new());
    let c = consumer(
        provider.clone(),
        sink.clone(),
        StreamOptions {
            include_metadata: true,
            include_start_message: false,
        },
    );

    let got = c.manual_trigger().await.unwrap();

    assert_eq!(got.len(), 3);
    assert_eq!(provider.last_limit.load(Ordering::SeqCst), MANUAL_TRIGGER_LIMIT);
    assert_eq!(
        provider.last_filter.lock().unwrap().clone(),
        Some(hashtag_filter())
    );
    let recs = sink.records();
    assert_eq!(ids(&recs), vec!["3", "2", "1"]);
    assert!(recs.iter().all(|r| matches!(
        r,
        Record::Wrapped(w) if w.metadata.is_manual_trigger == Some(true)
    )));
}

#[tokio::test]
async fn manual_trigger_failure_emits_manual_trigger_error() {
    let provider = Arc::new(ScriptedProvider::with_pages(vec![Err("timeout".into())]));
    let sink = Arc::new(MemorySink::new());
    let c = consumer(provider, sink.clone(), StreamOptions::default());

    assert!(c.manual_trigger().await.is_err());
    let recs = sink.records();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].event_kind(), Some("manual_trigger_error"));
}
