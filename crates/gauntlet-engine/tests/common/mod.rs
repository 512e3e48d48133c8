//! Shared helpers for the engine integration suites.

use gauntlet_engine::{boot, EngineConfig, Event, ExecutionCoordinator};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Boot a full engine (real interpreter, real harness) and swallow the
/// `ready` event so tests start from a clean stream.
pub async fn start(config: EngineConfig) -> (ExecutionCoordinator, UnboundedReceiver<Event>) {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (coordinator, _report) = boot(config, events_tx).await.expect("engine should boot");
    assert_eq!(drain(&mut events_rx), vec![Event::Ready]);
    (coordinator, events_rx)
}

/// Collect every event emitted so far. All events of a handled request are
/// enqueued by the time `handle` returns, so no waiting is needed.
pub fn drain(events: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// The `content` of an `error` event, if any.
pub fn error_content(events: &[Event]) -> Option<String> {
    events.iter().find_map(|event| match event {
        Event::Error { content } => Some(content.clone()),
        _ => None,
    })
}
