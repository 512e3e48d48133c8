//! Redirectable output sink.
//!
//! Everything user code writes to stdout/stderr lands here, via the harness
//! streams. The sink always streams: complete lines are forwarded to the
//! host as `log` events as they arrive, and any trailing partial line is
//! pushed out by [`OutputSink::flush`] when an execution settles. During
//! validation a capture buffer is engaged *in addition* to streaming; the
//! [`CaptureGuard`] restores pure streaming mode on drop, so every exit path
//! of the validate pipeline - including errors - releases it.
//!
//! After a timeout is declared the sink is muted until the next request:
//! the timed-out execution may still be running (there is no preemption),
//! and its late output must not appear after the terminal event.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use crate::protocol::Event;

/// Which stream a chunk was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

/// One raw chunk of output, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub channel: Channel,
    pub text: String,
}

#[derive(Debug, Default)]
struct SinkState {
    pending_stdout: String,
    pending_stderr: String,
    capture: Option<Vec<OutputEvent>>,
    muted: bool,
}

/// Shared between the interpreter thread (writer) and the coordinator
/// (mode changes).
#[derive(Debug)]
pub struct OutputSink {
    events: UnboundedSender<Event>,
    state: Mutex<SinkState>,
}

impl OutputSink {
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events,
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Record a chunk. Called from the interpreter thread for every write
    /// user code performs.
    pub fn write(&self, channel: Channel, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(capture) = &mut state.capture {
            capture.push(OutputEvent {
                channel,
                text: text.to_string(),
            });
        }
        if state.muted {
            return;
        }
        let pending = match channel {
            Channel::Stdout => &mut state.pending_stdout,
            Channel::Stderr => &mut state.pending_stderr,
        };
        pending.push_str(text);
        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            let _ = self.events.send(Event::Log {
                content: line.trim_end_matches('\n').to_string(),
            });
        }
    }

    /// Forward any buffered partial lines. Called once an execution settles,
    /// before the terminal event is emitted.
    pub fn flush(&self) {
        let mut guard = self.state.lock().unwrap();
        if guard.muted {
            return;
        }
        let state = &mut *guard;
        for pending in [&mut state.pending_stdout, &mut state.pending_stderr] {
            if !pending.is_empty() {
                let _ = self.events.send(Event::Log {
                    content: std::mem::take(pending),
                });
            }
        }
    }

    /// Stop streaming until the next request. Pending partial lines are
    /// discarded along with anything a still-running execution writes.
    pub fn mute(&self) {
        let mut state = self.state.lock().unwrap();
        state.muted = true;
        state.pending_stdout.clear();
        state.pending_stderr.clear();
    }

    /// Resume streaming. Called at the start of every request.
    pub fn unmute(&self) {
        self.state.lock().unwrap().muted = false;
    }

    /// Engage the capture buffer on top of streaming. The returned guard
    /// releases it on drop.
    pub fn capture(self: &Arc<Self>) -> CaptureGuard {
        self.state.lock().unwrap().capture = Some(Vec::new());
        CaptureGuard {
            sink: Arc::clone(self),
        }
    }

    fn end_capture(&self) {
        self.state.lock().unwrap().capture = None;
    }

    fn captured_stdout(&self) -> String {
        let state = self.state.lock().unwrap();
        state
            .capture
            .as_ref()
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.channel == Channel::Stdout)
                    .map(|event| event.text.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Scoped capture mode. Dropping the guard unconditionally restores the
/// sink to pure streaming.
#[derive(Debug)]
pub struct CaptureGuard {
    sink: Arc<OutputSink>,
}

impl CaptureGuard {
    /// Everything written to stdout since capture was engaged, raw
    /// (newlines included, no line batching).
    pub fn stdout(&self) -> String {
        self.sink.captured_stdout()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.sink.end_capture();
    }
}
