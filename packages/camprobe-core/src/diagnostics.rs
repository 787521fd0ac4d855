//! Injectable diagnostics sink.
//!
//! Components log through `tracing` like the rest of the crate, but callers
//! that want structured progress (a UI, the CLI, a test) hand in a sink and
//! receive every event as it happens.

use crate::discovery::{DiscoveredHost, ScanProgress};
use crate::rtsp::ProbeAttempt;
use std::sync::Arc;

/// Events emitted by scanner and prober sessions.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// Scan phase or progress change
    Scan(ScanProgress),
    /// A new host was added to the discovered list
    HostDiscovered(DiscoveredHost),
    /// One RTSP classification was appended to the attempt log
    Probe(ProbeAttempt),
    /// Human-readable status line changed
    Status(String),
}

/// Callback type receiving diagnostics.
pub type DiagnosticsSink = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Forward `event` to the sink when there is one.
pub(crate) fn emit(sink: &Option<DiagnosticsSink>, event: Diagnostic) {
    if let Some(sink) = sink {
        sink(&event);
    }
}

/// Sink that collects every event, handy for tests and batch callers.
pub fn collecting() -> (DiagnosticsSink, Arc<std::sync::Mutex<Vec<Diagnostic>>>) {
    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    let store = Arc::clone(&events);
    let sink: DiagnosticsSink = Arc::new(move |event: &Diagnostic| {
        if let Ok(mut events) = store.lock() {
            events.push(event.clone());
        }
    });
    (sink, events)
}
