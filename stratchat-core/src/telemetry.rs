//! Turn-level telemetry.
//! By default, nothing is emitted unless a sink is installed via
//! `set_telemetry_sink`.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// One record per chat turn, emitted at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnLog {
    /// Backend identifier, e.g. "http", "null".
    pub backend: Option<String>,

    /// How the session finalized: "sentinel", "end_of_stream", "error".
    pub outcome: Option<String>,

    /// Characters buffered for the assistant response.
    pub chars: Option<u64>,

    /// Number of content deltas received.
    pub deltas: Option<u64>,

    /// Wall time from submit to finalize.
    pub latency_ms: Option<u64>,

    /// Error metadata, if the turn failed.
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn chars(mut self, chars: u64) -> Self {
        self.chars = Some(chars);
        self
    }

    pub fn deltas(mut self, deltas: u64) -> Self {
        self.deltas = Some(deltas);
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    pub fn error(mut self, kind: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self.error_message = Some(message.into());
        self
    }
}

/// Implement this to receive turn records.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record_turn` may be called from any thread; avoid panicking.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record_turn(&self, log: TurnLog);
}

static TELEMETRY_SINK: OnceCell<Arc<dyn TelemetrySink>> = OnceCell::new();

// In tests, gate emission to only the calling test thread to avoid
// cross-test interference.
#[cfg(test)]
thread_local! {
    static TEST_CAPTURE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Install a global telemetry sink. Returns `false` if a sink is already
/// installed. Write-once for the process lifetime.
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) -> bool {
    TELEMETRY_SINK.set(sink).is_ok()
}

/// Emit a turn record if a sink is installed. Crate-visible by design.
#[inline]
pub(crate) fn emit_turn(log: TurnLog) {
    #[cfg(test)]
    {
        if !TEST_CAPTURE.with(|c| c.get()) {
            return;
        }
    }
    if let Some(sink) = TELEMETRY_SINK.get() {
        sink.record_turn(log);
    }
}

#[cfg(test)]
/// Test-only helper: enable or disable capture for the current test thread.
pub fn test_set_capture_enabled(enabled: bool) {
    TEST_CAPTURE.with(|c| c.set(enabled));
}
