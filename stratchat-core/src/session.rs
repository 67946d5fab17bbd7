//! Streaming-session state machine.
//!
//! Contract:
//! - One `StreamSession` is `Open` at a time per widget; `SessionGuard`
//!   rejects a second `begin_session` until the first is finalized or
//!   dropped.
//! - The buffer is append-only while `Open`; chunks are processed strictly
//!   in arrival order.
//! - Finalization happens exactly once, on the `[DONE]` sentinel, on natural
//!   end of stream, or on a transport error. After it, all input is ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreResult, StratChatError};
use crate::render;
use crate::sse::{ChatEvent, LineDecoder, parse_line};

/// Display capability for one message element. The session writes content;
/// it does not own the surface's lifecycle.
pub trait RenderTarget {
    fn set_content(&mut self, html: &str);
}

/// Capability for out-of-band system notices (errors, memory resets). Kept
/// separate from [`RenderTarget`] so failures are never mixed into the
/// assistant's partial buffer.
pub trait NoticeSink {
    fn system_notice(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Finalized,
}

/// How a session reached `Finalized`. Feeds the turn log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishKind {
    Sentinel,
    EndOfStream,
    Error,
}

impl FinishKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sentinel => "sentinel",
            Self::EndOfStream => "end_of_stream",
            Self::Error => "error",
        }
    }
}

/// Per-widget handle enforcing the single-open-session invariant.
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    open: Arc<AtomicBool>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Allocate a session bound to a fresh display surface. Fails with
    /// [`StratChatError::SessionBusy`] while a prior session is still open.
    pub fn begin_session<T: RenderTarget>(&self, target: T) -> CoreResult<StreamSession<T>> {
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StratChatError::SessionBusy);
        }
        Ok(StreamSession {
            decoder: LineDecoder::new(),
            buffer: String::new(),
            state: SessionState::Open,
            finish: None,
            deltas: 0,
            target,
            lease: Some(Lease(Arc::clone(&self.open))),
        })
    }
}

/// Releases the guard slot when the session finalizes or is dropped, so an
/// abandoned turn cannot wedge the widget.
#[derive(Debug)]
struct Lease(Arc<AtomicBool>);

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One outstanding assistant response being streamed and rendered.
pub struct StreamSession<T: RenderTarget> {
    decoder: LineDecoder,
    buffer: String,
    state: SessionState,
    finish: Option<FinishKind>,
    deltas: u64,
    target: T,
    lease: Option<Lease>,
}

impl<T: RenderTarget> StreamSession<T> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Cumulative raw text received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn finish_kind(&self) -> Option<FinishKind> {
        self.finish
    }

    pub fn deltas(&self) -> u64 {
        self.deltas
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Decode one raw chunk and process every line it completes. A trailing
    /// partial line is carried to the next chunk. Once the sentinel is seen,
    /// the rest of this chunk (and everything after) is ignored.
    pub fn consume_chunk(&mut self, bytes: &[u8]) {
        if self.state == SessionState::Finalized {
            return;
        }
        for line in self.decoder.push(bytes) {
            self.handle_line(&line);
            if self.state == SessionState::Finalized {
                break;
            }
        }
    }

    /// Process one already-complete line.
    pub fn handle_line(&mut self, line: &str) {
        if self.state == SessionState::Finalized {
            return;
        }
        match parse_line(line) {
            Some(ChatEvent::Delta(text)) => self.append_delta(&text),
            Some(ChatEvent::Done) => self.finalize(FinishKind::Sentinel),
            None => {}
        }
    }

    /// The transport completed without an explicit sentinel. Flushes any
    /// partial tail line, then finalizes. Idempotent.
    pub fn end_of_stream(&mut self) {
        if self.state == SessionState::Finalized {
            return;
        }
        if let Some(tail) = self.decoder.finish() {
            self.handle_line(&tail);
        }
        if self.state == SessionState::Open {
            self.finalize(FinishKind::EndOfStream);
        }
    }

    /// Force-finalize after a transport error, rendering whatever content
    /// accumulated. The caller surfaces the notice.
    pub fn fail(&mut self) {
        if self.state == SessionState::Open {
            self.finalize(FinishKind::Error);
        }
    }

    fn append_delta(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.deltas += 1;
        let html = render::incremental_html(&self.buffer);
        self.target.set_content(&html);
    }

    fn finalize(&mut self, kind: FinishKind) {
        self.state = SessionState::Finalized;
        self.finish = Some(kind);
        let html = render::final_render(&self.buffer);
        self.target.set_content(&html);
        self.lease.take();
        tracing::debug!(
            outcome = kind.as_str(),
            chars = self.buffer.len(),
            deltas = self.deltas,
            "chat stream finalized"
        );
    }
}
