//! One chat turn: submit a message, consume the streamed response.
//!
//! The read loop is the only suspension point; dropping the returned future
//! abandons the stream with no further surface writes (the session's guard
//! slot is released on drop).

use std::time::Instant;

use futures_util::StreamExt;

use crate::backend::ChatBackend;
use crate::error::{CoreResult, StratChatError};
use crate::normalize;
use crate::session::{FinishKind, NoticeSink, RenderTarget, SessionGuard, SessionState, StreamSession};
use crate::telemetry::{self, TurnLog};

/// Notice appended to the chat surface when a turn fails. Failures are
/// terminal for the exchange; recovery is a new user-initiated submission.
pub const TURN_FAILED_NOTICE: &str = "An error occurred while processing your request.";

/// Run one complete turn against `backend`, rendering into `target`.
///
/// Rejected with [`StratChatError::SessionBusy`] while a previous turn for
/// the same `guard` is still streaming. On success returns the full
/// assistant text. On any transport error the session is force-finalized, a
/// system notice goes to `notices`, and the error is returned.
pub async fn stream_turn<B, T, N>(
    backend: &B,
    guard: &SessionGuard,
    target: T,
    notices: &mut N,
    message: &str,
) -> CoreResult<String>
where
    B: ChatBackend + ?Sized,
    T: RenderTarget,
    N: NoticeSink,
{
    let message = normalize::normalize_message(message)?;
    let mut session = guard.begin_session(target)?;
    let started = Instant::now();

    let mut stream = match backend.chat_stream(&message).await {
        Ok(stream) => stream,
        Err(err) => {
            session.fail();
            notices.system_notice(TURN_FAILED_NOTICE);
            emit_failure(backend.name(), &session, started, &err);
            return Err(err);
        }
    };

    while session.state() == SessionState::Open {
        match stream.next().await {
            Some(Ok(chunk)) => session.consume_chunk(&chunk),
            Some(Err(err)) => {
                session.fail();
                notices.system_notice(TURN_FAILED_NOTICE);
                emit_failure(backend.name(), &session, started, &err);
                return Err(err);
            }
            None => session.end_of_stream(),
        }
    }

    telemetry::emit_turn(
        turn_log(backend.name(), &session).latency_ms(started.elapsed().as_millis() as u64),
    );
    Ok(session.buffer().to_string())
}

fn turn_log<T: RenderTarget>(backend: &str, session: &StreamSession<T>) -> TurnLog {
    TurnLog::new()
        .backend(backend)
        .outcome(session.finish_kind().map_or("error", FinishKind::as_str))
        .chars(session.buffer().len() as u64)
        .deltas(session.deltas())
}

fn emit_failure<T: RenderTarget>(
    backend: &str,
    session: &StreamSession<T>,
    started: Instant,
    err: &StratChatError,
) {
    tracing::warn!(error = %err, "chat turn failed");
    telemetry::emit_turn(
        turn_log(backend, session)
            .latency_ms(started.elapsed().as_millis() as u64)
            .error(err.kind(), err.to_string()),
    );
}
