//! Runs a single callback under a context deadline with a deterministic
//! outcome when the deadline and completion race.

use super::Context;
use crate::error::{ArmatureError, Result};
use std::future::Future;

/// Execute `fut` on a worker task, racing it against `ctx`.
///
/// Returns the callback's result, the context's error when the deadline
/// elapses or the context is cancelled, or [`ArmatureError::CallbackExited`]
/// when the worker terminates without producing a value. A callback that
/// completes once the context is already done yields the context's error, not
/// its own result, so tests never flake on which side of the race the
/// scheduler lands.
///
/// The worker is never force-aborted on timeout; context cancellation is the
/// handoff, and callbacks are expected to watch [`Context::done`].
pub(crate) async fn run_with_deadline<F>(ctx: &Context, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    if let Some(err) = ctx.error() {
        return Err(err);
    }

    let mut worker = tokio::spawn(fut);
    tokio::select! {
        _ = ctx.done() => Err(ctx.error().unwrap_or(ArmatureError::Cancelled)),
        joined = &mut worker => {
            if let Some(err) = ctx.error() {
                return Err(err);
            }
            match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => {
                    std::panic::resume_unwind(join_err.into_panic())
                }
                Err(_) => Err(ArmatureError::CallbackExited),
            }
        }
    }
}
