//! Inbound Ports (Driving Ports)
//!
//! Callers hand the dispatcher a [`Callback`]; every outcome of a call,
//! success or failure, is delivered through it exactly once.

use crate::domain::Response;
use crate::error::DispatchError;

/// Receiver of a call's (or an observer's) outcome.
///
/// Invoked on the runtime's blocking pool, never on the transport's inbound
/// task or the timeout waiter, so a slow callback does not stall matching or
/// deadlines. A submission refused up front (disconnected, shut down) fails on
/// the caller's thread before `submit` returns. An observer receives its
/// responses one at a time, in the order they arrived.
pub trait Callback: Send + Sync + 'static {
    fn on_response(&self, response: Response);

    fn on_failure(&self, error: DispatchError);
}

impl<F> Callback for F
where
    F: Fn(Result<Response, DispatchError>) + Send + Sync + 'static,
{
    fn on_response(&self, response: Response) {
        self(Ok(response))
    }

    fn on_failure(&self, error: DispatchError) {
        self(Err(error))
    }
}
