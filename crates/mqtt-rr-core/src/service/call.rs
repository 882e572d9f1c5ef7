//! Call and Observable handles, and the client facade that creates them.

use crate::domain::{
    CallId, Request, Response, SubscriptionDelta, TopicFilter, TopicSubscription,
};
use crate::error::{DispatchError, DispatchResult};
use crate::metrics::StatsSnapshot;
use crate::ports::Callback;
use crate::service::dispatcher::Dispatcher;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Client facade over a [`Dispatcher`].
#[derive(Clone)]
pub struct RrClient {
    dispatcher: Dispatcher,
}

impl RrClient {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// One-shot request/reply handle.
    pub fn new_call(&self, request: Request) -> Call {
        Call {
            dispatcher: self.dispatcher.clone(),
            request,
            executed: AtomicBool::new(false),
        }
    }

    /// Persistent observation handle.
    pub fn new_observable(&self, request: Request) -> Observable {
        let key = request
            .correlation_key(&self.dispatcher.config().base_topic)
            .to_string();
        Observable {
            dispatcher: self.dispatcher.clone(),
            request,
            key,
            executed: AtomicBool::new(false),
            registered: Mutex::new(None),
        }
    }

    pub async fn subscribe(
        &self,
        subscriptions: Vec<TopicSubscription>,
    ) -> DispatchResult<SubscriptionDelta> {
        self.dispatcher.subscribe(subscriptions).await
    }

    pub async fn unsubscribe(&self, filters: Vec<TopicFilter>) -> DispatchResult<SubscriptionDelta> {
        self.dispatcher.unsubscribe(filters).await
    }

    /// Reconnect; fails fast with `ReconnectThrottled` inside the window.
    pub async fn reconnect(&self) -> DispatchResult<()> {
        self.dispatcher.reconnect().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl From<Dispatcher> for RrClient {
    fn from(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher)
    }
}

/// One-shot call. Executes at most once, through whichever of
/// [`Call::enqueue`], [`Call::execute`] or [`Call::publish_without_callback`]
/// is used first.
pub struct Call {
    dispatcher: Dispatcher,
    request: Request,
    executed: AtomicBool,
}

impl Call {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    fn claim(&self) -> DispatchResult<()> {
        if self.executed.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyExecuted);
        }
        Ok(())
    }

    /// Submit with a callback. The outcome arrives on the runtime's blocking pool.
    pub fn enqueue<C: Callback>(&self, callback: C) -> DispatchResult<CallId> {
        self.enqueue_shared(Arc::new(callback))
    }

    pub fn enqueue_shared(&self, callback: Arc<dyn Callback>) -> DispatchResult<CallId> {
        self.claim()?;
        Ok(self.dispatcher.submit(self.request.clone(), Some(callback)))
    }

    /// Publish without registering for an answer.
    pub fn publish_without_callback(&self) -> DispatchResult<CallId> {
        self.claim()?;
        Ok(self.dispatcher.submit(self.request.clone(), None))
    }

    /// Submit and wait for the outcome.
    pub async fn execute(&self) -> DispatchResult<Response> {
        self.claim()?;
        let (tx, rx) = oneshot::channel();
        let sink = OneshotCallback {
            sender: Mutex::new(Some(tx)),
        };
        let id = self.dispatcher.submit(self.request.clone(), Some(Arc::new(sink)));
        debug!(call_id = %id, "Awaiting call outcome");
        // A dropped sender means the dispatcher went away with the call pending.
        rx.await.unwrap_or(Err(DispatchError::Closed))
    }
}

struct OneshotCallback {
    sender: Mutex<Option<oneshot::Sender<DispatchResult<Response>>>>,
}

impl OneshotCallback {
    fn send(&self, outcome: DispatchResult<Response>) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl Callback for OneshotCallback {
    fn on_response(&self, response: Response) {
        self.send(Ok(response));
    }

    fn on_failure(&self, error: DispatchError) {
        self.send(Err(error));
    }
}

/// Persistent observation of one correlation key.
pub struct Observable {
    dispatcher: Dispatcher,
    request: Request,
    key: String,
    executed: AtomicBool,
    registered: Mutex<Option<Arc<dyn Callback>>>,
}

impl Observable {
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Correlation key observed.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Start observing. Every message resolving to the key reaches
    /// `callback` until [`Observable::cancel`].
    pub fn subscribe<C: Callback>(&self, callback: C) -> DispatchResult<()> {
        if self.executed.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyExecuted);
        }
        let callback: Arc<dyn Callback> = Arc::new(callback);
        self.dispatcher
            .register_observer(self.key.clone(), callback.clone());
        *self.registered.lock() = Some(callback);
        Ok(())
    }

    /// Stop observing. Deliveries already in flight still complete; a
    /// replacement observer installed by someone else is left alone.
    pub fn cancel(&self) -> bool {
        let Some(callback) = self.registered.lock().take() else {
            debug!(key = %self.key, "Cancel on an observable that never subscribed");
            return false;
        };
        self.dispatcher.unregister_observer_if(&self.key, &callback)
    }

    pub fn is_subscribed(&self) -> bool {
        self.registered.lock().is_some()
    }
}
