//! Dispatcher: the request/reply and observation engine.
//!
//! ## Flow
//!
//! 1. `submit()` checks connectivity, registers a [`PendingTask`] and arms its
//!    deadline (one registry critical section), then queues the publish on the
//!    single submission worker.
//! 2. The transport reports inbound messages as [`TransportEvent`]s; the event
//!    loop hands them to `on_inbound_message()`, which resolves the correlation
//!    key, notifies the key's observer, pops the oldest pending task for the
//!    key and disarms its deadline.
//! 3. If the deadline fires first the waiter calls `on_timeout()`.
//!
//! Whichever path removes a task from the registry completes it; the other
//! finds nothing and does nothing. Completions and observer notifications run
//! on the blocking pool, never on the submitting task, the event loop or the
//! timeout waiter. Each observer drains its own queue, one response at a time.
//!
//! Lock order is registry, then timeout queue. The timeout waiter releases
//! the queue lock before it touches the registry.
//!
//! `shutdown()` drains the registry, which also closes it: a submission that
//! passed the `closed` check but registers afterwards gets its task back and
//! fails it with `Closed` itself.

use crate::domain::{
    CallId, CorrelationResolver, DispatcherConfig, PendingRegistry, PendingTask, Request,
    ResolverChain, Response, ResponseBody, SubscriptionBook, SubscriptionDelta, TopicFilter,
    TopicSubscription,
};
use crate::error::{ConfigError, DispatchError, DispatchResult};
use crate::metrics::{DispatchStats, StatsSnapshot};
use crate::ports::{Callback, Transport, TransportEvent};
use crate::service::observers::ObserverSlot;
use crate::service::reconnect::ReconnectGuard;
use crate::service::scheduler::{TimeoutHandler, TimeoutScheduler};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    resolvers: Vec<Arc<dyn CorrelationResolver>>,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            resolvers: Vec::new(),
            runtime: None,
        }
    }

    /// Append a resolver; resolvers are tried in the order added.
    pub fn resolver<R: CorrelationResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn shared_resolver(mut self, resolver: Arc<dyn CorrelationResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Runtime hosting the worker tasks. Defaults to the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate configuration and start the worker tasks.
    pub fn build(
        self,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Result<Dispatcher, ConfigError> {
        self.config.validate()?;
        let resolvers = ResolverChain::new(self.resolvers)?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };

        let mut book = SubscriptionBook::new();
        book.subscribe(&self.config.subscriptions);

        let (outbound, submissions) = mpsc::unbounded_channel();
        let reconnect = ReconnectGuard::new(self.config.reconnect_window);
        let config = self.config;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            scheduler: TimeoutScheduler::start(&runtime, weak.clone()),
            config,
            transport,
            resolvers,
            registry: PendingRegistry::new(),
            observers: DashMap::new(),
            subscriptions: Mutex::new(book),
            subscription_ops: tokio::sync::Mutex::new(()),
            outbound,
            reconnect,
            stats: DispatchStats::new(),
            runtime: runtime.clone(),
            closed: AtomicBool::new(false),
        });

        runtime.spawn(run_submissions(Arc::downgrade(&inner), submissions));
        runtime.spawn(run_events(Arc::downgrade(&inner), events));

        if inner.transport.is_connected() {
            let weak = Arc::downgrade(&inner);
            runtime.spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.replay_subscriptions().await;
                }
            });
        }

        info!(
            resolvers = ?inner.resolvers,
            default_timeout_ms = inner.config.default_timeout.as_millis() as u64,
            charset = %inner.config.charset,
            "Dispatcher started"
        );

        Ok(Dispatcher { inner })
    }
}

/// A publish queued for the submission worker.
struct Outbound {
    id: CallId,
    topic: String,
    payload: Vec<u8>,
    qos: u8,
    retained: bool,
    tracked: bool,
}

struct Inner {
    config: DispatcherConfig,
    transport: Arc<dyn Transport>,
    resolvers: ResolverChain,
    registry: PendingRegistry,
    scheduler: TimeoutScheduler,
    observers: DashMap<String, Arc<ObserverSlot>>,
    subscriptions: Mutex<SubscriptionBook>,
    /// Serializes book changes with their transport round trips.
    subscription_ops: tokio::sync::Mutex<()>,
    outbound: mpsc::UnboundedSender<Outbound>,
    reconnect: ReconnectGuard,
    stats: DispatchStats,
    runtime: Handle,
    closed: AtomicBool,
}

impl Inner {
    fn submit(&self, request: Request, callback: Option<Arc<dyn Callback>>) -> CallId {
        let id = CallId::new();

        if self.closed.load(Ordering::Acquire) {
            debug!(call_id = %id, "Submission after shutdown");
            if let Some(callback) = callback {
                callback.on_failure(DispatchError::Closed);
            }
            return id;
        }

        if !self.transport.is_connected() {
            DispatchStats::incr(&self.stats.rejected_disconnected);
            warn!(call_id = %id, "Transport not connected, submission rejected");
            if let Some(callback) = callback {
                callback.on_failure(DispatchError::Connection);
            }
            return id;
        }

        let base = self.config.base_topic.as_str();
        let topic = request.effective_topic(base).to_string();
        let qos = request.qos().unwrap_or(self.config.default_qos);
        let retained = request.retained().unwrap_or(self.config.retained);
        let tracked = callback.is_some();

        if let Some(callback) = callback {
            let key = request.correlation_key(base).to_string();
            let timeout = request.timeout().unwrap_or(self.config.default_timeout);
            let now = Instant::now();
            let task = PendingTask::new(id, key, now, now + timeout, callback);
            debug!(
                call_id = %id,
                key = %task.key,
                topic = %topic,
                timeout_ms = timeout.as_millis() as u64,
                tag = request.tag().unwrap_or_default(),
                "Registered pending call"
            );
            let registered = self
                .registry
                .register_with(task, |task| self.scheduler.arm(task.id, task.deadline));
            if let Err(task) = registered {
                debug!(call_id = %id, "Registry closed by shutdown");
                task.complete(Err(DispatchError::Closed));
                return id;
            }
        }

        DispatchStats::incr(&self.stats.submitted);
        let job = Outbound {
            id,
            topic,
            payload: request.into_payload(),
            qos,
            retained,
            tracked,
        };
        if self.outbound.send(job).is_err() {
            self.fail_local(id, DispatchError::Closed);
        }
        id
    }

    async fn publish(&self, job: Outbound) {
        match self
            .transport
            .publish(&job.topic, job.payload, job.qos, job.retained)
            .await
        {
            Ok(()) => {
                debug!(call_id = %job.id, topic = %job.topic, "Published");
            }
            Err(cause) => {
                DispatchStats::incr(&self.stats.publish_failures);
                warn!(call_id = %job.id, topic = %job.topic, error = %cause, "Publish failed");
                if job.tracked {
                    self.fail_local(job.id, DispatchError::Publish { cause });
                }
            }
        }
    }

    /// Tear down a pending call and fail it, bypassing its deadline.
    fn fail_local(&self, id: CallId, error: DispatchError) {
        if let Some(task) = self.registry.remove(&id) {
            self.scheduler.disarm(&id);
            DispatchStats::incr(&self.stats.failed_locally);
            self.deliver(task, Err(error));
        }
    }

    fn on_inbound_message(&self, topic: &str, payload: Vec<u8>) -> DispatchResult<String> {
        let data = self.config.charset.decode(&payload);
        let body = ResponseBody::new(topic, payload, data);

        let key = match self.resolvers.resolve(&body) {
            Ok(key) => key,
            Err(e) => {
                DispatchStats::incr(&self.stats.unmatched);
                error!(topic = %topic, error = %e, "Inbound message matched no resolver");
                return Err(e);
            }
        };

        let response = Response::ok(body);

        let observer = self.observers.get(&key).map(|entry| entry.value().clone());
        if let Some(observer) = observer {
            DispatchStats::incr(&self.stats.observer_deliveries);
            debug!(key = %key, topic = %topic, "Notifying observer");
            observer.push(response.clone(), &self.runtime);
        }

        if let Some(task) = self.registry.take_first(&key) {
            self.scheduler.disarm(&task.id);
            DispatchStats::incr(&self.stats.resolved);
            debug!(
                call_id = %task.id,
                key = %key,
                elapsed_ms = task.created_at.elapsed().as_millis() as u64,
                "Resolved pending call"
            );
            self.deliver(task, Ok(response));
        }

        Ok(key)
    }

    fn deliver(&self, task: PendingTask, result: Result<Response, DispatchError>) {
        self.runtime.spawn_blocking(move || {
            if !task.complete(result) {
                debug!(call_id = %task.id, "Completion already claimed");
            }
        });
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { reconnect } => {
                info!(reconnect, "Transport connected");
                self.replay_subscriptions().await;
            }
            TransportEvent::ConnectionLost(cause) => {
                warn!(cause = %cause, "Transport connection lost");
            }
            TransportEvent::MessageArrived { topic, payload } => {
                // Resolution failures are logged and counted inside.
                let _ = self.on_inbound_message(&topic, payload);
            }
            TransportEvent::ActionResult(Ok(())) => {
                debug!("Transport action completed");
            }
            TransportEvent::ActionResult(Err(e)) => {
                warn!(error = %e, "Transport action failed");
            }
        }
    }

    async fn replay_subscriptions(&self) {
        if !self.config.auto_subscribe {
            return;
        }
        let topics = self.subscriptions.lock().replay();
        if topics.is_empty() {
            return;
        }
        let count = topics.len();
        match self.transport.subscribe(topics).await {
            Ok(()) => debug!(count, "Re-issued recorded subscriptions"),
            Err(e) => warn!(error = %e, count, "Failed to re-issue subscriptions"),
        }
    }

    /// Push a book change to the transport: new filters first, then the
    /// ones they replace. A failure leaves the transport as it was.
    async fn apply(&self, delta: &SubscriptionDelta) -> Result<(), DispatchError> {
        if !delta.subscribe.is_empty() {
            self.transport.subscribe(delta.subscribe.clone()).await?;
        }
        if !delta.unsubscribe.is_empty() {
            if let Err(e) = self.transport.unsubscribe(delta.unsubscribe.clone()).await {
                let added: Vec<String> = delta.subscribe.iter().map(|(f, _)| f.clone()).collect();
                if !added.is_empty() {
                    if let Err(undo) = self.transport.unsubscribe(added).await {
                        error!(error = %undo, "Failed to revert subscriptions");
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Update the book with `change` and push the result to the transport.
    /// The book is restored when the transport refuses.
    async fn change_subscriptions<F>(&self, change: F) -> DispatchResult<SubscriptionDelta>
    where
        F: FnOnce(&mut SubscriptionBook) -> SubscriptionDelta,
    {
        let _serial = self.subscription_ops.lock().await;
        let (delta, previous) = {
            let mut book = self.subscriptions.lock();
            let previous = book.clone();
            (change(&mut book), previous)
        };
        if let Err(e) = self.apply(&delta).await {
            warn!(error = %e, ?delta, "Subscription change refused, book restored");
            *self.subscriptions.lock() = previous;
            return Err(e);
        }
        Ok(delta)
    }
}

impl TimeoutHandler for Inner {
    fn on_timeout(&self, id: CallId) {
        let Some(task) = self.registry.remove(&id) else {
            debug!(call_id = %id, "Deadline elapsed for an already resolved call");
            return;
        };
        DispatchStats::incr(&self.stats.timed_out);
        let waited = task.budget();
        warn!(
            call_id = %id,
            key = %task.key,
            waited_ms = waited.as_millis() as u64,
            "Pending call timed out"
        );
        self.deliver(task, Err(DispatchError::Timeout { call_id: id, waited }));
    }
}

async fn run_submissions(inner: Weak<Inner>, mut jobs: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(job) = jobs.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        inner.publish(job).await;
    }
    debug!("Submission worker stopped");
}

async fn run_events(inner: Weak<Inner>, mut events: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        inner.handle_event(event).await;
    }
    debug!("Transport event loop stopped");
}

/// Handle to the dispatch engine. Cheap to clone; the worker tasks stop once
/// the last handle is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Submit a request.
    ///
    /// Without a callback the publish is fire-and-forget and nothing is
    /// registered. When the transport is disconnected the callback receives
    /// `Connection` before this returns and nothing is registered.
    pub fn submit(&self, request: Request, callback: Option<Arc<dyn Callback>>) -> CallId {
        self.inner.submit(request, callback)
    }

    /// Install (or replace) the observer for `key`. Returns `true` when an
    /// existing observer was replaced.
    pub fn register_observer(&self, key: impl Into<String>, callback: Arc<dyn Callback>) -> bool {
        let key = key.into();
        debug!(key = %key, "Registering observer");
        self.inner
            .observers
            .insert(key, ObserverSlot::new(callback))
            .is_some()
    }

    /// Remove the observer for `key`. No-op if absent.
    pub fn unregister_observer(&self, key: &str) -> bool {
        self.inner.observers.remove(key).is_some()
    }

    /// Remove the observer for `key` only if it is `callback`.
    pub fn unregister_observer_if(&self, key: &str, callback: &Arc<dyn Callback>) -> bool {
        self.inner
            .observers
            .remove_if(key, |_, current| current.holds(callback))
            .is_some()
    }

    /// Feed one inbound message through resolution and matching.
    ///
    /// Returns the resolved key, or `NoResolverMatched` when every resolver
    /// declined; in that case nothing is resolved and any call waiting on the
    /// message runs into its deadline.
    pub fn on_inbound_message(&self, topic: &str, payload: Vec<u8>) -> DispatchResult<String> {
        self.inner.on_inbound_message(topic, payload)
    }

    /// Subscribe at the transport, honoring wildcard coverage.
    ///
    /// On a transport failure both the book and the transport are left as
    /// they were.
    pub async fn subscribe(
        &self,
        subscriptions: Vec<TopicSubscription>,
    ) -> DispatchResult<SubscriptionDelta> {
        if !self.inner.transport.is_connected() {
            return Err(DispatchError::Connection);
        }
        self.inner
            .change_subscriptions(|book| book.subscribe(&subscriptions))
            .await
    }

    /// Release subscriptions; shadowed filters are restored at the transport.
    pub async fn unsubscribe(&self, filters: Vec<TopicFilter>) -> DispatchResult<SubscriptionDelta> {
        if !self.inner.transport.is_connected() {
            return Err(DispatchError::Connection);
        }
        self.inner
            .change_subscriptions(|book| book.unsubscribe(&filters))
            .await
    }

    /// Reconnect the transport, at most once per reconnect window.
    pub async fn reconnect(&self) -> DispatchResult<()> {
        self.inner.reconnect.try_acquire()?;
        info!("Reconnecting transport");
        self.inner.transport.connect().await?;
        Ok(())
    }

    /// Fail every pending call with `Closed` and refuse further submissions.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = self.inner.registry.drain();
        self.inner.scheduler.close();
        self.inner.observers.clear();
        info!(pending = tasks.len(), "Dispatcher shutting down");
        for task in tasks {
            self.inner.deliver(task, Err(DispatchError::Closed));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Calls awaiting a match or a deadline.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Armed timeout entries.
    pub fn armed_count(&self) -> usize {
        self.inner.scheduler.len()
    }

    /// Calls queued under `key`.
    pub fn queue_len(&self, key: &str) -> usize {
        self.inner.registry.queue_len(key)
    }

    pub fn is_pending(&self, id: &CallId) -> bool {
        self.inner.registry.is_pending(id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Filters currently subscribed at the transport.
    pub fn active_subscriptions(&self) -> Vec<String> {
        self.inner
            .subscriptions
            .lock()
            .active()
            .into_iter()
            .map(|f| f.to_string())
            .collect()
    }
}
