//! The message bus
//!
//! A publish does three things in order:
//!
//! 1. every exchange routes the topic into its bound queues (a queue receives a
//!    message at most once per publish, overflow goes to the dead-letter queue);
//! 2. a pending request waiting on the message's correlation id is resolved;
//! 3. matching subscriptions are delivered to one at a time, in registration order,
//!    each through its own circuit breaker.
//!
//! Locks are `std::sync` and are released before any handler is awaited.

use crate::config::{BusConfig, DEFAULT_EXCHANGE};
use crate::error::{BusError, HandlerError};
use crate::exchange::{Exchange, ExchangeStrategy};
use crate::handler::{MessageHandler, SubscriptionId};
use crate::message::{Message, MessageKind};
use crate::queue::{Queue, QueueHandle, QueueOptions, QueueStats};
use crate::topic::TopicPattern;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core_resilience::{
    CircuitBreaker, CircuitBreakerStats, CircuitError, DeadLetterEntry, DeadLetterQueue,
    DeadLetterStats, FailureReason,
};

/// Prefix of the per-request reply topic
pub const REPLY_TOPIC_PREFIX: &str = "_reply";

pub fn reply_topic(correlation_id: Uuid) -> String {
    format!("{}.{}", REPLY_TOPIC_PREFIX, correlation_id)
}

/// Per-publish overrides; unset fields use the bus defaults
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub kind: Option<MessageKind>,
    pub priority: Option<u8>,
    pub ttl: Option<Duration>,
    pub correlation_id: Option<Uuid>,
    pub reply_to: Option<String>,
}

impl PublishOptions {
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    /// False when no queue, subscriber or pending request matched
    pub routed: bool,
    pub message_id: Uuid,
    /// Queues that accepted the message
    pub queues: Vec<String>,
    /// Subscriptions whose pattern matched
    pub handlers: usize,
    /// Subscriptions that handled the message successfully
    pub delivered: usize,
}

/// Bus-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub routed: u64,
    pub unroutable: u64,
    pub delivered: u64,
    pub handler_failures: u64,
    pub dead_lettered: u64,
    pub pending_requests: usize,
    pub exchanges: usize,
    pub subscriptions: usize,
    pub queues: Vec<QueueStats>,
    pub dead_letter: DeadLetterStats,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    routed: AtomicU64,
    unroutable: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    dead_lettered: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    handler: Arc<dyn MessageHandler>,
    breaker: CircuitBreaker,
}

impl Subscription {
    fn destination(&self) -> String {
        format!("subscription:{}", self.id)
    }
}

/// Result of routing one message, before handler delivery
struct Routing {
    matched_queues: usize,
    accepted_queues: Vec<String>,
    handlers: Vec<Arc<Subscription>>,
    reply_resolved: bool,
}

impl Routing {
    fn routed(&self) -> bool {
        self.matched_queues > 0 || !self.handlers.is_empty() || self.reply_resolved
    }
}

struct BusInner {
    config: BusConfig,
    exchanges: RwLock<BTreeMap<String, Exchange>>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Value>>>,
    dead_letters: Mutex<DeadLetterQueue<Message>>,
    counters: Counters,
}

/// In-process topic-routed message bus
///
/// Cloning is cheap; clones share the same queues, exchanges and subscriptions.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl MessageBus {
    /// Create a bus with the default topic exchange
    pub fn new(config: BusConfig) -> Self {
        let mut exchanges = BTreeMap::new();
        exchanges.insert(
            DEFAULT_EXCHANGE.to_string(),
            Exchange::new(DEFAULT_EXCHANGE, ExchangeStrategy::Topic),
        );

        Self {
            inner: Arc::new(BusInner {
                dead_letters: Mutex::new(DeadLetterQueue::new(config.dead_letter_capacity)),
                config,
                exchanges: RwLock::new(exchanges),
                queues: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(Vec::new()),
                pending: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Create a queue, or return the existing one with the same name
    pub fn create_queue(&self, name: &str, options: QueueOptions) -> Result<QueueHandle, BusError> {
        if name.trim().is_empty() {
            return Err(BusError::InvalidMessage("queue name is empty".to_string()));
        }

        let mut queues = write(&self.inner.queues);
        if let Some(queue) = queues.get(name) {
            debug!(queue = name, "queue already exists");
            return Ok(QueueHandle {
                queue: queue.clone(),
            });
        }

        let queue = Arc::new(Queue::new(name, options));
        queues.insert(name.to_string(), queue.clone());
        info!(queue = name, "queue created");
        Ok(QueueHandle { queue })
    }

    pub fn create_exchange(&self, name: &str, strategy: ExchangeStrategy) -> Result<(), BusError> {
        if name.trim().is_empty() {
            return Err(BusError::InvalidMessage("exchange name is empty".to_string()));
        }

        let mut exchanges = write(&self.inner.exchanges);
        if exchanges.contains_key(name) {
            return Err(BusError::ExchangeExists(name.to_string()));
        }
        exchanges.insert(name.to_string(), Exchange::new(name, strategy));
        info!(exchange = name, ?strategy, "exchange created");
        Ok(())
    }

    /// Bind a queue to an exchange; `Ok(false)` when either side is unknown
    pub fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<bool, BusError> {
        if !read(&self.inner.queues).contains_key(queue) {
            return Ok(false);
        }

        let mut exchanges = write(&self.inner.exchanges);
        let Some(target) = exchanges.get_mut(exchange) else {
            return Ok(false);
        };
        target.bind(queue, pattern)?;
        debug!(queue, exchange, pattern, "queue bound");
        Ok(true)
    }

    /// Register a handler for every topic matching `pattern`
    pub fn subscribe<H: MessageHandler>(
        &self,
        pattern: &str,
        handler: H,
    ) -> Result<SubscriptionId, BusError> {
        let pattern = TopicPattern::parse(pattern)?;
        let id = SubscriptionId::new();
        let subscription = Subscription {
            id,
            breaker: CircuitBreaker::new(
                format!("subscription:{}", id),
                self.inner.config.breaker_config(),
            ),
            pattern,
            handler: Arc::new(handler),
        };

        debug!(subscription = %id, pattern = %subscription.pattern, "subscribed");
        write(&self.inner.subscriptions).push(Arc::new(subscription));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = write(&self.inner.subscriptions);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    /// Build and publish a message
    pub async fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, BusError> {
        let message = self.build_message(topic, payload, options)?;
        Ok(self.publish_message(message).await)
    }

    /// Publish an already-built message
    pub async fn publish_message(&self, message: Message) -> PublishReceipt {
        bump(&self.inner.counters.published);
        let routing = self.route(&message);
        let routed = routing.routed();
        if !routed {
            self.record_unroutable(&message);
        }

        let delivered = self.deliver(&routing.handlers, &message).await;

        PublishReceipt {
            routed,
            message_id: message.id(),
            queues: routing.accepted_queues,
            handlers: routing.handlers.len(),
            delivered,
        }
    }

    /// Publish a request and wait for its reply
    ///
    /// Fails fast with [`BusError::NoRoute`] when nothing can receive the request.
    pub async fn request(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        let correlation_id = Uuid::new_v4();
        let message = self.build_message(
            topic,
            payload,
            PublishOptions::default()
                .with_kind(MessageKind::Request)
                .with_correlation_id(correlation_id),
        )?;

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(correlation_id, tx);

        bump(&self.inner.counters.published);
        let routing = self.route(&message);
        if !routing.routed() {
            lock(&self.inner.pending).remove(&correlation_id);
            self.record_unroutable(&message);
            return Err(BusError::NoRoute(topic.to_string()));
        }

        if !routing.handlers.is_empty() {
            let bus = self.clone();
            let handlers = routing.handlers;
            tokio::spawn(async move {
                bus.deliver(&handlers, &message).await;
            });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BusError::ReplyDropped(topic.to_string())),
            Err(_) => {
                lock(&self.inner.pending).remove(&correlation_id);
                warn!(topic, ?timeout, "request timed out");
                Err(BusError::Timeout {
                    topic: topic.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Answer a request message
    pub async fn reply(&self, request: &Message, payload: Value) -> Result<PublishReceipt, BusError> {
        let (Some(correlation_id), Some(reply_to)) = (request.correlation_id(), request.reply_to())
        else {
            return Err(BusError::InvalidMessage(format!(
                "message {} carries no reply address",
                request.id()
            )));
        };

        let message = Message::builder(reply_to, payload)
            .kind(MessageKind::Reply)
            .priority(request.priority())
            .ttl(self.inner.config.default_ttl())
            .correlation_id(correlation_id)
            .build()?;
        Ok(self.publish_message(message).await)
    }

    /// Pop the next live message; expired ones are dead-lettered on the way
    pub fn dequeue(&self, queue: &str) -> Result<Option<Message>, BusError> {
        let queue = self.queue(queue)?;
        while let Some(message) = queue.pop() {
            if message.is_expired() {
                self.dead_letter(message, queue.name(), FailureReason::Expired, "ttl elapsed");
                continue;
            }
            return Ok(Some(message));
        }
        Ok(None)
    }

    pub fn queue_depth(&self, queue: &str) -> Result<usize, BusError> {
        Ok(self.queue(queue)?.depth())
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry<Message>> {
        lock(&self.inner.dead_letters).entries().iter().cloned().collect()
    }

    pub fn drain_dead_letters(&self) -> Vec<DeadLetterEntry<Message>> {
        lock(&self.inner.dead_letters).drain()
    }

    pub fn dead_letter_stats(&self) -> DeadLetterStats {
        lock(&self.inner.dead_letters).stats()
    }

    /// Breaker snapshots in subscription order
    pub fn get_circuit_breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        read(&self.inner.subscriptions)
            .iter()
            .map(|s| s.breaker.stats())
            .collect()
    }

    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.counters;
        let mut queues: Vec<QueueStats> = read(&self.inner.queues)
            .values()
            .map(|q| QueueStats::from(q.as_ref()))
            .collect();
        queues.sort_by(|a, b| a.name.cmp(&b.name));

        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            routed: counters.routed.load(Ordering::Relaxed),
            unroutable: counters.unroutable.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            handler_failures: counters.handler_failures.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
            pending_requests: lock(&self.inner.pending).len(),
            exchanges: read(&self.inner.exchanges).len(),
            subscriptions: read(&self.inner.subscriptions).len(),
            queues,
            dead_letter: self.dead_letter_stats(),
        }
    }

    fn queue(&self, name: &str) -> Result<Arc<Queue>, BusError> {
        read(&self.inner.queues)
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::QueueNotFound(name.to_string()))
    }

    fn build_message(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<Message, BusError> {
        let mut builder = Message::builder(topic, payload)
            .kind(options.kind.unwrap_or_default())
            .priority(options.priority.unwrap_or(self.inner.config.default_priority))
            .ttl(options.ttl.unwrap_or_else(|| self.inner.config.default_ttl()));

        if let Some(correlation_id) = options.correlation_id {
            builder = builder.correlation_id(correlation_id);
        }
        match options.reply_to {
            Some(reply_to) => builder = builder.reply_to(reply_to),
            None if options.kind == Some(MessageKind::Request) => {
                if let Some(correlation_id) = options.correlation_id {
                    builder = builder.reply_to(reply_topic(correlation_id));
                }
            }
            None => {}
        }
        builder.build()
    }

    fn route(&self, message: &Message) -> Routing {
        let topic = message.topic();

        let queue_names: BTreeSet<String> = read(&self.inner.exchanges)
            .values()
            .flat_map(|exchange| exchange.route(topic))
            .map(str::to_string)
            .collect();

        let targets: Vec<Arc<Queue>> = {
            let queues = read(&self.inner.queues);
            queue_names
                .iter()
                .filter_map(|name| queues.get(name).cloned())
                .collect()
        };

        let mut accepted_queues = Vec::with_capacity(targets.len());
        for queue in &targets {
            let outcome = queue.enqueue(message.clone());
            for evicted in outcome.evicted {
                self.dead_letter(evicted, queue.name(), FailureReason::Evicted, "evicted to admit a newer message");
            }
            match outcome.rejected {
                Some(rejected) => {
                    let reason = format!("queue '{}' is full", queue.name());
                    self.dead_letter(rejected, queue.name(), FailureReason::QueueFull, reason);
                }
                None => accepted_queues.push(queue.name().to_string()),
            }
        }

        let handlers: Vec<Arc<Subscription>> = read(&self.inner.subscriptions)
            .iter()
            .filter(|s| s.pattern.matches(topic))
            .cloned()
            .collect();

        let reply_resolved = match (message.kind(), message.correlation_id()) {
            (MessageKind::Reply, Some(correlation_id)) => lock(&self.inner.pending)
                .remove(&correlation_id)
                .map(|tx| tx.send(message.payload().clone()).is_ok())
                .unwrap_or(false),
            _ => false,
        };

        let routing = Routing {
            matched_queues: targets.len(),
            accepted_queues,
            handlers,
            reply_resolved,
        };
        if routing.routed() {
            bump(&self.inner.counters.routed);
        }
        debug!(
            topic,
            message_id = %message.id(),
            queues = routing.matched_queues,
            handlers = routing.handlers.len(),
            reply = routing.reply_resolved,
            "routed"
        );
        routing
    }

    /// Deliver sequentially; returns the number of successful handlers
    async fn deliver(&self, handlers: &[Arc<Subscription>], message: &Message) -> usize {
        let mut delivered = 0;
        for subscription in handlers {
            if self.deliver_one(subscription, message).await {
                delivered += 1;
            }
        }
        delivered
    }

    async fn deliver_one(&self, subscription: &Subscription, message: &Message) -> bool {
        let attempts = self.inner.config.max_redeliveries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let handler = subscription.handler.clone();
            let msg = message.clone();
            let result = subscription
                .breaker
                .execute(|| async move {
                    AssertUnwindSafe(handler.handle(msg))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")))
                })
                .await;

            match result {
                Ok(()) => {
                    bump(&self.inner.counters.delivered);
                    return true;
                }
                Err(CircuitError::Open { retry_in, .. }) => {
                    warn!(
                        subscription = %subscription.id,
                        topic = message.topic(),
                        ?retry_in,
                        "subscriber circuit open, skipping"
                    );
                    self.dead_letter(
                        message.clone(),
                        subscription.destination(),
                        FailureReason::CircuitOpen,
                        format!("circuit open, retry in {:?}", retry_in),
                    );
                    return false;
                }
                Err(CircuitError::Inner(e)) => {
                    bump(&self.inner.counters.handler_failures);
                    warn!(
                        subscription = %subscription.id,
                        topic = message.topic(),
                        attempt,
                        error = %e,
                        "handler failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        self.dead_letter(
            message.clone(),
            subscription.destination(),
            FailureReason::RetriesExhausted { attempts },
            last_error,
        );
        false
    }

    fn record_unroutable(&self, message: &Message) {
        bump(&self.inner.counters.unroutable);
        debug!(topic = message.topic(), message_id = %message.id(), "no route");
        if self.inner.config.dead_letter_unroutable {
            self.dead_letter(message.clone(), message.topic(), FailureReason::Unroutable, "no route");
        }
    }

    fn dead_letter(
        &self,
        message: Message,
        destination: impl Into<String>,
        reason: FailureReason,
        error: impl Into<String>,
    ) {
        let destination = destination.into();
        warn!(
            message_id = %message.id(),
            topic = message.topic(),
            destination = %destination,
            reason = %reason,
            "message dead-lettered"
        );
        bump(&self.inner.counters.dead_lettered);
        lock(&self.inner.dead_letters).push(DeadLetterEntry::new(message, destination, reason, error));
    }
}
