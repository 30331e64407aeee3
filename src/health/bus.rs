//! Typed publish/subscribe bus for health notifications

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::HealthResult;

/// Emitted once per completed check
#[derive(Debug, Clone, PartialEq)]
pub struct HealthEvent {
    pub url: String,
    pub result: HealthResult,
}

/// Identifies one registration; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

enum Subscriber<E> {
    Callback(Handler<E>),
    Channel(mpsc::UnboundedSender<E>),
}

impl<E> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        match self {
            Subscriber::Callback(handler) => Subscriber::Callback(Arc::clone(handler)),
            Subscriber::Channel(sender) => Subscriber::Channel(sender.clone()),
        }
    }
}

/// Event emitter with callback and channel subscribers.
///
/// Handlers run on the publishing task, outside the registry lock, so a
/// handler may subscribe or unsubscribe without deadlocking.
pub struct EventBus<E> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionToken, Subscriber<E>)>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Vec<(SubscriptionToken, Subscriber<E>)>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, subscriber: Subscriber<E>) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry().push((token, subscriber));
        token
    }

    /// Register a callback invoked for every published event
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Subscriber::Callback(Arc::new(handler)))
    }

    /// Receive events on a channel; the registration is dropped once the
    /// receiver goes away.
    pub fn watch(&self) -> (SubscriptionToken, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(Subscriber::Channel(tx)), rx)
    }

    /// Remove exactly one registration; returns whether it existed
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut registry = self.registry();
        let before = registry.len();
        registry.retain(|(id, _)| *id != token);
        before != registry.len()
    }

    /// Deliver `event` to every current subscriber
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<(SubscriptionToken, Subscriber<E>)> = self.registry().clone();
        let mut closed = Vec::new();

        for (token, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(handler) => handler(event),
                Subscriber::Channel(sender) => {
                    if sender.send(event.clone()).is_err() {
                        closed.push(token);
                    }
                }
            }
        }

        if !closed.is_empty() {
            debug!("Dropping {} closed subscriber channel(s)", closed.len());
            self.registry().retain(|(id, _)| !closed.contains(id));
        }
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

pub type HealthBus = EventBus<HealthEvent>;
