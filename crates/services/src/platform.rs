//! Host platform event capability.
//!
//! A session subscribes once when it starts and drops its [`Subscription`]
//! when it terminates, so no listener outlives the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use proctor_core::violation::PlatformSignal;
use tokio::sync::mpsc;

/// Source of raw host signals (visibility, focus, print, clipboard, keys, resize).
pub trait PlatformEvents: Send + Sync {
    /// Start delivering signals to `sender` until the returned subscription is dropped.
    fn subscribe(&self, sender: mpsc::UnboundedSender<PlatformSignal>) -> Subscription;
}

/// Handle for an active listener registration.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<PlatformSignal>>,
}

/// In-process fan-out of platform signals to every subscriber.
#[derive(Clone, Default)]
pub struct BroadcastPlatform {
    listeners: Arc<Mutex<Listeners>>,
}

impl BroadcastPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to all live subscribers; returns how many received it.
    pub fn emit(&self, signal: &PlatformSignal) -> usize {
        let mut guard = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .senders
            .retain(|_, sender| sender.send(signal.clone()).is_ok());
        guard.senders.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }
}

fn unsubscribe(listeners: &Weak<Mutex<Listeners>>, id: u64) {
    if let Some(listeners) = listeners.upgrade() {
        listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .remove(&id);
    }
}

impl PlatformEvents for BroadcastPlatform {
    fn subscribe(&self, sender: mpsc::UnboundedSender<PlatformSignal>) -> Subscription {
        let id = {
            let mut guard = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let id = guard.next_id;
            guard.next_id += 1;
            guard.senders.insert(id, sender);
            id
        };
        tracing::debug!(subscriber = id, "platform listener attached");
        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            unsubscribe(&listeners, id);
            tracing::debug!(subscriber = id, "platform listener detached");
        })
    }
}

impl std::fmt::Debug for BroadcastPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastPlatform")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
