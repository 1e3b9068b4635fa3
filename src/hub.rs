//! Broadcast hub: fans every envelope out to all registered subscribers.
//!
//! The hub owns the live subscriber set. Delivery is attempted independently
//! per subscriber; a failing sink (closed connection, dropped receiver) is
//! pruned after the sweep without affecting delivery to the others. Per
//! source stream, envelopes reach each live subscriber in production order.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::Envelope;
use crate::{AppError, Result};

// ── Subscriber identity and sink ─────────────────────────────────────────────

/// Opaque identity of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SubscriberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Destination capable of accepting an [`Envelope`] and reporting failure.
///
/// Implemented by the channel-backed [`Subscription`] sink; services embed
/// their own implementations (and tests their doubles) via [`Hub::attach`].
pub trait SubscriberSink: Send + Sync {
    /// Deliver one envelope to this subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscriber can no longer accept envelopes;
    /// the hub removes the subscriber after the current broadcast sweep.
    fn deliver(&self, envelope: &Envelope) -> Result<()>;
}

/// Channel-backed sink handed out by [`Hub::subscribe`].
struct ChannelSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl SubscriberSink for ChannelSink {
    fn deliver(&self, envelope: &Envelope) -> Result<()> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| AppError::Io("subscriber channel closed".into()))
    }
}

/// Receiving half of a channel-backed subscription.
///
/// Dropping the subscription (or just its receiver) causes the next delivery
/// attempt to fail, which removes the subscriber from the hub.
pub struct Subscription {
    /// Identity under which the sink is registered.
    pub id: SubscriberId,
    /// Stream of broadcast envelopes, in per-source production order.
    pub rx: mpsc::UnboundedReceiver<Envelope>,
}

// ── Hub ──────────────────────────────────────────────────────────────────────

/// Live subscriber set with best-effort, at-most-once-per-call fan-out.
///
/// Cloning is cheap; all clones share one subscriber set.
#[derive(Clone, Default)]
pub struct Hub {
    subscribers: Arc<Mutex<HashMap<SubscriberId, Arc<dyn SubscriberSink>>>>,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel-backed subscriber and return its receiving half.
    ///
    /// The new subscriber immediately receives a `connection_established`
    /// envelope; it is not broadcast to anyone else.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.attach(Arc::new(ChannelSink { tx }));
        Subscription { id, rx }
    }

    /// Register an externally implemented sink.
    ///
    /// Sends the `connection_established` greeting to this sink only. A sink
    /// that rejects even the greeting is registered anyway and will be pruned
    /// on the first broadcast.
    pub fn attach(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let id = SubscriberId::new();
        if let Err(err) = sink.deliver(&Envelope::connection_established()) {
            warn!(subscriber = %id, %err, "greeting delivery failed");
        }
        self.lock().insert(id, sink);
        debug!(subscriber = %id, "subscriber registered");
        id
    }

    /// Remove a subscriber. Idempotent: unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.lock().remove(&id).is_some() {
            debug!(subscriber = %id, "subscriber removed");
        }
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `envelope` to every registered subscriber.
    ///
    /// The set is snapshot before the sweep, so concurrent subscribe and
    /// unsubscribe calls never corrupt an in-flight broadcast. Subscribers
    /// whose delivery fails are removed after the sweep completes.
    pub fn broadcast(&self, envelope: &Envelope) {
        let snapshot: Vec<(SubscriberId, Arc<dyn SubscriberSink>)> = self
            .lock()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        let mut failed: Vec<SubscriberId> = Vec::new();
        for (id, sink) in snapshot {
            if let Err(err) = sink.deliver(envelope) {
                warn!(subscriber = %id, %err, "delivery failed, pruning subscriber");
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut guard = self.lock();
            for id in failed {
                guard.remove(&id);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, Arc<dyn SubscriberSink>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
