use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, UserId};
use tokio::sync::oneshot;
use tracing::trace;

use crate::platform::InteractionHandle;

/// An inbound gateway event, normalised to what the verification sessions
/// care about.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A direct message arrived from a user
    DirectMessage { author: UserId, channel: ChannelId },
    /// A button was pressed, already acknowledged by the dispatcher
    ButtonPress {
        user: UserId,
        channel: ChannelId,
        custom_id: String,
        interaction: InteractionHandle,
    },
}

type EventPredicate = Box<dyn Fn(&GatewayEvent) -> bool + Send + Sync>;

struct Subscription {
    predicate: EventPredicate,
    tx: oneshot::Sender<GatewayEvent>,
}

/// Routes inbound events to at most one waiting subscriber each.
///
/// A subscription delivers at most one matching event, ever. Registration
/// happens before the subscriber starts waiting, so events arriving in the
/// gap are not lost. Delivery claims the subscription by removing it from
/// the table first; a cancel racing a delivery therefore drops the event
/// rather than double-delivering it.
pub struct EventWaiter {
    next_id: AtomicU64,
    subscriptions: DashMap<u64, Subscription>,
}

impl EventWaiter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscriptions: DashMap::new(),
        }
    }

    /// Register a predicate against the inbound event stream. The receiver
    /// yields the first matching event; dropping the handle unsubscribes.
    pub fn subscribe(
        self: &Arc<Self>,
        predicate: impl Fn(&GatewayEvent) -> bool + Send + Sync + 'static,
    ) -> (oneshot::Receiver<GatewayEvent>, WaitHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.subscriptions.insert(
            id,
            Subscription {
                predicate: Box::new(predicate),
                tx,
            },
        );
        (
            rx,
            WaitHandle {
                id,
                waiter: Arc::clone(self),
            },
        )
    }

    /// Offer an event to the waiting subscribers. Returns true if some
    /// subscriber accepted it; an event goes to at most one.
    pub fn notify(&self, event: &GatewayEvent) -> bool {
        let matching: Vec<u64> = self
            .subscriptions
            .iter()
            .filter(|entry| (entry.value().predicate)(event))
            .map(|entry| *entry.key())
            .collect();

        for id in matching {
            // Removal claims the subscription; a concurrent cancel wins by
            // getting there first
            if let Some((_, subscription)) = self.subscriptions.remove(&id) {
                if subscription.tx.send(event.clone()).is_ok() {
                    trace!("Delivered event to subscription {}", id);
                    return true;
                }
            }
        }
        false
    }
}

impl Default for EventWaiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Tears the subscription down when dropped, so a resolved session can
/// never be woken by a stale event.
pub struct WaitHandle {
    id: u64,
    waiter: Arc<EventWaiter>,
}

impl WaitHandle {
    pub fn cancel(self) {}
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.waiter.subscriptions.remove(&self.id);
    }
}

pub type SharedEventWaiter = Arc<EventWaiter>;

pub fn create_shared_event_waiter() -> SharedEventWaiter {
    Arc::new(EventWaiter::new())
}
