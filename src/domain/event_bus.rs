//! Broadcast channel for domain events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Services publish a
//! [`LedgerEvent`] after every committed mutation, and the notification
//! dispatcher subscribes at startup.

use tokio::sync::broadcast;

use super::LedgerEvent;

/// Broadcast bus for [`LedgerEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 1 024). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: LedgerEvent) -> usize {
        let event_type = event.event_type_str();
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!(event_type, delivered, "event published");
        delivered
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Amount, SponsorshipId, UserId};
    use chrono::Utc;

    fn make_event(sponsorship_id: SponsorshipId) -> LedgerEvent {
        LedgerEvent::SponsorshipFunded {
            sponsorship_id,
            beneficiary_id: UserId::new(),
            goal_amount: Amount::from_cents(100),
            donated_amount: Amount::from_cents(100),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(make_event(SponsorshipId::new())), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let id = SponsorshipId::new();
        assert_eq!(bus.publish(make_event(id)), 2);

        let Ok(e1) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(e2) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(e1.sponsorship_id(), Some(id));
        assert_eq!(e2.sponsorship_id(), Some(id));
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }
}
