//! Channel-based real-time fan-out.
//!
//! Each [`Channel`] owns a lazily created broadcast channel. Publishers send
//! an event to a channel; every receiver subscribed to that channel gets a copy.
//! Subscriptions made through [`FanoutHub::subscribe_as`] also register the
//! subscriber as *present* on the channel for as long as the returned
//! [`Presence`] guard lives, which is what push suppression queries.
//!
//! ```text
//! publisher ── publish(ticket:7, ev) ──▶ FanoutHub ──▶ rx (ws conn A, user 2)
//!                                           │     └──▶ rx (ws conn B, user 5)
//!                                           │
//! emitter ─── subscribers(ticket:7) ────────┘  → {2, 5}
//! ```

use appeals_core::{Channel, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, RwLock};

/// Per-channel buffer. Slow receivers beyond this lag and skip events.
pub const CHANNEL_CAPACITY: usize = 1000;

/// An event delivered on a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published<E> {
    /// Channel the event was published to
    pub channel: Channel,
    /// The event
    pub event: E,
}

type ChannelsMap<E> = Arc<RwLock<HashMap<Channel, broadcast::Sender<Published<E>>>>>;
type PresenceMap = Arc<Mutex<HashMap<Channel, HashMap<UserId, usize>>>>;

/// In-process pub/sub hub with presence tracking.
///
/// Cloning is cheap; clones share channels and presence.
pub struct FanoutHub<E>
where
    E: Clone + Send + 'static,
{
    channels: ChannelsMap<E>,
    presence: PresenceMap,
}

impl<E> FanoutHub<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `event` to `channel`. Returns how many receivers got it.
    pub async fn publish(&self, channel: Channel, event: E) -> usize {
        let channels = self.channels.read().await;
        let Some(sender) = channels.get(&channel) else {
            return 0;
        };

        sender
            .send(Published { channel, event })
            .unwrap_or_default()
    }

    /// Subscribe to `channel` without registering presence.
    pub async fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Published<E>> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to `channel` on behalf of `user`.
    ///
    /// The user counts as present on the channel until the returned guard is dropped.
    pub async fn subscribe_as(
        &self,
        channel: Channel,
        user: UserId,
    ) -> (broadcast::Receiver<Published<E>>, Presence) {
        let receiver = self.subscribe(channel).await;
        (receiver, Presence::enter(Arc::clone(&self.presence), channel, user))
    }

    /// Users currently present on `channel`.
    #[must_use]
    pub fn subscribers(&self, channel: Channel) -> HashSet<UserId> {
        let presence = self.presence.lock().unwrap_or_else(PoisonError::into_inner);
        presence
            .get(&channel)
            .map(|users| users.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Drop broadcast channels nobody listens to anymore.
    pub async fn prune(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    /// Number of channels with a broadcast sender.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl<E> Default for FanoutHub<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for FanoutHub<E>
where
    E: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            presence: Arc::clone(&self.presence),
        }
    }
}

/// Presence of one user on one channel. Leaves the channel on drop.
#[derive(Debug)]
pub struct Presence {
    presence: PresenceMap,
    channel: Channel,
    user: UserId,
}

impl Presence {
    fn enter(presence: PresenceMap, channel: Channel, user: UserId) -> Self {
        {
            let mut map = presence.lock().unwrap_or_else(PoisonError::into_inner);
            *map.entry(channel).or_default().entry(user).or_insert(0) += 1;
        }
        Self {
            presence,
            channel,
            user,
        }
    }

    /// Channel this guard is present on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }
}

impl Drop for Presence {
    fn drop(&mut self) {
        let mut map = self.presence.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(users) = map.get_mut(&self.channel) else {
            return;
        };

        if let Some(count) = users.get_mut(&self.user) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                users.remove(&self.user);
            }
        }
        if users.is_empty() {
            map.remove(&self.channel);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use appeals_core::TicketId;

    const TICKET: Channel = Channel::Ticket(TicketId(7));

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let hub = FanoutHub::<String>::new();
        let mut rx = hub.subscribe(TICKET).await;

        assert_eq!(hub.publish(TICKET, "hello".to_string()).await, 1);

        let published = rx.recv().await.expect("should receive event");
        assert_eq!(published.channel, TICKET);
        assert_eq!(published.event, "hello");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = FanoutHub::<String>::new();
        assert_eq!(hub.publish(TICKET, "lost".to_string()).await, 0);
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_channel_isolation() {
        let hub = FanoutHub::<String>::new();
        let mut rx_a = hub.subscribe(TICKET).await;
        let mut rx_b = hub.subscribe(Channel::User(UserId(1))).await;

        hub.publish(TICKET, "A".to_string()).await;

        assert_eq!(rx_a.recv().await.unwrap().event, "A");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_presence_follows_guard_lifetime() {
        let hub = FanoutHub::<String>::new();
        let (_rx1, first) = hub.subscribe_as(TICKET, UserId(2)).await;
        let (_rx2, second) = hub.subscribe_as(TICKET, UserId(2)).await;
        let (_rx3, other) = hub.subscribe_as(TICKET, UserId(5)).await;

        assert_eq!(hub.subscribers(TICKET), HashSet::from([UserId(2), UserId(5)]));

        drop(first);
        assert!(hub.subscribers(TICKET).contains(&UserId(2)));

        drop(second);
        drop(other);
        assert!(hub.subscribers(TICKET).is_empty());
    }

    #[tokio::test]
    async fn test_prune_removes_abandoned_channels() {
        let hub = FanoutHub::<String>::new();
        let rx = hub.subscribe(TICKET).await;
        assert_eq!(hub.prune().await, 0);

        drop(rx);
        assert_eq!(hub.prune().await, 1);
        assert_eq!(hub.channel_count().await, 0);
    }
}
