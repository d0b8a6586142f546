//! Gateway event subscriptions.
//!
//! The platform client publishes into an [`EventHub`]; components attach to
//! the event kinds they care about and detach on shutdown. Publishing never
//! holds the subscriber lock while a handler runs.

use crate::gateway::{ChannelId, GuildView, InboundMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    MessageUpdated,
    ChannelDestroyed,
    GuildAvailable,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::MessageReceived,
        EventKind::MessageUpdated,
        EventKind::ChannelDestroyed,
        EventKind::GuildAvailable,
    ];
}

/// Receiver side of gateway events. Handlers run on the dispatch path and
/// must return quickly; anything slow belongs in a spawned task.
pub trait GatewayEvents: Send + Sync {
    fn message_received(&self, _message: InboundMessage) {}

    fn message_updated(&self, _message: InboundMessage) {}

    fn channel_destroyed(&self, _channel_id: ChannelId) {}

    fn guild_available(&self, _guild: GuildView) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    handler: Arc<dyn GatewayEvents>,
}

#[derive(Default)]
pub struct EventHub {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, handler: Arc<dyn GatewayEvents>, kinds: &[EventKind]) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscriptions.push(Subscription {
            id,
            kinds: kinds.to_vec(),
            handler,
        });
        debug!(?id, ?kinds, "Attached event subscription");
        id
    }

    /// Remove a subscription. Returns `false` if it was not attached.
    pub fn detach(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        let removed = subscriptions.len() != before;
        if removed {
            debug!(?id, "Detached event subscription");
        }
        removed
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers(kind).len()
    }

    fn handlers(&self, kind: EventKind) -> Vec<Arc<dyn GatewayEvents>> {
        self.subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    pub fn publish_message_received(&self, message: InboundMessage) {
        for handler in self.handlers(EventKind::MessageReceived) {
            handler.message_received(message.clone());
        }
    }

    pub fn publish_message_updated(&self, message: InboundMessage) {
        for handler in self.handlers(EventKind::MessageUpdated) {
            handler.message_updated(message.clone());
        }
    }

    pub fn publish_channel_destroyed(&self, channel_id: ChannelId) {
        for handler in self.handlers(EventKind::ChannelDestroyed) {
            handler.channel_destroyed(channel_id);
        }
    }

    pub fn publish_guild_available(&self, guild: GuildView) {
        for handler in self.handlers(EventKind::GuildAvailable) {
            handler.guild_available(guild.clone());
        }
    }
}
