//! The chat-platform surface the relay depends on.
//!
//! Gateway state is owned by the platform client. Everything here is a plain
//! snapshot taken at call time, and channels are referred to by ID.

use anyhow::Result;
use async_trait::async_trait;

pub type GuildId = u64;
pub type ChannelId = u64;
pub type UserId = u64;

/// A weak reference to a text channel: its ID plus the name it had when observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub id: ChannelId,
    pub name: String,
}

impl ChannelHandle {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Discord mention syntax for this channel
    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

/// A channel category and the text channels inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryView {
    pub id: ChannelId,
    pub name: String,
    pub text_channels: Vec<ChannelHandle>,
}

impl CategoryView {
    pub fn text_channel_named(&self, name: &str) -> Option<&ChannelHandle> {
        self.text_channels.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildView {
    pub id: GuildId,
    pub name: String,
    pub categories: Vec<CategoryView>,
}

impl GuildView {
    /// Exact-name category lookup. Multiple matches count as none, so an
    /// ambiguous layout is treated the same as a missing category.
    pub fn category_named(&self, name: &str) -> Option<&CategoryView> {
        let mut matches = self.categories.iter().filter(|c| c.name == name);
        match (matches.next(), matches.next()) {
            (Some(category), None) => Some(category),
            _ => None,
        }
    }

    pub fn category(&self, id: ChannelId) -> Option<&CategoryView> {
        self.categories.iter().find(|c| c.id == id)
    }
}

/// Where an inbound message was posted, when it was posted in a guild text channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChannelRef {
    pub guild_id: GuildId,
    pub channel: ChannelHandle,
    /// Parent category, as (id, name)
    pub category: Option<(ChannelId, String)>,
}

/// An inbound message, flattened from the platform event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub author_id: UserId,
    /// Guild nickname, falling back to the username
    pub author_name: String,
    /// `None` for DMs and for non-text guild channels
    pub channel: Option<TextChannelRef>,
    pub content: String,
    pub attachment_urls: Vec<String>,
}

/// Channel and message operations on the chat platform.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// ID of the bot's own user, for self-message filtering
    fn current_user_id(&self) -> UserId;

    /// Snapshot of a guild's categories and text channels
    async fn guild(&self, guild_id: GuildId) -> Result<Option<GuildView>>;

    /// Guilds that are connected and ready right now
    async fn available_guilds(&self) -> Result<Vec<GuildView>>;

    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
        topic: &str,
    ) -> Result<ChannelHandle>;

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<()>;
}
