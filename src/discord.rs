//! Serenity binding for the [`Gateway`] trait and the event bridge that feeds
//! Discord events into an [`EventHub`].

use crate::events::EventHub;
use crate::gateway::{
    CategoryView, ChannelHandle, ChannelId, Gateway, GuildId, GuildView, InboundMessage,
    TextChannelRef, UserId,
};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::builder::CreateChannel;
use serenity::cache::Cache;
use serenity::client::{Client, Context, EventHandler};
use serenity::http::Http;
use serenity::model::channel::{ChannelType, GuildChannel, Message};
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::guild::Guild;
use serenity::model::id;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Discord rejects messages longer than this many characters
const MESSAGE_LIMIT: usize = 2000;

/// Gateway operations backed by serenity's HTTP client and cache.
pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    pub fn from_client(client: &Client) -> Self {
        Self::new(Arc::clone(&client.http), Arc::clone(&client.cache))
    }
}

#[async_trait]
impl Gateway for SerenityGateway {
    fn current_user_id(&self) -> UserId {
        self.cache.current_user().id.get()
    }

    async fn guild(&self, guild_id: GuildId) -> Result<Option<GuildView>> {
        Ok(self
            .cache
            .guild(id::GuildId::new(guild_id))
            .map(|guild| guild_view(&guild)))
    }

    async fn available_guilds(&self) -> Result<Vec<GuildView>> {
        Ok(self
            .cache
            .guilds()
            .into_iter()
            .filter_map(|guild_id| self.cache.guild(guild_id).map(|guild| guild_view(&guild)))
            .collect())
    }

    #[instrument(skip(self, topic))]
    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
        topic: &str,
    ) -> Result<ChannelHandle> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .category(id::ChannelId::new(category_id))
            .topic(topic);

        let channel = id::GuildId::new(guild_id)
            .create_channel(&*self.http, builder)
            .await
            .with_context(|| format!("Discord refused to create channel {}", name))?;

        debug!(channel_id = %channel.id, "Created channel");
        Ok(ChannelHandle::new(channel.id.get(), channel.name))
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        id::ChannelId::new(channel_id)
            .delete(&*self.http)
            .await
            .with_context(|| format!("Failed to delete channel {}", channel_id))?;
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        let channel = id::ChannelId::new(channel_id);
        for chunk in split_message(text, MESSAGE_LIMIT) {
            channel
                .say(&self.http, chunk)
                .await
                .with_context(|| format!("Failed to send message to channel {}", channel_id))?;
        }
        Ok(())
    }
}

/// Split `text` into pieces of at most `limit` characters.
fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.chars().count() > limit {
        let split_at = rest
            .char_indices()
            .nth(limit)
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(split_at);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Flatten a cached guild into categories and their text channels.
pub fn guild_view(guild: &Guild) -> GuildView {
    let mut categories: Vec<CategoryView> = guild
        .channels
        .values()
        .filter(|channel| channel.kind == ChannelType::Category)
        .map(|channel| CategoryView {
            id: channel.id.get(),
            name: channel.name.clone(),
            text_channels: Vec::new(),
        })
        .collect();
    categories.sort_by_key(|category| category.id);

    let mut text_channels: Vec<&GuildChannel> = guild
        .channels
        .values()
        .filter(|channel| channel.kind == ChannelType::Text)
        .collect();
    text_channels.sort_by_key(|channel| (channel.position, channel.id));

    for channel in text_channels {
        let Some(parent) = channel.parent_id else {
            continue;
        };
        if let Some(category) = categories.iter_mut().find(|c| c.id == parent.get()) {
            category
                .text_channels
                .push(ChannelHandle::new(channel.id.get(), channel.name.clone()));
        }
    }

    GuildView {
        id: guild.id.get(),
        name: guild.name.clone(),
        categories,
    }
}

/// Build the platform-neutral view of a message, resolving its channel through the cache.
fn inbound_message(cache: &Cache, message: &Message) -> InboundMessage {
    let channel = message.guild_id.and_then(|guild_id| {
        let guild = cache.guild(guild_id)?;
        let channel = guild.channels.get(&message.channel_id)?;
        if channel.kind != ChannelType::Text {
            return None;
        }

        let category = channel
            .parent_id
            .and_then(|parent| guild.channels.get(&parent))
            .map(|parent| (parent.id.get(), parent.name.clone()));

        Some(TextChannelRef {
            guild_id: guild_id.get(),
            channel: ChannelHandle::new(channel.id.get(), channel.name.clone()),
            category,
        })
    });

    let author_name = message
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| message.author.global_name.clone())
        .unwrap_or_else(|| message.author.name.clone());

    InboundMessage {
        author_id: message.author.id.get(),
        author_name,
        channel,
        content: message.content.clone(),
        attachment_urls: message.attachments.iter().map(|a| a.url.clone()).collect(),
    }
}

/// Serenity event handler that republishes Discord events on an [`EventHub`].
pub struct EventBridge {
    hub: Arc<EventHub>,
}

impl EventBridge {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }

    /// Gateway intents the relay needs
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }
}

#[serenity::async_trait]
impl EventHandler for EventBridge {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_user = %ready.user.name,
            bot_id = %ready.user.id,
            guilds = ready.guilds.len(),
            "Bot connected to Discord"
        );
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        debug!(guild_id = %guild.id, guild_name = %guild.name, "Guild available");
        self.hub.publish_guild_available(guild_view(&guild));
    }

    async fn message(&self, ctx: Context, new_message: Message) {
        let message = inbound_message(&ctx.cache, &new_message);
        self.hub.publish_message_received(message);
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        _event: MessageUpdateEvent,
    ) {
        if let Some(new) = new {
            let message = inbound_message(&ctx.cache, &new);
            self.hub.publish_message_updated(message);
        }
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        debug!(channel_id = %channel.id, channel_name = %channel.name, "Channel deleted");
        self.hub.publish_channel_destroyed(channel.id.get());
    }
}

/// Build a serenity client whose events flow into `hub`.
pub async fn build_client(token: &str, hub: Arc<EventHub>) -> Result<Client> {
    let intents = EventBridge::intents();
    info!("Building Serenity client with intents: {:?}", intents);

    Client::builder(token, intents)
        .event_handler(EventBridge::new(hub))
        .await
        .context("Failed to build Discord client")
}
