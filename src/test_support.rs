//! In-memory gateway and translator used by the unit tests.

use crate::gateway::{
    CategoryView, ChannelHandle, ChannelId, Gateway, GuildId, GuildView, UserId,
};
use crate::translation::TranslationBackend;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const BOT_ID: UserId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedChannel {
    pub id: ChannelId,
    pub name: String,
    pub category_id: ChannelId,
    pub topic: String,
}

#[derive(Default)]
struct GatewayState {
    guilds: HashMap<GuildId, GuildView>,
    next_id: ChannelId,
    created: Vec<CreatedChannel>,
    deleted: Vec<ChannelId>,
    sent: Vec<(ChannelId, String)>,
    failing_names: HashSet<String>,
}

type CreateHook = Box<dyn Fn() + Send + Sync>;

pub struct FakeGateway {
    state: Mutex<GatewayState>,
    on_create: Mutex<Option<CreateHook>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                next_id: 1000,
                ..Default::default()
            }),
            on_create: Mutex::new(None),
        }
    }

    pub fn with_category(guild_id: GuildId, category_id: ChannelId, name: &str) -> Self {
        let gateway = Self::new();
        gateway.add_category(guild_id, category_id, name);
        gateway
    }

    pub fn add_category(&self, guild_id: GuildId, category_id: ChannelId, name: &str) {
        let mut state = self.state.lock().unwrap();
        let guild = state.guilds.entry(guild_id).or_insert_with(|| GuildView {
            id: guild_id,
            name: format!("guild-{}", guild_id),
            categories: Vec::new(),
        });
        guild.categories.push(CategoryView {
            id: category_id,
            name: name.to_string(),
            text_channels: Vec::new(),
        });
    }

    pub fn add_text_channel(&self, guild_id: GuildId, category_id: ChannelId, id: ChannelId, name: &str) {
        let mut state = self.state.lock().unwrap();
        let category = state
            .guilds
            .get_mut(&guild_id)
            .and_then(|g| g.categories.iter_mut().find(|c| c.id == category_id))
            .unwrap();
        category.text_channels.push(ChannelHandle::new(id, name));
    }

    pub fn on_create(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_create.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn fail_creation_of(&self, name: &str) {
        self.state.lock().unwrap().failing_names.insert(name.to_string());
    }

    pub fn created_channels(&self) -> Vec<CreatedChannel> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted_channels(&self) -> Vec<ChannelId> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn sent_messages(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<String> {
        self.sent_messages()
            .into_iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    fn current_user_id(&self) -> UserId {
        BOT_ID
    }

    async fn guild(&self, guild_id: GuildId) -> Result<Option<GuildView>> {
        Ok(self.state.lock().unwrap().guilds.get(&guild_id).cloned())
    }

    async fn available_guilds(&self) -> Result<Vec<GuildView>> {
        let mut guilds: Vec<GuildView> =
            self.state.lock().unwrap().guilds.values().cloned().collect();
        guilds.sort_by_key(|g| g.id);
        Ok(guilds)
    }

    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
        topic: &str,
    ) -> Result<ChannelHandle> {
        if let Some(hook) = self.on_create.lock().unwrap().as_ref() {
            hook();
        }

        let mut state = self.state.lock().unwrap();
        if state.failing_names.contains(name) {
            bail!("Missing permissions to create {}", name);
        }

        let id = state.next_id;
        state.next_id += 1;
        let handle = ChannelHandle::new(id, name);

        if let Some(category) = state
            .guilds
            .get_mut(&guild_id)
            .and_then(|g| g.categories.iter_mut().find(|c| c.id == category_id))
        {
            category.text_channels.push(handle.clone());
        }
        state.created.push(CreatedChannel {
            id,
            name: name.to_string(),
            category_id,
            topic: topic.to_string(),
        });
        Ok(handle)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for guild in state.guilds.values_mut() {
            for category in &mut guild.categories {
                category.text_channels.retain(|c| c.id != channel_id);
            }
        }
        state.deleted.push(channel_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .sent
            .push((channel_id, text.to_string()));
        Ok(())
    }
}

/// Translator that tags text with its direction: `[en->fr] hello`.
#[derive(Default)]
pub struct FakeTranslator {
    unsupported: HashSet<String>,
    failing: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported(mut self, lang: &str) -> Self {
        self.unsupported.insert(lang.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn translate_calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationBackend for FakeTranslator {
    async fn is_language_supported(&self, lang: &str) -> Result<bool> {
        Ok(!self.unsupported.contains(lang))
    }

    async fn translate(&self, from: &str, to: &str, text: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string(), text.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            bail!("Translation API error (503): unavailable");
        }
        Ok(format!("[{}->{}] {}", from, to, text))
    }
}
