//! `translate create <lang>` chat command.

use crate::events::GatewayEvents;
use crate::gateway::{Gateway, GuildId, InboundMessage};
use crate::language::is_plausible_language_code;
use crate::provisioner::{PairProvisioner, ProvisionError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreatePair(String),
    InvalidLanguage(String),
    Usage,
}

/// Parse a chat message into a command. `None` means the message is not addressed to us.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("translate") {
        return None;
    }

    let command = match (words.next(), words.next(), words.next()) {
        (Some(sub), Some(lang), None) if sub.eq_ignore_ascii_case("create") => {
            if is_plausible_language_code(lang) {
                Command::CreatePair(lang.to_string())
            } else {
                Command::InvalidLanguage(lang.to_string())
            }
        }
        _ => Command::Usage,
    };
    Some(command)
}

pub struct CommandHandler {
    provisioner: Arc<PairProvisioner>,
    gateway: Arc<dyn Gateway>,
    prefix: String,
}

impl CommandHandler {
    pub fn new(provisioner: Arc<PairProvisioner>, gateway: Arc<dyn Gateway>, prefix: &str) -> Self {
        Self {
            provisioner,
            gateway,
            prefix: prefix.to_string(),
        }
    }

    /// Parse `message` and run the command in the background.
    pub fn handle(&self, message: &InboundMessage) -> Option<JoinHandle<()>> {
        if message.author_id == self.gateway.current_user_id() {
            return None;
        }
        let location = message.channel.as_ref()?;
        let command = parse_command(&self.prefix, &message.content)?;

        info!(author = %message.author_name, ?command, "Received translate command");

        let provisioner = Arc::clone(&self.provisioner);
        let gateway = Arc::clone(&self.gateway);
        let prefix = self.prefix.clone();
        let guild_id = location.guild_id;
        let channel_id = location.channel.id;

        Some(tokio::spawn(async move {
            let reply = respond(&provisioner, guild_id, &prefix, command).await;
            if let Err(e) = gateway.send_message(channel_id, &reply).await {
                error!("Failed to reply to translate command: {:#}", e);
            }
        }))
    }
}

async fn respond(
    provisioner: &PairProvisioner,
    guild_id: GuildId,
    prefix: &str,
    command: Command,
) -> String {
    match command {
        Command::Usage => format!("Usage: {}translate create <language code>", prefix),
        Command::InvalidLanguage(lang) => format!("'{}' does not look like a language code", lang),
        Command::CreatePair(lang) => match provisioner.get_or_create(guild_id, &lang).await {
            Ok(pair) => format!(
                "Translation channels have been created at {} and {}",
                pair.standard_channel.mention(),
                pair.translation_channel.mention()
            ),
            Err(e @ ProvisionError::LanguageNotSupported { .. }) => e.user_message(),
            Err(e) => {
                warn!(lang = %lang, "Failed to provision channel pair: {}", e);
                e.user_message()
            }
        },
    }
}

impl GatewayEvents for CommandHandler {
    fn message_received(&self, message: InboundMessage) {
        let _ = self.handle(&message);
    }
}
