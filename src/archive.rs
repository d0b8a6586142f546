use crate::gateway::{CategoryView, Gateway};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Mirrors relayed messages into the category's history channel.
pub struct HistoryArchiver {
    gateway: Arc<dyn Gateway>,
    history_channel_name: String,
}

impl HistoryArchiver {
    pub fn new(gateway: Arc<dyn Gateway>, history_channel_name: &str) -> Self {
        Self {
            gateway,
            history_channel_name: history_channel_name.to_string(),
        }
    }

    /// Post the original and translated text as two separate messages.
    ///
    /// Returns `Ok(false)` without posting when either text is blank or the
    /// category has no history channel.
    pub async fn archive(
        &self,
        category: &CategoryView,
        author: &str,
        original: &str,
        translated: &str,
    ) -> Result<bool> {
        if original.trim().is_empty() || translated.trim().is_empty() {
            return Ok(false);
        }

        let Some(history) = category.text_channel_named(&self.history_channel_name) else {
            return Ok(false);
        };

        debug!("Sending messages to the history channel");

        self.gateway
            .send_message(history.id, &format!("{}: {}", author, original))
            .await
            .context("Failed to post original text to history")?;
        self.gateway
            .send_message(history.id, &format!("{}: {}", author, translated))
            .await
            .context("Failed to post translated text to history")?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChannelHandle;
    use crate::test_support::FakeGateway;

    fn category(with_history: bool) -> CategoryView {
        let mut text_channels = vec![ChannelHandle::new(12, "from-fr-to-en")];
        if with_history {
            text_channels.push(ChannelHandle::new(11, "history"));
        }
        CategoryView {
            id: 10,
            name: "Localization".to_string(),
            text_channels,
        }
    }

    #[tokio::test]
    async fn test_archive_posts_two_messages() {
        let gateway = Arc::new(FakeGateway::new());
        let archiver = HistoryArchiver::new(gateway.clone(), "history");

        let posted = archiver
            .archive(&category(true), "alice", "hello", "bonjour")
            .await
            .unwrap();

        assert!(posted);
        assert_eq!(
            gateway.sent_to(11),
            vec!["alice: hello".to_string(), "alice: bonjour".to_string()]
        );
    }

    #[tokio::test]
    async fn test_archive_without_history_channel_is_noop() {
        let gateway = Arc::new(FakeGateway::new());
        let archiver = HistoryArchiver::new(gateway.clone(), "history");

        let posted = archiver
            .archive(&category(false), "alice", "hello", "bonjour")
            .await
            .unwrap();

        assert!(!posted);
        assert!(gateway.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_archive_skips_blank_text() {
        let gateway = Arc::new(FakeGateway::new());
        let archiver = HistoryArchiver::new(gateway.clone(), "history");

        assert!(!archiver.archive(&category(true), "alice", "  ", "x").await.unwrap());
        assert!(!archiver.archive(&category(true), "alice", "x", "").await.unwrap());
        assert!(gateway.sent_messages().is_empty());
    }
}
