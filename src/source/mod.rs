pub mod discord;

use anyhow::Result;
use async_trait::async_trait;

/// Identity of an emoji as the upstream platform reports it. Custom
/// emoji carry a stable id; built-in unicode emoji only have their
/// textual form, which stands in for an id in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmojiKey {
    Custom(String),
    Unicode(String),
}

impl EmojiKey {
    pub fn id(&self) -> &str {
        match self {
            EmojiKey::Custom(id) => id,
            EmojiKey::Unicode(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawChannel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RawMember {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone)]
pub struct RawAttachment {
    pub id: String,
    pub mime: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RawEmoji {
    pub key: EmojiKey,
    pub name: String,
    pub url: String,
    pub animated: bool,
}

#[derive(Debug, Clone)]
pub struct RawReaction {
    pub user_id: String,
    pub emoji: RawEmoji,
}

/// One message event as paged out of the upstream history. Reaction
/// kinds are listed without their reactors; the scrape loop hydrates
/// them per emoji only for messages it has not seen before.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub sent_at: i64,
    pub content: String,
    pub reply_to: Option<String>,
    pub attachments: Vec<RawAttachment>,
    pub reaction_kinds: Vec<RawEmoji>,
}

/// The upstream chat-platform client, as far as this pipeline cares.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Text channels of the configured guild.
    async fn channels(&self) -> Result<Vec<RawChannel>>;

    /// All members of the configured guild.
    async fn members(&self) -> Result<Vec<RawMember>>;

    /// One page of channel history, newest first, strictly older than
    /// `before` when given.
    async fn message_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<RawMessage>>;

    /// Users who reacted with the given emoji on the given message.
    async fn reactors(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &RawEmoji,
    ) -> Result<Vec<String>>;

    /// Current attachment records for one message (refresh path; the
    /// upstream re-signs attachment URLs periodically).
    async fn attachments(&self, channel_id: &str, message_id: &str)
        -> Result<Vec<RawAttachment>>;
}
