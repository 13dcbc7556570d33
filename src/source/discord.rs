use super::{EmojiKey, MessageSource, RawAttachment, RawChannel, RawEmoji, RawMember, RawMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::all::{ChannelType, Message, MessagePagination, ReactionType};
use serenity::http::Http;
use serenity::model::id::{ChannelId, EmojiId, GuildId, MessageId};

const MEMBER_PAGE: u64 = 1000;
const REACTOR_PAGE: u8 = 100;

/// `MessageSource` over the Discord REST API.
pub struct DiscordSource {
    http: Http,
    guild_id: GuildId,
}

impl DiscordSource {
    pub fn new(token: &str, guild_id: u64) -> Self {
        Self {
            http: Http::new(token),
            guild_id: GuildId::new(guild_id),
        }
    }
}

#[async_trait]
impl MessageSource for DiscordSource {
    async fn channels(&self) -> Result<Vec<RawChannel>> {
        let channels = self
            .http
            .get_channels(self.guild_id)
            .await
            .context("fetching guild channels failed")?;

        Ok(channels
            .into_iter()
            .filter(|ch| ch.kind == ChannelType::Text)
            .map(|ch| RawChannel {
                id: ch.id.to_string(),
                name: ch.name,
            })
            .collect())
    }

    async fn members(&self) -> Result<Vec<RawMember>> {
        let mut members = Vec::new();
        let mut after: Option<u64> = None;

        loop {
            let page = self
                .http
                .get_guild_members(self.guild_id, Some(MEMBER_PAGE), after)
                .await
                .context("fetching guild members failed")?;
            if page.is_empty() {
                break;
            }

            after = page.last().map(|m| m.user.id.get());
            let page_len = page.len();
            members.extend(page.into_iter().map(|m| RawMember {
                id: m.user.id.to_string(),
                avatar_url: m.user.face(),
                name: m.user.name,
            }));

            if page_len < MEMBER_PAGE as usize {
                break;
            }
        }

        Ok(members)
    }

    async fn message_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<RawMessage>> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let target = match before {
            Some(id) => Some(MessagePagination::Before(MessageId::new(parse_id(id)?))),
            None => None,
        };

        let messages = self
            .http
            .get_messages(channel, target, Some(limit))
            .await
            .with_context(|| format!("fetching messages failed for channel {channel_id}"))?;

        Ok(messages.iter().map(convert_message).collect())
    }

    async fn reactors(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &RawEmoji,
    ) -> Result<Vec<String>> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let message = MessageId::new(parse_id(message_id)?);
        let reaction_type = to_reaction_type(emoji)?;

        let mut reactors = Vec::new();
        let mut after: Option<u64> = None;

        loop {
            let page = self
                .http
                .get_reaction_users(channel, message, &reaction_type, REACTOR_PAGE, after)
                .await
                .with_context(|| format!("fetching reactors failed for message {message_id}"))?;
            if page.is_empty() {
                break;
            }

            after = page.last().map(|u| u.id.get());
            let page_len = page.len();
            reactors.extend(page.into_iter().map(|u| u.id.to_string()));

            if page_len < REACTOR_PAGE as usize {
                break;
            }
        }

        Ok(reactors)
    }

    async fn attachments(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Vec<RawAttachment>> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let message = self
            .http
            .get_message(channel, MessageId::new(parse_id(message_id)?))
            .await
            .with_context(|| format!("fetching message {message_id} failed"))?;

        Ok(convert_attachments(&message))
    }
}

fn convert_message(m: &Message) -> RawMessage {
    RawMessage {
        id: m.id.to_string(),
        channel_id: m.channel_id.to_string(),
        author_id: m.author.id.to_string(),
        sent_at: snowflake_secs(m.id),
        content: m.content.clone(),
        reply_to: m
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.to_string()),
        attachments: convert_attachments(m),
        reaction_kinds: m
            .reactions
            .iter()
            .map(|r| convert_emoji(&r.reaction_type))
            .collect(),
    }
}

fn convert_attachments(m: &Message) -> Vec<RawAttachment> {
    m.attachments
        .iter()
        .map(|a| RawAttachment {
            id: a.id.to_string(),
            mime: a.content_type.clone().unwrap_or_default(),
            url: a.url.clone(),
        })
        .collect()
}

fn convert_emoji(reaction: &ReactionType) -> RawEmoji {
    match reaction {
        ReactionType::Custom { animated, id, name } => RawEmoji {
            key: EmojiKey::Custom(id.to_string()),
            name: name.clone().unwrap_or_default(),
            url: custom_emoji_url(id.get(), *animated),
            animated: *animated,
        },
        ReactionType::Unicode(name) => RawEmoji {
            key: EmojiKey::Unicode(name.clone()),
            name: name.clone(),
            url: String::new(),
            animated: false,
        },
        other => RawEmoji {
            key: EmojiKey::Unicode(other.to_string()),
            name: other.to_string(),
            url: String::new(),
            animated: false,
        },
    }
}

fn to_reaction_type(emoji: &RawEmoji) -> Result<ReactionType> {
    Ok(match &emoji.key {
        EmojiKey::Custom(id) => ReactionType::Custom {
            animated: emoji.animated,
            id: EmojiId::new(parse_id(id)?),
            name: Some(emoji.name.clone()),
        },
        EmojiKey::Unicode(name) => ReactionType::Unicode(name.clone()),
    })
}

fn custom_emoji_url(id: u64, animated: bool) -> String {
    let ext = if animated { "gif" } else { "png" };
    format!("https://cdn.discordapp.com/emojis/{id}.{ext}")
}

fn parse_id(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("invalid snowflake id: {value}"))
}

fn snowflake_secs(id: MessageId) -> i64 {
    let discord_epoch_ms = 1_420_070_400_000i64; // 2015-01-01T00:00:00.000Z

    (((id.get() >> 22) as i64) + discord_epoch_ms) / 1000
}
