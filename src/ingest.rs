use crate::db::{self, AttachmentRecord, Channel, Emoji, MessageRow, NewReaction, NewReply, User};
use crate::source::{RawChannel, RawEmoji, RawMember, RawMessage, RawReaction};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike};
use diesel::sqlite::SqliteConnection;
use std::collections::HashSet;
use tracing::warn;

type ReactionKey = (String, String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    SkippedExisting,
    SkippedUnknownAuthor,
}

/// Hour-of-day and day-of-week (Sunday = 0) buckets for a unix
/// timestamp, in UTC. Stored on the message row so histogram queries
/// stay plain grouped counts.
pub fn time_buckets(sent_at: i64) -> Result<(i32, i32)> {
    let dt = DateTime::from_timestamp(sent_at, 0)
        .with_context(|| format!("timestamp out of range: {sent_at}"))?;
    Ok((
        dt.hour() as i32,
        dt.weekday().num_days_from_sunday() as i32,
    ))
}

/// Existence caches guarding idempotent inserts for one batch run.
///
/// Each cache is seeded lazily with a single full-table id scan on first
/// use; after that every `ensure_*` call is an in-memory membership
/// check, which is what makes replaying hundreds of thousands of
/// historical events affordable.
#[derive(Default)]
pub struct IngestSession {
    users: Option<HashSet<String>>,
    channels: Option<HashSet<String>>,
    emojis: Option<HashSet<String>>,
    messages: Option<HashSet<String>>,
    reactions: Option<HashSet<ReactionKey>>,
}

impl IngestSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&mut self, conn: &mut SqliteConnection) -> Result<&mut HashSet<String>> {
        if self.users.is_none() {
            self.users = Some(db::all_user_ids(conn)?.into_iter().collect());
        }
        Ok(self.users.as_mut().expect("seeded above"))
    }

    fn channels(&mut self, conn: &mut SqliteConnection) -> Result<&mut HashSet<String>> {
        if self.channels.is_none() {
            self.channels = Some(db::all_channel_ids(conn)?.into_iter().collect());
        }
        Ok(self.channels.as_mut().expect("seeded above"))
    }

    fn emojis(&mut self, conn: &mut SqliteConnection) -> Result<&mut HashSet<String>> {
        if self.emojis.is_none() {
            self.emojis = Some(db::all_emoji_ids(conn)?.into_iter().collect());
        }
        Ok(self.emojis.as_mut().expect("seeded above"))
    }

    fn messages(&mut self, conn: &mut SqliteConnection) -> Result<&mut HashSet<String>> {
        if self.messages.is_none() {
            self.messages = Some(db::all_message_ids(conn)?.into_iter().collect());
        }
        Ok(self.messages.as_mut().expect("seeded above"))
    }

    fn reactions(&mut self, conn: &mut SqliteConnection) -> Result<&mut HashSet<ReactionKey>> {
        if self.reactions.is_none() {
            self.reactions = Some(db::all_reaction_keys(conn)?.into_iter().collect());
        }
        Ok(self.reactions.as_mut().expect("seeded above"))
    }

    pub fn ensure_user(&mut self, conn: &mut SqliteConnection, member: &RawMember) -> Result<()> {
        if self.users(conn)?.contains(&member.id) {
            return Ok(());
        }

        db::insert_user(
            conn,
            &User {
                id: member.id.clone(),
                name: member.name.clone(),
                avatar_url: member.avatar_url.clone(),
            },
        )?;
        self.users(conn)?.insert(member.id.clone());
        Ok(())
    }

    pub fn ensure_channel(
        &mut self,
        conn: &mut SqliteConnection,
        channel: &RawChannel,
    ) -> Result<()> {
        if self.channels(conn)?.contains(&channel.id) {
            return Ok(());
        }

        db::insert_channel(
            conn,
            &Channel {
                id: channel.id.clone(),
                name: channel.name.clone(),
            },
        )?;
        self.channels(conn)?.insert(channel.id.clone());
        Ok(())
    }

    pub fn ensure_emoji(&mut self, conn: &mut SqliteConnection, emoji: &RawEmoji) -> Result<()> {
        let id = emoji.key.id();
        if self.emojis(conn)?.contains(id) {
            return Ok(());
        }

        db::insert_emoji(
            conn,
            &Emoji {
                id: id.to_string(),
                name: emoji.name.clone(),
                url: emoji.url.clone(),
                animated: emoji.animated,
            },
        )?;
        self.emojis(conn)?.insert(id.to_string());
        Ok(())
    }

    pub fn ensure_reaction(
        &mut self,
        conn: &mut SqliteConnection,
        user_id: &str,
        message_id: &str,
        emoji_id: &str,
    ) -> Result<()> {
        let key = (
            user_id.to_string(),
            message_id.to_string(),
            emoji_id.to_string(),
        );
        if self.reactions(conn)?.contains(&key) {
            return Ok(());
        }

        db::insert_reaction(
            conn,
            &NewReaction {
                user_id: key.0.clone(),
                message_id: key.1.clone(),
                emoji_id: key.2.clone(),
            },
        )?;
        self.reactions(conn)?.insert(key);
        Ok(())
    }

    pub fn message_exists(&mut self, conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        Ok(self.messages(conn)?.contains(id))
    }

    /// Records one scraped message and everything hanging off it.
    ///
    /// Skips silently when the author was never seen as a guild member
    /// (upstream history legitimately contains such gaps) or when the
    /// message id is already known. The reply edge is best-effort: its
    /// failure is logged and never rolls back the message row.
    pub fn insert_message(
        &mut self,
        conn: &mut SqliteConnection,
        msg: &RawMessage,
        reactions: &[RawReaction],
    ) -> Result<IngestOutcome> {
        if !self.users(conn)?.contains(&msg.author_id) {
            return Ok(IngestOutcome::SkippedUnknownAuthor);
        }
        if self.messages(conn)?.contains(&msg.id) {
            return Ok(IngestOutcome::SkippedExisting);
        }

        let (sent_hour, sent_dow) = time_buckets(msg.sent_at)?;
        db::insert_message(
            conn,
            &MessageRow {
                id: msg.id.clone(),
                user_id: msg.author_id.clone(),
                channel_id: msg.channel_id.clone(),
                sent_at: msg.sent_at,
                sent_hour,
                sent_dow,
                content: msg.content.clone(),
            },
        )?;
        self.messages(conn)?.insert(msg.id.clone());

        if let Some(reply_to) = &msg.reply_to {
            let edge = NewReply {
                message_id: msg.id.clone(),
                reply_to: reply_to.clone(),
            };
            if let Err(err) = db::insert_reply(conn, &edge) {
                warn!(message = %msg.id, reply_to = %reply_to, error = %err, "failed to store reply edge");
            }
        }

        // Attachment rows are keyed by their own id, so overlapping
        // scrapes are guarded by the store's primary key, not by this
        // session's caches.
        for attachment in &msg.attachments {
            db::insert_attachment(
                conn,
                &AttachmentRecord {
                    id: attachment.id.clone(),
                    message_id: msg.id.clone(),
                    mime: attachment.mime.clone(),
                    url: attachment.url.clone(),
                },
            )?;
        }

        for reaction in reactions {
            self.ensure_emoji(conn, &reaction.emoji)?;
            self.ensure_reaction(conn, &reaction.user_id, &msg.id, reaction.emoji.key.id())?;
        }

        Ok(IngestOutcome::Inserted)
    }
}
