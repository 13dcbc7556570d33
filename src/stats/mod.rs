pub mod histograms;
pub mod leaderboards;
pub mod overall;
pub mod swears;

use crate::db::{self, AttachmentRecord, MessageRow, ReactionCount};
use crate::settings::{Limits, SwearWord};
use anyhow::{Context, Result};
use dashmap::DashMap;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::sync::Arc;

/// One grouped-count row keyed by user.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserCount {
    pub count: i64,
    pub user_id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChannelCount {
    pub count: i64,
    pub channel_id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HourBucket {
    pub count: i64,
    pub hour: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WeekdayBucket {
    pub count: i64,
    pub dow: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmojiCount {
    pub count: i64,
    pub emoji_id: String,
}

/// A fully joined message record: the row itself, the message it
/// replies to (if any), its attachments, and its reaction tallies.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MessageDetail {
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub sent_at: i64,
    pub content: String,
    pub reply_to: Option<MessageRow>,
    pub attachments: Vec<AttachmentRecord>,
    pub reactions: Vec<ReactionCount>,
}

/// Shared state for one aggregation batch run. Every named query is a
/// pure read parameterized by the cutoff, the user allow-list and the
/// excluded-emoji set; the two maps memoize per-message expansion work
/// shared between concurrently running queries.
pub struct StatsContext {
    pub cutoff: i64,
    pub included_users: Vec<String>,
    pub excluded_emoji: Vec<String>,
    pub limits: Limits,
    pub swears: Vec<SwearWord>,
    cache: DashMap<String, Arc<MessageDetail>>,
    attachments_seen: DashMap<String, Vec<AttachmentRecord>>,
}

impl StatsContext {
    pub fn new(
        cutoff: i64,
        included_users: Vec<String>,
        excluded_emoji: Vec<String>,
        limits: Limits,
        swears: Vec<SwearWord>,
    ) -> Self {
        Self {
            cutoff,
            included_users,
            excluded_emoji,
            limits,
            swears,
            cache: DashMap::new(),
            attachments_seen: DashMap::new(),
        }
    }

    /// Memoized per-message expansion. The same message routinely shows
    /// up in several leaderboards, so the joined record is fetched once
    /// per run. Insert-if-absent: two queries racing on the same id may
    /// both fetch, but the cache never holds a partial value.
    pub fn message_detail(
        &self,
        conn: &mut SqliteConnection,
        message_id: &str,
    ) -> Result<Arc<MessageDetail>> {
        if let Some(hit) = self.cache.get(message_id) {
            return Ok(Arc::clone(hit.value()));
        }

        let row = db::message_by_id(conn, message_id)?
            .with_context(|| format!("message {message_id} not in store"))?;
        let reply_to = db::replied_message(conn, message_id)?;
        let attachments = db::attachments_for_message(conn, message_id)?;
        let reactions = db::reaction_counts(conn, message_id)?;

        if !attachments.is_empty() {
            self.attachments_seen
                .insert(message_id.to_string(), attachments.clone());
        }

        let detail = Arc::new(MessageDetail {
            id: row.id,
            user_id: row.user_id,
            channel_id: row.channel_id,
            sent_at: row.sent_at,
            content: row.content,
            reply_to,
            attachments,
            reactions,
        });

        let entry = self
            .cache
            .entry(message_id.to_string())
            .or_insert(detail);
        Ok(Arc::clone(entry.value()))
    }

    pub(crate) fn expand(
        &self,
        conn: &mut SqliteConnection,
        ids: &[String],
    ) -> Result<Vec<MessageDetail>> {
        ids.iter()
            .map(|id| Ok(self.message_detail(conn, id)?.as_ref().clone()))
            .collect()
    }

    /// `(message_id, channel_id)` for every attachment-bearing message
    /// expanded during this run, sorted for a stable blob.
    pub fn attachment_index(&self) -> Vec<AttachmentPointer> {
        let mut index: Vec<AttachmentPointer> = self
            .attachments_seen
            .iter()
            .filter_map(|entry| {
                self.cache.get(entry.key()).map(|detail| AttachmentPointer {
                    message_id: entry.key().clone(),
                    channel_id: detail.channel_id.clone(),
                })
            })
            .collect();
        index.sort_by(|a, b| {
            (&a.channel_id, &a.message_id).cmp(&(&b.channel_id, &b.message_id))
        });
        index
    }

    /// Every attachment record gathered as a side effect of message
    /// expansion, flattened, sorted by id.
    pub fn flat_attachments(&self) -> Vec<AttachmentRecord> {
        let mut all: Vec<AttachmentRecord> = self
            .attachments_seen
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AttachmentPointer {
    pub message_id: String,
    pub channel_id: String,
}
