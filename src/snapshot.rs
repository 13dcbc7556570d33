use crate::db::{self, AttachmentRecord, Channel, DbPool, Emoji, User};
use crate::stats::overall::UserOverview;
use crate::stats::{
    AttachmentPointer, ChannelCount, HourBucket, MessageDetail, StatsContext, UserCount,
    WeekdayBucket,
};
use crate::utils;
use anyhow::{Context, Result};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// The full year-in-review payload, one JSON object per published key.
#[derive(Serialize, Debug)]
pub struct Snapshot {
    #[serde(rename = "swearWordsByUser")]
    pub swear_words_by_user: BTreeMap<String, Vec<UserCount>>,
    #[serde(rename = "swearWordsByWeekday")]
    pub swear_words_by_weekday: BTreeMap<String, Vec<WeekdayBucket>>,
    #[serde(rename = "messagesByUser")]
    pub messages_by_user: Vec<UserCount>,
    #[serde(rename = "messagesByHour")]
    pub messages_by_hour: Vec<HourBucket>,
    #[serde(rename = "messagesByWeekday")]
    pub messages_by_weekday: Vec<WeekdayBucket>,
    #[serde(rename = "messagesByWeekdayByUser")]
    pub messages_by_weekday_by_user: BTreeMap<String, Vec<WeekdayBucket>>,
    #[serde(rename = "messagesByHourByUser")]
    pub messages_by_hour_by_user: BTreeMap<String, Vec<HourBucket>>,
    #[serde(rename = "messagesByHourByChannel")]
    pub messages_by_hour_by_channel: BTreeMap<String, Vec<HourBucket>>,
    #[serde(rename = "messagesByChannelByUser")]
    pub messages_by_channel_by_user: BTreeMap<String, Vec<UserCount>>,
    #[serde(rename = "messagesByUserByChannel")]
    pub messages_by_user_by_channel: BTreeMap<String, Vec<ChannelCount>>,
    #[serde(rename = "topMessagesByReactionsIncludingImages")]
    pub top_images: Vec<MessageDetail>,
    #[serde(rename = "topMessagesByReactionsIncludingVideos")]
    pub top_videos: Vec<MessageDetail>,
    #[serde(rename = "topMessagesByReactionsIncludingImagesByChannel")]
    pub top_images_by_channel: BTreeMap<String, Vec<MessageDetail>>,
    #[serde(rename = "topMessagesByReactionsIncludingVideosByChannel")]
    pub top_videos_by_channel: BTreeMap<String, Vec<MessageDetail>>,
    #[serde(rename = "topMessagesByReactionsIncludingImagesByUser")]
    pub top_images_by_user: BTreeMap<String, Vec<MessageDetail>>,
    #[serde(rename = "topMessagesByReactionsIncludingVideosByUser")]
    pub top_videos_by_user: BTreeMap<String, Vec<MessageDetail>>,
    #[serde(rename = "topTextMessages")]
    pub top_text: Vec<MessageDetail>,
    #[serde(rename = "topTextMessagesByUser")]
    pub top_text_by_user: BTreeMap<String, Vec<MessageDetail>>,
    #[serde(rename = "topReplies")]
    pub top_replies: Vec<MessageDetail>,
    #[serde(rename = "topRepliesByUser")]
    pub top_replies_by_user: BTreeMap<String, Vec<MessageDetail>>,
    #[serde(rename = "overallStatsByUser")]
    pub overall_stats_by_user: BTreeMap<String, UserOverview>,
    #[serde(rename = "allUsers")]
    pub all_users: BTreeMap<String, User>,
    #[serde(rename = "allChannels")]
    pub all_channels: BTreeMap<String, Channel>,
    #[serde(rename = "allEmojis")]
    pub all_emojis: BTreeMap<String, Emoji>,
    #[serde(rename = "messagesWithAttachments")]
    pub messages_with_attachments: Vec<AttachmentPointer>,
    #[serde(rename = "allAttachments")]
    pub all_attachments: Vec<AttachmentRecord>,
}

impl StatsContext {
    fn roster(&self, conn: &mut SqliteConnection) -> Result<BTreeMap<String, User>> {
        let users = db::users_in(conn, &self.included_users)?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    fn channel_index(&self, conn: &mut SqliteConnection) -> Result<BTreeMap<String, Channel>> {
        let channels = db::all_channels(conn)?;
        Ok(channels.into_iter().map(|c| (c.id.clone(), c)).collect())
    }

    fn emoji_index(&self, conn: &mut SqliteConnection) -> Result<BTreeMap<String, Emoji>> {
        let emojis = db::all_emojis(conn)?;
        Ok(emojis.into_iter().map(|e| (e.id.clone(), e)).collect())
    }
}

/// Runs one context method on its own blocking task with its own
/// pooled connection, logging how long the query took.
macro_rules! run {
    ($pool:expr, $ctx:expr, $method:ident) => {{
        let pool = $pool.clone();
        let ctx = Arc::clone(&$ctx);
        async move {
            let handle = tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let mut conn = pool.get()?;
                let value = ctx.$method(&mut conn)?;
                utils::log_query_done(stringify!($method), started.elapsed());
                anyhow::Ok(value)
            });
            handle.await.map_err(anyhow::Error::from)?
        }
    }};
}

pub async fn build_snapshot(pool: &DbPool, ctx: Arc<StatsContext>) -> Result<Snapshot> {
    let (
        swear_words_by_user,
        swear_words_by_weekday,
        messages_by_user,
        messages_by_hour,
        messages_by_weekday,
        messages_by_weekday_by_user,
        messages_by_hour_by_user,
        messages_by_hour_by_channel,
        messages_by_channel_by_user,
        messages_by_user_by_channel,
        top_images,
        top_videos,
        top_images_by_channel,
        top_videos_by_channel,
    ) = tokio::try_join!(
        run!(pool, ctx, swear_words_by_user),
        run!(pool, ctx, swear_words_by_weekday),
        run!(pool, ctx, messages_by_user),
        run!(pool, ctx, messages_by_hour),
        run!(pool, ctx, messages_by_weekday),
        run!(pool, ctx, messages_by_weekday_by_user),
        run!(pool, ctx, messages_by_hour_by_user),
        run!(pool, ctx, messages_by_hour_by_channel),
        run!(pool, ctx, messages_by_channel_by_user),
        run!(pool, ctx, messages_by_user_by_channel),
        run!(pool, ctx, top_images),
        run!(pool, ctx, top_videos),
        run!(pool, ctx, top_images_by_channel),
        run!(pool, ctx, top_videos_by_channel),
    )?;

    let (
        top_images_by_user,
        top_videos_by_user,
        top_text,
        top_text_by_user,
        top_replies,
        top_replies_by_user,
        overall_stats_by_user,
        all_users,
        all_channels,
        all_emojis,
    ) = tokio::try_join!(
        run!(pool, ctx, top_images_by_user),
        run!(pool, ctx, top_videos_by_user),
        run!(pool, ctx, top_text),
        run!(pool, ctx, top_text_by_user),
        run!(pool, ctx, top_replies),
        run!(pool, ctx, top_replies_by_user),
        run!(pool, ctx, overall_stats_by_user),
        run!(pool, ctx, roster),
        run!(pool, ctx, channel_index),
        run!(pool, ctx, emoji_index),
    )?;

    // These two read the side index the leaderboard expansions filled
    // in, so they have to come after every ranking query finished.
    let messages_with_attachments = ctx.attachment_index();
    let all_attachments = ctx.flat_attachments();

    Ok(Snapshot {
        swear_words_by_user,
        swear_words_by_weekday,
        messages_by_user,
        messages_by_hour,
        messages_by_weekday,
        messages_by_weekday_by_user,
        messages_by_hour_by_user,
        messages_by_hour_by_channel,
        messages_by_channel_by_user,
        messages_by_user_by_channel,
        top_images,
        top_videos,
        top_images_by_channel,
        top_videos_by_channel,
        top_images_by_user,
        top_videos_by_user,
        top_text,
        top_text_by_user,
        top_replies,
        top_replies_by_user,
        overall_stats_by_user,
        all_users,
        all_channels,
        all_emojis,
        messages_with_attachments,
        all_attachments,
    })
}

/// Writes the snapshot twice: a plain JSON blob, and a TypeScript
/// module with one `export const` per key for direct frontend import.
pub fn write_blob(snapshot: &Snapshot, json_path: &Path, ts_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(json_path, &json)
        .with_context(|| format!("writing {}", json_path.display()))?;

    let value = serde_json::to_value(snapshot)?;
    let object = value
        .as_object()
        .context("snapshot did not serialize to an object")?;
    let mut module = String::new();
    for (key, field) in object {
        module.push_str(&format!(
            "export const {key} = {} as const;\n\n",
            serde_json::to_string_pretty(field)?
        ));
    }
    std::fs::write(ts_path, module)
        .with_context(|| format!("writing {}", ts_path.display()))?;

    utils::log_snapshot_written(json_path, ts_path);
    Ok(())
}
