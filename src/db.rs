use crate::schema::{attachments, channels, emojis, messages, reactions, replies, users};
use anyhow::Context;
use diesel::connection::SimpleConnection;
use diesel::dsl::count;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::{Deserialize, Serialize};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn establish_pool(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    // The snapshot batch checks out up to 14 connections at once; a
    // smaller pool would park queries against r2d2's checkout timeout.
    Pool::builder()
        .max_size(16)
        .build(manager)
        .expect("Failed to create pool")
}

pub fn configure_connection(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute("PRAGMA busy_timeout = 2000;")?;
    conn.batch_execute("PRAGMA journal_mode = WAL;")?;
    conn.batch_execute("PRAGMA synchronous = NORMAL;")?;
    conn.batch_execute("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

pub fn run_migrations(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to run migrations")?;
    Ok(())
}

#[derive(Queryable, Selectable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = channels)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = emojis)]
pub struct Emoji {
    pub id: String,
    pub name: String,
    pub url: String,
    pub animated: bool,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = messages)]
pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub sent_at: i64,
    pub sent_hour: i32,
    pub sent_dow: i32,
    pub content: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = replies)]
pub struct NewReply {
    pub message_id: String,
    pub reply_to: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = attachments)]
pub struct AttachmentRecord {
    pub id: String,
    pub message_id: String,
    pub mime: String,
    pub url: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = reactions)]
pub struct NewReaction {
    pub user_id: String,
    pub message_id: String,
    pub emoji_id: String,
}

/// Per-emoji reaction tally for one message.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReactionCount {
    pub count: i64,
    pub emoji_id: String,
    pub emoji_name: String,
    pub is_animated: bool,
}

pub fn insert_user(conn: &mut SqliteConnection, user: &User) -> QueryResult<usize> {
    diesel::insert_or_ignore_into(users::table)
        .values(user)
        .execute(conn)
}

pub fn insert_channel(conn: &mut SqliteConnection, channel: &Channel) -> QueryResult<usize> {
    diesel::insert_or_ignore_into(channels::table)
        .values(channel)
        .execute(conn)
}

pub fn insert_emoji(conn: &mut SqliteConnection, emoji: &Emoji) -> QueryResult<usize> {
    diesel::insert_or_ignore_into(emojis::table)
        .values(emoji)
        .execute(conn)
}

pub fn insert_message(conn: &mut SqliteConnection, message: &MessageRow) -> QueryResult<usize> {
    diesel::insert_or_ignore_into(messages::table)
        .values(message)
        .execute(conn)
}

// Plain insert: FK/PK failures must surface so the ingest layer can treat
// the reply edge as best-effort.
pub fn insert_reply(conn: &mut SqliteConnection, reply: &NewReply) -> QueryResult<usize> {
    diesel::insert_into(replies::table)
        .values(reply)
        .execute(conn)
}

pub fn insert_attachment(
    conn: &mut SqliteConnection,
    attachment: &AttachmentRecord,
) -> QueryResult<usize> {
    diesel::insert_or_ignore_into(attachments::table)
        .values(attachment)
        .execute(conn)
}

pub fn upsert_attachment(
    conn: &mut SqliteConnection,
    attachment: &AttachmentRecord,
) -> QueryResult<usize> {
    diesel::insert_into(attachments::table)
        .values(attachment)
        .on_conflict(attachments::id)
        .do_update()
        .set(attachment)
        .execute(conn)
}

pub fn insert_reaction(conn: &mut SqliteConnection, reaction: &NewReaction) -> QueryResult<usize> {
    diesel::insert_or_ignore_into(reactions::table)
        .values(reaction)
        .execute(conn)
}

pub fn all_user_ids(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    users::table.select(users::id).load(conn)
}

pub fn all_channel_ids(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    channels::table.select(channels::id).load(conn)
}

pub fn all_emoji_ids(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    emojis::table.select(emojis::id).load(conn)
}

pub fn all_message_ids(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    messages::table.select(messages::id).load(conn)
}

pub fn all_reaction_keys(
    conn: &mut SqliteConnection,
) -> QueryResult<Vec<(String, String, String)>> {
    reactions::table
        .select((reactions::user_id, reactions::message_id, reactions::emoji_id))
        .load(conn)
}

pub fn users_in(conn: &mut SqliteConnection, ids: &[String]) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::id.eq_any(ids))
        .order(users::id.asc())
        .load(conn)
}

pub fn all_channels(conn: &mut SqliteConnection) -> QueryResult<Vec<Channel>> {
    channels::table.order(channels::id.asc()).load(conn)
}

pub fn all_emojis(conn: &mut SqliteConnection) -> QueryResult<Vec<Emoji>> {
    emojis::table.order(emojis::id.asc()).load(conn)
}

pub fn message_by_id(
    conn: &mut SqliteConnection,
    message_id: &str,
) -> QueryResult<Option<MessageRow>> {
    messages::table.find(message_id).first(conn).optional()
}

/// The message this one replies to, if a reply edge exists.
pub fn replied_message(
    conn: &mut SqliteConnection,
    message_id: &str,
) -> QueryResult<Option<MessageRow>> {
    let reply_to: Option<String> = replies::table
        .filter(replies::message_id.eq(message_id))
        .select(replies::reply_to)
        .first(conn)
        .optional()?;

    match reply_to {
        Some(id) => message_by_id(conn, &id),
        None => Ok(None),
    }
}

pub fn attachments_for_message(
    conn: &mut SqliteConnection,
    message_id: &str,
) -> QueryResult<Vec<AttachmentRecord>> {
    attachments::table
        .filter(attachments::message_id.eq(message_id))
        .order(attachments::id.asc())
        .load(conn)
}

pub fn reaction_counts(
    conn: &mut SqliteConnection,
    message_id: &str,
) -> QueryResult<Vec<ReactionCount>> {
    let rows: Vec<(i64, String, String, bool)> = reactions::table
        .inner_join(emojis::table)
        .filter(reactions::message_id.eq(message_id))
        .group_by((emojis::id, emojis::name, emojis::animated))
        .select((
            count(reactions::user_id),
            emojis::id,
            emojis::name,
            emojis::animated,
        ))
        .order(emojis::id.asc())
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(n, emoji_id, emoji_name, is_animated)| ReactionCount {
            count: n,
            emoji_id,
            emoji_name,
            is_animated,
        })
        .collect())
}

/// Distinct attachment-bearing messages, ordered by (channel, message id).
pub fn messages_with_attachments(
    conn: &mut SqliteConnection,
) -> QueryResult<Vec<(String, String)>> {
    messages::table
        .inner_join(attachments::table)
        .select((messages::id, messages::channel_id))
        .distinct()
        .order((messages::channel_id.asc(), messages::id.asc()))
        .load(conn)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};
    use chrono::Datelike;

    pub fn test_connection() -> SqliteConnection {
        let mut conn =
            SqliteConnection::establish(":memory:").expect("in-memory sqlite should open");
        configure_connection(&mut conn).expect("pragmas");
        run_migrations(&mut conn).expect("migrations");
        conn
    }

    pub fn seed_user(conn: &mut SqliteConnection, id: &str) {
        insert_user(
            conn,
            &User {
                id: id.to_string(),
                name: format!("user-{id}"),
                avatar_url: format!("https://cdn.example/{id}.png"),
            },
        )
        .unwrap();
    }

    pub fn seed_channel(conn: &mut SqliteConnection, id: &str) {
        insert_channel(
            conn,
            &Channel {
                id: id.to_string(),
                name: format!("channel-{id}"),
            },
        )
        .unwrap();
    }

    pub fn seed_emoji(conn: &mut SqliteConnection, id: &str) {
        insert_emoji(
            conn,
            &Emoji {
                id: id.to_string(),
                name: id.to_string(),
                url: String::new(),
                animated: false,
            },
        )
        .unwrap();
    }

    pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
    }

    pub fn seed_message(
        conn: &mut SqliteConnection,
        id: &str,
        user_id: &str,
        channel_id: &str,
        sent_at: i64,
        content: &str,
    ) {
        let dt = chrono::DateTime::from_timestamp(sent_at, 0).unwrap();
        insert_message(
            conn,
            &MessageRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                channel_id: channel_id.to_string(),
                sent_at,
                sent_hour: dt.hour() as i32,
                sent_dow: dt.weekday().num_days_from_sunday() as i32,
                content: content.to_string(),
            },
        )
        .unwrap();
    }

    pub fn seed_reaction(conn: &mut SqliteConnection, user: &str, message: &str, emoji: &str) {
        insert_reaction(
            conn,
            &NewReaction {
                user_id: user.to_string(),
                message_id: message.to_string(),
                emoji_id: emoji.to_string(),
            },
        )
        .unwrap();
    }

    pub fn seed_attachment(
        conn: &mut SqliteConnection,
        id: &str,
        message: &str,
        mime: &str,
    ) {
        insert_attachment(
            conn,
            &AttachmentRecord {
                id: id.to_string(),
                message_id: message.to_string(),
                mime: mime.to_string(),
                url: format!("https://cdn.example/att/{id}"),
            },
        )
        .unwrap();
    }
}
