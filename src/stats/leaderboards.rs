use super::{MessageDetail, StatsContext};
use crate::db;
use crate::schema::{attachments, messages, reactions, replies};
use anyhow::Result;
use diesel::dsl::count;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeMap;

enum Scope<'a> {
    Global,
    Channel(&'a str),
    User(&'a str),
}

// Reaction counts are taken over the join product, so a message with
// several matching attachments weighs each reaction once per
// attachment. This matches the upstream ranking contract. Ties break
// deterministically by message id ascending.

fn top_media_ids(
    conn: &mut SqliteConnection,
    cutoff: i64,
    excluded: &[String],
    mime_prefix: &str,
    scope: Scope<'_>,
    limit: i64,
) -> QueryResult<Vec<String>> {
    let rows: Vec<(String, i64)> = match scope {
        Scope::Global => messages::table
            .inner_join(attachments::table)
            .inner_join(reactions::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(attachments::mime.like(mime_prefix))
            .filter(reactions::emoji_id.ne_all(excluded))
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
        Scope::Channel(channel_id) => messages::table
            .inner_join(attachments::table)
            .inner_join(reactions::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(messages::channel_id.eq(channel_id))
            .filter(attachments::mime.like(mime_prefix))
            .filter(reactions::emoji_id.ne_all(excluded))
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
        Scope::User(user_id) => messages::table
            .inner_join(attachments::table)
            .inner_join(reactions::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(messages::user_id.eq(user_id))
            .filter(attachments::mime.like(mime_prefix))
            .filter(reactions::emoji_id.ne_all(excluded))
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
    };

    Ok(rows.into_iter().map(|(id, _)| id).collect())
}

fn top_text_ids(
    conn: &mut SqliteConnection,
    cutoff: i64,
    excluded: &[String],
    scope: Scope<'_>,
    limit: i64,
) -> QueryResult<Vec<String>> {
    let rows: Vec<(String, i64)> = match scope {
        Scope::Global => messages::table
            .inner_join(reactions::table)
            .left_join(attachments::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(reactions::emoji_id.ne_all(excluded))
            .filter(attachments::id.is_null())
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
        Scope::User(user_id) => messages::table
            .inner_join(reactions::table)
            .left_join(attachments::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(messages::user_id.eq(user_id))
            .filter(reactions::emoji_id.ne_all(excluded))
            .filter(attachments::id.is_null())
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
        Scope::Channel(_) => Vec::new(),
    };

    Ok(rows.into_iter().map(|(id, _)| id).collect())
}

fn top_reply_ids(
    conn: &mut SqliteConnection,
    cutoff: i64,
    excluded: &[String],
    scope: Scope<'_>,
    limit: i64,
) -> QueryResult<Vec<String>> {
    let rows: Vec<(String, i64)> = match scope {
        Scope::Global => messages::table
            .inner_join(reactions::table)
            .inner_join(replies::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(reactions::emoji_id.ne_all(excluded))
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
        Scope::User(user_id) => messages::table
            .inner_join(reactions::table)
            .inner_join(replies::table)
            .filter(messages::sent_at.gt(cutoff))
            .filter(messages::user_id.eq(user_id))
            .filter(reactions::emoji_id.ne_all(excluded))
            .group_by(messages::id)
            .select((messages::id, count(reactions::user_id)))
            .order((count(reactions::user_id).desc(), messages::id.asc()))
            .limit(limit)
            .load(conn)?,
        Scope::Channel(_) => Vec::new(),
    };

    Ok(rows.into_iter().map(|(id, _)| id).collect())
}

impl StatsContext {
    pub fn top_images(&self, conn: &mut SqliteConnection) -> Result<Vec<MessageDetail>> {
        let ids = top_media_ids(
            conn,
            self.cutoff,
            &self.excluded_emoji,
            "image/%",
            Scope::Global,
            self.limits.top_media,
        )?;
        self.expand(conn, &ids)
    }

    pub fn top_videos(&self, conn: &mut SqliteConnection) -> Result<Vec<MessageDetail>> {
        let ids = top_media_ids(
            conn,
            self.cutoff,
            &self.excluded_emoji,
            "video/%",
            Scope::Global,
            self.limits.top_media,
        )?;
        self.expand(conn, &ids)
    }

    pub fn top_images_by_channel(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        self.media_by_channel(conn, "image/%")
    }

    pub fn top_videos_by_channel(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        self.media_by_channel(conn, "video/%")
    }

    fn media_by_channel(
        &self,
        conn: &mut SqliteConnection,
        mime_prefix: &str,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        let mut result = BTreeMap::new();
        for channel_id in db::all_channel_ids(conn)? {
            let ids = top_media_ids(
                conn,
                self.cutoff,
                &self.excluded_emoji,
                mime_prefix,
                Scope::Channel(&channel_id),
                self.limits.per_scope,
            )?;
            result.insert(channel_id, self.expand(conn, &ids)?);
        }
        Ok(result)
    }

    pub fn top_images_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        self.media_by_user(conn, "image/%")
    }

    pub fn top_videos_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        self.media_by_user(conn, "video/%")
    }

    fn media_by_user(
        &self,
        conn: &mut SqliteConnection,
        mime_prefix: &str,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        let mut result = BTreeMap::new();
        for user_id in &self.included_users {
            let ids = top_media_ids(
                conn,
                self.cutoff,
                &self.excluded_emoji,
                mime_prefix,
                Scope::User(user_id),
                self.limits.per_scope,
            )?;
            result.insert(user_id.clone(), self.expand(conn, &ids)?);
        }
        Ok(result)
    }

    /// Most-reacted messages carrying no attachment at all.
    pub fn top_text(&self, conn: &mut SqliteConnection) -> Result<Vec<MessageDetail>> {
        let ids = top_text_ids(
            conn,
            self.cutoff,
            &self.excluded_emoji,
            Scope::Global,
            self.limits.top_text,
        )?;
        self.expand(conn, &ids)
    }

    pub fn top_text_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        let mut result = BTreeMap::new();
        for user_id in &self.included_users {
            let ids = top_text_ids(
                conn,
                self.cutoff,
                &self.excluded_emoji,
                Scope::User(user_id),
                self.limits.top_text_per_user,
            )?;
            result.insert(user_id.clone(), self.expand(conn, &ids)?);
        }
        Ok(result)
    }

    pub fn top_replies(&self, conn: &mut SqliteConnection) -> Result<Vec<MessageDetail>> {
        let ids = top_reply_ids(
            conn,
            self.cutoff,
            &self.excluded_emoji,
            Scope::Global,
            self.limits.top_replies,
        )?;
        self.expand(conn, &ids)
    }

    pub fn top_replies_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<MessageDetail>>> {
        let mut result = BTreeMap::new();
        for user_id in &self.included_users {
            let ids = top_reply_ids(
                conn,
                self.cutoff,
                &self.excluded_emoji,
                Scope::User(user_id),
                self.limits.per_scope,
            )?;
            result.insert(user_id.clone(), self.expand(conn, &ids)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::test_context;
    use super::*;
    use crate::db::testing::*;
    use crate::settings::Settings;
    use crate::stats::StatsContext;

    fn seed_image_message(
        conn: &mut SqliteConnection,
        id: &str,
        sent_at: i64,
        reaction_count: usize,
    ) {
        seed_message(conn, id, "u1", "c1", sent_at, "look");
        seed_attachment(conn, &format!("att-{id}"), id, "image/png");
        for i in 0..reaction_count {
            seed_reaction(conn, &format!("reactor-{i}"), id, "e1");
        }
    }

    #[test]
    fn top_images_cap_and_strict_descending_order() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_emoji(&mut conn, "e1");
        for i in 1..=20usize {
            seed_image_message(
                &mut conn,
                &format!("m{i:02}"),
                ts(2024, 3, 1, 10, 0) + i as i64,
                i,
            );
        }

        let ctx = test_context(0);
        let top = ctx.top_images(&mut conn).unwrap();
        assert_eq!(top.len(), 16);

        let counts: Vec<i64> = top
            .iter()
            .map(|m| m.reactions.iter().map(|r| r.count).sum())
            .collect();
        assert!(counts.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(top[0].id, "m20");
    }

    #[test]
    fn ties_break_by_message_id_ascending() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_emoji(&mut conn, "e1");
        seed_image_message(&mut conn, "mb", ts(2024, 3, 1, 10, 0), 2);
        seed_image_message(&mut conn, "ma", ts(2024, 3, 2, 10, 0), 2);

        let ctx = test_context(0);
        let top = ctx.top_images(&mut conn).unwrap();
        assert_eq!(
            top.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["ma", "mb"]
        );
    }

    #[test]
    fn excluded_emoji_carry_no_ranking_weight() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_emoji(&mut conn, "e1");
        seed_emoji(&mut conn, "spam");
        // "winner" has 2 real reactions; "spammy" has 1 real and 3 spam.
        seed_image_message(&mut conn, "winner", ts(2024, 3, 1, 10, 0), 2);
        seed_image_message(&mut conn, "spammy", ts(2024, 3, 2, 10, 0), 1);
        for i in 0..3 {
            seed_reaction(&mut conn, &format!("bot-{i}"), "spammy", "spam");
        }

        let without_exclusion = test_context(0);
        let top = without_exclusion.top_images(&mut conn).unwrap();
        assert_eq!(top[0].id, "spammy");

        let defaults = Settings::default();
        let with_exclusion = StatsContext::new(
            0,
            vec![],
            vec!["spam".to_string()],
            defaults.stats.limits,
            defaults.swears,
        );
        let top = with_exclusion.top_images(&mut conn).unwrap();
        assert_eq!(top[0].id, "winner");
    }

    #[test]
    fn text_ranking_skips_messages_with_attachments() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_emoji(&mut conn, "e1");
        seed_message(&mut conn, "plain", "u1", "c1", ts(2024, 3, 1, 10, 0), "t");
        seed_reaction(&mut conn, "r1", "plain", "e1");
        seed_image_message(&mut conn, "pic", ts(2024, 3, 2, 10, 0), 5);

        let ctx = test_context(0);
        let top = ctx.top_text(&mut conn).unwrap();
        assert_eq!(
            top.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["plain"]
        );
    }

    #[test]
    fn reply_ranking_only_counts_reply_messages() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_emoji(&mut conn, "e1");
        seed_message(&mut conn, "root", "u1", "c1", ts(2024, 3, 1, 10, 0), "q");
        seed_message(&mut conn, "answer", "u1", "c1", ts(2024, 3, 1, 10, 5), "a");
        crate::db::insert_reply(
            &mut conn,
            &crate::db::NewReply {
                message_id: "answer".to_string(),
                reply_to: "root".to_string(),
            },
        )
        .unwrap();
        seed_reaction(&mut conn, "r1", "root", "e1");
        seed_reaction(&mut conn, "r2", "answer", "e1");

        let ctx = test_context(0);
        let top = ctx.top_replies(&mut conn).unwrap();
        assert_eq!(
            top.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["answer"]
        );
        assert_eq!(top[0].reply_to.as_ref().unwrap().id, "root");
    }

    #[test]
    fn per_user_media_respects_the_allow_list_and_scope_limit() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_user(&mut conn, "u2");
        seed_user(&mut conn, "outsider");
        seed_channel(&mut conn, "c1");
        seed_emoji(&mut conn, "e1");
        for i in 1..=12usize {
            let id = format!("m{i:02}");
            seed_message(&mut conn, &id, "u1", "c1", ts(2024, 3, 1, 10, 0) + i as i64, "x");
            seed_attachment(&mut conn, &format!("att-{id}"), &id, "image/png");
            seed_reaction(&mut conn, "r1", &id, "e1");
            seed_reaction(&mut conn, &format!("r-{i}"), &id, "e1");
        }
        seed_message(&mut conn, "other", "outsider", "c1", ts(2024, 3, 5, 10, 0), "y");
        seed_attachment(&mut conn, "att-other", "other", "image/png");
        seed_reaction(&mut conn, "r1", "other", "e1");

        let ctx = test_context(0);
        let by_user = ctx.top_images_by_user(&mut conn).unwrap();
        // Allow-list from the test context: u1 and u2 only.
        assert_eq!(by_user.len(), 2);
        assert_eq!(by_user["u1"].len(), 10);
        assert!(by_user["u2"].is_empty());
        assert!(!by_user.contains_key("outsider"));
    }
}
