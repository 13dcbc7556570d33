use super::{EmojiCount, StatsContext};
use crate::schema::{attachments, messages, reactions, replies};
use anyhow::Result;
use diesel::dsl::count;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::collections::BTreeMap;

/// One user's totals for the whole period.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    pub total_messages: i64,
    pub total_reactions_given: i64,
    pub total_reactions_received: i64,
    pub favorite_reaction_emojis: Vec<EmojiCount>,
    pub top_received_emojis: Vec<EmojiCount>,
    pub replies_received: i64,
    pub replies_sent: i64,
    pub images_sent: i64,
    pub videos_sent: i64,
}

impl StatsContext {
    pub fn overall_stats_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, UserOverview>> {
        let mut result = BTreeMap::new();
        for user_id in &self.included_users {
            result.insert(user_id.clone(), self.user_overview(conn, user_id)?);
        }
        Ok(result)
    }

    fn user_overview(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<UserOverview> {
        let total_messages: i64 = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .count()
            .get_result(conn)?;

        let total_reactions_given: i64 = reactions::table
            .inner_join(messages::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(reactions::user_id.eq(user_id))
            .count()
            .get_result(conn)?;

        let total_reactions_received: i64 = reactions::table
            .inner_join(messages::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .count()
            .get_result(conn)?;

        let favorite_reaction_emojis = reactions::table
            .inner_join(messages::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(reactions::user_id.eq(user_id))
            .group_by(reactions::emoji_id)
            .select((count(reactions::message_id), reactions::emoji_id))
            .order((count(reactions::message_id).desc(), reactions::emoji_id.asc()))
            .limit(self.limits.top_emojis)
            .load::<(i64, String)>(conn)?
            .into_iter()
            .map(|(count, emoji_id)| EmojiCount { count, emoji_id })
            .collect();

        let top_received_emojis = reactions::table
            .inner_join(messages::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .group_by(reactions::emoji_id)
            .select((count(reactions::user_id), reactions::emoji_id))
            .order((count(reactions::user_id).desc(), reactions::emoji_id.asc()))
            .limit(self.limits.top_emojis)
            .load::<(i64, String)>(conn)?
            .into_iter()
            .map(|(count, emoji_id)| EmojiCount { count, emoji_id })
            .collect();

        // Replies pointing AT this user's messages.
        let replies_received: i64 = messages::table
            .inner_join(replies::table.on(replies::reply_to.eq(messages::id)))
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .count()
            .get_result(conn)?;

        let replies_sent: i64 = messages::table
            .inner_join(replies::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .count()
            .get_result(conn)?;

        let images_sent: i64 = messages::table
            .inner_join(attachments::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .filter(attachments::mime.like("image/%"))
            .count()
            .get_result(conn)?;

        let videos_sent: i64 = messages::table
            .inner_join(attachments::table)
            .filter(messages::sent_at.gt(self.cutoff))
            .filter(messages::user_id.eq(user_id))
            .filter(attachments::mime.like("video/%"))
            .count()
            .get_result(conn)?;

        Ok(UserOverview {
            total_messages,
            total_reactions_given,
            total_reactions_received,
            favorite_reaction_emojis,
            top_received_emojis,
            replies_received,
            replies_sent,
            images_sent,
            videos_sent,
        })
    }
}
