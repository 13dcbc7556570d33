use super::{ChannelCount, HourBucket, StatsContext, UserCount, WeekdayBucket};
use crate::db;
use crate::schema::messages;
use anyhow::Result;
use diesel::dsl::count;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeMap;

// Only buckets with at least one message appear; consumers filling a
// fixed 24/7-slot display supply the zeroes themselves.

impl StatsContext {
    pub fn messages_by_user(&self, conn: &mut SqliteConnection) -> Result<Vec<UserCount>> {
        let rows: Vec<(i64, String)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .group_by(messages::user_id)
            .select((count(messages::id), messages::user_id))
            .order(messages::user_id.asc())
            .load(conn)?;

        Ok(rows
            .into_iter()
            .map(|(n, user_id)| UserCount { count: n, user_id })
            .collect())
    }

    pub fn messages_by_hour(&self, conn: &mut SqliteConnection) -> Result<Vec<HourBucket>> {
        let rows: Vec<(i64, i32)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .group_by(messages::sent_hour)
            .select((count(messages::id), messages::sent_hour))
            .order(messages::sent_hour.asc())
            .load(conn)?;

        Ok(rows
            .into_iter()
            .map(|(n, hour)| HourBucket { count: n, hour })
            .collect())
    }

    pub fn messages_by_weekday(&self, conn: &mut SqliteConnection) -> Result<Vec<WeekdayBucket>> {
        let rows: Vec<(i64, i32)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .group_by(messages::sent_dow)
            .select((count(messages::id), messages::sent_dow))
            .order(messages::sent_dow.asc())
            .load(conn)?;

        Ok(rows
            .into_iter()
            .map(|(n, dow)| WeekdayBucket { count: n, dow })
            .collect())
    }

    pub fn messages_by_hour_by_channel(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<HourBucket>>> {
        let rows: Vec<(String, i32, i64)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .group_by((messages::channel_id, messages::sent_hour))
            .select((messages::channel_id, messages::sent_hour, count(messages::id)))
            .order((messages::channel_id.asc(), messages::sent_hour.asc()))
            .load(conn)?;

        let mut grouped: BTreeMap<String, Vec<HourBucket>> = BTreeMap::new();
        for (channel_id, hour, n) in rows {
            grouped
                .entry(channel_id)
                .or_default()
                .push(HourBucket { count: n, hour });
        }
        Ok(grouped)
    }

    pub fn messages_by_hour_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<HourBucket>>> {
        let rows: Vec<(String, i32, i64)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .group_by((messages::user_id, messages::sent_hour))
            .select((messages::user_id, messages::sent_hour, count(messages::id)))
            .order((messages::user_id.asc(), messages::sent_hour.asc()))
            .load(conn)?;

        let mut grouped: BTreeMap<String, Vec<HourBucket>> = BTreeMap::new();
        for (user_id, hour, n) in rows {
            grouped
                .entry(user_id)
                .or_default()
                .push(HourBucket { count: n, hour });
        }
        Ok(grouped)
    }

    pub fn messages_by_weekday_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<WeekdayBucket>>> {
        let rows: Vec<(String, i32, i64)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .group_by((messages::user_id, messages::sent_dow))
            .select((messages::user_id, messages::sent_dow, count(messages::id)))
            .order((messages::user_id.asc(), messages::sent_dow.asc()))
            .load(conn)?;

        let mut grouped: BTreeMap<String, Vec<WeekdayBucket>> = BTreeMap::new();
        for (user_id, dow, n) in rows {
            grouped
                .entry(user_id)
                .or_default()
                .push(WeekdayBucket { count: n, dow });
        }
        Ok(grouped)
    }

    /// Per channel, who wrote how much. Every channel appears, even
    /// when it has no post-cutoff messages.
    pub fn messages_by_channel_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<UserCount>>> {
        let mut result = BTreeMap::new();
        for channel_id in db::all_channel_ids(conn)? {
            let rows: Vec<(i64, String)> = messages::table
                .filter(messages::channel_id.eq(&channel_id))
                .filter(messages::sent_at.gt(self.cutoff))
                .group_by(messages::user_id)
                .select((count(messages::id), messages::user_id))
                .order(messages::user_id.asc())
                .load(conn)?;

            result.insert(
                channel_id,
                rows.into_iter()
                    .map(|(n, user_id)| UserCount { count: n, user_id })
                    .collect(),
            );
        }
        Ok(result)
    }

    /// Per allow-listed user, where they wrote. Every allow-listed user
    /// appears.
    pub fn messages_by_user_by_channel(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<ChannelCount>>> {
        let mut result = BTreeMap::new();
        for user_id in &self.included_users {
            let rows: Vec<(i64, String)> = messages::table
                .filter(messages::user_id.eq(user_id))
                .filter(messages::sent_at.gt(self.cutoff))
                .group_by(messages::channel_id)
                .select((count(messages::id), messages::channel_id))
                .order(messages::channel_id.asc())
                .load(conn)?;

            result.insert(
                user_id.clone(),
                rows.into_iter()
                    .map(|(n, channel_id)| ChannelCount {
                        count: n,
                        channel_id,
                    })
                    .collect(),
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::test_context;
    use super::*;
    use crate::db::testing::*;

    #[test]
    fn hour_histogram_has_only_non_empty_buckets() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_message(&mut conn, "m1", "u1", "c1", ts(2024, 3, 1, 3, 10), "a");
        seed_message(&mut conn, "m2", "u1", "c1", ts(2024, 3, 2, 3, 50), "b");
        seed_message(&mut conn, "m3", "u1", "c1", ts(2024, 3, 1, 7, 0), "c");

        let ctx = test_context(0);
        let buckets = ctx.messages_by_hour(&mut conn).unwrap();
        assert_eq!(
            buckets,
            vec![
                HourBucket { count: 2, hour: 3 },
                HourBucket { count: 1, hour: 7 },
            ]
        );
    }

    #[test]
    fn cutoff_excludes_messages_at_or_before_it() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        let cutoff = ts(2024, 1, 1, 0, 0);
        seed_message(&mut conn, "old", "u1", "c1", cutoff - 1, "pre");
        seed_message(&mut conn, "edge", "u1", "c1", cutoff, "at");
        seed_message(&mut conn, "new", "u1", "c1", cutoff + 1, "post");

        let ctx = test_context(cutoff);
        let total: i64 = ctx
            .messages_by_hour(&mut conn)
            .unwrap()
            .iter()
            .map(|b| b.count)
            .sum();
        assert_eq!(total, 1);

        let by_user = ctx.messages_by_user(&mut conn).unwrap();
        assert_eq!(
            by_user,
            vec![UserCount {
                count: 1,
                user_id: "u1".to_string()
            }]
        );
    }

    #[test]
    fn weekday_histogram_counts_per_dow() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        // 2024-05-05 was a Sunday, 2024-05-06 a Monday.
        seed_message(&mut conn, "m1", "u1", "c1", ts(2024, 5, 5, 10, 0), "a");
        seed_message(&mut conn, "m2", "u1", "c1", ts(2024, 5, 6, 10, 0), "b");
        seed_message(&mut conn, "m3", "u1", "c1", ts(2024, 5, 6, 11, 0), "c");

        let ctx = test_context(0);
        let buckets = ctx.messages_by_weekday(&mut conn).unwrap();
        assert_eq!(
            buckets,
            vec![
                WeekdayBucket { count: 1, dow: 0 },
                WeekdayBucket { count: 2, dow: 1 },
            ]
        );
    }

    #[test]
    fn per_channel_breakdown_includes_empty_channels() {
        let mut conn = test_connection();
        seed_user(&mut conn, "u1");
        seed_channel(&mut conn, "c1");
        seed_channel(&mut conn, "quiet");
        seed_message(&mut conn, "m1", "u1", "c1", ts(2024, 3, 1, 10, 0), "a");

        let ctx = test_context(0);
        let by_channel = ctx.messages_by_channel_by_user(&mut conn).unwrap();
        assert_eq!(by_channel.len(), 2);
        assert_eq!(by_channel["c1"].len(), 1);
        assert!(by_channel["quiet"].is_empty());
    }
}
