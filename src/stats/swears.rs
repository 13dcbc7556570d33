use super::{StatsContext, UserCount, WeekdayBucket};
use crate::schema::messages;
use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use regex::Regex;
use std::collections::BTreeMap;

/// Word-level profanity tallies, keyed by configured word. A message
/// counts once per word it matches, however many times the word
/// appears in it. SQLite has no regexp support built in, so both
/// breakdowns come from a single scan of the period's message
/// contents, matched against the configured patterns.
impl StatsContext {
    pub fn swear_words_by_user(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<UserCount>>> {
        let patterns = self.compiled_swears()?;
        let rows: Vec<(String, String)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .select((messages::user_id, messages::content))
            .load(conn)?;

        let mut counts: BTreeMap<String, BTreeMap<String, i64>> = patterns
            .iter()
            .map(|(word, _)| (word.clone(), BTreeMap::new()))
            .collect();
        for (user_id, content) in &rows {
            for (word, regex) in &patterns {
                if regex.is_match(content) {
                    *counts
                        .entry(word.clone())
                        .or_default()
                        .entry(user_id.clone())
                        .or_default() += 1;
                }
            }
        }

        Ok(counts
            .into_iter()
            .map(|(word, per_user)| {
                let rows = per_user
                    .into_iter()
                    .map(|(user_id, count)| UserCount { count, user_id })
                    .collect();
                (word, rows)
            })
            .collect())
    }

    pub fn swear_words_by_weekday(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<BTreeMap<String, Vec<WeekdayBucket>>> {
        let patterns = self.compiled_swears()?;
        let rows: Vec<(i32, String)> = messages::table
            .filter(messages::sent_at.gt(self.cutoff))
            .select((messages::sent_dow, messages::content))
            .load(conn)?;

        let mut counts: BTreeMap<String, BTreeMap<i32, i64>> = patterns
            .iter()
            .map(|(word, _)| (word.clone(), BTreeMap::new()))
            .collect();
        for (dow, content) in &rows {
            for (word, regex) in &patterns {
                if regex.is_match(content) {
                    *counts
                        .entry(word.clone())
                        .or_default()
                        .entry(*dow)
                        .or_default() += 1;
                }
            }
        }

        Ok(counts
            .into_iter()
            .map(|(word, per_dow)| {
                let buckets = per_dow
                    .into_iter()
                    .map(|(dow, count)| WeekdayBucket { count, dow })
                    .collect();
                (word, buckets)
            })
            .collect())
    }

    fn compiled_swears(&self) -> Result<Vec<(String, Regex)>> {
        self.swears
            .iter()
            .map(|swear| {
                let regex = Regex::new(&format!("(?i){}", swear.pattern))
                    .with_context(|| format!("bad pattern for {:?}", swear.word))?;
                Ok((swear.word.clone(), regex))
            })
            .collect()
    }
}
