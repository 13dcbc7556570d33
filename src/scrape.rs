use crate::db::DbPool;
use crate::ingest::{IngestOutcome, IngestSession};
use crate::source::{MessageSource, RawReaction};
use crate::utils;
use anyhow::Result;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub channels: usize,
    pub inserted: usize,
    pub skipped: usize,
}

pub struct ScrapeConfig {
    pub page_size: u8,
    pub horizon: i64,
    pub skipped_channels: Vec<String>,
}

/// One full scrape pass: ensure channels and members, then walk each
/// channel's history backward page by page until it runs out or crosses
/// the horizon date. Safe to re-run over an overlapping range; already
/// ingested messages are skipped from the in-memory existence cache
/// before any reactor hydration happens.
pub async fn run_scrape<S: MessageSource + ?Sized>(
    source: &S,
    pool: &DbPool,
    config: &ScrapeConfig,
) -> Result<ScrapeSummary> {
    let mut conn = pool.get()?;
    let mut session = IngestSession::new();
    let mut summary = ScrapeSummary::default();

    let channels: Vec<_> = source
        .channels()
        .await?
        .into_iter()
        .filter(|ch| !config.skipped_channels.contains(&ch.id))
        .collect();
    for channel in &channels {
        utils::log_channel_seen(&channel.id, &channel.name);
        session.ensure_channel(&mut conn, channel)?;
    }

    let members = source.members().await?;
    utils::log_members(members.len());
    for member in &members {
        session.ensure_user(&mut conn, member)?;
    }

    for channel in &channels {
        utils::log_channel_start(&channel.name);
        let mut before: Option<String> = None;
        let mut earliest_at = i64::MAX;

        loop {
            let page = source
                .message_page(&channel.id, before.as_deref(), config.page_size)
                .await?;
            if page.is_empty() {
                utils::log_channel_exhausted(&channel.name);
                break;
            }

            // The cursor always moves to the oldest message of the
            // page. Timestamps are stored at second granularity, so a
            // whole page can share one sent_at value; keying the
            // cursor on a strictly-smaller timestamp would refetch
            // that page forever.
            if let Some(oldest) = page.last() {
                before = Some(oldest.id.clone());
            }

            for msg in &page {
                if msg.sent_at < earliest_at {
                    earliest_at = msg.sent_at;
                }

                if session.message_exists(&mut conn, &msg.id)? {
                    summary.skipped += 1;
                    utils::log_message_skipped();
                    continue;
                }

                let mut reactions: Vec<RawReaction> = Vec::new();
                for emoji in &msg.reaction_kinds {
                    for user_id in source.reactors(&channel.id, &msg.id, emoji).await? {
                        reactions.push(RawReaction {
                            user_id,
                            emoji: emoji.clone(),
                        });
                    }
                }

                match session.insert_message(&mut conn, msg, &reactions)? {
                    IngestOutcome::Inserted => {
                        summary.inserted += 1;
                        utils::log_message_inserted();
                    }
                    IngestOutcome::SkippedExisting | IngestOutcome::SkippedUnknownAuthor => {
                        summary.skipped += 1;
                        utils::log_message_skipped();
                    }
                }
            }

            if earliest_at <= config.horizon {
                utils::log_channel_horizon(&channel.name);
                break;
            }
        }

        summary.channels += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::ts;
    use crate::db::{configure_connection, establish_pool, run_migrations, DbPool};
    use crate::source::{EmojiKey, RawChannel, RawEmoji, RawMember, RawMessage};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        channels: Vec<RawChannel>,
        members: Vec<RawMember>,
        /// Per channel, full history newest first.
        history: HashMap<String, Vec<RawMessage>>,
        reactors: HashMap<(String, String), Vec<String>>,
        reactor_fetches: AtomicUsize,
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn channels(&self) -> Result<Vec<RawChannel>> {
            Ok(self.channels.clone())
        }

        async fn members(&self) -> Result<Vec<RawMember>> {
            Ok(self.members.clone())
        }

        async fn message_page(
            &self,
            channel_id: &str,
            before: Option<&str>,
            limit: u8,
        ) -> Result<Vec<RawMessage>> {
            let history = self.history.get(channel_id).cloned().unwrap_or_default();
            let start = match before {
                Some(id) => history.iter().position(|m| m.id == id).map_or(0, |i| i + 1),
                None => 0,
            };
            Ok(history
                .into_iter()
                .skip(start)
                .take(limit as usize)
                .collect())
        }

        async fn reactors(
            &self,
            _channel_id: &str,
            message_id: &str,
            emoji: &RawEmoji,
        ) -> Result<Vec<String>> {
            self.reactor_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .reactors
                .get(&(message_id.to_string(), emoji.key.id().to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn attachments(
            &self,
            _channel_id: &str,
            _message_id: &str,
        ) -> Result<Vec<crate::source::RawAttachment>> {
            Ok(vec![])
        }
    }

    // A shared ":memory:" database does not survive r2d2 handing out a
    // second connection, so pool-based tests use a throwaway file.
    fn test_pool() -> DbPool {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "wrapped-scrape-test-{}-{}.db",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_file(&path);
        let pool = establish_pool(path.to_str().unwrap());
        let mut conn = pool.get().unwrap();
        configure_connection(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        pool
    }

    fn msg(id: &str, channel: &str, sent_at: i64) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            channel_id: channel.to_string(),
            author_id: "u1".to_string(),
            sent_at,
            content: format!("message {id}"),
            reply_to: None,
            attachments: vec![],
            reaction_kinds: vec![],
        }
    }

    fn fake_source(history: Vec<RawMessage>) -> FakeSource {
        FakeSource {
            channels: vec![RawChannel {
                id: "c1".to_string(),
                name: "general".to_string(),
            }],
            members: vec![RawMember {
                id: "u1".to_string(),
                name: "someone".to_string(),
                avatar_url: String::new(),
            }],
            history: HashMap::from([("c1".to_string(), history)]),
            reactors: HashMap::new(),
            reactor_fetches: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn scrape_pages_to_the_horizon_and_stops() {
        let history = vec![
            msg("m3", "c1", ts(2024, 3, 3, 10, 0)),
            msg("m2", "c1", ts(2024, 3, 2, 10, 0)),
            msg("m1", "c1", ts(2023, 12, 30, 10, 0)), // past the horizon
            msg("m0", "c1", ts(2023, 12, 29, 10, 0)),
        ];
        let source = fake_source(history);
        let pool = test_pool();
        let config = ScrapeConfig {
            page_size: 3,
            horizon: ts(2023, 12, 31, 23, 59),
            skipped_channels: vec![],
        };

        let summary = run_scrape(&source, &pool, &config).await.unwrap();

        // The page that crossed the horizon is still ingested; paging
        // just does not continue past it, so m0 is never fetched.
        assert_eq!(summary.inserted, 3);
        let mut conn = pool.get().unwrap();
        let mut ids = crate::db::all_message_ids(&mut conn).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn replay_skips_existing_without_hydrating_reactions() {
        let mut first = msg("m1", "c1", ts(2024, 3, 3, 10, 0));
        first.reaction_kinds.push(RawEmoji {
            key: EmojiKey::Unicode("🔥".to_string()),
            name: "🔥".to_string(),
            url: String::new(),
            animated: false,
        });
        let mut source = fake_source(vec![first]);
        source.reactors.insert(
            ("m1".to_string(), "🔥".to_string()),
            vec!["u1".to_string()],
        );
        let pool = test_pool();
        let config = ScrapeConfig {
            page_size: 100,
            horizon: ts(2023, 12, 31, 23, 59),
            skipped_channels: vec![],
        };

        let summary = run_scrape(&source, &pool, &config).await.unwrap();
        assert_eq!(summary.inserted, 1);
        let fetches_after_first = source.reactor_fetches.load(Ordering::SeqCst);
        assert_eq!(fetches_after_first, 1);

        let summary = run_scrape(&source, &pool, &config).await.unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.skipped, 1);
        // Existence is decided before any reactor fetch.
        assert_eq!(
            source.reactor_fetches.load(Ordering::SeqCst),
            fetches_after_first
        );
    }

    #[tokio::test]
    async fn skipped_channels_are_not_walked() {
        let source = FakeSource {
            channels: vec![
                RawChannel {
                    id: "c1".to_string(),
                    name: "general".to_string(),
                },
                RawChannel {
                    id: "c2".to_string(),
                    name: "bots".to_string(),
                },
            ],
            members: vec![],
            history: HashMap::from([
                ("c1".to_string(), vec![]),
                ("c2".to_string(), vec![msg("m1", "c2", ts(2024, 3, 3, 10, 0))]),
            ]),
            reactors: HashMap::new(),
            reactor_fetches: AtomicUsize::new(0),
        };
        let pool = test_pool();
        let config = ScrapeConfig {
            page_size: 100,
            horizon: 0,
            skipped_channels: vec!["c2".to_string()],
        };

        let summary = run_scrape(&source, &pool, &config).await.unwrap();
        assert_eq!(summary.channels, 1);
        let mut conn = pool.get().unwrap();
        assert!(crate::db::all_message_ids(&mut conn).unwrap().is_empty());
        assert_eq!(crate::db::all_channel_ids(&mut conn).unwrap(), vec!["c1"]);
    }

    #[tokio::test]
    async fn pages_sharing_one_timestamp_still_advance() {
        // Second-granularity timestamps mean a burst of messages can
        // land on the same sent_at; paging must still terminate.
        let same_second = ts(2024, 3, 3, 10, 0);
        let history = vec![
            msg("m3", "c1", same_second),
            msg("m2", "c1", same_second),
            msg("m1", "c1", same_second),
        ];
        let source = fake_source(history);
        let pool = test_pool();
        let config = ScrapeConfig {
            page_size: 2,
            horizon: ts(2023, 12, 31, 23, 59),
            skipped_channels: vec![],
        };

        let summary = run_scrape(&source, &pool, &config).await.unwrap();
        assert_eq!(summary.inserted, 3);
        let mut conn = pool.get().unwrap();
        let mut ids = crate::db::all_message_ids(&mut conn).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }
}
