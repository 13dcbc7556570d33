use crate::db::{self, DbPool};
use crate::source::MessageSource;
use crate::utils;
use anyhow::Result;

/// Re-fetches every stored message that carries attachments and
/// upserts the current CDN URLs. Attachment links expire; running
/// this right before a snapshot keeps the published blob clickable.
pub async fn run_refresh<S: MessageSource + ?Sized>(source: &S, pool: &DbPool) -> Result<usize> {
    let index = {
        let mut conn = pool.get()?;
        db::messages_with_attachments(&mut conn)?
    };
    utils::log_refresh_start(index.len());

    let mut refreshed = 0;
    for (message_id, channel_id) in index {
        let current = source.attachments(&channel_id, &message_id).await?;
        let mut conn = pool.get()?;
        for raw in current {
            db::upsert_attachment(
                &mut conn,
                &db::AttachmentRecord {
                    id: raw.id,
                    message_id: message_id.clone(),
                    mime: raw.mime,
                    url: raw.url,
                },
            )?;
            refreshed += 1;
        }
        utils::log_refresh_progress(&message_id);
    }

    utils::log_refresh_done(refreshed);
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::db::{establish_pool, run_migrations};
    use crate::source::{RawAttachment, RawChannel, RawEmoji, RawMember, RawMessage};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        attachments: HashMap<String, Vec<RawAttachment>>,
    }

    #[async_trait]
    impl MessageSource for StubSource {
        async fn channels(&self) -> Result<Vec<RawChannel>> {
            Ok(vec![])
        }

        async fn members(&self) -> Result<Vec<RawMember>> {
            Ok(vec![])
        }

        async fn message_page(
            &self,
            _channel_id: &str,
            _before: Option<&str>,
            _limit: u8,
        ) -> Result<Vec<RawMessage>> {
            Ok(vec![])
        }

        async fn reactors(
            &self,
            _channel_id: &str,
            _message_id: &str,
            _emoji: &RawEmoji,
        ) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn attachments(
            &self,
            _channel_id: &str,
            message_id: &str,
        ) -> Result<Vec<RawAttachment>> {
            Ok(self.attachments.get(message_id).cloned().unwrap_or_default())
        }
    }

    fn refresh_pool() -> DbPool {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "wrapped-refresh-test-{}-{}.db",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_file(&path);
        let pool = establish_pool(path.to_str().unwrap());
        let mut conn = pool.get().unwrap();
        run_migrations(&mut conn).unwrap();
        pool
    }

    #[tokio::test]
    async fn refresh_replaces_stale_urls_in_place() {
        let pool = refresh_pool();
        {
            let mut conn = pool.get().unwrap();
            seed_user(&mut conn, "u1");
            seed_channel(&mut conn, "c1");
            seed_message(&mut conn, "m1", "u1", "c1", ts(2024, 6, 1, 12, 0), "pic");
            seed_attachment(&mut conn, "a1", "m1", "image/png");
        }

        let source = StubSource {
            attachments: HashMap::from([(
                "m1".to_string(),
                vec![RawAttachment {
                    id: "a1".to_string(),
                    mime: "image/png".to_string(),
                    url: "https://cdn.example/fresh/a1.png".to_string(),
                }],
            )]),
        };

        let refreshed = run_refresh(&source, &pool).await.unwrap();
        assert_eq!(refreshed, 1);

        let mut conn = pool.get().unwrap();
        let stored = crate::db::attachments_for_message(&mut conn, "m1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].url, "https://cdn.example/fresh/a1.png");
    }

    #[tokio::test]
    async fn messages_without_stored_attachments_are_not_queried() {
        let pool = refresh_pool();
        {
            let mut conn = pool.get().unwrap();
            seed_user(&mut conn, "u1");
            seed_channel(&mut conn, "c1");
            seed_message(&mut conn, "plain", "u1", "c1", ts(2024, 6, 1, 12, 0), "hi");
        }

        let source = StubSource {
            attachments: HashMap::new(),
        };
        let refreshed = run_refresh(&source, &pool).await.unwrap();
        assert_eq!(refreshed, 0);
    }
}
