use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

static SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub scrape: Scrape,
    pub stats: Stats,
    pub output: Output,
    pub swears: Vec<SwearWord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub guild_id: u64,
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scrape {
    pub page_size: u8,
    /// Paging backward through a channel stops once the earliest seen
    /// message is at or before this unix timestamp.
    pub horizon: i64,
    pub skipped_channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Messages at or before this unix timestamp are excluded everywhere.
    pub cutoff: i64,
    pub included_users: Vec<String>,
    pub excluded_emoji: Vec<String>,
    pub limits: Limits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub top_media: i64,
    pub top_text: i64,
    pub top_text_per_user: i64,
    pub top_replies: i64,
    pub per_scope: i64,
    pub top_emojis: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub blob_json: String,
    pub blob_ts: String,
    pub attachments_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwearWord {
    pub word: String,
    pub pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: Server {
                guild_id: 0,
                database_url: "wrapped.db".to_string(),
            },
            scrape: Scrape {
                page_size: 100,
                // 2023-12-31T23:59:59Z
                horizon: 1_704_067_199,
                skipped_channels: vec![],
            },
            stats: Stats {
                cutoff: 1_704_067_199,
                included_users: vec![],
                excluded_emoji: vec![],
                limits: Limits {
                    top_media: 16,
                    top_text: 20,
                    top_text_per_user: 15,
                    top_replies: 20,
                    per_scope: 10,
                    top_emojis: 5,
                },
            },
            output: Output {
                blob_json: "data.json".to_string(),
                blob_ts: "data.ts".to_string(),
                attachments_dir: "attachments".to_string(),
            },
            swears: vec![
                swear("vittu", "(^|\\s)(v+i+tt+u)|(v+i+t+u+n)"),
                swear("perkele", "(^|\\s)p+e+r+k+e+l+e"),
                swear("saatana", "(^|\\s)s(a|u)a+tana"),
                swear("paska", "(^|\\s)paska"),
                swear("helvetti", "(^|\\s)helvet+i"),
                swear("hitto", "(^|\\s)hit+o"),
                swear("jumalauta", "(^|\\s)jumalaut"),
                swear("perse", "(^|\\s)perse"),
            ],
        }
    }
}

fn swear(word: &str, pattern: &str) -> SwearWord {
    SwearWord {
        word: word.to_string(),
        pattern: pattern.to_string(),
    }
}

impl Settings {
    pub fn load() -> &'static Settings {
        SETTINGS.get_or_init(Self::load_from_files)
    }

    fn load_from_files() -> Settings {
        let default_path = Path::new("settings.default.ron");
        let override_path = Path::new("settings.ron");

        let mut settings = if default_path.exists() {
            fs::read_to_string(default_path)
                .ok()
                .and_then(|content| ron::from_str(&content).ok())
                .unwrap_or_default()
        } else {
            Settings::default()
        };

        if override_path.exists() {
            if let Ok(content) = fs::read_to_string(override_path) {
                if let Ok(overrides) = ron::from_str::<Settings>(&content) {
                    settings = overrides;
                }
            }
        }

        settings
    }
}

pub fn settings() -> &'static Settings {
    Settings::load()
}
