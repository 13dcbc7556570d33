use std::io::Write;
use std::path::Path;
use std::time::Duration;

use console::Style;

use crate::scrape::ScrapeSummary;

pub fn dim() -> Style {
    Style::new().dim()
}

fn blue() -> Style {
    Style::new().blue()
}

fn magenta() -> Style {
    Style::new().magenta()
}

fn cyan() -> Style {
    Style::new().cyan()
}

fn green() -> Style {
    Style::new().green()
}

fn yellow() -> Style {
    Style::new().yellow()
}

fn bold() -> Style {
    Style::new().bold()
}

fn init_prefix() -> String {
    blue().apply_to("[INIT]").to_string()
}

fn scrape_prefix() -> String {
    magenta().apply_to("[SCRAPE]").to_string()
}

fn stats_prefix() -> String {
    yellow().apply_to("[STATS]").to_string()
}

fn refresh_prefix() -> String {
    cyan().apply_to("[REFRESH]").to_string()
}

fn fetch_prefix() -> String {
    green().apply_to("[FETCH]").to_string()
}

pub fn log_init(guild_id: u64, database_url: &str) {
    println!(
        "{} guild {} into {}",
        init_prefix(),
        cyan().apply_to(guild_id),
        dim().apply_to(database_url),
    );
}

pub fn log_channel_seen(id: &str, name: &str) {
    println!(
        "{} found channel {} {}",
        scrape_prefix(),
        cyan().apply_to(format!("#{name}")),
        dim().apply_to(id),
    );
}

pub fn log_members(count: usize) {
    println!(
        "{} tracking {} members",
        scrape_prefix(),
        bold().apply_to(count),
    );
}

pub fn log_channel_start(name: &str) {
    println!(
        "{} walking {}...",
        scrape_prefix(),
        cyan().apply_to(format!("#{name}")),
    );
}

pub fn log_channel_exhausted(name: &str) {
    println!(
        "\n{} {} has no more history",
        scrape_prefix(),
        cyan().apply_to(format!("#{name}")),
    );
}

pub fn log_channel_horizon(name: &str) {
    println!(
        "\n{} {} reached the horizon",
        scrape_prefix(),
        cyan().apply_to(format!("#{name}")),
    );
}

// Per-message markers stay on one line, a page at a time.
pub fn log_message_inserted() {
    print!(".");
    let _ = std::io::stdout().flush();
}

pub fn log_message_skipped() {
    print!("{}", dim().apply_to("s"));
    let _ = std::io::stdout().flush();
}

pub fn log_scrape_done(summary: &ScrapeSummary) {
    println!(
        "{} done. {} channels, {} inserted, {} already stored",
        scrape_prefix(),
        bold().apply_to(summary.channels),
        green().apply_to(summary.inserted),
        dim().apply_to(summary.skipped),
    );
}

pub fn log_query_done(name: &str, elapsed: Duration) {
    println!(
        "{} {} {}",
        stats_prefix(),
        name,
        dim().apply_to(format!("({}ms)", elapsed.as_millis())),
    );
}

pub fn log_snapshot_written(json_path: &Path, ts_path: &Path) {
    println!(
        "{} wrote {} and {}",
        stats_prefix(),
        green().apply_to(json_path.display()),
        green().apply_to(ts_path.display()),
    );
}

pub fn log_refresh_start(messages: usize) {
    println!(
        "{} refreshing attachments on {} messages...",
        refresh_prefix(),
        bold().apply_to(messages),
    );
}

pub fn log_refresh_progress(message_id: &str) {
    println!("{} {}", refresh_prefix(), dim().apply_to(message_id));
}

pub fn log_refresh_done(attachments: usize) {
    println!(
        "{} done. {} attachment urls refreshed",
        refresh_prefix(),
        green().apply_to(attachments),
    );
}

pub fn log_download_start(total: usize) {
    println!(
        "{} downloading {} attachments...",
        fetch_prefix(),
        bold().apply_to(total),
    );
}

pub fn log_download_saved(file_name: &str) {
    println!("{} saved {}", fetch_prefix(), dim().apply_to(file_name));
}

pub fn log_download_skipped(id: &str, reason: &str) {
    println!(
        "{} skipped {} {}",
        fetch_prefix(),
        yellow().apply_to(id),
        dim().apply_to(reason),
    );
}

pub fn log_download_done(saved: usize, skipped: usize) {
    println!(
        "{} done. {} saved, {} skipped",
        fetch_prefix(),
        green().apply_to(saved),
        dim().apply_to(skipped),
    );
}
