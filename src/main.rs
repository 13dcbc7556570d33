use anyhow::{Context, Result};
use guild_wrapped::db::{configure_connection, establish_pool, run_migrations};
use guild_wrapped::scrape::{run_scrape, ScrapeConfig};
use guild_wrapped::settings::settings;
use guild_wrapped::source::discord::DiscordSource;
use guild_wrapped::utils;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("guild_wrapped=info".parse()?))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        );
    set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let settings = settings();
    let token = std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?;
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| settings.server.database_url.clone());

    utils::log_init(settings.server.guild_id, &database_url);

    let pool = establish_pool(&database_url);
    {
        let mut conn = pool.get().expect("Failed to get initial connection");
        configure_connection(&mut conn).expect("Failed to configure SQLite connection");
        run_migrations(&mut conn)?;
    }

    let source = DiscordSource::new(&token, settings.server.guild_id);
    let config = ScrapeConfig {
        page_size: settings.scrape.page_size,
        horizon: settings.scrape.horizon,
        skipped_channels: settings.scrape.skipped_channels.clone(),
    };

    let summary = run_scrape(&source, &pool, &config).await?;
    utils::log_scrape_done(&summary);

    Ok(())
}
