use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use guild_wrapped::db::{configure_connection, establish_pool, run_migrations};
use guild_wrapped::settings::settings;
use guild_wrapped::snapshot::{build_snapshot, write_blob};
use guild_wrapped::stats::StatsContext;
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
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| settings.server.database_url.clone());

    let pool = establish_pool(&database_url);
    {
        let mut conn = pool.get().expect("Failed to get initial connection");
        configure_connection(&mut conn).expect("Failed to configure SQLite connection");
        run_migrations(&mut conn)?;
    }

    let ctx = Arc::new(StatsContext::new(
        settings.stats.cutoff,
        settings.stats.included_users.clone(),
        settings.stats.excluded_emoji.clone(),
        settings.stats.limits.clone(),
        settings.swears.clone(),
    ));

    let snapshot = build_snapshot(&pool, ctx).await?;
    write_blob(
        &snapshot,
        Path::new(&settings.output.blob_json),
        Path::new(&settings.output.blob_ts),
    )?;

    Ok(())
}
