pub mod db;
pub mod ingest;
pub mod refresh;
pub mod schema;
pub mod scrape;
pub mod settings;
pub mod snapshot;
pub mod source;
pub mod stats;
pub mod utils;
