use std::path::Path;

use anyhow::{Context, Result};
use guild_wrapped::db::AttachmentRecord;
use guild_wrapped::settings::settings;
use guild_wrapped::utils;
use serde::Deserialize;

/// The only snapshot key this tool cares about.
#[derive(Deserialize)]
struct Blob {
    #[serde(rename = "allAttachments")]
    all_attachments: Vec<AttachmentRecord>,
}

fn file_extension(attachment: &AttachmentRecord) -> &str {
    let path = attachment.url.split('?').next().unwrap_or(&attachment.url);
    if let Some(dot) = path.rfind('.') {
        let ext = &path[dot + 1..];
        if !ext.is_empty() && !ext.contains('/') {
            return ext;
        }
    }
    attachment.mime.split('/').last().unwrap_or("bin")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = settings();
    let blob_path = Path::new(&settings.output.blob_json);
    let content = std::fs::read_to_string(blob_path)
        .with_context(|| format!("reading {}", blob_path.display()))?;
    let blob: Blob = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", blob_path.display()))?;

    let out_dir = Path::new(&settings.output.attachments_dir);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    utils::log_download_start(blob.all_attachments.len());

    let client = reqwest::Client::new();
    let mut saved = 0;
    let mut skipped = 0;
    for attachment in &blob.all_attachments {
        let file_name = format!("{}.{}", attachment.id, file_extension(attachment));
        let target = out_dir.join(&file_name);
        if target.exists() {
            skipped += 1;
            utils::log_download_skipped(&attachment.id, "already downloaded");
            continue;
        }

        // A dead URL means the blob is stale; stop and let the
        // operator run refresh-attachments + wrapped-stats first.
        let bytes = client
            .get(&attachment.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("fetching attachment {}", attachment.id))?
            .bytes()
            .await?;

        std::fs::write(&target, &bytes)
            .with_context(|| format!("writing {}", target.display()))?;
        saved += 1;
        utils::log_download_saved(&file_name);
    }

    utils::log_download_done(saved, skipped);
    Ok(())
}
