use crate::api::{CaptureApi, HttpCaptureClient};
use crate::cli::render::format_size;
use crate::core::models::OutputFormat;
use crate::core::settings::Settings;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub async fn run(
    settings: &Settings,
    id: String,
    format: Option<OutputFormat>,
    dir: PathBuf,
) -> Result<()> {
    let api = HttpCaptureClient::from_settings(&settings.api)?;
    for (path, size) in download_outputs(&api, &id, format, &dir).await? {
        println!("Saved {} ({})", path.display(), format_size(size));
    }
    Ok(())
}

/// Saves every output of the task (or only those in `format`) into `dir`,
/// named after their format. Returns the written paths and sizes.
pub(crate) async fn download_outputs(
    api: &dyn CaptureApi,
    id: &str,
    format: Option<OutputFormat>,
    dir: &Path,
) -> Result<Vec<(PathBuf, u64)>> {
    let outputs = api
        .list_outputs(id)
        .await
        .with_context(|| format!("Failed to list outputs of capture task {id}"))?;

    let selected: Vec<_> = outputs
        .into_iter()
        .filter(|o| format.map_or(true, |f| o.format == f.name()))
        .collect();

    if selected.is_empty() {
        match format {
            Some(f) => anyhow::bail!("Capture task {id} has no {} output", f.name()),
            None => anyhow::bail!("Capture task {id} has no outputs yet"),
        }
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut saved = Vec::with_capacity(selected.len());
    for output in selected {
        let body = api
            .download_output(id, &output.id)
            .await
            .with_context(|| format!("Failed to download output {}", output.id))?;

        let path = dir.join(output.file_name());
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::debug!(?path, bytes = body.len(), "Output saved");
        saved.push((path, body.len() as u64));
    }
    Ok(saved)
}
