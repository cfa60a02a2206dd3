use crate::api::{CaptureApi, HttpCaptureClient};
use crate::core::settings::Settings;
use anyhow::{Context, Result};

pub async fn run(settings: &Settings, id: String) -> Result<()> {
    let api = HttpCaptureClient::from_settings(&settings.api)?;
    api.delete_task(&id)
        .await
        .with_context(|| format!("Failed to delete capture task {id}"))?;

    tracing::debug!(%id, "Capture task deleted");
    println!("Capture task {id} deleted");
    Ok(())
}
