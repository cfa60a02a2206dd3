use crate::api::{CaptureApi, HttpCaptureClient};
use crate::core::settings::Settings;
use anyhow::{Context, Result};

pub async fn run(settings: &Settings, id: String) -> Result<()> {
    let api = HttpCaptureClient::from_settings(&settings.api)?;
    api.retry_task(&id)
        .await
        .with_context(|| format!("Failed to retry capture task {id}"))?;

    println!("Capture task {id} queued for retry");
    Ok(())
}
