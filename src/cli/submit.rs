use crate::api::{CaptureApi, HttpCaptureClient};
use crate::cli::render::to_json;
use crate::cli::show;
use crate::core::models::{CreateTask, DeliveryConfig, DeliveryKind, OutputFormat};
use crate::core::settings::Settings;
use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub url: String,
    pub formats: Vec<OutputFormat>,
    pub cookies: Option<String>,
    pub deliver_email: Option<String>,
    pub deliver_webhook: Option<String>,
}

impl Submission {
    pub fn into_request(self) -> Result<CreateTask> {
        let url = Url::parse(self.url.trim())
            .with_context(|| format!("Invalid URL: {}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Only http and https URLs can be captured: {}", url);
        }

        let mut formats = Vec::new();
        for format in self.formats {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            formats.push(OutputFormat::Pdf);
        }

        let delivery_config = match (self.deliver_email, self.deliver_webhook) {
            (Some(_), Some(_)) => {
                anyhow::bail!("Choose either email or webhook delivery, not both")
            }
            (Some(id), None) => Some(DeliveryConfig {
                kind: DeliveryKind::Email,
                id,
            }),
            (None, Some(id)) => Some(DeliveryConfig {
                kind: DeliveryKind::Webhook,
                id,
            }),
            (None, None) => None,
        };

        Ok(CreateTask {
            url: url.to_string(),
            formats,
            cookies: self.cookies.filter(|c| !c.trim().is_empty()),
            delivery_config,
        })
    }
}

pub async fn run(
    settings: &Settings,
    submission: Submission,
    watching: bool,
    json: bool,
) -> Result<()> {
    let request = submission.into_request()?;
    let api: Arc<dyn CaptureApi> = Arc::new(HttpCaptureClient::from_settings(&settings.api)?);

    let task = api
        .create_task(&request)
        .await
        .context("Failed to submit capture task")?;

    if json && !watching {
        println!("{}", to_json(&task)?);
    } else if !json {
        let formats: Vec<&str> = request.formats.iter().map(OutputFormat::name).collect();
        println!("Submitted {} ({})", task.id, formats.join(", "));
    }

    if watching {
        show::follow_task(settings, api, task.id, json).await?;
    }
    Ok(())
}
