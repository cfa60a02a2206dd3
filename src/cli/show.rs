use crate::api::{ApiError, CaptureApi, HttpCaptureClient};
use crate::cli::follow::{self, Exit};
use crate::cli::render::{task_view, Screen};
use crate::core::models::TaskStatus;
use crate::core::settings::Settings;
use crate::core::store::TaskStore;
use crate::host;
use crate::poller::{Pending, Poller};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run(settings: &Settings, id: String, watching: bool, json: bool) -> Result<()> {
    let api: Arc<dyn CaptureApi> = Arc::new(HttpCaptureClient::from_settings(&settings.api)?);

    if !watching {
        let task = api
            .get_task(&id)
            .await
            .with_context(|| format!("Failed to fetch capture task {id}"))?;
        Screen::new().show(task_view(&task, json)?);
        return Ok(());
    }

    follow_task(settings, api, id, json).await
}

/// Polls one task until it settles. Fails if the task ends up failed or
/// disappears.
pub async fn follow_task(
    settings: &Settings,
    api: Arc<dyn CaptureApi>,
    id: String,
    json: bool,
) -> Result<()> {
    let store = TaskStore::new();
    let screen = Arc::new(Screen::new());
    let (done_tx, done_rx) = watch::channel(false);
    let done_tx = Arc::new(done_tx);

    let refresh = {
        let api = Arc::clone(&api);
        let store = store.clone();
        let screen = Arc::clone(&screen);
        let id = id.clone();
        move || {
            let api = Arc::clone(&api);
            let store = store.clone();
            let screen = Arc::clone(&screen);
            let done_tx = Arc::clone(&done_tx);
            let id = id.clone();
            async move {
                let settled = refresh_task(api.as_ref(), &store, &screen, &id, json).await?;
                if settled {
                    done_tx.send_replace(true);
                }
                anyhow::Ok(())
            }
        }
    };

    let visibility = host::visibility(settings.visibility.source).await;
    let poller = Poller::builder(refresh)
        .config(settings.polling.poller_config())
        .pending(Pending::Watch(store.pending()))
        .visibility(visibility)
        .spawn();

    tracing::info!(%id, "Watching capture task; Ctrl-C to stop");
    let exit = follow::drive(&poller, done_rx).await?;
    if exit == Exit::Interrupted {
        return Ok(());
    }

    match store.get_task(&id).await {
        None => anyhow::bail!("Capture task {id} no longer exists"),
        Some(task) if task.status == TaskStatus::Failed => anyhow::bail!(
            "Capture task {id} failed: {}",
            task.error().unwrap_or("no error reported")
        ),
        Some(_) => Ok(()),
    }
}

/// Fetches the task into the store. Returns whether watching can stop:
/// the task has settled or no longer exists.
pub(crate) async fn refresh_task(
    api: &dyn CaptureApi,
    store: &TaskStore,
    screen: &Screen,
    id: &str,
    json: bool,
) -> Result<bool> {
    match api.get_task(id).await {
        Ok(task) => {
            let settled = !task.is_in_progress();
            screen.show(task_view(&task, json)?);
            store.update_task(task).await;
            Ok(settled)
        }
        Err(ApiError::NotFound(detail)) => {
            tracing::warn!(%id, %detail, "Capture task disappeared");
            store.remove_task(id).await;
            Ok(true)
        }
        Err(e) => {
            let error_msg = e.to_string();
            screen.show_error(&error_msg);
            store.set_error(error_msg).await;
            Err(e).with_context(|| format!("Failed to refresh capture task {id}"))
        }
    }
}
