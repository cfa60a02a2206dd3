use crate::api::{CaptureApi, HttpCaptureClient};
use crate::cli::follow;
use crate::cli::render::{page_view, Screen};
use crate::core::models::TaskQuery;
use crate::core::settings::Settings;
use crate::core::store::TaskStore;
use crate::host;
use crate::poller::{Pending, Poller};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run(
    settings: &Settings,
    query: TaskQuery,
    watching: bool,
    json: bool,
) -> Result<()> {
    let api: Arc<dyn CaptureApi> = Arc::new(HttpCaptureClient::from_settings(&settings.api)?);
    let screen = Arc::new(Screen::new());

    if !watching {
        let page = api
            .list_tasks(&query)
            .await
            .context("Failed to list capture tasks")?;
        screen.show(page_view(&page, json)?);
        return Ok(());
    }

    let store = TaskStore::new();
    let refresh = {
        let api = Arc::clone(&api);
        let store = store.clone();
        let screen = Arc::clone(&screen);
        move || {
            let api = Arc::clone(&api);
            let store = store.clone();
            let screen = Arc::clone(&screen);
            let query = query.clone();
            async move { refresh_list(api.as_ref(), &store, &screen, &query, json).await }
        }
    };

    let visibility = host::visibility(settings.visibility.source).await;
    let poller = Poller::builder(refresh)
        .config(settings.polling.poller_config())
        .pending(Pending::Watch(store.pending()))
        .visibility(visibility)
        .spawn();

    tracing::info!("Watching capture tasks; Ctrl-C to stop");
    let (_done_tx, done_rx) = watch::channel(false);
    follow::drive(&poller, done_rx).await?;
    Ok(())
}

pub(crate) async fn refresh_list(
    api: &dyn CaptureApi,
    store: &TaskStore,
    screen: &Screen,
    query: &TaskQuery,
    json: bool,
) -> Result<()> {
    match api.list_tasks(query).await {
        Ok(page) => {
            screen.show(page_view(&page, json)?);
            store.update_page(page).await;
            Ok(())
        }
        Err(e) => {
            let error_msg = e.to_string();
            screen.show_error(&error_msg);
            if store.get_page().await.is_some() {
                let stale_for = store.last_fetch().await.map(|at| at.elapsed());
                tracing::debug!(?stale_for, "Keeping last good task list");
            }
            store.set_error(error_msg).await;
            Err(e).context("Failed to refresh task list")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::api::ApiError;
    use crate::core::models::{Page, PageMeta, Task, TaskStatus};
    use chrono::Utc;

    fn page_with(statuses: &[TaskStatus]) -> Page<Task> {
        let data: Vec<Task> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| Task {
                id: format!("task-{i}"),
                url: "https://example.com".to_string(),
                status: *status,
                formats: vec!["pdf".to_string()],
                created_at: Utc::now(),
                updated_at: None,
                error_message: None,
                outputs: Vec::new(),
                delivery_history: Vec::new(),
            })
            .collect();
        let total = data.len() as u64;
        Page {
            data,
            meta: PageMeta {
                page: 1,
                per_page: 20,
                total,
                total_pages: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_refresh_list_tracks_pending_and_errors() {
        let api = FakeApi::with_pages(vec![
            Ok(page_with(&[TaskStatus::Completed, TaskStatus::Running])),
            Err(ApiError::Unexpected {
                status: 502,
                body: "Bad Gateway".to_string(),
            }),
            Ok(page_with(&[TaskStatus::Completed, TaskStatus::Failed])),
        ]);
        let store = TaskStore::new();
        let screen = Screen::new();
        let query = TaskQuery::default();

        refresh_list(&api, &store, &screen, &query, true).await.unwrap();
        assert!(store.has_pending());

        let err = refresh_list(&api, &store, &screen, &query, true)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Bad Gateway"));
        assert!(store.get_error().await.is_some());
        assert!(store.has_pending());

        refresh_list(&api, &store, &screen, &query, true).await.unwrap();
        assert!(!store.has_pending());
        assert!(store.get_error().await.is_none());
    }
}
