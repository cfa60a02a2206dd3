use crate::core::models::{Page, Task};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};

#[derive(Default)]
struct StoreInner {
    page: Option<Page<Task>>,
    tasks: HashMap<String, Task>,
    error: Option<String>,
    last_fetch: Option<Instant>,
}

impl StoreInner {
    fn has_in_progress(&self) -> bool {
        self.page.as_ref().is_some_and(Page::has_in_progress)
            || self.tasks.values().any(Task::is_in_progress)
    }
}

/// Latest known view of the server's tasks, shared between the refresh
/// callback and whoever renders it.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<RwLock<StoreInner>>,
    pending_tx: Arc<watch::Sender<bool>>,
}

impl TaskStore {
    pub fn new() -> Self {
        let (pending_tx, _pending_rx) = watch::channel(false);
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            pending_tx: Arc::new(pending_tx),
        }
    }

    /// Follows whether any known task is still pending or running.
    pub fn pending(&self) -> watch::Receiver<bool> {
        self.pending_tx.subscribe()
    }

    #[allow(dead_code)]
    pub fn has_pending(&self) -> bool {
        *self.pending_tx.borrow()
    }

    pub async fn get_page(&self) -> Option<Page<Task>> {
        self.inner.read().await.page.clone()
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    #[allow(dead_code)]
    pub async fn get_error(&self) -> Option<String> {
        self.inner.read().await.error.clone()
    }

    pub async fn last_fetch(&self) -> Option<Instant> {
        self.inner.read().await.last_fetch
    }

    pub async fn update_page(&self, page: Page<Task>) {
        let mut inner = self.inner.write().await;
        inner.page = Some(page);
        self.mark_success(&mut inner);
    }

    pub async fn update_task(&self, task: Task) {
        let mut inner = self.inner.write().await;
        inner.tasks.insert(task.id.clone(), task);
        self.mark_success(&mut inner);
    }

    pub async fn remove_task(&self, id: &str) {
        let mut inner = self.inner.write().await;
        inner.tasks.remove(id);
        if let Some(page) = inner.page.as_mut() {
            page.data.retain(|t| t.id != id);
        }
        self.publish_pending(&inner);
    }

    /// Records a failed refresh. The last good data is kept.
    pub async fn set_error(&self, error: String) {
        self.inner.write().await.error = Some(error);
    }

    fn mark_success(&self, inner: &mut StoreInner) {
        inner.error = None;
        inner.last_fetch = Some(Instant::now());
        self.publish_pending(inner);
    }

    fn publish_pending(&self, inner: &StoreInner) {
        let pending = inner.has_in_progress();
        self.pending_tx.send_if_modified(|current| {
            if *current == pending {
                return false;
            }
            *current = pending;
            true
        });
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{PageMeta, TaskStatus};
    use chrono::Utc;

    fn make_task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            url: format!("https://example.com/{id}"),
            status,
            formats: vec!["pdf".to_string()],
            created_at: Utc::now(),
            updated_at: None,
            error_message: None,
            outputs: Vec::new(),
            delivery_history: Vec::new(),
        }
    }

    fn make_page(tasks: Vec<Task>) -> Page<Task> {
        let total = tasks.len() as u64;
        Page {
            data: tasks,
            meta: PageMeta {
                page: 1,
                per_page: 20,
                total,
                total_pages: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_store_update_and_get() {
        let store = TaskStore::new();
        assert!(store.last_fetch().await.is_none());

        store.update_task(make_task("t1", TaskStatus::Completed)).await;

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(store.get_task("t2").await.is_none());
        assert!(store.last_fetch().await.is_some());
    }

    #[tokio::test]
    async fn test_error_keeps_last_good_data() {
        let store = TaskStore::new();
        store
            .update_page(make_page(vec![make_task("a", TaskStatus::Pending)]))
            .await;

        store.set_error("connection refused".to_string()).await;
        assert_eq!(store.get_error().await.as_deref(), Some("connection refused"));
        assert_eq!(store.get_page().await.unwrap().data.len(), 1);

        store
            .update_page(make_page(vec![make_task("a", TaskStatus::Running)]))
            .await;
        assert!(store.get_error().await.is_none());
    }

    #[tokio::test]
    async fn test_pending_follows_task_states() {
        let store = TaskStore::new();
        let mut pending_rx = store.pending();
        assert!(!store.has_pending());

        store
            .update_page(make_page(vec![
                make_task("a", TaskStatus::Completed),
                make_task("b", TaskStatus::Running),
            ]))
            .await;
        assert!(pending_rx.has_changed().unwrap());
        assert!(*pending_rx.borrow_and_update());

        // Same pending state does not notify again
        store
            .update_page(make_page(vec![make_task("b", TaskStatus::Pending)]))
            .await;
        assert!(!pending_rx.has_changed().unwrap());

        store
            .update_page(make_page(vec![make_task("b", TaskStatus::Failed)]))
            .await;
        assert!(!*pending_rx.borrow_and_update());
        assert!(!store.has_pending());
    }

    #[tokio::test]
    async fn test_remove_task_updates_pending() {
        let store = TaskStore::new();
        store.update_task(make_task("t1", TaskStatus::Pending)).await;
        assert!(store.has_pending());

        store.remove_task("t1").await;
        assert!(!store.has_pending());
        assert!(store.get_task("t1").await.is_none());
    }
}
