mod client;

use crate::core::models::{CreateTask, Page, ProblemDetail, Task, TaskOutput, TaskQuery};
use async_trait::async_trait;

pub use client::HttpCaptureClient;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not authorized; set api.token in the config or {}", crate::core::settings::TOKEN_ENV)]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}", format_problem(.0))]
    Problem(ProblemDetail),

    #[error("unexpected response ({status}): {body}")]
    Unexpected { status: u16, body: String },

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

fn format_problem(problem: &ProblemDetail) -> String {
    let mut out = match &problem.detail {
        Some(detail) => format!("{}: {}", problem.title, detail),
        None => problem.title.clone(),
    };
    for field in &problem.errors {
        out.push_str(&format!("; {}: {}", field.field, field.message));
    }
    out
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[async_trait]
pub trait CaptureApi: Send + Sync {
    async fn list_tasks(&self, query: &TaskQuery) -> ApiResult<Page<Task>>;
    async fn get_task(&self, id: &str) -> ApiResult<Task>;
    async fn create_task(&self, request: &CreateTask) -> ApiResult<Task>;
    async fn retry_task(&self, id: &str) -> ApiResult<()>;
    async fn delete_task(&self, id: &str) -> ApiResult<()>;
    async fn list_outputs(&self, task_id: &str) -> ApiResult<Vec<TaskOutput>>;
    async fn download_output(&self, task_id: &str, output_id: &str) -> ApiResult<Vec<u8>>;
}
