use super::{ApiError, ApiResult, CaptureApi};
use crate::core::models::{CreateTask, Page, ProblemDetail, Task, TaskOutput, TaskQuery};
use crate::core::settings::ApiSettings;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;

const USER_AGENT: &str = concat!("pagemail-client/", env!("CARGO_PKG_VERSION"));

pub struct HttpCaptureClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCaptureClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ApiResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;

        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn from_settings(settings: &ApiSettings) -> ApiResult<Self> {
        Self::new(&settings.base_url, settings.token.clone(), settings.timeout())
    }

    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", "captures"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> ApiResult<RequestBuilder> {
        let mut builder = self.client.request(method, self.url(segments)?);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %body, "API request rejected");
        Err(error_from_response(status, &body))
    }
}

fn error_from_response(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }

    let problem = serde_json::from_str::<ProblemDetail>(body).ok();

    if status == StatusCode::NOT_FOUND {
        let detail = problem
            .and_then(|p| p.detail)
            .unwrap_or_else(|| "Capture task not found".to_string());
        return ApiError::NotFound(detail);
    }

    match problem {
        Some(problem) => ApiError::Problem(problem),
        None => ApiError::Unexpected {
            status: status.as_u16(),
            body: body.trim().to_string(),
        },
    }
}

#[async_trait]
impl CaptureApi for HttpCaptureClient {
    async fn list_tasks(&self, query: &TaskQuery) -> ApiResult<Page<Task>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(status) = &query.status {
            params.push(("status", status.clone()));
        }

        let builder = self.request(Method::GET, &[])?.query(&params);
        Ok(self.send(builder).await?.json().await?)
    }

    async fn get_task(&self, id: &str) -> ApiResult<Task> {
        let builder = self.request(Method::GET, &[id])?;
        Ok(self.send(builder).await?.json().await?)
    }

    async fn create_task(&self, request: &CreateTask) -> ApiResult<Task> {
        let builder = self.request(Method::POST, &[])?.json(request);
        let task: Task = self.send(builder).await?.json().await?;
        tracing::info!(id = %task.id, url = %task.url, "Capture task created");
        Ok(task)
    }

    async fn retry_task(&self, id: &str) -> ApiResult<()> {
        let builder = self.request(Method::POST, &[id, "retry"])?;
        self.send(builder).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> ApiResult<()> {
        let builder = self.request(Method::DELETE, &[id])?;
        self.send(builder).await?;
        Ok(())
    }

    async fn list_outputs(&self, task_id: &str) -> ApiResult<Vec<TaskOutput>> {
        let builder = self.request(Method::GET, &[task_id, "outputs"])?;
        Ok(self.send(builder).await?.json().await?)
    }

    async fn download_output(&self, task_id: &str, output_id: &str) -> ApiResult<Vec<u8>> {
        let builder = self.request(Method::GET, &[task_id, "outputs", output_id, "download"])?;
        let body = self.send(builder).await?.bytes().await?;
        tracing::debug!(%task_id, %output_id, bytes = body.len(), "Output downloaded");
        Ok(body.to_vec())
    }
}
