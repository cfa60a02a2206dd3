use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    #[serde(alias = "processing")]
    Running,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Unknown => "unknown",
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    Html,
    Screenshot,
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
            OutputFormat::Screenshot => "screenshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub id: String,
    pub format: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub path: String,
}

impl TaskOutput {
    /// Name a downloaded output is saved under, e.g. `screenshot.png`.
    pub fn file_name(&self) -> String {
        let extension = match self.format.as_str() {
            "pdf" => ".pdf",
            "html" => ".html",
            "screenshot" => ".png",
            _ => "",
        };
        format!("{}{}", self.format, extension)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub channel: String,
    pub status: String,
    pub attempt_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub url: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub formats: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    // The list endpoint calls this `error`
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub outputs: Vec<TaskOutput>,
    #[serde(default)]
    pub delivery_history: Vec<DeliveryAttempt>,
}

impl Task {
    pub fn is_in_progress(&self) -> bool {
        self.status.is_in_progress()
    }

    /// The server sends an empty string when there is no error.
    pub fn error(&self) -> Option<&str> {
        self.error_message.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl Page<Task> {
    pub fn has_in_progress(&self) -> bool {
        self.data.iter().any(Task::is_in_progress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Email,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(rename = "type")]
    pub kind: DeliveryKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateTask {
    pub url: String,
    pub formats: Vec<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_config: Option<DeliveryConfig>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

/// RFC 7807 error body returned by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProblemDetail {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}
