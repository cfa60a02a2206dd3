use crate::core::models::{Page, Task};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Mutex;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prints views to stdout, skipping a view identical to the previous one.
pub struct Screen {
    last_view: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
}

impl Screen {
    pub fn new() -> Self {
        Self {
            last_view: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn show(&self, view: String) -> bool {
        let mut last = self.last_view.lock().unwrap_or_else(|e| e.into_inner());
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if last.as_deref() == Some(view.as_str()) {
            return false;
        }

        println!("{}", view);
        *last = Some(view);
        true
    }

    /// Reports a refresh failure once until it changes or a view succeeds.
    pub fn show_error(&self, error: &str) -> bool {
        let mut last = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(error) {
            return false;
        }

        eprintln!("Refresh failed: {}", error);
        *last = Some(error.to_string());
        true
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn page_view(page: &Page<Task>, json: bool) -> Result<String> {
    if json {
        return to_json(page);
    }
    Ok(task_table(page))
}

pub fn task_view(task: &Task, json: bool) -> Result<String> {
    if json {
        return to_json(task);
    }
    Ok(task_detail(task))
}

pub fn task_table(page: &Page<Task>) -> String {
    if page.data.is_empty() {
        return "No capture tasks".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<36}  {:<10}  {:<19}  {:<22}  URL",
        "ID", "STATUS", "CREATED", "FORMATS"
    );

    for task in &page.data {
        let _ = writeln!(
            out,
            "{:<36}  {:<10}  {:<19}  {:<22}  {}",
            task.id,
            task.status,
            format_time(task.created_at),
            task.formats.join(","),
            task.url
        );
    }

    let _ = write!(
        out,
        "Page {}/{} ({} tasks)",
        page.meta.page,
        page.meta.total_pages.max(1),
        page.meta.total
    );
    out
}

pub fn task_detail(task: &Task) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", task.id);
    let _ = writeln!(out, "  URL:      {}", task.url);
    let _ = writeln!(out, "  Status:   {}", task.status);
    let _ = writeln!(out, "  Formats:  {}", task.formats.join(", "));
    let _ = writeln!(out, "  Created:  {}", format_time(task.created_at));

    if let Some(updated_at) = task.updated_at {
        let _ = writeln!(out, "  Updated:  {}", format_time(updated_at));
        if !task.is_in_progress() {
            let elapsed = updated_at.signed_duration_since(task.created_at);
            let _ = writeln!(out, "  Took:     {}", format_elapsed(elapsed.num_seconds()));
        }
    }

    if let Some(error) = task.error() {
        let _ = writeln!(out, "  Error:    {}", error);
    }

    if !task.outputs.is_empty() {
        let _ = writeln!(out, "  Outputs:");
        for output in &task.outputs {
            let _ = writeln!(
                out,
                "    {:<10} {:>10}  {}",
                output.format,
                format_size(output.size),
                output.id
            );
        }
    }

    if !task.delivery_history.is_empty() {
        let _ = writeln!(out, "  Deliveries:");
        for attempt in &task.delivery_history {
            let error = attempt
                .error
                .as_deref()
                .filter(|e| !e.is_empty())
                .map(|e| format!(" ({})", e))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    {}  {:<8} {}{}",
                format_time(attempt.attempt_time),
                attempt.channel,
                attempt.status,
                error
            );
        }
    }

    out.trim_end().to_string()
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

fn format_elapsed(total_seconds: i64) -> String {
    if total_seconds <= 0 {
        return "0s".to_string();
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
