//! Repair of raw decoded records into well-formed tasks and categories.
//!
//! Everything in here is total: malformed input never raises, it is
//! patched up field by field. The save path runs the same normalization
//! so a corrupt in-memory record can never reach disk.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use crate::category::{Category, DEFAULT_COLOR};
use crate::task::{Priority, SubTask, Task, UNCATEGORIZED};

/// Title given to tasks and subtasks whose title is missing or blank.
pub const FALLBACK_TITLE: &str = "Untitled task";

/// Name given to categories whose name is missing or blank.
pub const FALLBACK_NAME: &str = "Unnamed";

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("static color pattern"))
}

pub fn is_valid_color(raw: &str) -> bool {
    color_pattern().is_match(raw)
}

/// Build a well-formed task out of an arbitrary decoded value.
pub fn task_from_value(raw: &Value, now: DateTime<Utc>) -> Task {
    let id = parse_id(raw);
    let title = string_field(raw, "title")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());
    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let category = string_field(raw, "category")
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| UNCATEGORIZED.to_string());
    let priority = raw
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Priority>().ok())
        .unwrap_or_default();
    let due_date = raw
        .get("dueDate")
        .and_then(Value::as_str)
        .and_then(parse_calendar_date);
    let completed = raw.get("completed").and_then(Value::as_bool).unwrap_or(false);
    let created_at = raw
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);
    let subtasks = raw
        .get("subtasks")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(subtask_from_value).collect())
        .unwrap_or_default();

    Task {
        id,
        title,
        description,
        category,
        priority,
        due_date,
        completed,
        created_at,
        subtasks,
    }
}

fn subtask_from_value(raw: &Value) -> Option<SubTask> {
    if !raw.is_object() {
        trace!(?raw, "dropping non-object subtask entry");
        return None;
    }

    Some(SubTask {
        id: parse_id(raw),
        title: string_field(raw, "title")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
        completed: raw.get("completed").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Build a well-formed category out of an arbitrary decoded value.
pub fn category_from_value(raw: &Value) -> Category {
    let color = raw
        .get("color")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| is_valid_color(c))
        .unwrap_or(DEFAULT_COLOR)
        .to_string();

    Category {
        id: parse_id(raw),
        name: string_field(raw, "name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| FALLBACK_NAME.to_string()),
        color,
    }
}

/// Validate an entire decoded array, dropping entries that are not
/// object-shaped and keeping the original order otherwise. A value that
/// is not an array at all yields an empty collection.
pub fn tasks_from_value(raw: &Value, now: DateTime<Utc>) -> Vec<Task> {
    let Some(items) = raw.as_array() else {
        return vec![];
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| task_from_value(item, now))
        .collect()
}

pub fn categories_from_value(raw: &Value) -> Vec<Category> {
    let Some(items) = raw.as_array() else {
        return vec![];
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(category_from_value)
        .collect()
}

/// In-place repair applied to every task on the save path.
pub fn normalize_task(task: &mut Task) {
    task.title = task.title.trim().to_string();
    if task.title.is_empty() {
        task.title = FALLBACK_TITLE.to_string();
    }
    if task.category.trim().is_empty() {
        task.category = UNCATEGORIZED.to_string();
    }
    for subtask in &mut task.subtasks {
        subtask.title = subtask.title.trim().to_string();
        if subtask.title.is_empty() {
            subtask.title = FALLBACK_TITLE.to_string();
        }
    }
}

/// In-place repair applied to every category on the save path.
pub fn normalize_category(category: &mut Category) {
    category.name = category.name.trim().to_string();
    if category.name.is_empty() {
        category.name = FALLBACK_NAME.to_string();
    }
    if !is_valid_color(category.color.trim()) {
        category.color = DEFAULT_COLOR.to_string();
    } else {
        category.color = category.color.trim().to_string();
    }
}

fn parse_id(raw: &Value) -> Uuid {
    raw.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
