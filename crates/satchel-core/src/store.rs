//! The single source of truth for the in-memory collections. Every
//! mutation builds the next collection, persists it, and only then
//! swaps it in, so a failed write leaves memory exactly as it was and
//! the caller sees the error.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::category::{Category, DEFAULT_COLOR, default_categories};
use crate::storage::{ExportBundle, Storage, StorageError, StorageInfo};
use crate::task::{Priority, SubTask, Task, UNCATEGORIZED};
use crate::validate;

/// Input for `add_task`. Only the title is required.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    /// Subtask titles; ids are assigned by the store.
    pub subtasks: Vec<String>,
}

/// Field-level partial update. `None` leaves the field untouched.
/// `created_at` is deliberately absent: it is immutable.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    /// Outer `None` leaves the due date alone, `Some(None)` clears it.
    pub due_date: Option<Option<NaiveDate>>,
    pub completed: Option<bool>,
    pub subtasks: Option<Vec<SubTask>>,
}

#[derive(Debug, Clone, Default)]
pub struct SubTaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug)]
pub struct TaskStore {
    storage: Storage,
    tasks: Vec<Task>,
    categories: Vec<Category>,
}

impl TaskStore {
    #[tracing::instrument(skip(data_dir, now))]
    pub fn open(data_dir: &Path, now: DateTime<Utc>) -> Result<Self, StorageError> {
        let storage = Storage::open(data_dir)?;
        let tasks = storage.load_tasks(now);
        let categories = storage.load_categories();

        info!(
            tasks = tasks.len(),
            categories = categories.len(),
            "loaded store"
        );

        Ok(Self {
            storage,
            tasks,
            categories,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn task_by_id(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn category_by_id(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Uuid, StorageError> {
        let mut task = Task::new(draft.title, now);
        task.description = draft.description;
        task.category = draft.category.unwrap_or_else(|| UNCATEGORIZED.to_string());
        task.priority = draft.priority;
        task.due_date = draft.due_date;
        task.subtasks = draft.subtasks.into_iter().map(SubTask::new).collect();

        let id = task.id;
        let mut next = self.tasks.clone();
        next.push(task);
        self.commit_tasks(next)?;

        info!(%id, "added task");
        Ok(id)
    }

    /// Merges the patch into the matching task. An absent id is a silent
    /// no-op reported as `Ok(false)`.
    #[tracing::instrument(skip(self, patch), fields(%id))]
    pub fn update_task(&mut self, id: Uuid, patch: &TaskPatch) -> Result<bool, StorageError> {
        if self.task_by_id(id).is_none() {
            debug!(%id, "update for unknown task ignored");
            return Ok(false);
        }

        let mut next = self.tasks.clone();
        for task in next.iter_mut().filter(|task| task.id == id) {
            apply_task_patch(task, patch);
        }
        self.commit_tasks(next)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(%id))]
    pub fn toggle_task(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let Some(current) = self.task_by_id(id) else {
            debug!(%id, "toggle for unknown task ignored");
            return Ok(false);
        };

        let patch = TaskPatch {
            completed: Some(!current.completed),
            ..TaskPatch::default()
        };
        self.update_task(id, &patch)
    }

    #[tracing::instrument(skip(self), fields(%id))]
    pub fn delete_task(&mut self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.bulk_delete_tasks(&[id])? > 0)
    }

    /// Sets every task's completion flag in one persisted write.
    #[tracing::instrument(skip(self))]
    pub fn toggle_all_tasks(&mut self, completed: bool) -> Result<usize, StorageError> {
        let mut next = self.tasks.clone();
        let mut changed = 0;
        for task in &mut next {
            if task.completed != completed {
                task.completed = completed;
                changed += 1;
            }
        }

        if changed > 0 {
            self.commit_tasks(next)?;
        }
        Ok(changed)
    }

    /// Removes every completed task in one persisted write.
    #[tracing::instrument(skip(self))]
    pub fn clear_completed(&mut self) -> Result<usize, StorageError> {
        let next: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| !task.completed)
            .cloned()
            .collect();
        let removed = self.tasks.len() - next.len();

        if removed > 0 {
            self.commit_tasks(next)?;
        }
        info!(removed, "cleared completed tasks");
        Ok(removed)
    }

    /// Applies the patch to every matching id; one persisted write for
    /// the whole batch.
    #[tracing::instrument(skip(self, ids, patch), fields(requested = ids.len()))]
    pub fn bulk_update_tasks(&mut self, ids: &[Uuid], patch: &TaskPatch) -> Result<usize, StorageError> {
        let mut next = self.tasks.clone();
        let mut changed = 0;
        for task in next.iter_mut().filter(|task| ids.contains(&task.id)) {
            apply_task_patch(task, patch);
            changed += 1;
        }

        if changed > 0 {
            self.commit_tasks(next)?;
        }
        Ok(changed)
    }

    /// Removes every matching id, preserving survivor order; one
    /// persisted write for the whole batch.
    #[tracing::instrument(skip(self, ids), fields(requested = ids.len()))]
    pub fn bulk_delete_tasks(&mut self, ids: &[Uuid]) -> Result<usize, StorageError> {
        let next: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| !ids.contains(&task.id))
            .cloned()
            .collect();
        let removed = self.tasks.len() - next.len();

        if removed > 0 {
            self.commit_tasks(next)?;
        }
        Ok(removed)
    }

    /// Merges the patch into one subtask of one task and writes the
    /// whole collection back. Unknown task or subtask ids are no-ops.
    #[tracing::instrument(skip(self, patch), fields(%task_id, %subtask_id))]
    pub fn update_subtask(
        &mut self,
        task_id: Uuid,
        subtask_id: Uuid,
        patch: &SubTaskPatch,
    ) -> Result<bool, StorageError> {
        let known = self
            .task_by_id(task_id)
            .is_some_and(|task| task.subtasks.iter().any(|sub| sub.id == subtask_id));
        if !known {
            debug!("subtask update for unknown id ignored");
            return Ok(false);
        }

        let mut next = self.tasks.clone();
        for task in next.iter_mut().filter(|task| task.id == task_id) {
            for subtask in task.subtasks.iter_mut().filter(|sub| sub.id == subtask_id) {
                if let Some(title) = &patch.title {
                    subtask.title = title.clone();
                }
                if let Some(completed) = patch.completed {
                    subtask.completed = completed;
                }
            }
        }
        self.commit_tasks(next)?;
        Ok(true)
    }

    /// Appends a subtask to a task; returns its id, or `None` when the
    /// task does not exist.
    #[tracing::instrument(skip(self, title), fields(%task_id))]
    pub fn add_subtask(
        &mut self,
        task_id: Uuid,
        title: impl Into<String>,
    ) -> Result<Option<Uuid>, StorageError> {
        if self.task_by_id(task_id).is_none() {
            return Ok(None);
        }

        let subtask = SubTask::new(title);
        let subtask_id = subtask.id;

        let mut next = self.tasks.clone();
        for task in next.iter_mut().filter(|task| task.id == task_id) {
            task.subtasks.push(subtask.clone());
        }
        self.commit_tasks(next)?;
        Ok(Some(subtask_id))
    }

    /// Re-reads both collections from storage, discarding in-memory
    /// state. Used at startup and after whole-store operations.
    #[tracing::instrument(skip(self, now))]
    pub fn reload(&mut self, now: DateTime<Utc>) {
        self.tasks = self.storage.load_tasks(now);
        self.categories = self.storage.load_categories();
    }

    /// Clears the task collection, in memory and on disk.
    #[tracing::instrument(skip(self))]
    pub fn reset_tasks(&mut self) -> Result<(), StorageError> {
        self.commit_tasks(vec![])
    }

    #[tracing::instrument(skip(self, name, color))]
    pub fn add_category(
        &mut self,
        name: impl Into<String>,
        color: Option<String>,
    ) -> Result<Uuid, StorageError> {
        let color = color
            .filter(|c| validate::is_valid_color(c.trim()))
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
        let category = Category::new(name, color);
        let id = category.id;

        let mut next = self.categories.clone();
        next.push(category);
        self.commit_categories(next)?;
        Ok(id)
    }

    /// Renames or recolors a category. Tasks referencing the old name
    /// are NOT rewritten; callers wanting a cascade must bulk-update the
    /// matching tasks themselves.
    #[tracing::instrument(skip(self, patch), fields(%id))]
    pub fn update_category(&mut self, id: Uuid, patch: &CategoryPatch) -> Result<bool, StorageError> {
        if self.category_by_id(id).is_none() {
            debug!(%id, "update for unknown category ignored");
            return Ok(false);
        }

        let mut next = self.categories.clone();
        for category in next.iter_mut().filter(|category| category.id == id) {
            if let Some(name) = &patch.name {
                category.name = name.clone();
            }
            if let Some(color) = &patch.color {
                category.color = color.clone();
            }
        }
        self.commit_categories(next)?;
        Ok(true)
    }

    /// Deletes a category. Tasks keep their stale name string.
    #[tracing::instrument(skip(self), fields(%id))]
    pub fn delete_category(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let next: Vec<Category> = self
            .categories
            .iter()
            .filter(|category| category.id != id)
            .cloned()
            .collect();
        let removed = next.len() < self.categories.len();

        if removed {
            self.commit_categories(next)?;
        }
        Ok(removed)
    }

    /// Replaces the category collection with the built-in default set.
    #[tracing::instrument(skip(self))]
    pub fn reset_default_categories(&mut self) -> Result<(), StorageError> {
        self.commit_categories(default_categories())
    }

    pub fn export_data(&self, now: DateTime<Utc>) -> ExportBundle {
        self.storage.export_data(now)
    }

    pub fn import_data(&mut self, raw: &Value, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.storage.import_data(raw, now)?;
        self.reload(now);
        Ok(())
    }

    pub fn restore_backup(&mut self, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.storage.restore_backup(now)?;
        self.reload(now);
        Ok(())
    }

    pub fn clear_all(&mut self, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.storage.clear_all()?;
        self.reload(now);
        Ok(())
    }

    pub fn optimize_storage(&mut self, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.storage.optimize_storage()?;
        self.reload(now);
        Ok(())
    }

    pub fn storage_info(&self) -> StorageInfo {
        self.storage.storage_info()
    }

    // Normalization runs before the save so that after a successful
    // commit memory holds exactly what went to disk.
    fn commit_tasks(&mut self, mut next: Vec<Task>) -> Result<(), StorageError> {
        for task in &mut next {
            validate::normalize_task(task);
        }
        self.storage.save_tasks(&next)?;
        self.tasks = next;
        Ok(())
    }

    fn commit_categories(&mut self, mut next: Vec<Category>) -> Result<(), StorageError> {
        for category in &mut next {
            validate::normalize_category(category);
        }
        self.storage.save_categories(&next)?;
        self.categories = next;
        Ok(())
    }
}

fn apply_task_patch(task: &mut Task, patch: &TaskPatch) {
    if let Some(title) = &patch.title {
        task.title = title.clone();
    }
    if let Some(description) = &patch.description {
        task.description = description.clone();
    }
    if let Some(category) = &patch.category {
        task.category = category.clone();
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    if let Some(completed) = patch.completed {
        task.completed = completed;
    }
    if let Some(subtasks) = &patch.subtasks {
        task.subtasks = subtasks.clone();
    }
}
