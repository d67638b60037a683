//! Derived views over the canonical task collection: filtering, sort
//! orders, aggregate statistics and per-category counts. Everything is
//! pure and total; inputs are never mutated and empty collections are
//! fine everywhere.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::category::Category;
use crate::datetime::today_in_project_tz;
use crate::task::{Priority, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Todo,
    Completed,
}

impl std::str::FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "todo" | "pending" | "open" => Ok(Self::Todo),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(anyhow::anyhow!("invalid status filter: {other}")),
        }
    }
}

/// Conjunction of three independent clauses; a task must satisfy all of
/// them to pass.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    /// Case-insensitive substring match against title or description.
    /// Empty matches everything.
    pub search: String,
    /// Exact, case-sensitive category name. `None` matches everything.
    pub category: Option<String>,
    pub status: StatusFilter,
}

impl TaskQuery {
    pub fn matches(&self, task: &Task) -> bool {
        let search = self.search.trim().to_lowercase();
        let search_ok = search.is_empty()
            || task.title.to_lowercase().contains(&search)
            || task.description.to_lowercase().contains(&search);

        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|name| task.category == name);

        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Todo => !task.completed,
            StatusFilter::Completed => task.completed,
        };

        search_ok && category_ok && status_ok
    }
}

pub fn filter_tasks(tasks: &[Task], query: &TaskQuery) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| query.matches(task))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    CreatedAt,
    DueDate,
    Priority,
    Title,
}

impl std::str::FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "createdat" | "created-at" => Ok(Self::CreatedAt),
            "due" | "duedate" | "due-date" => Ok(Self::DueDate),
            "priority" | "pri" => Ok(Self::Priority),
            "title" => Ok(Self::Title),
            other => Err(anyhow::anyhow!("invalid sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Stable sort; equal keys keep their original relative order. Tasks
/// without a due date sort after all dated tasks in both directions.
pub fn sort_tasks(tasks: &[Task], key: SortKey, dir: SortDir) -> Vec<Task> {
    let mut out = tasks.to_vec();
    out.sort_by(|a, b| compare_tasks(a, b, key, dir));
    out
}

fn compare_tasks(a: &Task, b: &Task, key: SortKey, dir: SortDir) -> Ordering {
    match key {
        SortKey::CreatedAt => dir.apply(a.created_at.cmp(&b.created_at)),
        SortKey::Title => dir.apply(a.title.cmp(&b.title)),
        SortKey::Priority => dir.apply(a.priority.weight().cmp(&b.priority.weight())),
        SortKey::DueDate => match (a.due_date, b.due_date) {
            (Some(left), Some(right)) => dir.apply(left.cmp(&right)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Rounded percentage in [0, 100]; 0 for an empty collection.
    pub completion_rate: u8,
    /// Incomplete tasks whose due date is strictly before today.
    pub overdue: usize,
    /// Tasks due today, regardless of completion.
    pub due_today: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
}

pub fn task_stats(tasks: &[Task], now: DateTime<Utc>) -> TaskStats {
    let today = today_in_project_tz(now);

    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let completion_rate = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u8
    };

    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_priority: BTreeMap<Priority, usize> = BTreeMap::new();
    let mut overdue = 0;
    let mut due_today = 0;

    for task in tasks {
        *by_category.entry(task.category.clone()).or_default() += 1;
        *by_priority.entry(task.priority).or_default() += 1;

        if let Some(due) = task.due_date {
            if !task.completed && due < today {
                overdue += 1;
            }
            if due == today {
                due_today += 1;
            }
        }
    }

    TaskStats {
        total,
        completed,
        pending: total - completed,
        completion_rate,
        overdue,
        due_today,
        by_category,
        by_priority,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Per-category task counts matched by name string, not id. A task whose
/// category was deleted keeps its stale string and is simply not counted
/// under any surviving category.
pub fn categories_with_task_count(categories: &[Category], tasks: &[Task]) -> Vec<CategoryCount> {
    categories
        .iter()
        .map(|category| CategoryCount {
            category: category.clone(),
            count: tasks
                .iter()
                .filter(|task| task.category == category.name)
                .count(),
        })
        .collect()
}
