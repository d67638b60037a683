use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::cli::{CategoryCommand, Command, SubtaskCommand};
use crate::datetime::parse_due_date;
use crate::render::Renderer;
use crate::storage::Storage;
use crate::store::{CategoryPatch, SubTaskPatch, TaskDraft, TaskPatch, TaskStore};
use crate::task::Priority;
use crate::views::{
    SortDir, SortKey, StatusFilter, TaskQuery, categories_with_task_count, filter_tasks,
    sort_tasks, task_stats,
};

#[tracing::instrument(skip(store, renderer, command, now))]
pub fn dispatch(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match command {
        Command::Add {
            title,
            description,
            category,
            priority,
            due,
            subtasks,
        } => cmd_add(store, now, title, description, category, priority, due, subtasks),
        Command::List {
            search,
            category,
            status,
            sort,
            desc,
        } => cmd_list(store, renderer, now, search, category, &status, &sort, desc),
        Command::Show { id } => cmd_show(store, renderer, &id),
        Command::Toggle { id } => cmd_toggle(store, &id),
        Command::ToggleAll { completed } => cmd_toggle_all(store, completed),
        Command::Edit {
            ids,
            title,
            description,
            category,
            priority,
            due,
            completed,
        } => cmd_edit(store, now, &ids, title, description, category, priority, due, completed),
        Command::Rm { ids } => cmd_rm(store, &ids),
        Command::ClearCompleted => cmd_clear_completed(store),
        Command::Subtask(sub) => cmd_subtask(store, sub),
        Command::Categories => cmd_categories(store, renderer),
        Command::Category(sub) => cmd_category(store, sub),
        Command::Stats => cmd_stats(store, renderer, now),
        Command::Export { output } => cmd_export(store, now, output.as_deref()),
        Command::Import { path } => cmd_import(store, now, &path),
        Command::Restore => cmd_restore(store, now),
        Command::Reset => cmd_reset_tasks(store),
        Command::ClearAll => cmd_clear_all(store, now),
        Command::Storage => cmd_storage(store, renderer),
        Command::Optimize => cmd_optimize(store, now),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    store: &mut TaskStore,
    now: DateTime<Utc>,
    title: String,
    description: Option<String>,
    category: Option<String>,
    priority: Option<String>,
    due: Option<String>,
    subtasks: Vec<String>,
) -> anyhow::Result<()> {
    let priority = priority
        .map(|p| p.parse::<Priority>())
        .transpose()?
        .unwrap_or_default();
    let due_date = due.map(|d| parse_due_date(&d, now)).transpose()?;

    let draft = TaskDraft {
        title,
        description: description.unwrap_or_default(),
        category,
        priority,
        due_date,
        subtasks,
    };

    let id = store.add_task(draft, now)?;
    println!("Created task {}.", &id.to_string()[..8]);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_list(
    store: &TaskStore,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    search: Option<String>,
    category: Option<String>,
    status: &str,
    sort: &str,
    desc: bool,
) -> anyhow::Result<()> {
    let query = TaskQuery {
        search: search.unwrap_or_default(),
        category,
        status: status.parse::<StatusFilter>()?,
    };
    let key = sort.parse::<SortKey>()?;
    let dir = if desc { SortDir::Desc } else { SortDir::Asc };

    let matched = filter_tasks(store.tasks(), &query);
    let sorted = sort_tasks(&matched, key, dir);

    if sorted.is_empty() {
        println!("No matching tasks.");
        return Ok(());
    }

    renderer.print_task_table(&sorted, now)?;
    println!("\n{} task(s).", sorted.len());
    Ok(())
}

fn cmd_show(store: &TaskStore, renderer: &mut Renderer, id: &str) -> anyhow::Result<()> {
    let id = resolve_task_id(store, id)?;
    let task = store
        .task_by_id(id)
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    renderer.print_task_detail(task)?;
    Ok(())
}

fn cmd_toggle(store: &mut TaskStore, id: &str) -> anyhow::Result<()> {
    let id = resolve_task_id(store, id)?;
    if store.toggle_task(id)? {
        let task = store.task_by_id(id).ok_or_else(|| anyhow!("task vanished"))?;
        let state = if task.completed { "completed" } else { "todo" };
        println!("Task {} is now {state}.", &id.to_string()[..8]);
    } else {
        println!("Nothing to do.");
    }
    Ok(())
}

fn cmd_toggle_all(store: &mut TaskStore, completed: bool) -> anyhow::Result<()> {
    let changed = store.toggle_all_tasks(completed)?;
    println!("Modified {changed} task(s).");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_edit(
    store: &mut TaskStore,
    now: DateTime<Utc>,
    ids: &[String],
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    priority: Option<String>,
    due: Option<String>,
    completed: Option<bool>,
) -> anyhow::Result<()> {
    if ids.is_empty() {
        bail!("no task ids given");
    }

    let due_date = match due.as_deref() {
        None => None,
        Some("none") => Some(None),
        Some(expr) => Some(Some(parse_due_date(expr, now)?)),
    };

    let patch = TaskPatch {
        title,
        description,
        category,
        priority: priority.map(|p| p.parse::<Priority>()).transpose()?,
        due_date,
        completed,
        subtasks: None,
    };

    let resolved: Vec<Uuid> = ids
        .iter()
        .map(|id| resolve_task_id(store, id))
        .collect::<anyhow::Result<_>>()?;

    let changed = store.bulk_update_tasks(&resolved, &patch)?;
    println!("Modified {changed} task(s).");
    Ok(())
}

fn cmd_rm(store: &mut TaskStore, ids: &[String]) -> anyhow::Result<()> {
    if ids.is_empty() {
        bail!("no task ids given");
    }

    let resolved: Vec<Uuid> = ids
        .iter()
        .map(|id| resolve_task_id(store, id))
        .collect::<anyhow::Result<_>>()?;

    let removed = store.bulk_delete_tasks(&resolved)?;
    println!("Deleted {removed} task(s).");
    Ok(())
}

fn cmd_clear_completed(store: &mut TaskStore) -> anyhow::Result<()> {
    let removed = store.clear_completed()?;
    println!("Deleted {removed} completed task(s).");
    Ok(())
}

fn cmd_subtask(store: &mut TaskStore, command: SubtaskCommand) -> anyhow::Result<()> {
    match command {
        SubtaskCommand::Add { task_id, title } => {
            let task_id = resolve_task_id(store, &task_id)?;
            match store.add_subtask(task_id, title)? {
                Some(id) => println!("Created subtask {}.", &id.to_string()[..8]),
                None => println!("Nothing to do."),
            }
        }
        SubtaskCommand::Toggle {
            task_id,
            subtask_id,
        } => {
            let task_id = resolve_task_id(store, &task_id)?;
            let subtask_id = resolve_subtask_id(store, task_id, &subtask_id)?;
            let current = store
                .task_by_id(task_id)
                .and_then(|task| task.subtasks.iter().find(|sub| sub.id == subtask_id))
                .map(|sub| sub.completed)
                .ok_or_else(|| anyhow!("no subtask with id {subtask_id}"))?;

            let patch = SubTaskPatch {
                completed: Some(!current),
                ..SubTaskPatch::default()
            };
            if store.update_subtask(task_id, subtask_id, &patch)? {
                println!("Modified 1 subtask.");
            } else {
                println!("Nothing to do.");
            }
        }
        SubtaskCommand::Edit {
            task_id,
            subtask_id,
            title,
            completed,
        } => {
            let task_id = resolve_task_id(store, &task_id)?;
            let subtask_id = resolve_subtask_id(store, task_id, &subtask_id)?;
            let patch = SubTaskPatch { title, completed };
            if store.update_subtask(task_id, subtask_id, &patch)? {
                println!("Modified 1 subtask.");
            } else {
                println!("Nothing to do.");
            }
        }
    }
    Ok(())
}

fn cmd_categories(store: &TaskStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    let counts = categories_with_task_count(store.categories(), store.tasks());
    renderer.print_category_table(&counts)?;
    Ok(())
}

fn cmd_category(store: &mut TaskStore, command: CategoryCommand) -> anyhow::Result<()> {
    match command {
        CategoryCommand::Add { name, color } => {
            let id = store.add_category(name, color)?;
            println!("Created category {}.", &id.to_string()[..8]);
        }
        CategoryCommand::Edit { id, name, color } => {
            let id = resolve_category_id(store, &id)?;
            let patch = CategoryPatch { name, color };
            if store.update_category(id, &patch)? {
                println!("Modified 1 category.");
            } else {
                println!("Nothing to do.");
            }
        }
        CategoryCommand::Rm { id } => {
            let id = resolve_category_id(store, &id)?;
            if store.delete_category(id)? {
                println!("Deleted 1 category.");
            } else {
                println!("Nothing to do.");
            }
        }
        CategoryCommand::Reset => {
            store.reset_default_categories()?;
            println!("Restored default categories.");
        }
    }
    Ok(())
}

fn cmd_stats(store: &TaskStore, renderer: &mut Renderer, now: DateTime<Utc>) -> anyhow::Result<()> {
    let stats = task_stats(store.tasks(), now);
    renderer.print_stats(&stats)?;
    Ok(())
}

fn cmd_export(
    store: &TaskStore,
    now: DateTime<Utc>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let bundle = store.export_data(now);
    let payload = serde_json::to_string_pretty(&bundle).context("failed serializing export")?;

    match output {
        Some(path) if path.as_os_str() == "-" => {
            println!("{payload}");
        }
        Some(path) => {
            fs::write(path, &payload)
                .with_context(|| format!("failed writing {}", path.display()))?;
            println!("Exported {} task(s) to {}.", bundle.tasks.len(), path.display());
        }
        None => {
            let name = Storage::export_file_name(now);
            fs::write(&name, &payload).with_context(|| format!("failed writing {name}"))?;
            println!("Exported {} task(s) to {name}.", bundle.tasks.len());
        }
    }
    Ok(())
}

fn cmd_import(store: &mut TaskStore, now: DateTime<Utc>, path: &Path) -> anyhow::Result<()> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed reading stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
    };

    let value: Value = serde_json::from_str(&raw).context("import payload is not valid JSON")?;
    store.import_data(&value, now)?;

    info!(tasks = store.tasks().len(), "import finished");
    println!(
        "Imported {} task(s) and {} categor(ies). Previous data saved as backup.",
        store.tasks().len(),
        store.categories().len()
    );
    Ok(())
}

fn cmd_restore(store: &mut TaskStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    store.restore_backup(now)?;
    println!("Restored {} task(s) from backup.", store.tasks().len());
    Ok(())
}

fn cmd_reset_tasks(store: &mut TaskStore) -> anyhow::Result<()> {
    store.reset_tasks()?;
    println!("Cleared all tasks.");
    Ok(())
}

fn cmd_clear_all(store: &mut TaskStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    store.clear_all(now)?;
    println!("Cleared all stored data.");
    Ok(())
}

fn cmd_storage(store: &TaskStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    renderer.print_storage_info(&store.storage_info())?;
    Ok(())
}

fn cmd_optimize(store: &mut TaskStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    store.optimize_storage(now)?;
    println!("Optimized storage; {} task(s) remain.", store.tasks().len());
    Ok(())
}

/// Resolves a full uuid or a unique uuid prefix against the task
/// collection. Ambiguous prefixes are an error, not a guess.
fn resolve_task_id(store: &TaskStore, input: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = input.parse::<Uuid>() {
        return Ok(id);
    }

    resolve_prefix(
        input,
        store.tasks().iter().map(|task| task.id),
        "task",
    )
}

fn resolve_subtask_id(store: &TaskStore, task_id: Uuid, input: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = input.parse::<Uuid>() {
        return Ok(id);
    }

    let task = store
        .task_by_id(task_id)
        .ok_or_else(|| anyhow!("no task with id {task_id}"))?;
    resolve_prefix(input, task.subtasks.iter().map(|sub| sub.id), "subtask")
}

fn resolve_category_id(store: &TaskStore, input: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = input.parse::<Uuid>() {
        return Ok(id);
    }

    resolve_prefix(
        input,
        store.categories().iter().map(|category| category.id),
        "category",
    )
}

fn resolve_prefix(
    input: &str,
    candidates: impl Iterator<Item = Uuid>,
    noun: &str,
) -> anyhow::Result<Uuid> {
    let needle = input.trim().to_ascii_lowercase();
    if needle.is_empty() {
        bail!("empty {noun} id");
    }

    let matches: Vec<Uuid> = candidates
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [only] => Ok(*only),
        [] => bail!("no {noun} matches id {input}"),
        _ => bail!("{noun} id {input} is ambiguous ({} matches)", matches.len()),
    }
}
