use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::tempdir;
use uuid::Uuid;

use satchel_core::category::DEFAULT_COLOR;
use satchel_core::storage::StorageError;
use satchel_core::store::{CategoryPatch, SubTaskPatch, TaskDraft, TaskPatch, TaskStore};
use satchel_core::task::Priority;
use satchel_core::views::{categories_with_task_count, task_stats};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 20, 14, 30, 0)
        .single()
        .expect("valid now")
}

fn draft(title: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        ..TaskDraft::default()
    }
}

#[test]
fn add_toggle_and_stats_end_to_end() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    let id = store
        .add_task(
            TaskDraft {
                title: "Buy groceries".to_string(),
                category: Some("购物".to_string()),
                priority: Priority::High,
                ..TaskDraft::default()
            },
            now(),
        )
        .expect("add task");

    assert!(store.toggle_task(id).expect("toggle"));

    let stats = task_stats(store.tasks(), now());
    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.completion_rate, 100);

    // Toggling back flips the flag rather than setting it.
    assert!(store.toggle_task(id).expect("toggle back"));
    assert!(!store.task_by_id(id).expect("task").completed);
}

#[test]
fn state_survives_reopening_the_store() {
    let temp = tempdir().expect("tempdir");

    let id = {
        let mut store = TaskStore::open(temp.path(), now()).expect("open store");
        store.add_task(draft("durable"), now()).expect("add task")
    };

    let store = TaskStore::open(temp.path(), now()).expect("reopen store");
    let task = store.task_by_id(id).expect("task survived");
    assert_eq!(task.title, "durable");
    assert_eq!(store.categories().len(), 5, "fresh store seeds default categories");
}

#[test]
fn default_category_ids_are_stable_across_opens() {
    let temp = tempdir().expect("tempdir");

    let first: Vec<_> = TaskStore::open(temp.path(), now())
        .expect("first open")
        .categories()
        .to_vec();
    let store = TaskStore::open(temp.path(), now()).expect("second open");

    assert_eq!(first.len(), 5);
    assert_eq!(first, store.categories());

    // A seeded id is addressable in a later invocation.
    let shopping = first
        .iter()
        .find(|category| category.name == "购物")
        .expect("default category");
    assert!(store.category_by_id(shopping.id).is_some());
}

#[test]
fn failed_write_rolls_back_nothing_into_memory() {
    let temp = tempdir().expect("tempdir");
    let data_dir = temp.path().join("store");
    let mut store = TaskStore::open(&data_dir, now()).expect("open store");
    let keeper = store.add_task(draft("keeper"), now()).expect("add");

    // Pull the directory out from under the store so the next atomic
    // write cannot create its tempfile.
    std::fs::remove_dir_all(&data_dir).expect("remove data dir");

    let err = store
        .add_task(draft("doomed"), now())
        .expect_err("write must fail");
    assert!(matches!(err, StorageError::Write { .. }));

    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].id, keeper);
    assert_eq!(store.tasks()[0].title, "keeper");
}

#[test]
fn commits_hold_normalized_records_in_memory() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    let task_id = store.add_task(draft("  padded  "), now()).expect("add");
    assert_eq!(store.task_by_id(task_id).expect("task").title, "padded");

    let category_id = store.add_category("tidy", None).expect("add category");
    let patch = CategoryPatch {
        color: Some("red".to_string()),
        ..CategoryPatch::default()
    };
    assert!(store.update_category(category_id, &patch).expect("patch"));

    let in_memory = store.category_by_id(category_id).expect("category");
    assert_eq!(in_memory.color, DEFAULT_COLOR, "bad color repaired before the swap");

    // Disk agrees without a reload.
    store.reload(now());
    assert_eq!(
        store.category_by_id(category_id).expect("category").color,
        DEFAULT_COLOR
    );
}

#[test]
fn bulk_delete_preserves_survivor_order() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    let a = store.add_task(draft("a"), now()).expect("add");
    let b = store.add_task(draft("b"), now()).expect("add");
    let c = store.add_task(draft("c"), now()).expect("add");
    let d = store.add_task(draft("d"), now()).expect("add");

    let removed = store.bulk_delete_tasks(&[b, d]).expect("bulk delete");
    assert_eq!(removed, 2);

    let survivors: Vec<Uuid> = store.tasks().iter().map(|task| task.id).collect();
    assert_eq!(survivors, vec![a, c]);
}

#[test]
fn mutating_an_absent_id_is_a_silent_no_op() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");
    store.add_task(draft("only"), now()).expect("add");

    let ghost = Uuid::new_v4();
    let patch = TaskPatch {
        title: Some("renamed".to_string()),
        ..TaskPatch::default()
    };

    assert!(!store.update_task(ghost, &patch).expect("update"));
    assert!(!store.toggle_task(ghost).expect("toggle"));
    assert!(!store.delete_task(ghost).expect("delete"));
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].title, "only");
}

#[test]
fn toggle_all_and_clear_completed() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    store.add_task(draft("one"), now()).expect("add");
    store.add_task(draft("two"), now()).expect("add");
    store.add_task(draft("three"), now()).expect("add");

    assert_eq!(store.toggle_all_tasks(true).expect("all done"), 3);
    assert_eq!(store.toggle_all_tasks(true).expect("again"), 0, "already set flags do not count");

    let keeper = store.add_task(draft("fresh"), now()).expect("add");
    assert_eq!(store.clear_completed().expect("clear"), 3);
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].id, keeper);
}

#[test]
fn subtasks_are_added_and_patched_in_place() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    let task_id = store.add_task(draft("parent"), now()).expect("add");
    let sub_id = store
        .add_subtask(task_id, "first step")
        .expect("add subtask")
        .expect("task exists");

    let patch = SubTaskPatch {
        title: Some("first step, revised".to_string()),
        completed: Some(true),
    };
    assert!(store.update_subtask(task_id, sub_id, &patch).expect("patch"));

    let task = store.task_by_id(task_id).expect("task");
    assert_eq!(task.subtasks.len(), 1);
    assert_eq!(task.subtasks[0].title, "first step, revised");
    assert!(task.subtasks[0].completed);

    // Unknown subtask id on a known task is a no-op.
    assert!(!store
        .update_subtask(task_id, Uuid::new_v4(), &patch)
        .expect("unknown subtask"));
}

#[test]
fn deleting_a_category_leaves_tasks_with_a_stale_name() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    let shopping = store
        .categories()
        .iter()
        .find(|category| category.name == "购物")
        .expect("default category")
        .clone();

    store
        .add_task(
            TaskDraft {
                title: "buy rice".to_string(),
                category: Some(shopping.name.clone()),
                ..TaskDraft::default()
            },
            now(),
        )
        .expect("add");

    assert!(store.delete_category(shopping.id).expect("delete"));

    let counts = categories_with_task_count(store.categories(), store.tasks());
    assert!(counts.iter().all(|entry| entry.category.name != "购物"));
    assert_eq!(store.tasks()[0].category, "购物", "task keeps the stale string");
}

#[test]
fn failed_import_leaves_the_store_untouched() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");
    let id = store.add_task(draft("precious"), now()).expect("add");

    let bad = json!({"tasks": {"not": "an array"}, "categories": []});
    assert!(store.import_data(&bad, now()).is_err());

    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].id, id);
}

#[test]
fn import_then_restore_round_trips_through_the_backup() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");
    let original = store.add_task(draft("original"), now()).expect("add");

    let incoming = json!({
        "tasks": [
            {"title": "imported", "priority": "high", "dueDate": "2026-06-01"}
        ],
        "categories": [
            {"name": "imported category", "color": "#112233"}
        ]
    });
    store.import_data(&incoming, now()).expect("import");

    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].title, "imported");
    assert_eq!(store.tasks()[0].priority, Priority::High);
    assert_eq!(store.categories().len(), 1);

    store.restore_backup(now()).expect("restore");
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].id, original);
    assert_eq!(store.tasks()[0].title, "original");
}

#[test]
fn export_bundle_carries_both_collections_and_a_version() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");
    store.add_task(draft("exported"), now()).expect("add");

    let bundle = store.export_data(now());
    assert_eq!(bundle.tasks.len(), 1);
    assert_eq!(bundle.categories.len(), 5);
    assert_eq!(bundle.version, "1.0.0");
    assert_eq!(bundle.export_time, now());

    let value = serde_json::to_value(&bundle).expect("serialize");
    assert!(value.get("exportTime").is_some(), "wire field is camelCase");
    assert!(value.get("tasks").expect("tasks").is_array());
}

#[test]
fn clear_all_resets_everything_to_defaults() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    store.add_task(draft("doomed"), now()).expect("add");
    store.add_category("extra", None).expect("add category");

    store.clear_all(now()).expect("clear all");

    assert!(store.tasks().is_empty());
    assert_eq!(store.categories().len(), 5, "defaults come back after a wipe");
    assert_eq!(store.storage_info().used, 0);
}

#[test]
fn bulk_update_patches_only_the_named_tasks() {
    let temp = tempdir().expect("tempdir");
    let mut store = TaskStore::open(temp.path(), now()).expect("open store");

    let a = store.add_task(draft("a"), now()).expect("add");
    let b = store.add_task(draft("b"), now()).expect("add");
    let c = store.add_task(draft("c"), now()).expect("add");

    let patch = TaskPatch {
        priority: Some(Priority::High),
        completed: Some(true),
        ..TaskPatch::default()
    };
    let changed = store.bulk_update_tasks(&[a, c], &patch).expect("bulk update");
    assert_eq!(changed, 2);

    assert!(store.task_by_id(a).expect("a").completed);
    assert!(!store.task_by_id(b).expect("b").completed);
    assert_eq!(store.task_by_id(c).expect("c").priority, Priority::High);
    assert_eq!(store.task_by_id(b).expect("b").priority, Priority::Medium);
}
