use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::category::{Category, default_categories};
use crate::task::Task;
use crate::validate;

/// Capacity assumption for `storage_info`. A plain directory has no
/// quota to ask, so usage is reported against this fixed ceiling.
pub const STORAGE_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

pub const EXPORT_VERSION: &str = "1.0.0";

const TASKS_KEY: &str = "tasks.json";
const CATEGORIES_KEY: &str = "categories.json";
const BACKUP_KEY: &str = "backup.json";
const SETTINGS_KEY: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed writing {key}: {source}")]
    Write {
        key: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed serializing {key}: {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid import payload: {0}")]
    InvalidImport(&'static str),

    #[error("no backup available to restore")]
    NoBackup,
}

/// Durable storage for the two collections, one JSON blob per key.
/// Reads degrade to defaults; writes surface errors, because a failed
/// write means memory and disk no longer agree.
#[derive(Debug)]
pub struct Storage {
    pub data_dir: PathBuf,
    tasks_path: PathBuf,
    categories_path: PathBuf,
    backup_path: PathBuf,
    settings_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
    #[serde(rename = "exportTime")]
    pub export_time: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupBundle {
    tasks: Vec<Task>,
    categories: Vec<Category>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub used: u64,
    pub available: u64,
    pub total: u64,
}

impl Storage {
    /// Opens (and creates if needed) the data directory. Failure here is
    /// the one-time availability check; per-operation reads never error.
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| StorageError::Unavailable {
            path: data_dir.clone(),
            source,
        })?;

        info!(data_dir = %data_dir.display(), "opened storage");

        let storage = Self {
            tasks_path: data_dir.join(TASKS_KEY),
            categories_path: data_dir.join(CATEGORIES_KEY),
            backup_path: data_dir.join(BACKUP_KEY),
            settings_path: data_dir.join(SETTINGS_KEY),
            data_dir,
        };

        // Seed the built-in category set on first open so its ids stay
        // stable across invocations and show up in exports as-is.
        if !storage.categories_path.exists() {
            storage.save_categories(&default_categories())?;
            debug!("seeded default categories");
        }

        Ok(storage)
    }

    #[tracing::instrument(skip(self, now))]
    pub fn load_tasks(&self, now: DateTime<Utc>) -> Vec<Task> {
        match self.read_key(&self.tasks_path) {
            Some(raw) => validate::tasks_from_value(&raw, now),
            None => vec![],
        }
    }

    /// An absent or unreadable category blob yields the built-in set.
    #[tracing::instrument(skip(self))]
    pub fn load_categories(&self) -> Vec<Category> {
        match self.read_key(&self.categories_path) {
            Some(raw) => validate::categories_from_value(&raw),
            None => default_categories(),
        }
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let mut normalized = tasks.to_vec();
        for task in &mut normalized {
            validate::normalize_task(task);
        }
        self.write_key(TASKS_KEY, &self.tasks_path, &normalized)
    }

    #[tracing::instrument(skip(self, categories), fields(count = categories.len()))]
    pub fn save_categories(&self, categories: &[Category]) -> Result<(), StorageError> {
        let mut normalized = categories.to_vec();
        for category in &mut normalized {
            validate::normalize_category(category);
        }
        self.write_key(CATEGORIES_KEY, &self.categories_path, &normalized)
    }

    pub fn task_by_id(&self, id: Uuid, now: DateTime<Utc>) -> Option<Task> {
        self.load_tasks(now).into_iter().find(|task| task.id == id)
    }

    pub fn category_by_id(&self, id: Uuid) -> Option<Category> {
        self.load_categories()
            .into_iter()
            .find(|category| category.id == id)
    }

    /// Full-snapshot bundle suitable for writing to an export file.
    #[tracing::instrument(skip(self, now))]
    pub fn export_data(&self, now: DateTime<Utc>) -> ExportBundle {
        ExportBundle {
            tasks: self.load_tasks(now),
            categories: self.load_categories(),
            export_time: now,
            version: EXPORT_VERSION.to_string(),
        }
    }

    pub fn export_file_name(now: DateTime<Utc>) -> String {
        format!("todo-backup-{}.json", now.format("%Y-%m-%d"))
    }

    /// Overwrites both collections from an import payload. The payload
    /// is rejected before anything destructive happens; the previous
    /// state is snapshotted to the backup key first.
    #[tracing::instrument(skip(self, raw, now))]
    pub fn import_data(&self, raw: &Value, now: DateTime<Utc>) -> Result<(), StorageError> {
        let Some(bundle) = raw.as_object() else {
            return Err(StorageError::InvalidImport("top-level value must be an object"));
        };

        let tasks_raw = bundle
            .get("tasks")
            .ok_or(StorageError::InvalidImport("missing tasks array"))?;
        if !tasks_raw.is_array() {
            return Err(StorageError::InvalidImport("tasks must be an array"));
        }

        let categories_raw = bundle
            .get("categories")
            .ok_or(StorageError::InvalidImport("missing categories array"))?;
        if !categories_raw.is_array() {
            return Err(StorageError::InvalidImport("categories must be an array"));
        }

        self.write_backup(now)?;

        let tasks = validate::tasks_from_value(tasks_raw, now);
        let categories = validate::categories_from_value(categories_raw);
        self.save_tasks(&tasks)?;
        self.save_categories(&categories)?;

        info!(
            tasks = tasks.len(),
            categories = categories.len(),
            "imported data"
        );
        Ok(())
    }

    /// Overwrites both collections from the last automatic backup.
    #[tracing::instrument(skip(self, now))]
    pub fn restore_backup(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        let raw = self.read_key(&self.backup_path).ok_or(StorageError::NoBackup)?;

        let tasks = raw
            .get("tasks")
            .map(|value| validate::tasks_from_value(value, now))
            .unwrap_or_default();
        let categories = raw
            .get("categories")
            .map(validate::categories_from_value)
            .unwrap_or_default();

        self.save_tasks(&tasks)?;
        self.save_categories(&categories)?;
        info!(tasks = tasks.len(), "restored backup");
        Ok(())
    }

    /// Removes every persisted key. The next read falls back to defaults
    /// (empty tasks, built-in categories).
    #[tracing::instrument(skip(self))]
    pub fn clear_all(&self) -> Result<(), StorageError> {
        for (key, path) in [
            (TASKS_KEY, &self.tasks_path),
            (CATEGORIES_KEY, &self.categories_path),
            (BACKUP_KEY, &self.backup_path),
            (SETTINGS_KEY, &self.settings_path),
        ] {
            match fs::remove_file(path) {
                Ok(()) => debug!(key, "removed"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::Write { key, source }),
            }
        }
        Ok(())
    }

    /// Byte usage of the known keys against the fixed capacity
    /// assumption. There is no authoritative quota API to ask.
    pub fn storage_info(&self) -> StorageInfo {
        let used = [
            &self.tasks_path,
            &self.categories_path,
            &self.backup_path,
            &self.settings_path,
        ]
        .into_iter()
        .filter_map(|path| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();

        StorageInfo {
            used,
            available: STORAGE_CAPACITY_BYTES.saturating_sub(used),
            total: STORAGE_CAPACITY_BYTES,
        }
    }

    /// Re-saves only records that pass structural checks, dropping the
    /// rest. Works on the raw stored values so records too broken for
    /// the lenient validator are shed rather than repaired.
    #[tracing::instrument(skip(self))]
    pub fn optimize_storage(&self) -> Result<(), StorageError> {
        if let Some(Value::Array(items)) = self.read_key(&self.tasks_path) {
            let before = items.len();
            let kept: Vec<Value> = items.into_iter().filter(is_sound_task_record).collect();
            info!(before, after = kept.len(), "optimized task records");
            self.write_key(TASKS_KEY, &self.tasks_path, &kept)?;
        }

        if let Some(Value::Array(items)) = self.read_key(&self.categories_path) {
            let before = items.len();
            let kept: Vec<Value> = items.into_iter().filter(is_sound_category_record).collect();
            info!(before, after = kept.len(), "optimized category records");
            self.write_key(CATEGORIES_KEY, &self.categories_path, &kept)?;
        }

        Ok(())
    }

    fn write_backup(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        let bundle = BackupBundle {
            tasks: self.load_tasks(now),
            categories: self.load_categories(),
        };
        self.write_key(BACKUP_KEY, &self.backup_path, &bundle)
    }

    /// Read failures never propagate; the caller falls back to defaults.
    fn read_key(&self, path: &Path) -> Option<Value> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed reading stored key");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "stored key held corrupt JSON");
                None
            }
        }
    }

    fn write_key<T: Serialize>(
        &self,
        key: &'static str,
        path: &Path,
        value: &T,
    ) -> Result<(), StorageError> {
        debug!(key, file = %path.display(), "writing key atomically");

        let payload = serde_json::to_vec(value)
            .map_err(|source| StorageError::Serialize { key, source })?;

        let mut temp = NamedTempFile::new_in(&self.data_dir)
            .map_err(|source| StorageError::Write { key, source })?;
        temp.write_all(&payload)
            .and_then(|()| temp.flush())
            .map_err(|source| StorageError::Write { key, source })?;
        temp.persist(path)
            .map_err(|err| StorageError::Write {
                key,
                source: err.error,
            })?;

        Ok(())
    }
}

fn is_sound_task_record(value: &Value) -> bool {
    let Some(record) = value.as_object() else {
        return false;
    };

    let has_id = record
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    let has_title = record
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|title| !title.trim().is_empty());
    let completed_is_bool = record.get("completed").is_none_or(Value::is_boolean);

    has_id && has_title && completed_is_bool
}

fn is_sound_category_record(value: &Value) -> bool {
    let Some(record) = value.as_object() else {
        return false;
    };

    let has_id = record
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    let has_name = record
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());

    has_id && has_name
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use super::{Storage, StorageError};
    use crate::task::Task;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn corrupt_blob_degrades_to_defaults() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");

        std::fs::write(temp.path().join("tasks.json"), "{not json").expect("write corrupt");
        std::fs::write(temp.path().join("categories.json"), "[[[").expect("write corrupt");

        assert!(storage.load_tasks(now()).is_empty());
        let categories = storage.load_categories();
        assert_eq!(categories.len(), 5, "corrupt categories fall back to built-ins");
    }

    #[test]
    fn import_rejects_bad_shapes_before_touching_state() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");

        let task = Task::new("keep me", now());
        storage.save_tasks(std::slice::from_ref(&task)).expect("seed tasks");

        let bad = json!({"tasks": "not-an-array", "categories": []});
        let err = storage.import_data(&bad, now()).expect_err("must reject");
        assert!(matches!(err, StorageError::InvalidImport(_)));

        let err = storage.import_data(&json!([1, 2, 3]), now()).expect_err("must reject");
        assert!(matches!(err, StorageError::InvalidImport(_)));

        let survivors = storage.load_tasks(now());
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].title, "keep me");
    }

    #[test]
    fn import_takes_backup_and_restore_brings_it_back() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");

        let original = Task::new("original", now());
        storage.save_tasks(std::slice::from_ref(&original)).expect("seed tasks");

        let incoming = json!({
            "tasks": [{"title": "imported"}],
            "categories": []
        });
        storage.import_data(&incoming, now()).expect("import");
        assert_eq!(storage.load_tasks(now())[0].title, "imported");

        storage.restore_backup(now()).expect("restore");
        let restored = storage.load_tasks(now());
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].title, "original");
        assert_eq!(restored[0].id, original.id);
    }

    #[test]
    fn restore_without_backup_fails() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");
        assert!(matches!(
            storage.restore_backup(now()),
            Err(StorageError::NoBackup)
        ));
    }

    #[test]
    fn clear_all_resets_to_defaults_on_next_read() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");

        storage.save_tasks(&[Task::new("gone", now())]).expect("seed");
        storage.clear_all().expect("clear");

        assert!(storage.load_tasks(now()).is_empty());
        assert_eq!(storage.load_categories().len(), 5);
        assert_eq!(storage.storage_info().used, 0);
    }

    #[test]
    fn optimize_drops_structurally_broken_records() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");

        let raw = json!([
            {"id": "a-1", "title": "sound", "completed": false},
            {"id": "", "title": "no id", "completed": false},
            {"id": "a-2", "title": "  ", "completed": false},
            {"id": "a-3", "title": "bad flag", "completed": "yes"},
            "garbage"
        ]);
        std::fs::write(
            temp.path().join("tasks.json"),
            serde_json::to_vec(&raw).expect("serialize seed"),
        )
        .expect("seed raw tasks");

        storage.optimize_storage().expect("optimize");

        let kept = storage.load_tasks(now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "sound");
    }

    #[test]
    fn storage_info_counts_written_bytes() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path()).expect("open storage");

        let baseline = storage.storage_info();
        assert!(baseline.used > 0, "seeded categories occupy bytes");
        assert_eq!(baseline.total, super::STORAGE_CAPACITY_BYTES);

        storage.save_tasks(&[Task::new("something", now())]).expect("save");
        let info = storage.storage_info();
        assert!(info.used > baseline.used);
        assert_eq!(info.available, info.total - info.used);
    }

    #[test]
    fn first_open_seeds_categories_with_durable_ids() {
        let temp = tempdir().expect("tempdir");

        let first = Storage::open(temp.path()).expect("first open").load_categories();
        let second = Storage::open(temp.path()).expect("second open").load_categories();

        assert_eq!(first.len(), 5);
        assert_eq!(first, second, "seeded ids survive reopening");
    }
}
