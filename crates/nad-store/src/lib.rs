use chrono::Utc;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const SETTINGS_FILE_NAME: &str = "config.json";
pub const FALLBACK_FILE_NAME: &str = "config_safe_fallback.json";

pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const DEVICE_ID: &str = "device_id";
    pub const DARK_MODE: &str = "dark_mode";
    pub const LAST_BACKGROUND_MODE_VALUE: &str = "last_background_mode_value";
    pub const APP_MANAGEMENT_SHOWN: &str = "app_management_shown";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("settings file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Which recovery path produced a backup; becomes part of the backup file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryKind {
    Open,
    Read,
    Panic,
}

impl RecoveryKind {
    fn suffix(&self) -> &'static str {
        match self {
            RecoveryKind::Open => "corrupt",
            RecoveryKind::Read => "invalid",
            RecoveryKind::Panic => "panic",
        }
    }
}

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory(Map<String, Value>),
}

/// Durable key-value settings record backed by a JSON object file.
///
/// Opening never fails: an unreadable file is backed up and reset, and if the
/// primary location stays unusable the store moves to a fallback file, then to
/// memory.
#[derive(Debug)]
pub struct SettingsStore {
    backing: Backing,
}

impl SettingsStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self::open_file(data_dir.as_ref().join(SETTINGS_FILE_NAME))
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match try_open(&path) {
            Ok(()) => return Self::file(path),
            Err(err) => {
                warn!(event = "store_open_failed", path = %path.display(), error = %err);
            }
        }

        if let Err(err) = recover_settings_file(&path, RecoveryKind::Open) {
            warn!(event = "store_recover_failed", path = %path.display(), error = %err);
        }
        match try_open(&path) {
            Ok(()) => {
                info!(event = "store_recovered", path = %path.display());
                return Self::file(path);
            }
            Err(err) => {
                warn!(event = "store_retry_failed", path = %path.display(), error = %err);
            }
        }

        let fallback = path
            .parent()
            .map(|dir| dir.join(FALLBACK_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_FILE_NAME));
        if fallback != path {
            if try_open(&fallback).is_ok() {
                warn!(event = "store_fallback", path = %fallback.display());
                return Self::file(fallback);
            }
            let _ = recover_settings_file(&fallback, RecoveryKind::Open);
            if try_open(&fallback).is_ok() {
                warn!(event = "store_fallback", path = %fallback.display());
                return Self::file(fallback);
            }
        }

        warn!(event = "store_in_memory", path = %path.display());
        Self::in_memory()
    }

    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Map::new()),
        }
    }

    fn file(path: PathBuf) -> Self {
        Self {
            backing: Backing::File(path),
        }
    }

    /// Backing file, or `None` when running in memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().remove(key)
    }

    /// Reads a value as a string; booleans and numbers are stringified.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) => Some(value),
            Value::Null => None,
            Value::Bool(value) => Some(value.to_string()),
            Value::Number(value) => Some(value.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let value = value.into();
        match &mut self.backing {
            Backing::Memory(record) => {
                record.insert(key.to_string(), value);
                Ok(())
            }
            Backing::File(path) => {
                let mut record = load_or_recover(path)?;
                record.insert(key.to_string(), value);
                write_record(path, &record)
            }
        }
    }

    pub fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        match &mut self.backing {
            Backing::Memory(record) => {
                record.remove(key);
                Ok(())
            }
            Backing::File(path) => {
                let mut record = load_or_recover(path)?;
                if record.remove(key).is_none() {
                    return Ok(());
                }
                write_record(path, &record)
            }
        }
    }

    /// Returns the persisted device id, generating and storing one on first use.
    pub fn ensure_device_id(&mut self) -> Result<String, StoreError> {
        if let Some(existing) = self.get_string(keys::DEVICE_ID) {
            if !existing.trim().is_empty() {
                info!(event = "device_id_exists", device_id = %existing);
                return Ok(existing);
            }
        }
        let device_id = uuid::Uuid::new_v4().to_string();
        self.set(keys::DEVICE_ID, device_id.clone())?;
        info!(event = "device_id_created", device_id = %device_id);
        Ok(device_id)
    }

    fn read(&self) -> Map<String, Value> {
        match &self.backing {
            Backing::Memory(record) => record.clone(),
            Backing::File(path) => load_or_recover(path).unwrap_or_else(|err| {
                warn!(event = "store_read_failed", path = %path.display(), error = %err);
                Map::new()
            }),
        }
    }
}

fn try_open(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    load_record(path).map(|_| ())
}

/// Reads and validates the record. A missing file is an empty record.
pub fn load_record(path: &Path) -> Result<Map<String, Value>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => return Err(err.into()),
    };
    let text = String::from_utf8_lossy(&bytes);
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        let head: String = trimmed.chars().take(16).collect();
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("unexpected leading content {head:?}"),
        });
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: "top-level value is not an object".to_string(),
        }),
        Err(err) => Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

/// Loads the record, resetting it when corrupt. Any other read failure is
/// returned so callers never write over a file they could not read.
fn load_or_recover(path: &Path) -> Result<Map<String, Value>, StoreError> {
    match load_record(path) {
        Err(StoreError::Corrupt { reason, .. }) => {
            warn!(event = "store_read_corrupt", path = %path.display(), reason = %reason);
            if let Err(err) = recover_settings_file(path, RecoveryKind::Read) {
                warn!(event = "store_recover_failed", path = %path.display(), error = %err);
            }
            Ok(Map::new())
        }
        other => other,
    }
}

fn write_record(path: &Path, record: &Map<String, Value>) -> Result<(), StoreError> {
    let body = serde_json::to_string_pretty(record)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;
    let tmp = sibling_path(path, "tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| SETTINGS_FILE_NAME.into());
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Copies the current file aside with a timestamped suffix and replaces it
/// with an empty record. Returns the backup path when there was a file to save.
pub fn recover_settings_file(
    path: &Path,
    kind: RecoveryKind,
) -> Result<Option<PathBuf>, StoreError> {
    let mut backup = None;
    if path.exists() {
        let target = sibling_path(
            path,
            &format!("{}.{}", kind.suffix(), Utc::now().timestamp_millis()),
        );
        fs::copy(path, &target)?;
        backup = Some(target);
    }
    fs::write(path, "{}")?;
    warn!(
        event = "store_reset",
        path = %path.display(),
        backup = %backup.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
    );
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn backups(dir: &Path, marker: &str) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.contains(marker))
                    .unwrap_or(false)
            })
            .collect();
        found.sort();
        found
    }

    #[test]
    fn missing_file_reads_as_empty_and_set_persists() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::open(dir.path());
        assert_eq!(store.get(keys::ACCESS_TOKEN), None);

        store.set(keys::ACCESS_TOKEN, "tok-1").expect("set");
        let reopened = SettingsStore::open(dir.path());
        assert_eq!(reopened.get_string(keys::ACCESS_TOKEN).as_deref(), Some("tok-1"));
    }

    #[test]
    fn delete_removes_key() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::open(dir.path());
        store.set(keys::REFRESH_TOKEN, "r").expect("set");
        store.delete(keys::REFRESH_TOKEN).expect("delete");
        store.delete(keys::REFRESH_TOKEN).expect("delete twice");
        assert_eq!(store.get(keys::REFRESH_TOKEN), None);
    }

    #[test]
    fn html_content_is_backed_up_and_reset_on_open() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "<html>").expect("write");

        let store = SettingsStore::open(dir.path());
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.get("anything"), None);
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}");

        let saved = backups(dir.path(), ".corrupt.");
        assert_eq!(saved.len(), 1);
        assert_eq!(fs::read_to_string(&saved[0]).expect("read backup"), "<html>");
    }

    #[test]
    fn malformed_object_counts_as_corrupt() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "{\"access_token\": ").expect("write");
        let store = SettingsStore::open(dir.path());
        assert_eq!(store.get(keys::ACCESS_TOKEN), None);
        assert_eq!(backups(dir.path(), ".corrupt.").len(), 1);
    }

    #[test]
    fn corruption_during_normal_reads_is_recovered() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::open(dir.path());
        store.set(keys::DARK_MODE, "true").expect("set");

        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "true").expect("clobber");

        assert_eq!(store.get(keys::DARK_MODE), None);
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}");
        let saved = backups(dir.path(), ".invalid.");
        assert_eq!(saved.len(), 1);
        assert_eq!(fs::read_to_string(&saved[0]).expect("read backup"), "true");

        store.set(keys::DARK_MODE, "false").expect("set after recovery");
        assert_eq!(store.get_string(keys::DARK_MODE).as_deref(), Some("false"));
    }

    #[test]
    fn unreadable_file_is_not_overwritten() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::open(dir.path());
        store.set(keys::ACCESS_TOKEN, "tok").expect("set");

        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::remove_file(&path).expect("remove");
        fs::create_dir(&path).expect("dir in the way");

        assert!(matches!(
            store.set(keys::DARK_MODE, "true"),
            Err(StoreError::Io(_))
        ));
        assert!(matches!(
            store.delete(keys::ACCESS_TOKEN),
            Err(StoreError::Io(_))
        ));
        assert!(path.is_dir());
        assert!(!sibling_path(&path, "tmp").exists());
        assert_eq!(store.get(keys::ACCESS_TOKEN), None);
    }

    #[test]
    fn unusable_primary_location_falls_back() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join(SETTINGS_FILE_NAME)).expect("dir in the way");

        let mut store = SettingsStore::open(dir.path());
        assert_eq!(
            store.path(),
            Some(dir.path().join(FALLBACK_FILE_NAME).as_path())
        );
        store.set(keys::ACCESS_TOKEN, "tok").expect("set");
        assert_eq!(store.get_string(keys::ACCESS_TOKEN).as_deref(), Some("tok"));
    }

    #[test]
    fn device_id_is_generated_once() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::open(dir.path());
        let first = store.ensure_device_id().expect("first");
        let second = store.ensure_device_id().expect("second");
        assert!(!first.is_empty());
        assert_eq!(first, second);

        let mut reopened = SettingsStore::open(dir.path());
        assert_eq!(reopened.ensure_device_id().expect("third"), first);
    }

    #[test]
    fn booleans_read_back_as_strings() {
        let mut store = SettingsStore::in_memory();
        store.set(keys::LAST_BACKGROUND_MODE_VALUE, true).expect("set");
        assert_eq!(
            store.get_string(keys::LAST_BACKGROUND_MODE_VALUE).as_deref(),
            Some("true")
        );
        assert_eq!(store.get_or(keys::APP_MANAGEMENT_SHOWN, "false"), "false");
    }
}
