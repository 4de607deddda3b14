//! File-backed acknowledgement store.
//!
//! An acknowledgement is a zero-byte marker at
//! `<root>/<user_id>/<yyyyMMdd>/<file_identifier>`. Day directories older
//! than today are purged at login.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fieldalert_core::types::{DATE_KEY_FORMAT, date_key, validate_file_identifier};
use fieldalert_core::{AlertError, Result};
use tracing::debug;

use crate::traits::Acknowledger;

/// Acknowledgement markers on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileAckStore {
    root: PathBuf,
}

impl FileAckStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf> {
        validate_file_identifier(user_id)?;
        Ok(self.root.join(user_id))
    }

    fn day_dir(&self, user_id: &str, date: NaiveDate) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join(date_key(date)))
    }

    fn marker(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<PathBuf> {
        validate_file_identifier(file)?;
        Ok(self.day_dir(user_id, date)?.join(file))
    }

    /// File identifiers acknowledged by `user_id` on `date`, sorted.
    pub fn today_files(&self, user_id: &str, date: NaiveDate) -> Result<Vec<String>> {
        let dir = self.day_dir(user_id, date)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AlertError::io("listing acknowledgements", &dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AlertError::io("listing acknowledgements", &dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                files.push(name.to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Remove day directories of `user_id` dated before `date`.
    ///
    /// Returns the number of day directories removed. Entries whose names are
    /// not dates are left alone.
    pub fn purge_before(&self, user_id: &str, date: NaiveDate) -> Result<usize> {
        let dir = self.user_dir(user_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AlertError::io("listing acknowledgement days", &dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| AlertError::io("listing acknowledgement days", &dir, e))?;
            let path = entry.path();
            let Some(day) = entry
                .file_name()
                .to_str()
                .and_then(|name| NaiveDate::parse_from_str(name, DATE_KEY_FORMAT).ok())
            else {
                continue;
            };
            if day < date && path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| AlertError::io("purging acknowledgements", &path, e))?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(user_id, removed, "purged old acknowledgements");
        }
        Ok(removed)
    }
}

impl Acknowledger for FileAckStore {
    fn exists(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<bool> {
        Ok(self.marker(user_id, date, file)?.is_file())
    }

    fn write(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<()> {
        let marker = self.marker(user_id, date, file)?;
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent).map_err(|e| AlertError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::File::create(&marker).map_err(|e| AlertError::io("writing acknowledgement", &marker, e))?;
        debug!(user_id, file, "acknowledgement written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_write_then_exists() {
        let temp = TempDir::new().unwrap();
        let store = FileAckStore::new(temp.path());

        assert!(!store.exists("13", day(2), "a.json").unwrap());
        store.write("13", day(2), "a.json").unwrap();
        assert!(store.exists("13", day(2), "a.json").unwrap());

        let marker = temp.path().join("13").join("20240102").join("a.json");
        assert_eq!(fs::metadata(marker).unwrap().len(), 0);

        assert!(!store.exists("13", day(3), "a.json").unwrap());
        assert!(!store.exists("14", day(2), "a.json").unwrap());
    }

    #[test]
    fn test_write_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FileAckStore::new(temp.path());
        store.write("13", day(2), "a.json").unwrap();
        store.write("13", day(2), "a.json").unwrap();
        assert_eq!(store.today_files("13", day(2)).unwrap(), vec!["a.json"]);
    }

    #[test]
    fn test_today_files() {
        let temp = TempDir::new().unwrap();
        let store = FileAckStore::new(temp.path());
        assert!(store.today_files("13", day(2)).unwrap().is_empty());

        store.write("13", day(2), "b.json").unwrap();
        store.write("13", day(2), "a.json").unwrap();
        store.write("13", day(1), "c.json").unwrap();
        assert_eq!(store.today_files("13", day(2)).unwrap(), vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_purge_before() {
        let temp = TempDir::new().unwrap();
        let store = FileAckStore::new(temp.path());
        store.write("13", day(1), "old.json").unwrap();
        store.write("13", day(2), "older.json").unwrap();
        store.write("13", day(3), "today.json").unwrap();
        fs::create_dir_all(temp.path().join("13").join("notes")).unwrap();

        assert_eq!(store.purge_before("13", day(3)).unwrap(), 2);
        assert!(store.exists("13", day(3), "today.json").unwrap());
        assert!(!store.exists("13", day(1), "old.json").unwrap());
        assert!(temp.path().join("13").join("notes").exists());
        assert_eq!(store.purge_before("99", day(3)).unwrap(), 0);
    }

    #[test]
    fn test_rejects_path_components() {
        let temp = TempDir::new().unwrap();
        let store = FileAckStore::new(temp.path());
        let err = store.write("13", day(1), "../escape").unwrap_err();
        assert!(matches!(err, AlertError::MalformedRecord { .. }));
        assert!(store.exists("../13", day(1), "a.json").is_err());
    }
}
