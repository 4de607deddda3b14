//! Directory-backed alert store.
//!
//! Layout: `<root>/<kind prefix>/<file identifier>.json`, one [`AlertRecord`]
//! per file. The file name is the record's identifier regardless of what
//! the body says.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fieldalert_core::{AlertError, AlertKind, AlertRecord, Result, ScopePrefix};
use tracing::debug;

use crate::traits::AlertSource;

#[derive(Debug, Clone)]
pub struct DirectoryAlertSource {
    root: PathBuf,
}

impl DirectoryAlertSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_record(path: &Path, name: &str) -> Result<AlertRecord> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AlertError::malformed(name, format!("unreadable: {e}")))?;
        let mut record: AlertRecord =
            serde_json::from_str(&contents).map_err(|e| AlertError::malformed(name, e.to_string()))?;
        record.file_identifier = name.to_string();
        Ok(record)
    }
}

#[async_trait]
impl AlertSource for DirectoryAlertSource {
    async fn fetch(&self, kind: AlertKind, scope: &ScopePrefix) -> Result<Vec<AlertRecord>> {
        let dir = self.root.join(&scope.dir);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%kind, dir = %dir.display(), "alert directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(AlertError::fetch(kind, format!("{}: {e}", dir.display()))),
        };

        let mut matched = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(AlertError::fetch(kind, format!("{}: {e}", dir.display()))),
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with(&scope.file_prefix) && name.ends_with(".json") {
                matched.push((entry.path(), name));
            }
        }
        matched.sort_by(|a, b| a.1.cmp(&b.1));

        let mut records = Vec::with_capacity(matched.len());
        for (path, name) in matched {
            match Self::read_record(&path, &name).await {
                Ok(record) => records.push(record),
                Err(e) => debug!(%kind, error = %e, "skipping record file"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scope(prefix: &str) -> ScopePrefix {
        ScopePrefix {
            dir: "sosNoticeAlert".to_string(),
            file_prefix: prefix.to_string(),
        }
    }

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let source = DirectoryAlertSource::new(temp.path());
        let records = source.fetch(AlertKind::Sos, &scope("100_")).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_filters_by_prefix_and_extension() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("sosNoticeAlert");
        let body = r#"{"occurrenceTime":"202401010900","startTime":"202401010855","operatorName":"Sato"}"#;
        write(&dir, "100_02_03_20240101_a.json", body);
        write(&dir, "100_02_04_20240101_b.json", body);
        write(&dir, "100_02_03_20240101_c.txt", body);
        write(&dir, "200_02_03_20240101_d.json", body);

        let source = DirectoryAlertSource::new(temp.path());
        let records = source.fetch(AlertKind::Sos, &scope("100_02_03_20240101")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_identifier, "100_02_03_20240101_a.json");
        assert_eq!(records[0].operator_name, "Sato");
        assert_eq!(records[0].start_time, "202401010855");

        let office = source.fetch(AlertKind::Sos, &scope("100_")).await.unwrap();
        assert_eq!(office.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_file_skipped() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("sosNoticeAlert");
        write(&dir, "100_a.json", "{not json");
        write(&dir, "100_b.json", r#"{"startTime":"202401010855"}"#);

        let source = DirectoryAlertSource::new(temp.path());
        let records = source.fetch(AlertKind::Sos, &scope("100_")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_identifier, "100_b.json");
    }
}
