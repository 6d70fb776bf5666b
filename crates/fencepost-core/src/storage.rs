//! Persistent attendance journal.
//!
//! One pretty-printed JSON file per day, organized by year and month:
//! `{data_dir}/attendance/{YYYY}/{MM}/{DD}.json`.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::debug;

use crate::attendance::{AttendanceEntry, AttendanceRecorder, DayRecord, RecorderError};

/// Errors from reading or writing the journal.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No platform data directory could be determined.
    #[error("Cannot determine data directory")]
    NoDataDir,

    /// A journal file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A journal file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A journal directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A journal file is not valid JSON for a day record.
    #[error("Failed to parse {}: {source}", path.display())]
    ParseError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A day record could not be serialized.
    #[error("Failed to serialize day record: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result type for journal operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// The default data directory.
///
/// On Linux: `/var/lib/fencepost`. Elsewhere the platform data directory.
///
/// # Errors
///
/// Returns [`StorageError::NoDataDir`] if no platform directory is known.
pub fn default_data_dir() -> StorageResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/fencepost"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fencepost")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::NoDataDir)
    }
}

/// File-backed [`AttendanceRecorder`].
#[derive(Debug, Clone)]
pub struct JournalRecorder {
    data_dir: PathBuf,
}

impl JournalRecorder {
    /// Create a journal rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory of the journal.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load the record for `date`, or `None` if nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_day(&self, date: NaiveDate) -> StorageResult<Option<DayRecord>> {
        let path = self.day_path(date);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|source| StorageError::ReadError {
            path: path.clone(),
            source,
        })?;
        let record = serde_json::from_str(&content)
            .map_err(|source| StorageError::ParseError { path, source })?;
        Ok(Some(record))
    }

    /// Persist the record for its date, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_day(&self, record: &DayRecord) -> StorageResult<()> {
        let path = self.day_path(record.date);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, content)
            .map_err(|source| StorageError::WriteError { path: path.clone(), source })?;

        debug!(path = %path.display(), "Saved attendance day");
        Ok(())
    }

    fn append(&self, entry: AttendanceEntry) -> StorageResult<()> {
        let mut record = self
            .load_day(entry.date)?
            .unwrap_or_else(|| DayRecord::new(entry.date));
        record.apply(entry);
        self.save_day(&record)
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join("attendance")
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}.json", date.day()))
    }
}

impl AttendanceRecorder for JournalRecorder {
    fn record(&self, entry: AttendanceEntry) -> BoxFuture<'_, Result<(), RecorderError>> {
        let journal = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || journal.append(entry))
                .await
                .map_err(|e| RecorderError::Unavailable(e.to_string()))??;
            Ok::<(), RecorderError>(())
        })
    }

    fn day(&self, date: NaiveDate) -> BoxFuture<'_, Result<Option<DayRecord>, RecorderError>> {
        let journal = self.clone();
        Box::pin(async move {
            let record = tokio::task::spawn_blocking(move || journal.load_day(date))
                .await
                .map_err(|e| RecorderError::Unavailable(e.to_string()))??;
            Ok::<_, RecorderError>(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{AttendanceStatus, PunchKind, PunchLocation};
    use chrono::{NaiveTime, Utc};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn entry(kind: PunchKind, hour: u32) -> AttendanceEntry {
        AttendanceEntry {
            id: Uuid::now_v7(),
            kind,
            date: date(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            location: PunchLocation {
                latitude: 22.318_82,
                longitude: 73.187_437,
                accuracy_m: Some(12.0),
                label: "Office Location".into(),
                captured_at: Utc::now(),
            },
            status: AttendanceStatus::Present,
            message: "On time".into(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_day_is_none() {
        let dir = TempDir::new().unwrap();
        let journal = JournalRecorder::new(dir.path());
        assert!(journal.load_day(date()).unwrap().is_none());
    }

    #[test]
    fn test_day_layout_on_disk() {
        let dir = TempDir::new().unwrap();
        let journal = JournalRecorder::new(dir.path());
        journal.save_day(&DayRecord::new(date())).unwrap();

        assert!(dir.path().join("attendance/2025/01/15.json").exists());
    }

    #[test]
    fn test_corrupt_day_reports_path() {
        let dir = TempDir::new().unwrap();
        let journal = JournalRecorder::new(dir.path());
        let path = dir.path().join("attendance/2025/01/15.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = journal.load_day(date()).unwrap_err();
        assert!(matches!(err, StorageError::ParseError { .. }));
        assert!(err.to_string().contains("15.json"));
    }

    #[tokio::test]
    async fn test_recorder_accumulates_punches() {
        let dir = TempDir::new().unwrap();
        let journal = JournalRecorder::new(dir.path());

        journal.record(entry(PunchKind::CheckIn, 11)).await.unwrap();
        journal.record(entry(PunchKind::CheckOut, 19)).await.unwrap();

        let record = journal.day(date()).await.unwrap().unwrap();
        assert_eq!(record.check_in.unwrap().time.to_string(), "11:00:00");
        assert_eq!(record.check_out.unwrap().time.to_string(), "19:00:00");

        // A fresh journal over the same directory sees the same day.
        let reopened = JournalRecorder::new(dir.path());
        assert!(reopened.load_day(date()).unwrap().is_some());
    }
}
