//! Backup artifact models.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Format of the timestamp embedded in backup filenames.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A backup file found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// File name, without directory
    pub filename: String,
    /// Last modification time of the file
    pub created_at: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// Result of a successful dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCreated {
    /// Name of the new file inside the backup directory
    pub filename: String,
    /// Human-readable outcome
    pub message: String,
    /// Always true; failures are reported as errors
    pub success: bool,
}

impl BackupCreated {
    /// Successful result for `filename`.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            message: "Backup created successfully".to_string(),
            success: true,
        }
    }
}

/// Result of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDeleted {
    /// Human-readable outcome
    pub message: String,
    /// Always true; failures are reported as errors
    pub success: bool,
}

impl Default for BackupDeleted {
    fn default() -> Self {
        Self { message: "Backup deleted successfully".to_string(), success: true }
    }
}

/// Result of a successful restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRestored {
    /// Human-readable outcome
    pub message: String,
    /// Always true; failures are reported as errors
    pub success: bool,
}

impl Default for BackupRestored {
    fn default() -> Self {
        Self { message: "Backup restored successfully".to_string(), success: true }
    }
}

/// Build the server-assigned name for a new backup of `database`.
pub fn backup_filename(database: &str, at: DateTime<Local>) -> String {
    format!("{database}_backup_{}.sql", at.format(BACKUP_TIMESTAMP_FORMAT))
}
