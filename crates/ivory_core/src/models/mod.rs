//! Data models for the Ivory administration service.
//!
//! - `connection` - ConnectionConfig, ConnectionOptions, PoolStatus
//! - `query` - QueryKind, ColumnKind, ColumnInfo, QueryOutcome
//! - `backup` - Backup and the backup operation results

pub mod backup;
pub mod connection;
pub mod query;

pub use backup::{Backup, BackupCreated, BackupDeleted, BackupRestored};
pub use connection::{ConnectionConfig, ConnectionOptions, PoolStatus};
pub use query::{ColumnInfo, ColumnKind, QueryKind, QueryOutcome, Row, TextRow};
