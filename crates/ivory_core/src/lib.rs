//! Core types and services for Ivory, a REST administration API for PostgreSQL.
//!
//! This crate provides the backend service layer:
//!
//! - **error**: Error handling with PostgreSQL-specific details and call-site context
//! - **models**: Data structures for connections, query results, and backups
//! - **services**: Connection pooling, query execution, schema and backup administration
//! - **config**: YAML + environment configuration
//! - **logging**: Structured logging setup

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::{IvoryError, ResultExt};
pub use models::{
    Backup, BackupCreated, BackupDeleted, BackupRestored, ColumnInfo, ColumnKind,
    ConnectionConfig, ConnectionOptions, PoolStatus, QueryKind, QueryOutcome,
};
pub use services::{
    AdminService, BackupService, BackupTools, ConnectionPool, QueryService, SchemaService,
};
