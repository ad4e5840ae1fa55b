//! Service facade composing query, schema and backup operations.
//!
//! Holds only shared handles; all state lives in the database or on disk.
//! Each operation annotates errors with what it was doing.

use crate::error::{IvoryError, ResultExt};
use crate::models::{Backup, BackupCreated, PoolStatus};
use crate::services::backup::BackupService;
use crate::services::connection::ConnectionPool;
use crate::services::query::QueryService;
use crate::services::schema::SchemaService;

use std::sync::Arc;

/// Entry point used by the transport layer.
pub struct AdminService {
    pool: Arc<ConnectionPool>,
    backups: BackupService,
}

impl AdminService {
    /// Create the facade over a connected pool and a backup service.
    pub fn new(pool: Arc<ConnectionPool>, backups: BackupService) -> Self {
        Self { pool, backups }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// List all base tables of the default schema.
    pub async fn tables(&self) -> Result<Vec<String>, IvoryError> {
        let conn = self.pool.get().await.context("list tables")?;
        QueryService::list_tables(&conn).await.context("list tables")
    }

    /// Execute arbitrary SQL and return the rendered result.
    pub async fn execute_query(&self, sql: &str) -> Result<String, IvoryError> {
        let conn = self.pool.get().await.context("execute query")?;
        QueryService::execute_to_string(&conn, sql).await.context("execute query")
    }

    /// List backups in the configured directory, sorted by filename.
    pub async fn list_backups(&self) -> Result<Vec<Backup>, IvoryError> {
        let dir = self.backups.resolve_dir(None).context("list backups")?;
        let mut backups = BackupService::list_backups(&dir).await.context("list backups")?;
        backups.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(backups)
    }

    /// Dump the database into the configured directory.
    pub async fn create_backup(&self) -> Result<BackupCreated, IvoryError> {
        self.backups.create_backup(None).await.context("create backup")
    }

    /// Read a backup file.
    pub async fn download_backup(&self, filename: &str) -> Result<Vec<u8>, IvoryError> {
        let dir = self.backups.resolve_dir(None).context("download backup")?;
        BackupService::download_backup(&dir, filename).await.context("download backup")
    }

    /// Delete a backup file.
    pub async fn delete_backup(&self, filename: &str) -> Result<(), IvoryError> {
        let dir = self.backups.resolve_dir(None).context("delete backup")?;
        BackupService::delete_backup(&dir, filename).await.context("delete backup")
    }

    /// Restore the database from a backup file.
    pub async fn restore_backup(&self, filename: &str) -> Result<(), IvoryError> {
        let dir = self.backups.resolve_dir(None).context("restore backup")?;
        self.backups.restore_backup(filename, &dir).await.context("restore backup")
    }

    /// Drop every table of the default schema.
    ///
    /// All tables are dropped or none are. The connection is discarded on
    /// failure so a session whose rollback may not have gone through never
    /// goes back to the pool.
    pub async fn delete_all_tables(&self) -> Result<(), IvoryError> {
        let conn = self.pool.get().await.context("delete all tables")?;

        match SchemaService::delete_all_tables(&conn).await {
            Ok(()) => Ok(()),
            Err(e) => {
                conn.discard();
                Err(e.context("delete all tables"))
            }
        }
    }

    /// Report connection pool health.
    pub fn health(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Close the pool. Called once at shutdown.
    pub fn close(&self) {
        self.pool.close();
    }
}
