//! Backup lifecycle: dump, restore, list, download and delete.
//!
//! Dumps and restores are delegated to the PostgreSQL client tools
//! (`pg_dump` and `psql`), run as supervised child processes. The password
//! travels in `PGPASSWORD`, never on the command line.
//!
//! Every caller-supplied filename is reduced to its final path component
//! before it is joined with the backup directory.

use crate::error::IvoryError;
use crate::models::backup::backup_filename;
use crate::models::{Backup, BackupCreated, ConnectionConfig};

use chrono::{DateTime, Local, Utc};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Reduce a caller-supplied filename to its final component.
///
/// `"../../etc/passwd"` becomes `"passwd"`. Empty names and names with no
/// final component (`".."`, `"/"`) are rejected.
pub fn sanitize_filename(filename: &str) -> Result<String, IvoryError> {
    if filename.is_empty() {
        return Err(IvoryError::validation("filename is required"));
    }

    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IvoryError::validation(format!("invalid backup filename: {filename}")))
}

/// Resolve a caller-supplied filename inside `dir`.
pub fn backup_path(dir: &Path, filename: &str) -> Result<PathBuf, IvoryError> {
    Ok(dir.join(sanitize_filename(filename)?))
}

/// Paths of the external client tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTools {
    /// Dump tool, `pg_dump` by default
    pub pg_dump: PathBuf,
    /// SQL script runner used for restores, `psql` by default
    pub psql: PathBuf,
}

impl Default for BackupTools {
    fn default() -> Self {
        Self { pg_dump: PathBuf::from("pg_dump"), psql: PathBuf::from("psql") }
    }
}

/// Creates, restores and manages backup files for one database.
pub struct BackupService {
    connection: Arc<ConnectionConfig>,
    password: Option<String>,
    default_dir: Option<PathBuf>,
    tools: BackupTools,
}

impl BackupService {
    /// Create a backup service for the given database.
    pub fn new(connection: ConnectionConfig, password: Option<String>) -> Self {
        Self {
            connection: Arc::new(connection),
            password: password.filter(|p| !p.is_empty()),
            default_dir: None,
            tools: BackupTools::default(),
        }
    }

    /// Set the directory used when a caller does not name one.
    pub fn with_default_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.default_dir = dir.filter(|d| !d.as_os_str().is_empty());
        self
    }

    /// Use specific client tool binaries.
    pub fn with_tools(mut self, tools: BackupTools) -> Self {
        self.tools = tools;
        self
    }

    /// Pick `dir` if given, otherwise the configured default.
    pub fn resolve_dir(&self, dir: Option<&Path>) -> Result<PathBuf, IvoryError> {
        dir.filter(|d| !d.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| self.default_dir.clone())
            .ok_or_else(|| {
                IvoryError::validation(
                    "backup directory not provided and no default backup directory is configured",
                )
            })
    }

    /// Dump the whole database into a new timestamped file.
    pub async fn create_backup(&self, dir: Option<&Path>) -> Result<BackupCreated, IvoryError> {
        let dir = self.resolve_dir(dir)?;

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IvoryError::filesystem("failed to create backup directory", e))?;

        let filename = backup_filename(&self.connection.database, Local::now());
        let path = dir.join(&filename);

        let mut args = self.connection_args();
        args.push("-f".into());
        args.push(path.clone().into_os_string());
        args.push(self.connection.database.clone().into());

        self.run_tool(&self.tools.pg_dump, args).await?;

        tracing::info!(filename = %filename, dir = %dir.display(), "Backup created");
        Ok(BackupCreated::new(filename))
    }

    /// Replay a backup file against the database.
    pub async fn restore_backup(&self, filename: &str, dir: &Path) -> Result<(), IvoryError> {
        let path = backup_path(dir, filename)?;

        if let Err(e) = tokio::fs::metadata(&path).await {
            return Err(IvoryError::filesystem("backup file does not exist", e));
        }

        let mut args = self.connection_args();
        args.push("-d".into());
        args.push(self.connection.database.clone().into());
        args.push("-f".into());
        args.push(path.clone().into_os_string());

        self.run_tool(&self.tools.psql, args).await?;

        tracing::info!(path = %path.display(), "Backup restored");
        Ok(())
    }

    /// List the files in `dir`, in directory-listing order.
    pub async fn list_backups(dir: &Path) -> Result<Vec<Backup>, IvoryError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| IvoryError::filesystem("failed to open backup directory", e))?;

        let mut backups = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(IvoryError::filesystem("failed to read backup directory", e)),
            };

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| IvoryError::filesystem("failed to stat backup file", e))?;
            if metadata.is_dir() {
                continue;
            }

            let modified = metadata
                .modified()
                .map_err(|e| IvoryError::filesystem("failed to read modification time", e))?;

            backups.push(Backup {
                filename: entry.file_name().to_string_lossy().into_owned(),
                created_at: DateTime::<Utc>::from(modified),
                size: metadata.len(),
            });
        }

        Ok(backups)
    }

    /// Read a backup file in full.
    pub async fn download_backup(dir: &Path, filename: &str) -> Result<Vec<u8>, IvoryError> {
        let path = backup_path(dir, filename)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| IvoryError::filesystem("failed to read backup file", e))
    }

    /// Remove a backup file.
    pub async fn delete_backup(dir: &Path, filename: &str) -> Result<(), IvoryError> {
        let path = backup_path(dir, filename)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| IvoryError::filesystem("failed to delete backup file", e))?;

        tracing::info!(path = %path.display(), "Backup deleted");
        Ok(())
    }

    /// `-h <host> -p <port> -U <user>`, shared by both tools.
    fn connection_args(&self) -> Vec<OsString> {
        vec![
            "-h".into(),
            self.connection.host.clone().into(),
            "-p".into(),
            self.connection.port.to_string().into(),
            "-U".into(),
            self.connection.username.clone().into(),
        ]
    }

    /// Run a client tool to completion, failing with its combined output
    /// on a non-zero exit. The child is killed if the caller goes away.
    async fn run_tool(&self, tool: &Path, args: Vec<OsString>) -> Result<(), IvoryError> {
        let name = tool
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.display().to_string());
        let start = Instant::now();

        let mut command = Command::new(tool);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &self.password {
            command.env("PGPASSWORD", password);
        }

        tracing::debug!(tool = %name, ?args, "Running external tool");

        let mut child = command
            .spawn()
            .map_err(|e| IvoryError::filesystem(format!("failed to run {name}"), e))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(IvoryError::internal(format!("{name} output was not captured")));
        };

        let output = read_interleaved(stdout, stderr)
            .await
            .map_err(|e| IvoryError::filesystem(format!("failed to read {name} output"), e))?;
        let status = child
            .wait()
            .await
            .map_err(|e| IvoryError::filesystem(format!("failed to wait for {name}"), e))?;

        if !status.success() {
            tracing::warn!(tool = %name, status = %status, "External tool failed");
            return Err(IvoryError::process(name, status, String::from_utf8_lossy(&output)));
        }

        tracing::debug!(
            tool = %name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "External tool finished"
        );
        Ok(())
    }
}

/// Drain two streams into one buffer in the order chunks arrive.
async fn read_interleaved<O, E>(mut stdout: O, mut stderr: E) -> std::io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut combined = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read? {
                0 => out_open = false,
                n => combined.extend_from_slice(&out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if err_open => match read? {
                0 => err_open = false,
                n => combined.extend_from_slice(&err_buf[..n]),
            },
        }
    }

    Ok(combined)
}
