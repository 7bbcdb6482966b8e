//! Database backups
//!
//! A backup is a `VACUUM INTO` snapshot of the live database, gzip-compressed
//! into `<backup dir>/backup_<YYYYmmdd_HHMMSS_mmm>.db.gz`. The timestamp in the
//! name sorts lexicographically, so name order is creation order.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use super::{ServiceError, ServiceResult};
use crate::models::BackupInfo;
use crate::storage::DatabaseSnapshot;

const BACKUP_PREFIX: &str = "backup_";
const BACKUP_SUFFIX: &str = ".db.gz";

#[derive(Clone)]
pub struct BackupService {
    database: Arc<dyn DatabaseSnapshot>,
    directory: PathBuf,
}

impl BackupService {
    pub fn new(database: Arc<dyn DatabaseSnapshot>, directory: impl Into<PathBuf>) -> Self {
        Self {
            database,
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Snapshot and compress the database into a new backup file
    pub async fn create_backup(&self) -> ServiceResult<BackupInfo> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let now = Utc::now();
        let filename = format!("{BACKUP_PREFIX}{}{BACKUP_SUFFIX}", now.format("%Y%m%d_%H%M%S_%3f"));
        let path = self.directory.join(&filename);
        let temp = self.directory.join(format!(".{filename}.tmp"));

        // VACUUM INTO refuses to overwrite
        if tokio::fs::try_exists(&temp).await? {
            tokio::fs::remove_file(&temp).await?;
        }

        info!(backup = %filename, "Creating database backup");
        self.database.snapshot_to(&temp).await?;

        let compressed = {
            let (src, dst) = (temp.clone(), path.clone());
            tokio::task::spawn_blocking(move || compress(&src, &dst)).await?
        };
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary snapshot");
        }
        compressed?;

        let size = tokio::fs::metadata(&path).await?.len();
        info!(backup = %filename, size, "Backup created");

        Ok(BackupInfo {
            filename,
            size,
            created_at: now,
        })
    }

    /// All backups in the directory, newest first
    pub async fn list_backups(&self) -> ServiceResult<Vec<BackupInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if !is_backup_name(&filename) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            backups.push(BackupInfo {
                filename,
                size: metadata.len(),
                created_at,
            });
        }

        backups.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(backups)
    }

    /// Delete one backup by file name
    pub async fn delete_backup(&self, filename: &str) -> ServiceResult<()> {
        let path = self.backup_path(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(backup = %filename, "Backup deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServiceError::NotFound(format!("backup {filename}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Keep the newest `keep` backups and delete the rest.
    ///
    /// Returns the number of files deleted; a file that cannot be deleted is
    /// logged and left for the next rotation.
    pub async fn cleanup_old_backups(&self, keep: usize) -> ServiceResult<usize> {
        let backups = self.list_backups().await?;
        let mut deleted = 0;

        for backup in backups.iter().skip(keep) {
            match self.delete_backup(&backup.filename).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(backup = %backup.filename, error = %e, "Failed to delete old backup"),
            }
        }

        if deleted > 0 {
            info!(deleted, kept = backups.len() - deleted, "Old backups rotated");
        }
        Ok(deleted)
    }

    fn backup_path(&self, filename: &str) -> ServiceResult<PathBuf> {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') || !is_backup_name(filename) {
            return Err(ServiceError::InvalidName(filename.to_string()));
        }
        Ok(self.directory.join(filename))
    }
}

fn is_backup_name(name: &str) -> bool {
    name.len() > BACKUP_PREFIX.len() + BACKUP_SUFFIX.len()
        && name.starts_with(BACKUP_PREFIX)
        && name.ends_with(BACKUP_SUFFIX)
}

fn compress(src: &Path, dst: &Path) -> std::io::Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());
    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.into_inner().map_err(|e| e.into_error())?.sync_all()
}
