//! On-disk write-ahead log of timestamp-stamped scrape payloads
//! (spec.md §4.3).
//!
//! Layout: `<root>/<sanitized_exporter_name>/YYYYMMDD-HHMMSS-<host_id>.prom`.
//! Lexicographic filename order equals chronological collection order,
//! which is what lets the drainer treat "oldest files" as "a prefix of
//! `list()`".

use crate::errors::BufferError;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One on-disk buffer entry, recovered from its filename and contents.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferEntry {
    pub host_id: String,
    pub exporter_name: String,
    pub collected_at: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// A listed (but not yet loaded) buffer file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferFile {
    pub path: PathBuf,
}

/// The write-ahead log. All operations serialize through one mutex —
/// the buffer is the sole writer and sole deleter; the scheduler and
/// drainer only ever call through this handle.
#[derive(Clone)]
pub struct ScrapeBuffer {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ScrapeBuffer {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Persist a scrape. Creates the exporter subdirectory if missing.
    ///
    /// # Errors
    /// Returns [`BufferError::Io`] on any filesystem failure.
    pub async fn save(
        &self,
        data: &[u8],
        host_id: &str,
        exporter_name: &str,
        collected_at: DateTime<Utc>,
    ) -> Result<PathBuf, BufferError> {
        let _guard = self.lock.lock().await;

        let dir = self.root.join(sanitize(exporter_name));
        tokio::fs::create_dir_all(&dir).await?;
        set_permissive(&dir).await;

        let filename = format!(
            "{}-{host_id}.prom",
            collected_at.format("%Y%m%d-%H%M%S")
        );
        let path = dir.join(filename);

        // Write to a temp file then rename, so a concurrent reader never
        // observes a partially-written entry.
        let tmp_path = path.with_extension("prom.tmp");
        tokio::fs::write(&tmp_path, data).await?;
        set_owner_rw_group_r(&tmp_path).await;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(path)
    }

    /// Every `*.prom` file across all exporter subdirectories, sorted so
    /// the oldest collection instant comes first. A nonexistent root
    /// yields an empty list.
    ///
    /// # Errors
    /// Returns [`BufferError::Io`] on any filesystem failure besides a
    /// missing root directory.
    pub async fn list(&self) -> Result<Vec<BufferFile>, BufferError> {
        let _guard = self.lock.lock().await;
        self.list_locked().await
    }

    async fn list_locked(&self) -> Result<Vec<BufferFile>, BufferError> {
        let mut files = Vec::new();

        let mut root_entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        while let Some(exporter_dir) = root_entries.next_entry().await? {
            if !exporter_dir.file_type().await?.is_dir() {
                continue;
            }

            let mut entries = tokio::fs::read_dir(exporter_dir.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("prom") {
                    files.push(BufferFile { path });
                }
            }
        }

        // Filenames are "YYYYMMDD-HHMMSS-host.prom" inside per-exporter
        // directories, so sorting by filename alone (not the full path,
        // which could sort directories unevenly) gives chronological
        // order across exporters.
        files.sort_by(|a, b| file_name(&a.path).cmp(&file_name(&b.path)));

        Ok(files)
    }

    /// Read a buffer file and recover its `(host_id, exporter_name,
    /// collected_at)` from its path.
    ///
    /// # Errors
    /// Returns [`BufferError::Corrupt`] if the filename doesn't split
    /// into at least three `-` segments after stripping `.prom`, or if
    /// the timestamp segment doesn't parse. Returns [`BufferError::Io`]
    /// on any filesystem failure.
    pub async fn load(&self, file: &BufferFile) -> Result<BufferEntry, BufferError> {
        let _guard = self.lock.lock().await;

        let data = tokio::fs::read(&file.path).await?;
        let entry = parse_entry(&file.path, data)?;
        Ok(entry)
    }

    /// Unlink a buffer file. Idempotent: deleting an already-gone file
    /// is not an error.
    ///
    /// # Errors
    /// Returns [`BufferError::Io`] on any filesystem failure besides the
    /// file already being gone.
    pub async fn delete(&self, file: &BufferFile) -> Result<(), BufferError> {
        let _guard = self.lock.lock().await;
        self.delete_locked(file).await
    }

    async fn delete_locked(&self, file: &BufferFile) -> Result<(), BufferError> {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file whose filename-derived collection instant
    /// precedes `now - retention_hours`. Files whose name can't be
    /// parsed are left in place and logged at debug, never deleted as a
    /// side effect of cleanup.
    ///
    /// # Errors
    /// Returns [`BufferError::Io`] if listing the buffer root fails for
    /// a reason other than it not existing.
    pub async fn cleanup(&self, retention_hours: u64) -> Result<usize, BufferError> {
        let _guard = self.lock.lock().await;

        let files = self.list_locked().await?;
        let cutoff = Utc::now() - chrono::Duration::hours(retention_hours as i64);

        let mut deleted = 0;
        for file in files {
            match collection_instant_from_filename(&file.path) {
                Ok(instant) if instant < cutoff => {
                    self.delete_locked(&file).await?;
                    deleted += 1;
                }
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!(path = %file.path.display(), "cleanup: unparseable filename, leaving in place");
                }
            }
        }

        Ok(deleted)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Replace filesystem-hostile characters in an exporter name with `_`.
#[must_use]
pub fn sanitize(exporter_name: &str) -> String {
    exporter_name
        .chars()
        .map(|c| if "/\\:. ".contains(c) { '_' } else { c })
        .collect()
}

fn parse_entry(path: &Path, data: Vec<u8>) -> Result<BufferEntry, BufferError> {
    let exporter_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .ok_or_else(|| BufferError::Corrupt {
            path: path.display().to_string(),
            reason: "missing parent exporter directory".to_string(),
        })?
        .to_string();

    let stem = path
        .file_stem()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BufferError::Corrupt {
            path: path.display().to_string(),
            reason: "non-UTF8 filename".to_string(),
        })?;

    let segments: Vec<&str> = stem.split('-').collect();
    if segments.len() < 3 {
        return Err(BufferError::Corrupt {
            path: path.display().to_string(),
            reason: format!("expected at least 3 '-'-separated segments, got {}", segments.len()),
        });
    }

    let host_id = segments[2..].join("-");
    let collected_at = parse_instant(segments[0], segments[1]).map_err(|reason| BufferError::Corrupt {
        path: path.display().to_string(),
        reason,
    })?;

    Ok(BufferEntry {
        host_id,
        exporter_name,
        collected_at,
        data,
    })
}

fn collection_instant_from_filename(path: &Path) -> Result<DateTime<Utc>, String> {
    let stem = path
        .file_stem()
        .and_then(|n| n.to_str())
        .ok_or("non-UTF8 filename")?;
    let segments: Vec<&str> = stem.split('-').collect();
    if segments.len() < 3 {
        return Err("not enough '-'-separated segments".to_string());
    }
    parse_instant(segments[0], segments[1])
}

fn parse_instant(date_part: &str, time_part: &str) -> Result<DateTime<Utc>, String> {
    let combined = format!("{date_part}{time_part}");
    let naive = chrono::NaiveDateTime::parse_from_str(&combined, "%Y%m%d%H%M%S")
        .map_err(|e| format!("bad timestamp segment: {e}"))?;
    Utc.from_local_datetime(&naive)
        .single()
        .ok_or_else(|| "ambiguous local datetime".to_string())
}

#[cfg(unix)]
async fn set_permissive(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = tokio::fs::metadata(dir).await {
        let mut perms = meta.permissions();
        perms.set_mode(0o755);
        let _ = tokio::fs::set_permissions(dir, perms).await;
    }
}

#[cfg(not(unix))]
async fn set_permissive(_dir: &Path) {}

#[cfg(unix)]
async fn set_owner_rw_group_r(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = tokio::fs::metadata(path).await {
        let mut perms = meta.permissions();
        perms.set_mode(0o640);
        let _ = tokio::fs::set_permissions(path, perms).await;
    }
}

#[cfg(not(unix))]
async fn set_owner_rw_group_r(_path: &Path) {}
