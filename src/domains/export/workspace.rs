use crate::errors::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Per-job working directory plus the archive built from it.
///
/// Both are removed when the last handle is dropped, whatever the job outcome.
/// Blocking file work runs on cloned `Arc` handles, so removal never races it.
pub struct JobWorkspace {
    name: String,
    dir: Option<TempDir>,
    dir_path: PathBuf,
    archive_path: PathBuf,
    /// File names already handed out in this working directory
    file_names: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for JobWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWorkspace")
            .field("name", &self.name)
            .field("dir_path", &self.dir_path)
            .field("archive_path", &self.archive_path)
            .finish()
    }
}

/// Keep identifiers usable as file names
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `{projectID}_{timestamp}`, shared by the working directory and the download name
pub fn job_name(project_id: &str, requested_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        sanitize(project_id),
        requested_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

impl JobWorkspace {
    pub fn create(work_root: &Path, project_id: &str, requested_at: DateTime<Utc>) -> ServiceResult<Self> {
        std::fs::create_dir_all(work_root)?;

        let name = job_name(project_id, requested_at);
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", name))
            .tempdir_in(work_root)?;
        let dir_path = dir.path().to_path_buf();
        let dir_file_name = dir_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let archive_path = work_root.join(format!("{}.zip", dir_file_name));

        debug!("Created working directory {}", dir_path.display());

        Ok(Self {
            name,
            dir: Some(dir),
            dir_path,
            archive_path,
            file_names: Mutex::new(HashSet::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// File name offered to the caller for the archive
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.name)
    }

    /// Sanitized name for a new file, suffixed `_2`, `_3`, ... when an
    /// earlier file already took it
    fn reserve_file_name(&self, file_name: &str) -> ServiceResult<String> {
        let mut taken = self
            .file_names
            .lock()
            .map_err(|_| ServiceError::Internal("File name registry poisoned".to_string()))?;

        let base = sanitize_file_name(file_name);
        let (stem, ext) = match base.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
            None => (base.clone(), String::new()),
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while !taken.insert(candidate.clone()) {
            candidate = format!("{}_{}{}", stem, n, ext);
            n += 1;
        }
        if candidate != base {
            warn!("File name {} already used in job {}, writing {}", base, self.name, candidate);
        }
        Ok(candidate)
    }

    /// Write one file into the working directory. Never overwrites an
    /// earlier file of the same job.
    pub async fn write_file(self: &Arc<Self>, file_name: &str, contents: String) -> ServiceResult<PathBuf> {
        let workspace = Arc::clone(self);
        let path = workspace.dir().join(workspace.reserve_file_name(file_name)?);
        tokio::task::spawn_blocking(move || -> ServiceResult<PathBuf> {
            std::fs::write(&path, contents.as_bytes())?;
            drop(workspace);
            Ok(path)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("File write task failed: {}", e)))?
    }

    /// Compress the working directory into the job archive
    pub async fn archive(self: &Arc<Self>) -> ServiceResult<u64> {
        let workspace = Arc::clone(self);
        tokio::task::spawn_blocking(move || -> ServiceResult<u64> {
            create_zip_from_dir(workspace.dir(), workspace.archive_path())?;
            let size = std::fs::metadata(workspace.archive_path())?.len();
            Ok(size)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Archive task failed: {}", e)))?
    }

    fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!("Failed to remove working directory {}: {}", self.dir_path.display(), e);
            }
        }
        match std::fs::remove_file(&self.archive_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove archive {}: {}", self.archive_path.display(), e),
        }
        info!("Cleaned up export job {}", self.name);
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.{}", sanitize(stem), sanitize(ext)),
        None => sanitize(file_name),
    }
}

pub fn create_zip_from_dir(src_dir: &Path, dest_zip: &Path) -> ServiceResult<()> {
    let file = std::fs::File::create(dest_zip)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    fn add_dir_recursively(
        zip: &mut ZipWriter<std::fs::File>,
        base_dir: &Path,
        path: &Path,
        options: FileOptions,
    ) -> ServiceResult<()> {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();

        for path in entries {
            let name = path
                .strip_prefix(base_dir)
                .map_err(|e| ServiceError::Internal(e.to_string()))?
                .to_string_lossy()
                .into_owned();
            if path.is_file() {
                zip.start_file(name, options)?;
                let mut f = std::fs::File::open(&path)?;
                std::io::copy(&mut f, zip)?;
            } else if path.is_dir() {
                zip.add_directory(name, options)?;
                add_dir_recursively(zip, base_dir, &path, options)?;
            }
        }
        Ok(())
    }

    add_dir_recursively(&mut zip, src_dir, src_dir, options)?;
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    fn requested_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_job_name() {
        assert_eq!(job_name("proj/1", requested_at()), "proj_1_20240309T140507000Z");
    }

    #[test]
    fn test_concurrent_jobs_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = JobWorkspace::create(root.path(), "p", requested_at()).unwrap();
        let b = JobWorkspace::create(root.path(), "p", requested_at()).unwrap();
        assert_ne!(a.dir(), b.dir());
        assert_ne!(a.archive_path(), b.archive_path());
        assert_eq!(a.archive_file_name(), b.archive_file_name());
    }

    #[tokio::test]
    async fn test_archive_contains_written_files_and_drop_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Arc::new(JobWorkspace::create(root.path(), "p", requested_at()).unwrap());
        workspace.write_file("a.csv", "h\n1\n".into()).await.unwrap();
        workspace.write_file("b.csv", "h\n2\n".into()).await.unwrap();
        let size = workspace.archive().await.unwrap();
        assert!(size > 0);

        let mut archive = zip::ZipArchive::new(std::fs::File::open(workspace.archive_path()).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut contents = String::new();
        archive.by_name("a.csv").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "h\n1\n");

        let dir = workspace.dir().to_path_buf();
        let zip_path = workspace.archive_path().to_path_buf();
        drop(archive);
        drop(workspace);
        assert!(!dir.exists());
        assert!(!zip_path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_colliding_names_get_suffixes() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Arc::new(JobWorkspace::create(root.path(), "p", requested_at()).unwrap());
        let first = workspace.write_file("a.b.csv", "1".into()).await.unwrap();
        let second = workspace.write_file("a_b.csv", "2".into()).await.unwrap();
        let third = workspace.write_file("a?b.csv", "3".into()).await.unwrap();

        let names: Vec<String> = [&first, &second, &third]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_b.csv", "a_b_2.csv", "a_b_3.csv"]);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "1");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "2");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../evil.csv"), "___evil.csv");
        assert_eq!(sanitize_file_name("abc-123.csv"), "abc-123.csv");
    }
}
