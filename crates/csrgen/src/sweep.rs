//! Startup reconciliation between the job table and the jobs directory.
//!
//! Runs once before the worker starts. Empty folders are deleted, folders
//! with content but no record are reported and left alone, and records whose
//! files are incomplete are deleted together with their folder.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use tracing::info_span;
use walkdir::WalkDir;

use crate::db::job_repo::JobRow;
use crate::job::{JobError, JobId, JobRepository, JobStatus};

/// What a sweep changed or found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed_empty_folders: Vec<PathBuf>,
    /// Non-empty folders with no record. Never deleted automatically.
    pub orphan_folders: Vec<PathBuf>,
    /// Ids of records deleted because their files were incomplete.
    pub removed_jobs: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.removed_empty_folders.is_empty()
            && self.orphan_folders.is_empty()
            && self.removed_jobs.is_empty()
    }
}

/// Why a record is considered broken.
#[derive(Debug)]
enum RecordDefect {
    InvalidId,
    UnknownStatus(i64),
    MissingFolder(PathBuf),
    MissingFile(PathBuf),
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDefect::InvalidId => write!(f, "id is not a valid folder name"),
            RecordDefect::UnknownStatus(value) => write!(f, "unknown status value {}", value),
            RecordDefect::MissingFolder(path) => write!(f, "folder {} is missing", path.display()),
            RecordDefect::MissingFile(path) => write!(f, "file {} is missing", path.display()),
        }
    }
}

/// Repairs drift between records and folders.
pub fn reconcile(repo: &JobRepository) -> Result<SweepReport, JobError> {
    let _span = info_span!("sweep", jobs_dir = %repo.jobs_dir().display()).entered();
    let mut report = SweepReport::default();

    sweep_folders(repo, &mut report)?;
    sweep_records(repo, &mut report)?;

    if report.is_clean() {
        debug!("Sweep found nothing to repair");
    } else {
        info!(
            "Sweep removed {} empty folders and {} broken jobs, found {} orphan folders",
            report.removed_empty_folders.len(),
            report.removed_jobs.len(),
            report.orphan_folders.len()
        );
    }
    Ok(report)
}

fn sweep_folders(repo: &JobRepository, report: &mut SweepReport) -> Result<(), JobError> {
    let mut folders = Vec::new();
    for entry in WalkDir::new(repo.jobs_dir()).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in jobs directory: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            folders.push(entry.into_path());
        } else {
            debug!("Ignoring non-directory {}", entry.path().display());
        }
    }

    sweep_folder_list(repo, &folders, report)
}

/// Filesystem failures on one folder are logged and skip that folder only;
/// store errors end the sweep.
fn sweep_folder_list(
    repo: &JobRepository,
    folders: &[PathBuf],
    report: &mut SweepReport,
) -> Result<(), JobError> {
    for folder in folders {
        match sweep_folder(repo, folder, report) {
            Ok(()) => {}
            Err(e @ JobError::Io { .. }) => {
                warn!("Skipping folder {}: {}", folder.display(), e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn sweep_folder(
    repo: &JobRepository,
    path: &Path,
    report: &mut SweepReport,
) -> Result<(), JobError> {
    if is_empty_dir(path)? {
        fs::remove_dir(path).map_err(|e| JobError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Removed empty job folder {}", path.display());
        report.removed_empty_folders.push(path.to_path_buf());
        return Ok(());
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !repo.has_record(&name)? {
        warn!(
            "Folder {} has no job record; leaving it for manual cleanup",
            path.display()
        );
        report.orphan_folders.push(path.to_path_buf());
    }
    Ok(())
}

fn sweep_records(repo: &JobRepository, report: &mut SweepReport) -> Result<(), JobError> {
    for row in repo.rows()? {
        let Some(defect) = inspect(repo, &row) else {
            continue;
        };

        warn!("Removing job {}: {}", row.id, defect);
        repo.remove(&row.id)?;
        report.removed_jobs.push(row.id);
    }
    Ok(())
}

fn inspect(repo: &JobRepository, row: &JobRow) -> Option<RecordDefect> {
    let Some(id) = JobId::parse(&row.id) else {
        return Some(RecordDefect::InvalidId);
    };
    let Some(status) = JobStatus::from_i64(row.status) else {
        return Some(RecordDefect::UnknownStatus(row.status));
    };

    let paths = repo.paths(&id);
    if !paths.folder.is_dir() {
        return Some(RecordDefect::MissingFolder(paths.folder));
    }

    let mut required = vec![paths.config];
    if status.has_artifacts() {
        required.push(paths.key);
        required.push(paths.csr);
    }
    required
        .into_iter()
        .find(|path| !path.is_file())
        .map(RecordDefect::MissingFile)
}

fn is_empty_dir(path: &Path) -> Result<bool, JobError> {
    let mut entries = fs::read_dir(path).map_err(|e| JobError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(entries.next().is_none())
}
