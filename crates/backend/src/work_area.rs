//! Filesystem primitives for the shared work area.
//!
//! Every directory the pipeline creates lives directly under the work
//! directory and is named `<purpose>-<uuid>`:
//!
//! ```text
//! work/
//!   claim-0190...   # pairs moved out of a scanned directory
//!   input-0190...   # per-processor copy of a claimed pair
//!   output-0190...  # where the processor writes its results
//! ```
//!
//! Claims use `rename`, so scanned directories and the work directory must be
//! on the same filesystem.

use std::{
  io,
  path::{Path, PathBuf},
  time::{Duration, SystemTime},
};

use sluice_core::PROPERTIES_EXTENSION;
use tracing::{debug, warn};
use uuid::Uuid;

const CREATE_ATTEMPTS: usize = 8;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkAreaError {
  #[error("Failed to create directory {}: {source}", .path.display())]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
  Rename {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Failed to copy {} to {}: {source}", .from.display(), .to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Failed to remove {}: {source}", .path.display())]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{} has no file name", .0.display())]
  NoFileName(PathBuf),
}

// ============================================================================
// Work Directories
// ============================================================================

/// What a work directory is used for; the prefix of its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
  Claim,
  Input,
  Output,
}

impl Purpose {
  pub fn as_str(&self) -> &'static str {
    match self {
      Purpose::Claim => "claim",
      Purpose::Input => "input",
      Purpose::Output => "output",
    }
  }
}

/// Create a fresh, uniquely named directory directly under `base`.
///
/// The create is non-recursive and fails on an existing name, so two callers
/// can never receive the same directory.
pub async fn create_unique_dir(base: &Path, purpose: Purpose) -> Result<PathBuf, WorkAreaError> {
  let mut last = None;

  for _ in 0..CREATE_ATTEMPTS {
    let path = base.join(format!("{}-{}", purpose.as_str(), Uuid::now_v7()));
    match tokio::fs::create_dir(&path).await {
      Ok(()) => return Ok(path),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
        last = Some((path, e));
      }
      Err(source) => return Err(WorkAreaError::Create { path, source }),
    }
  }

  let (path, source) = last.unwrap_or_else(|| (base.to_path_buf(), io::Error::from(io::ErrorKind::AlreadyExists)));
  Err(WorkAreaError::Create { path, source })
}

/// Paths of a pair after it was moved into a claim directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimed {
  pub dir: PathBuf,
  pub metadata: PathBuf,
  pub data: PathBuf,
}

/// Move a metadata/data pair into a new claim directory under `work_dir`.
///
/// Either both files move or neither does: when the data file cannot be
/// moved, the metadata file is moved back and the claim directory removed.
pub async fn claim_pair(work_dir: &Path, metadata: &Path, data: &Path) -> Result<Claimed, WorkAreaError> {
  let metadata_name = metadata
    .file_name()
    .ok_or_else(|| WorkAreaError::NoFileName(metadata.to_path_buf()))?;
  let data_name = data
    .file_name()
    .ok_or_else(|| WorkAreaError::NoFileName(data.to_path_buf()))?;

  let dir = create_unique_dir(work_dir, Purpose::Claim).await?;
  let claimed_metadata = dir.join(metadata_name);
  let claimed_data = dir.join(data_name);

  if let Err(source) = tokio::fs::rename(metadata, &claimed_metadata).await {
    discard_dir(&dir).await;
    return Err(WorkAreaError::Rename {
      from: metadata.to_path_buf(),
      to: claimed_metadata,
      source,
    });
  }

  if let Err(source) = tokio::fs::rename(data, &claimed_data).await {
    if let Err(e) = tokio::fs::rename(&claimed_metadata, metadata).await {
      warn!(
        from = %claimed_metadata.display(),
        to = %metadata.display(),
        error = %e,
        "Failed to restore metadata file after partial claim"
      );
    } else {
      discard_dir(&dir).await;
    }
    return Err(WorkAreaError::Rename {
      from: data.to_path_buf(),
      to: claimed_data,
      source,
    });
  }

  Ok(Claimed {
    dir,
    metadata: claimed_metadata,
    data: claimed_data,
  })
}

/// Copy `file` into `dir`, keeping its file name.
pub async fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf, WorkAreaError> {
  let name = file
    .file_name()
    .ok_or_else(|| WorkAreaError::NoFileName(file.to_path_buf()))?;
  let target = dir.join(name);

  tokio::fs::copy(file, &target)
    .await
    .map_err(|source| WorkAreaError::Copy {
      from: file.to_path_buf(),
      to: target.clone(),
      source,
    })?;

  Ok(target)
}

/// Recursively remove a directory tree.
pub async fn remove_tree(path: &Path) -> Result<(), WorkAreaError> {
  tokio::fs::remove_dir_all(path)
    .await
    .map_err(|source| WorkAreaError::Remove {
      path: path.to_path_buf(),
      source,
    })
}

async fn discard_dir(dir: &Path) {
  if let Err(e) = tokio::fs::remove_dir(dir).await {
    warn!(path = %dir.display(), error = %e, "Failed to remove unused claim directory");
  }
}

// ============================================================================
// Scanning
// ============================================================================

/// Metadata files directly inside `dir`, sorted by path.
pub async fn list_metadata_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
  let mut entries = tokio::fs::read_dir(dir).await?;
  let mut files = Vec::new();

  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.extension().is_some_and(|ext| ext == PROPERTIES_EXTENSION)
      && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false)
    {
      files.push(path);
    }
  }

  files.sort();
  Ok(files)
}

/// The data file paired with a metadata file: the same path without the extension.
pub fn data_path_for(metadata: &Path) -> PathBuf {
  metadata.with_extension("")
}

/// Age of a file modified at `modified`; modification times in the future count as zero.
pub fn file_age(now: SystemTime, modified: SystemTime) -> Duration {
  now.duration_since(modified).unwrap_or(Duration::ZERO)
}

/// Whether a file of the given age may be claimed.
///
/// A zero minimum disables the gate entirely. Otherwise the age must be
/// strictly greater than the minimum.
pub fn is_old_enough(age: Duration, min_age: Duration) -> bool {
  min_age.is_zero() || age > min_age
}

// ============================================================================
// Age-off
// ============================================================================

/// Remove immediate children of `dir` last modified more than `max_age` ago.
///
/// Returns the number of entries removed. Failures are logged and skipped.
pub async fn sweep_older_than(dir: &Path, max_age: Duration, now: SystemTime) -> usize {
  let mut entries = match tokio::fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) => {
      warn!(path = %dir.display(), error = %e, "Failed to read work directory for age-off");
      return 0;
    }
  };

  let mut removed = 0;
  loop {
    let entry = match entries.next_entry().await {
      Ok(Some(entry)) => entry,
      Ok(None) => break,
      Err(e) => {
        warn!(path = %dir.display(), error = %e, "Failed to list work directory for age-off");
        break;
      }
    };

    let path = entry.path();
    let Ok(metadata) = entry.metadata().await else {
      continue;
    };
    let Ok(modified) = metadata.modified() else {
      continue;
    };
    if file_age(now, modified) <= max_age {
      continue;
    }

    let result = if metadata.is_dir() {
      tokio::fs::remove_dir_all(&path).await
    } else {
      tokio::fs::remove_file(&path).await
    };

    match result {
      Ok(()) => {
        debug!(path = %path.display(), "Aged off work entry");
        removed += 1;
      }
      Err(e) => warn!(path = %path.display(), error = %e, "Failed to age off work entry"),
    }
  }

  removed
}
