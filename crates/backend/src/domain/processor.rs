//! Processor definitions and execution of the external worker program.
//!
//! A processor definition is a directory holding a `config.properties` file,
//! an executable and a hook file:
//!
//! ```text
//! processors/
//!   thumbnail/
//!     config.properties   # executable = run.sh, hook_file = hook.properties, pool_size = 2
//!     hook.properties     # type = image
//!     run.sh
//! ```

use std::{
  fmt,
  path::{Path, PathBuf},
  process::{ExitStatus, Stdio},
};

use sluice_core::{Properties, PropertiesError};
use tokio::process::Command;
use tracing::{debug, warn};

use super::hook::{Hook, HookError, HookKind};

/// Name of the configuration file inside a processor definition directory
pub const CONFIG_FILE: &str = "config.properties";

pub const DEFAULT_POOL_SIZE: usize = 5;

// ============================================================================
// ProcessorId
// ============================================================================

/// Stable processor identity derived from the definition directory's location.
///
/// Renaming the processor inside its config keeps the id; moving the
/// directory changes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(String);

impl ProcessorId {
  pub fn from_dir(path: &Path) -> Self {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    ProcessorId(Self::hash_path(&canonical))
  }

  fn hash_path(path: &Path) -> String {
    use std::{
      collections::hash_map::DefaultHasher,
      hash::{Hash, Hasher},
    };

    let mut hasher = DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  #[cfg(test)]
  pub(crate) fn from_raw(id: &str) -> Self {
    ProcessorId(id.to_string())
  }
}

impl fmt::Display for ProcessorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a processor definition is rejected
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
  #[error("Processor definition path must be a directory: {}", .0.display())]
  NotADirectory(PathBuf),

  #[error(transparent)]
  Config(#[from] PropertiesError),

  #[error("{} missing {key} property", .path.display())]
  MissingKey { path: PathBuf, key: &'static str },

  #[error("Could not find executable at {}", .0.display())]
  MissingExecutable(PathBuf),

  #[error("Executable is not a regular file: {}", .0.display())]
  ExecutableNotAFile(PathBuf),

  #[error("Executable is not runnable: {}", .0.display())]
  NotExecutable(PathBuf),

  #[error("Invalid value for pool_size {0:?}: must be an integer of at least 1")]
  InvalidPoolSize(String),

  #[error(transparent)]
  Hook(#[from] HookError),
}

/// Failure of a single processor run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
  #[error("Failed to launch {}: {source}", .path.display())]
  Launch {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Processor exited unsuccessfully ({0})")]
  Failed(ExitStatus),
}

// ============================================================================
// Processor
// ============================================================================

/// Immutable snapshot of one processor definition.
///
/// Rebuilt wholesale on every registry rebuild, never mutated in place.
#[derive(Debug, Clone)]
pub struct Processor {
  id: ProcessorId,
  name: String,
  dir: PathBuf,
  executable: PathBuf,
  hook: Hook,
  pool_size: usize,
}

impl Processor {
  /// Load and validate the definition in `dir`.
  pub async fn load(dir: &Path) -> Result<Self, DefinitionError> {
    let dir = tokio::fs::canonicalize(dir)
      .await
      .map_err(|_| DefinitionError::NotADirectory(dir.to_path_buf()))?;
    if !tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
      return Err(DefinitionError::NotADirectory(dir));
    }

    let config_path = dir.join(CONFIG_FILE);
    let content = tokio::fs::read_to_string(&config_path)
      .await
      .map_err(|source| PropertiesError::Read {
        path: config_path.clone(),
        source,
      })?;
    let config = Properties::parse_in(&config_path, &content)?;

    let executable = config
      .get("executable")
      .or_else(|| config.get("execute_file"))
      .filter(|v| !v.is_empty())
      .ok_or_else(|| DefinitionError::MissingKey {
        path: config_path.clone(),
        key: "executable",
      })?;
    let executable = dir.join(executable);
    check_executable(&executable).await?;

    let pool_size = match config.get("pool_size") {
      Some(value) => match value.parse::<usize>() {
        Ok(size) if size >= 1 => size,
        _ => return Err(DefinitionError::InvalidPoolSize(value.to_string())),
      },
      None => DEFAULT_POOL_SIZE,
    };

    let hook_file = config
      .get("hook_file")
      .filter(|v| !v.is_empty())
      .ok_or_else(|| DefinitionError::MissingKey {
        path: config_path.clone(),
        key: "hook_file",
      })?;
    let kind = match config.get("hook_type") {
      Some(value) => value.parse::<HookKind>()?,
      None => HookKind::default(),
    };
    let hook = Hook::load(kind, &dir.join(hook_file)).await?;

    let name = match config.get("name").filter(|v| !v.is_empty()) {
      Some(name) => name.to_string(),
      None => dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string()),
    };

    Ok(Self {
      id: ProcessorId::from_dir(&dir),
      name,
      dir,
      executable,
      hook,
      pool_size,
    })
  }

  pub fn id(&self) -> &ProcessorId {
    &self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn pool_size(&self) -> usize {
    self.pool_size
  }

  pub fn matches(&self, properties: &Properties) -> bool {
    self.hook.matches(properties)
  }

  /// File name, inside the output directory, that receives the run's combined stdout/stderr
  pub fn output_log_name(&self) -> String {
    let sanitized: String = self
      .name
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
      .collect();
    format!("_{}_output.txt", sanitized)
  }

  /// Run the executable on an input/output directory pair.
  ///
  /// The program runs inside the definition directory with the two directory
  /// paths as its only arguments. Its stdout and stderr both go to
  /// [`Processor::output_log_name`] in the output directory.
  pub async fn run(&self, input: &Path, output: &Path) -> Result<(), RunError> {
    let mut cmd = Command::new(&self.executable);
    cmd.arg(input).arg(output).current_dir(&self.dir).stdin(Stdio::null());

    let log_path = output.join(self.output_log_name());
    match open_output_log(&log_path) {
      Ok((stdout, stderr)) => {
        cmd.stdout(stdout).stderr(stderr);
      }
      Err(e) => {
        warn!(
          processor = %self.name,
          path = %log_path.display(),
          error = %e,
          "Could not open output log, discarding stdout/stderr"
        );
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
      }
    }

    debug!(
      processor = %self.name,
      executable = %self.executable.display(),
      input = %input.display(),
      output = %output.display(),
      "Running processor"
    );

    let status = cmd.status().await.map_err(|source| RunError::Launch {
      path: self.executable.clone(),
      source,
    })?;

    if !status.success() {
      return Err(RunError::Failed(status));
    }
    Ok(())
  }
}

fn open_output_log(path: &Path) -> std::io::Result<(Stdio, Stdio)> {
  let file = std::fs::File::create(path)?;
  let clone = file.try_clone()?;
  Ok((Stdio::from(file), Stdio::from(clone)))
}

async fn check_executable(path: &Path) -> Result<(), DefinitionError> {
  let metadata = tokio::fs::metadata(path)
    .await
    .map_err(|_| DefinitionError::MissingExecutable(path.to_path_buf()))?;

  if !metadata.is_file() {
    return Err(DefinitionError::ExecutableNotAFile(path.to_path_buf()));
  }

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 == 0 {
      return Err(DefinitionError::NotExecutable(path.to_path_buf()));
    }
  }

  Ok(())
}
