//! Routing predicates over metadata property sets.
//!
//! A processor declares which artifacts it wants through a hook. Every hook
//! variant answers the same question, [`Hook::matches`], so new strategies
//! can be added as variants without touching the registry or dispatcher.

use std::{path::Path, str::FromStr};

use sluice_core::{Properties, PropertiesError};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HookError {
  #[error("Unknown hook_type {0:?}")]
  UnknownType(String),

  #[error("Failed to load hook file: {0}")]
  Properties(#[from] PropertiesError),
}

// ============================================================================
// Hook Kind
// ============================================================================

/// The `hook_type` value of a processor definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookKind {
  #[default]
  Basic,
}

impl FromStr for HookKind {
  type Err = HookError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "basic" | "basicpropertiesmatchhook" => Ok(HookKind::Basic),
      _ => Err(HookError::UnknownType(s.to_string())),
    }
  }
}

// ============================================================================
// Hook
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
  Basic(BasicMatch),
}

impl Hook {
  /// Load the hook of the given kind from its hook file.
  pub async fn load(kind: HookKind, path: &Path) -> Result<Self, HookError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|source| PropertiesError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let reference = Properties::parse_in(path, &content)?;

    Ok(match kind {
      HookKind::Basic => Hook::Basic(BasicMatch::new(reference)),
    })
  }

  pub fn matches(&self, candidate: &Properties) -> bool {
    match self {
      Hook::Basic(hook) => hook.matches(candidate),
    }
  }
}

/// Subset-equality match with permissive handling of missing keys.
///
/// Every key present in both the reference and the candidate must carry the
/// same value. A reference key the candidate lacks does not cause a mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicMatch {
  reference: Properties,
}

impl BasicMatch {
  pub fn new(reference: Properties) -> Self {
    Self { reference }
  }

  pub fn matches(&self, candidate: &Properties) -> bool {
    self
      .reference
      .iter()
      .all(|(key, expected)| candidate.get(key).is_none_or(|actual| actual == expected))
  }
}
