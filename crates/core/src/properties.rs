//! Line-oriented `key = value` property files.
//!
//! Property files carry both processor configuration and per-artifact
//! metadata. The format is deliberately small:
//!
//! ```text
//! # comment
//! type = image
//! volume=11
//! ```
//!
//! Each line is split on the first `=`, so values may themselves contain `=`.

use std::{
  collections::{HashMap, hash_map},
  path::{Path, PathBuf},
};

/// File extension (without the dot) that marks a metadata file.
///
/// A metadata file `foo.properties` pairs with the data file `foo` in the
/// same directory.
pub const PROPERTIES_EXTENSION: &str = "properties";

/// Errors produced while reading or parsing a property file
#[derive(Debug, thiserror::Error)]
pub enum PropertiesError {
  #[error("Failed to read property file {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Invalid properties: {}", .lines.join("; "))]
  Invalid { lines: Vec<String> },

  #[error("Invalid properties in {}: {}", .path.display(), .lines.join("; "))]
  InvalidFile { path: PathBuf, lines: Vec<String> },
}

/// An unordered string-to-string mapping parsed from a property file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(HashMap<String, String>);

impl Properties {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parse property text.
  ///
  /// Every malformed line is collected so the error names all of them at once.
  pub fn parse(input: &str) -> Result<Self, PropertiesError> {
    let mut properties = HashMap::new();
    let mut invalid = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
      let line = raw.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      match line.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
          properties.insert(key.trim().to_string(), value.trim().to_string());
        }
        _ => invalid.push(format!("line {}: {}", idx + 1, line)),
      }
    }

    if !invalid.is_empty() {
      return Err(PropertiesError::Invalid { lines: invalid });
    }

    Ok(Self(properties))
  }

  /// Read and parse a property file from disk.
  pub fn load(path: &Path) -> Result<Self, PropertiesError> {
    let content = std::fs::read_to_string(path).map_err(|source| PropertiesError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse_in(path, &content)
  }

  /// Parse property text that was read from `path`, naming the file in any error.
  pub fn parse_in(path: &Path, content: &str) -> Result<Self, PropertiesError> {
    Self::parse(content).map_err(|e| e.with_path(path))
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
    self.0.insert(key.into(), value.into())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
    self.0.iter()
  }
}

impl PropertiesError {
  fn with_path(self, path: &Path) -> Self {
    match self {
      PropertiesError::Invalid { lines } => PropertiesError::InvalidFile {
        path: path.to_path_buf(),
        lines,
      },
      other => other,
    }
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

impl<'a> IntoIterator for &'a Properties {
  type Item = (&'a String, &'a String);
  type IntoIter = hash_map::Iter<'a, String, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}
