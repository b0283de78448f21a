use std::fmt;

use super::processor::ProcessorId;

/// Ordered record of the processors that already ran on an artifact's lineage.
///
/// Values are never shared between fan-out targets: [`Provenance::with`]
/// returns a fresh list, so appending for one target cannot leak into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance(Vec<ProcessorId>);

impl Provenance {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, id: &ProcessorId) -> bool {
    self.0.contains(id)
  }

  /// A copy of this list with `id` appended.
  pub fn with(&self, id: ProcessorId) -> Self {
    let mut ids = Vec::with_capacity(self.0.len() + 1);
    ids.extend(self.0.iter().cloned());
    ids.push(id);
    Self(ids)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ProcessorId> {
    self.0.iter()
  }
}

impl From<Vec<ProcessorId>> for Provenance {
  fn from(ids: Vec<ProcessorId>) -> Self {
    Self(ids)
  }
}

impl fmt::Display for Provenance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[")?;
    for (i, id) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", id)?;
    }
    write!(f, "]")
  }
}
