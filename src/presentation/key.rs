//! Document key resolution.

use super::entity::Presentation;
use crate::core::{PersistError, Result};
use crate::storage::Revision;

pub const KEY_PREFIX: &str = "p::";

/// Derives the document key for a title: `p::` + lowercased title, spaces as underscores.
pub fn derive_key(title: &str) -> Result<String> {
    if title.is_empty() {
        return Err(PersistError::Validation(
            "cannot derive a document key from an empty title".to_string(),
        ));
    }
    Ok(format!("{}{}", KEY_PREFIX, title.replace(' ', "_").to_lowercase()))
}

/// The storage operation a save resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// Replace the document the revision points at.
    Replace(Revision),
    /// Insert a new document under this key.
    Insert(String),
}

impl WriteTarget {
    pub fn id(&self) -> &str {
        match self {
            WriteTarget::Replace(revision) => revision.id(),
            WriteTarget::Insert(id) => id,
        }
    }
}

/// Picks the write target: a known revision wins over any identifier, an
/// assigned identifier wins over derivation.
pub fn resolve_write_target(presentation: &Presentation) -> Result<WriteTarget> {
    if let Some(revision) = presentation.revision() {
        return Ok(WriteTarget::Replace(revision.clone()));
    }
    match presentation.id() {
        Some(id) => Ok(WriteTarget::Insert(id.to_string())),
        None => derive_key(presentation.title()).map(WriteTarget::Insert),
    }
}
