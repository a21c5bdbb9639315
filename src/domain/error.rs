use thiserror::Error;

use crate::domain::content::ContentId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("content `{id}` not found")]
    NotFound { id: ContentId },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("cannot move content `{id}` into its own descendant `{target}`")]
    CyclicMove { id: ContentId, target: ContentId },
    #[error("cannot restore content `{id}`: parent `{parent}` is missing or trashed")]
    OrphanedRestore { id: ContentId, parent: ContentId },
    #[error("tree invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn not_found(id: ContentId) -> Self {
        Self::NotFound { id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn cyclic_move(id: ContentId, target: ContentId) -> Self {
        Self::CyclicMove { id, target }
    }

    pub fn orphaned_restore(id: ContentId, parent: ContentId) -> Self {
        Self::OrphanedRestore { id, parent }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
