use thiserror::Error;

use crate::domain::error::DomainError;
use crate::application::repos::RepoError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("mutation aborted by observer: {0}")]
    Aborted(String),
}

impl AppError {
    pub fn not_found(id: crate::domain::content::ContentId) -> Self {
        Self::Domain(DomainError::not_found(id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(message))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::Domain(DomainError::NotFound { .. }) | AppError::Repo(RepoError::NotFound)
        )
    }
}
