use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the store itself failed, as opposed to the request being refused.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AppError::Repo(_))
    }
}

impl From<RepoError> for AppError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => AppError::NotFound,
            RepoError::Duplicate { constraint } => {
                AppError::Conflict(format!("duplicate value for `{constraint}`"))
            }
            RepoError::InvalidInput { message } => AppError::Validation(message),
            other => AppError::Repo(other),
        }
    }
}
