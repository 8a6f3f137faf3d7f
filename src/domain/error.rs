use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("`{raw}` is not a valid identifier")]
    InvalidId { raw: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("{entity} is still referenced by {count} blogs")]
    InUse { entity: &'static str, count: u64 },
}

impl DomainError {
    pub fn invalid_id(raw: impl Into<String>) -> Self {
        Self::InvalidId { raw: raw.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn in_use(entity: &'static str, count: u64) -> Self {
        Self::InUse { entity, count }
    }
}
