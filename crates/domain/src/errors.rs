use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Invalid RecordId: {0}")]
    InvalidRecordId(String),

    #[error("Invalid ImageKey: {0}")]
    InvalidImageKey(String),

    #[error("Required field is missing: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field is read-only: {0}")]
    ReadOnlyField(String),

    #[error("Form validation failed: {0:?}")]
    InvalidForm(Vec<String>),

    #[error("Record serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// 入力値の問題によるエラーかどうか
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::MissingField(_)
                | DomainError::InvalidField { .. }
                | DomainError::UnknownField(_)
                | DomainError::ReadOnlyField(_)
                | DomainError::InvalidForm(_)
        )
    }
}
