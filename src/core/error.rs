use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{field} {reason}")]
    InvalidParameter { field: &'static str, reason: String },
}

impl ParameterError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ParameterError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
