use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("field `{field}` holds an undecodable value `{value}`")]
    Decode { field: &'static str, value: String },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn decode(field: &'static str, value: impl Into<String>) -> Self {
        Self::Decode {
            field,
            value: value.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
