use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),
    #[error("STORAGE: {0}")]
    Storage(String),
    #[error("CONFIG: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Message text without the category prefix, for showing to a person.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::NotFound(message)
            | Self::Forbidden(message)
            | Self::Storage(message)
            | Self::Config(message)
            | Self::Io(message)
            | Self::Internal(message) => message,
        }
    }

    /// Same category, new text.
    pub fn with_message(self, message: String) -> Self {
        match self {
            Self::Validation(_) => Self::Validation(message),
            Self::NotFound(_) => Self::NotFound(message),
            Self::Forbidden(_) => Self::Forbidden(message),
            Self::Storage(_) => Self::Storage(message),
            Self::Config(_) => Self::Config(message),
            Self::Io(_) => Self::Io(message),
            Self::Internal(_) => Self::Internal(message),
        }
    }

    /// Caller mistakes rather than system faults; these are not logged as errors.
    pub fn is_recoverable_input(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_) | Self::Forbidden(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<tera::Error> for AppError {
    fn from(value: tera::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
