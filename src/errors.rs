use thiserror::Error;

/// Errors that can occur during identity reconciliation.
#[derive(Error, Debug)]
pub enum ContactGraphError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("corrupt cluster: no primary contact among {contact_ids:?}")]
    CorruptCluster { contact_ids: Vec<i64> },

    #[error("contact not found: {id}")]
    NotFound { id: i64 },

    #[error("database error: {message} (operation: {operation})")]
    Database { message: String, operation: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContactGraphError {
    /// Shorthand for building a [`ContactGraphError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by the caller's input rather
    /// than by the store or the graph itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}

/// Convenience alias for results using `ContactGraphError`.
pub type Result<T> = std::result::Result<T, ContactGraphError>;
