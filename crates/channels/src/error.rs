pub type Result<T> = std::result::Result<T, Error>;

/// Why a connector could not make sense of a delivery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The webhook body does not have the shape the platform sends.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }
}
