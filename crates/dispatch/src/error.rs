#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `request_handler` was called before `on_event`.
    #[error("no event handler registered; call on_event before request_handler")]
    MissingHandler,

    #[error("webhook request body is missing")]
    MissingBody,

    #[error(transparent)]
    Session(#[from] parley_sessions::Error),

    #[error(transparent)]
    Channel(#[from] parley_channels::Error),

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
