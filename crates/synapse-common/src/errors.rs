#[derive(Debug, thiserror::Error)]
pub enum SynapseError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("api error: {0}")]
    Api(String),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}
