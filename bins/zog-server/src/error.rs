#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Engine(#[from] zog_engine::ConfigError),

    #[error("{0}")]
    Receiver(#[from] zog_engine::ReceiverError),

    #[error("{0}")]
    Transport(#[from] zog_engine::TransportError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
