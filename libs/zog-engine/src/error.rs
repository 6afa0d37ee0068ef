use std::path::PathBuf;

use crate::framing::FrameError;

#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("topic name is empty")]
    Empty,
}

/// Invalid receiver configuration. Detected before the loop starts, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("address '{addr}': {detail}")]
    Address { addr: String, detail: String },

    #[error("pattern '{pattern}': {detail}")]
    Pattern { pattern: String, detail: &'static str },

    #[error("no channels configured")]
    NoChannels,

    #[error("framing: {0}")]
    Framing(String),

    #[error("unknown consumption strategy '{0}'")]
    Strategy(String),

    #[error("topic: {0}")]
    Topic(#[from] TopicError),

    #[error("bus client: {0}")]
    Bus(String),
}

/// Fault on the wire. Terminal for the receiver that hit it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect {addr}: {detail}")]
    Connect { addr: String, detail: String },

    #[error("transport not started")]
    NotStarted,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    #[error("payload is not valid utf-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("bus: {0}")]
    Bus(#[from] redis::RedisError),

    #[error("no reply within {0:?}")]
    Unresponsive(std::time::Duration),

    #[error("transport closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log dir {}: {source}", path.display())]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal result of [`crate::Receiver::start`].
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("background worker: {0}")]
    Worker(String),

    #[error("interrupted")]
    Interrupted,
}
