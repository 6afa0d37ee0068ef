//! Per-topic log aggregation.
//!
//! A [`Receiver`] pulls messages from a [`Transport`] (a direct TCP socket or
//! a Redis pub/sub bus), and appends each one to `<logpath>/<topic>.log`.

pub mod config;
pub mod emitter;
pub mod error;
pub mod framing;
pub mod health;
pub mod oplog;
pub mod receiver;
pub mod router;
pub mod sink;
pub mod topic;
pub mod transport;

pub use config::{Address, BusConfig, ByteOrder, ConsumptionStrategy, DirectConfig, FramingConfig, TransportConfig};
pub use emitter::{BusEmitter, SocketEmitter};
pub use error::{ConfigError, ReceiverError, SinkError, TopicError, TransportError};
pub use health::HealthMonitor;
pub use oplog::{OperationalLogger, ReceiverStats};
pub use receiver::Receiver;
pub use router::Router;
pub use sink::{LogHandle, LogSink};
pub use topic::{Message, Topic};
pub use transport::{BusClient, BusItem, BusTransport, DirectSocketTransport, RedisBus, Transport};
