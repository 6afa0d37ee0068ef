mod bus;
mod direct;

use tokio::task::{JoinError, JoinHandle};

use crate::config::TransportConfig;
use crate::error::ConfigError;

pub use bus::{BusClient, BusFuture, BusItem, BusTransport, DefectReason, ItemKind, RedisBus, RoutingDefect};
pub(crate) use bus::connection_info;
pub use direct::DirectSocketTransport;

/// Wire mechanism of a receiver. The set is closed: a direct socket or a bus.
///
/// `B` is the bus client; production code uses [`RedisBus`].
pub enum Transport<B: BusClient = RedisBus> {
    Direct(DirectSocketTransport),
    Bus(BusTransport<B>),
}

impl Transport<RedisBus> {
    pub fn from_config(config: &TransportConfig) -> Result<Self, ConfigError> {
        Ok(match config {
            TransportConfig::Direct(c) => Transport::Direct(DirectSocketTransport::new(c)?),
            TransportConfig::Bus(c) => Transport::Bus(BusTransport::new(c.clone())?),
        })
    }
}

impl<B: BusClient> Transport<B> {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Direct(_) => "direct",
            Transport::Bus(_) => "bus",
        }
    }
}

impl<B: BusClient> From<DirectSocketTransport> for Transport<B> {
    fn from(t: DirectSocketTransport) -> Self {
        Transport::Direct(t)
    }
}

impl<B: BusClient> From<BusTransport<B>> for Transport<B> {
    fn from(t: BusTransport<B>) -> Self {
        Transport::Bus(t)
    }
}

/// Aborts the task when dropped, so a cancelled receiver takes its
/// spawned work down with it.
pub(crate) struct TaskGuard<T>(JoinHandle<T>);

impl<T> TaskGuard<T> {
    pub(crate) fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }

    pub(crate) async fn join(&mut self) -> Result<T, JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
