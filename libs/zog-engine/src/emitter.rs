//! Producer side: ship lines to a running receiver.

use futures::SinkExt;
use redis::{AsyncCommands, AsyncConnectionConfig};
use redis::aio::MultiplexedConnection;
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;

use crate::config::{BusConfig, FramingConfig};
use crate::error::{ConfigError, TransportError};
use crate::framing::LengthPrefixedCodec;
use crate::topic::Topic;
use crate::transport::connection_info;

/// Pushes length-prefixed frames to a direct socket receiver.
pub struct SocketEmitter {
    frames: FramedWrite<TcpStream, LengthPrefixedCodec>,
}

impl SocketEmitter {
    pub async fn connect(addr: &str, framing: &FramingConfig) -> Result<Self, TransportError> {
        let codec = LengthPrefixedCodec::new(framing).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            detail: e.to_string(),
        })?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                detail: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        Ok(Self {
            frames: FramedWrite::new(stream, codec),
        })
    }

    /// Send one line as one frame and flush it.
    pub async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.frames.send(line.as_bytes()).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), TransportError> {
        SinkExt::<&[u8]>::close(&mut self.frames).await?;
        Ok(())
    }
}

/// Publishes lines to one bus channel.
pub struct BusEmitter {
    conn: MultiplexedConnection,
    channel: Topic,
    target: String,
}

impl BusEmitter {
    /// Connect using the host, port, password and db of `config`. Its
    /// channel patterns are ignored.
    pub async fn connect(config: &BusConfig, channel: &str) -> Result<Self, TransportError> {
        let channel = Topic::new(channel).map_err(|e| TransportError::Connect {
            addr: config.target(),
            detail: ConfigError::from(e).to_string(),
        })?;
        let connect_err = |e: redis::RedisError| TransportError::Connect {
            addr: config.target(),
            detail: e.to_string(),
        };
        let client = redis::Client::open(connection_info(config)).map_err(connect_err)?;
        let timeouts = AsyncConnectionConfig::new()
            .set_connection_timeout(config.probe_timeout())
            .set_response_timeout(config.probe_timeout());
        let conn = client
            .get_multiplexed_async_connection_with_config(&timeouts)
            .await
            .map_err(connect_err)?;
        tracing::debug!(bus = %config.target(), channel = %channel, "bus emitter connected");
        Ok(Self {
            conn,
            channel,
            target: config.target(),
        })
    }

    pub fn channel(&self) -> &Topic {
        &self.channel
    }

    /// Publish one line. Returns how many subscribers received it.
    pub async fn publish(&mut self, line: &str) -> Result<usize, TransportError> {
        let receivers: usize = self.conn.publish(self.channel.as_str(), line).await?;
        tracing::trace!(bus = %self.target, channel = %self.channel, receivers, "published");
        Ok(receivers)
    }
}
