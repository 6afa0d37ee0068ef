use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use redis::aio::PubSubSink;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tokio::time::timeout;

use crate::config::{BusConfig, ConsumptionStrategy};
use crate::error::{ConfigError, TransportError};
use crate::topic::{Message, Topic};

// ═══════════════════════════════════════════════════════════════
//  BusItem: one raw delivery, checked before routing
// ═══════════════════════════════════════════════════════════════

/// Frame type as reported by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Message,
    PMessage,
    /// Subscribe confirmations and anything else that is not a publication.
    Control(String),
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Message => f.write_str("message"),
            ItemKind::PMessage => f.write_str("pmessage"),
            ItemKind::Control(kind) => f.write_str(kind),
        }
    }
}

/// An item as it came off the subscription, before any shape check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusItem {
    pub kind: ItemKind,
    pub channel: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl BusItem {
    pub fn new(kind: ItemKind, channel: Option<Vec<u8>>, payload: Option<Vec<u8>>) -> Self {
        Self {
            kind,
            channel,
            payload,
        }
    }

    /// A well-formed pattern publication.
    pub fn publication(channel: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(ItemKind::PMessage, Some(channel.into()), Some(payload.into()))
    }

    /// Accept the item only if it is a publication with a non-empty UTF-8
    /// channel and a UTF-8 payload.
    pub fn into_message(self) -> Result<Message, RoutingDefect> {
        let reason = match (&self.kind, self.channel.as_deref(), self.payload.as_deref()) {
            (ItemKind::Control(_), _, _) => DefectReason::NotAPublication,
            (_, None | Some([]), _) => DefectReason::MissingChannel,
            (_, _, None) => DefectReason::MissingPayload,
            (_, Some(channel), Some(payload)) => {
                match (std::str::from_utf8(channel), std::str::from_utf8(payload)) {
                    (Err(_), _) => DefectReason::ChannelNotText,
                    (_, Err(_)) => DefectReason::PayloadNotText,
                    (Ok(channel), Ok(payload)) => match Topic::new(channel) {
                        Ok(topic) => return Ok(Message::new(topic, payload)),
                        Err(_) => DefectReason::MissingChannel,
                    },
                }
            }
        };
        Err(RoutingDefect::new(self, reason))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectReason {
    NotAPublication,
    MissingChannel,
    MissingPayload,
    ChannelNotText,
    PayloadNotText,
}

impl fmt::Display for DefectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefectReason::NotAPublication => "not a publication",
            DefectReason::MissingChannel => "missing channel",
            DefectReason::MissingPayload => "missing payload",
            DefectReason::ChannelNotText => "channel is not utf-8",
            DefectReason::PayloadNotText => "payload is not utf-8",
        })
    }
}

/// A bus item that failed the shape check. Logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDefect {
    pub kind: ItemKind,
    /// Channel as lossy text, empty if absent.
    pub channel: String,
    /// Payload as lossy text, empty if absent.
    pub payload: String,
    pub reason: DefectReason,
}

impl RoutingDefect {
    fn new(item: BusItem, reason: DefectReason) -> Self {
        let lossy = |bytes: Option<Vec<u8>>| {
            bytes
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default()
        };
        Self {
            kind: item.kind,
            channel: lossy(item.channel),
            payload: lossy(item.payload),
            reason,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  BusClient: the pub/sub connection seam
// ═══════════════════════════════════════════════════════════════

pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Connection to a pub/sub bus, as the receive loops need it.
pub trait BusClient: Send + 'static {
    /// Connect and PSUBSCRIBE to every pattern, in order.
    fn subscribe<'a>(&'a mut self, patterns: &'a [String]) -> BusFuture<'a, ()>;

    /// Next pending item without waiting, `Ok(None)` if there is none.
    fn poll_item(&mut self) -> Result<Option<BusItem>, TransportError>;

    /// Wait for the next item.
    fn next_item(&mut self) -> BusFuture<'_, BusItem>;

    /// Liveness probe over the subscribed connection.
    fn ping(&mut self) -> BusFuture<'_, ()>;

    /// Drop the connection. Best effort, never fails.
    fn close(&mut self);
}

/// Pub/sub side of a receiver: the client plus its validated config.
pub struct BusTransport<B: BusClient = RedisBus> {
    config: BusConfig,
    client: B,
}

impl BusTransport<RedisBus> {
    pub fn new(config: BusConfig) -> Result<Self, ConfigError> {
        let client = RedisBus::new(&config)?;
        Self::with_client(config, client)
    }
}

impl<B: BusClient> BusTransport<B> {
    pub fn with_client(config: BusConfig, client: B) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn strategy(&self) -> ConsumptionStrategy {
        self.config.strategy
    }

    pub(crate) fn into_parts(self) -> (BusConfig, B) {
        (self.config, self.client)
    }
}

// ═══════════════════════════════════════════════════════════════
//  RedisBus
// ═══════════════════════════════════════════════════════════════

pub(crate) fn connection_info(config: &BusConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.db.unwrap_or(0),
            password: config.password.clone(),
            ..Default::default()
        },
    }
}

/// Redis pub/sub client.
///
/// Everything goes over one pub/sub connection. The async client in redis 0.27
/// cannot send PING on a subscribed connection (the reply would be read as a
/// malformed push and drop the connection), so the liveness check re-issues
/// PSUBSCRIBE for the first pattern instead. The server treats that as a no-op
/// but still answers on the same socket. The socket also has TCP keepalive,
/// from redis' default `keep-alive` feature.
pub struct RedisBus {
    client: redis::Client,
    target: String,
    connect_timeout: Duration,
    messages: Option<BoxStream<'static, redis::Msg>>,
    control: Option<(PubSubSink, String)>,
}

impl RedisBus {
    pub fn new(config: &BusConfig) -> Result<Self, ConfigError> {
        let client = redis::Client::open(connection_info(config))
            .map_err(|e| ConfigError::Bus(e.to_string()))?;
        Ok(Self {
            client,
            target: config.target(),
            connect_timeout: config.probe_timeout(),
            messages: None,
            control: None,
        })
    }

    fn connect_err(&self, detail: impl fmt::Display) -> TransportError {
        TransportError::Connect {
            addr: self.target.clone(),
            detail: detail.to_string(),
        }
    }
}

fn item_from_msg(msg: &redis::Msg) -> BusItem {
    let kind = if msg.from_pattern() {
        ItemKind::PMessage
    } else {
        ItemKind::Message
    };
    BusItem::new(
        kind,
        msg.get_channel::<Vec<u8>>().ok(),
        msg.get_payload::<Vec<u8>>().ok(),
    )
}

impl BusClient for RedisBus {
    fn subscribe<'a>(&'a mut self, patterns: &'a [String]) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let mut pubsub = match timeout(self.connect_timeout, self.client.get_async_pubsub()).await {
                Ok(Ok(pubsub)) => pubsub,
                Ok(Err(e)) => return Err(self.connect_err(e)),
                Err(_) => return Err(self.connect_err(format!("timed out after {:?}", self.connect_timeout))),
            };
            for pattern in patterns {
                pubsub.psubscribe(pattern).await?;
                tracing::info!(bus = %self.target, pattern = %pattern, "subscribed");
            }
            let (sink, stream) = pubsub.split();
            self.messages = Some(stream.boxed());
            self.control = patterns.first().map(|pattern| (sink, pattern.clone()));
            Ok(())
        })
    }

    fn poll_item(&mut self) -> Result<Option<BusItem>, TransportError> {
        let messages = self.messages.as_mut().ok_or(TransportError::NotStarted)?;
        match messages.next().now_or_never() {
            None => Ok(None),
            Some(Some(msg)) => Ok(Some(item_from_msg(&msg))),
            Some(None) => Err(TransportError::Closed),
        }
    }

    fn next_item(&mut self) -> BusFuture<'_, BusItem> {
        Box::pin(async move {
            let messages = self.messages.as_mut().ok_or(TransportError::NotStarted)?;
            match messages.next().await {
                Some(msg) => Ok(item_from_msg(&msg)),
                None => Err(TransportError::Closed),
            }
        })
    }

    fn ping(&mut self) -> BusFuture<'_, ()> {
        Box::pin(async move {
            let (sink, pattern) = self.control.as_mut().ok_or(TransportError::NotStarted)?;
            sink.psubscribe(pattern.as_str()).await?;
            Ok(())
        })
    }

    fn close(&mut self) {
        self.control = None;
        self.messages = None;
        tracing::debug!(bus = %self.target, "bus connection closed");
    }
}
