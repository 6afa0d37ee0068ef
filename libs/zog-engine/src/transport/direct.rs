use std::net::SocketAddr;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;

use crate::config::DirectConfig;
use crate::error::{ConfigError, TransportError};
use crate::framing::LengthPrefixedCodec;
use crate::topic::{Message, Topic};

use super::TaskGuard;

type Inbox = mpsc::Receiver<Result<String, TransportError>>;
type Outbox = mpsc::Sender<Result<String, TransportError>>;

/// Fan-in TCP endpoint: any number of peers push length-prefixed frames, all
/// logged under one fixed topic.
///
/// The first socket fault from any peer (bad frame,
/// reset mid-frame, invalid UTF-8, accept error) is returned from
/// [`receive`](Self::receive) and is not retried.
pub struct DirectSocketTransport {
    addr: String,
    topic: Topic,
    codec: LengthPrefixedCodec,
    buffer: usize,
    inbox: Option<Inbox>,
    acceptor: Option<TaskGuard<()>>,
    local_addr: Option<SocketAddr>,
}

impl DirectSocketTransport {
    pub fn new(config: &DirectConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            addr: config.bind_addr(),
            topic: Topic::new(config.topic.clone())?,
            codec: LengthPrefixedCodec::new(&config.framing)?,
            buffer: config.buffer,
            inbox: None,
            acceptor: None,
            local_addr: None,
        })
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Bound address, once [`bind`](Self::bind) succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and start accepting peers. Binding twice is a no-op.
    pub async fn bind(&mut self) -> Result<SocketAddr, TransportError> {
        if let Some(addr) = self.local_addr {
            return Ok(addr);
        }

        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: self.addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let handle = tokio::spawn(accept_loop(listener, self.codec.clone(), tx));

        tracing::info!(addr = %local, topic = %self.topic, "direct socket listening");
        self.inbox = Some(rx);
        self.acceptor = Some(TaskGuard::new(handle));
        self.local_addr = Some(local);
        Ok(local)
    }

    /// Next non-empty message, `Ok(None)` once the acceptor is gone.
    pub async fn receive(&mut self) -> Result<Option<Message>, TransportError> {
        let inbox = self.inbox.as_mut().ok_or(TransportError::NotStarted)?;
        loop {
            match inbox.recv().await {
                Some(Ok(payload)) if payload.is_empty() => continue,
                Some(Ok(payload)) => return Ok(Some(Message::new(self.topic.clone(), payload))),
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }

    /// Stop accepting and drop every peer connection.
    pub fn close(&mut self) {
        self.inbox = None;
        self.acceptor = None;
    }
}

async fn accept_loop(listener: TcpListener, codec: LengthPrefixedCodec, tx: Outbox) {
    // Dropping the set aborts every connection reader with it.
    let mut peers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "direct socket peer connected");
                    peers.spawn(read_peer(stream, peer, codec.clone(), tx.clone()));
                }
                Err(e) => {
                    let _ = tx.send(Err(TransportError::Io(e))).await;
                    return;
                }
            },
            Some(_) = peers.join_next(), if !peers.is_empty() => {}
            _ = tx.closed() => return,
        }
    }
}

async fn read_peer(stream: TcpStream, peer: SocketAddr, codec: LengthPrefixedCodec, tx: Outbox) {
    let mut frames = FramedRead::new(stream, codec);
    while let Some(frame) = frames.next().await {
        let item = match frame {
            Ok(bytes) => String::from_utf8(bytes.to_vec()).map_err(TransportError::from),
            Err(e) => Err(TransportError::Frame(e)),
        };
        let fault = item.is_err();
        if tx.send(item).await.is_err() || fault {
            break;
        }
    }
    tracing::debug!(%peer, "direct socket peer disconnected");
}
