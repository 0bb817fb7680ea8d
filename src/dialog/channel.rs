//! Transports that carry the operator's reply back to a waiting case.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode, utf8_percent_encode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::DialogError;

/// Upper bound on a single reply payload.
pub const MAX_REPLY_BYTES: usize = 1024;

/// Abstraction over the rendezvous transport.
/// Real implementation: `TcpResponseChannel`. Test double: `MemoryChannel`.
#[async_trait]
pub trait ResponseChannel: Send {
    /// Wait for one reply, honouring cancellation.
    async fn receive(&mut self, cancel: &CancellationToken) -> Result<String, DialogError>;
}

/// Opens a fresh channel for every blocking request.
pub trait ChannelFactory: Send + Sync {
    fn open(&self) -> Box<dyn ResponseChannel>;
}

/// One-shot TCP listener on the configured rendezvous address.
///
/// The listener is bound lazily on the first `receive` unless
/// [`TcpResponseChannel::bind`] was called, and is closed once a reply
/// arrives.
pub struct TcpResponseChannel {
    addr: String,
    poll_interval: Duration,
    listener: Option<TcpListener>,
}

impl TcpResponseChannel {
    pub fn new(addr: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            addr: addr.into(),
            poll_interval,
            listener: None,
        }
    }

    /// Bind the listener now and return the bound address.
    pub async fn bind(&mut self) -> Result<SocketAddr, DialogError> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => self.listen().await?,
        };
        let addr = listener.local_addr().map_err(DialogError::Io);
        self.listener = Some(listener);
        addr
    }

    async fn listen(&self) -> Result<TcpListener, DialogError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| DialogError::Bind {
                addr: self.addr.clone(),
                source,
            })?;
        info!(addr = %self.addr, "waiting for operator reply");
        Ok(listener)
    }
}

#[async_trait]
impl ResponseChannel for TcpResponseChannel {
    async fn receive(&mut self, cancel: &CancellationToken) -> Result<String, DialogError> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => self.listen().await?,
        };

        // Poll so that an interrupt is observed within one interval.
        let (mut stream, peer) = loop {
            if cancel.is_cancelled() {
                return Err(DialogError::Interrupted);
            }
            match tokio::time::timeout(self.poll_interval, listener.accept()).await {
                Ok(accepted) => break accepted.map_err(DialogError::Io)?,
                Err(_elapsed) => continue,
            }
        };
        drop(listener);
        debug!(%peer, "operator reply connection accepted");

        let mut buf = vec![0u8; MAX_REPLY_BYTES];
        let n = tokio::select! {
            read = stream.read(&mut buf) => read.map_err(DialogError::Io)?,
            _ = cancel.cancelled() => return Err(DialogError::Interrupted),
        };
        decode_reply(&buf[..n])
    }
}

/// Factory for [`TcpResponseChannel`]s on a fixed address.
#[derive(Debug, Clone)]
pub struct TcpChannelFactory {
    addr: String,
    poll_interval: Duration,
}

impl TcpChannelFactory {
    pub fn new(host: &str, port: u16, poll_interval: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            poll_interval,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl ChannelFactory for TcpChannelFactory {
    fn open(&self) -> Box<dyn ResponseChannel> {
        Box::new(TcpResponseChannel::new(self.addr.clone(), self.poll_interval))
    }
}

/// Percent-decode a raw reply payload into text.
pub fn decode_reply(raw: &[u8]) -> Result<String, DialogError> {
    percent_decode(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| DialogError::InvalidEncoding)
}

/// Percent-encode an answer the way the panel sends it.
pub fn encode_reply(answer: &str) -> String {
    utf8_percent_encode(answer, NON_ALPHANUMERIC).to_string()
}

/// Deliver one answer to a waiting rendezvous listener at `addr`.
pub async fn send_reply(addr: &str, answer: &str) -> Result<(), DialogError> {
    let payload = encode_reply(answer);
    if payload.len() > MAX_REPLY_BYTES {
        return Err(DialogError::WidgetConfig(format!(
            "reply is {} bytes encoded, limit is {}",
            payload.len(),
            MAX_REPLY_BYTES
        )));
    }
    let mut stream = TcpStream::connect(addr).await.map_err(DialogError::Io)?;
    stream
        .write_all(payload.as_bytes())
        .await
        .map_err(DialogError::Io)?;
    stream.shutdown().await.map_err(DialogError::Io)?;
    debug!(%addr, bytes = payload.len(), "operator reply sent");
    Ok(())
}

/// In-process channel fed by a [`MemoryReplier`].
pub struct MemoryChannel {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Sending side of a [`MemoryChannel`].
#[derive(Clone)]
pub struct MemoryReplier {
    tx: mpsc::UnboundedSender<String>,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryReplier) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryChannel { rx }, MemoryReplier { tx })
    }
}

impl MemoryReplier {
    /// Queue a reply. Returns false when the channel is gone.
    pub fn reply(&self, reply: impl Into<String>) -> bool {
        self.tx.send(reply.into()).is_ok()
    }
}

#[async_trait]
impl ResponseChannel for MemoryChannel {
    async fn receive(&mut self, cancel: &CancellationToken) -> Result<String, DialogError> {
        tokio::select! {
            reply = self.rx.recv() => reply.ok_or(DialogError::Interrupted),
            _ = cancel.cancelled() => Err(DialogError::Interrupted),
        }
    }
}

/// Factory handing out channels that share one reply queue.
///
/// Replies queued before a request is opened are delivered to it in order.
/// Requests wait until a reply arrives or the session is cancelled.
pub struct MemoryChannelFactory {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    tx: mpsc::UnboundedSender<String>,
}

impl MemoryChannelFactory {
    pub fn new() -> (Self, MemoryReplier) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = Self {
            rx: Arc::new(Mutex::new(rx)),
            tx: tx.clone(),
        };
        (factory, MemoryReplier { tx })
    }

    pub fn replier(&self) -> MemoryReplier {
        MemoryReplier {
            tx: self.tx.clone(),
        }
    }
}

struct SharedMemoryChannel {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait]
impl ResponseChannel for SharedMemoryChannel {
    async fn receive(&mut self, cancel: &CancellationToken) -> Result<String, DialogError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            reply = rx.recv() => reply.ok_or(DialogError::Interrupted),
            _ = cancel.cancelled() => Err(DialogError::Interrupted),
        }
    }
}

impl ChannelFactory for MemoryChannelFactory {
    fn open(&self) -> Box<dyn ResponseChannel> {
        Box::new(SharedMemoryChannel {
            rx: Arc::clone(&self.rx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reply_percent_encoding() {
        assert_eq!(decode_reply(b"hello%20world").unwrap(), "hello world");
        assert_eq!(
            decode_reply(b"%7B%22one%22%2C%22two%22%7D").unwrap(),
            r#"{"one","two"}"#
        );
        assert!(matches!(
            decode_reply(b"%FF%FE"),
            Err(DialogError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_encode_reply_round_trips_through_decode() {
        let answer = r#"{"one","two"}"#;
        let encoded = encode_reply(answer);
        assert!(!encoded.contains('"'));
        assert_eq!(decode_reply(encoded.as_bytes()).unwrap(), answer);
    }

    #[tokio::test]
    async fn test_send_reply_reaches_listener() {
        let mut channel = TcpResponseChannel::new("127.0.0.1:0", Duration::from_millis(20));
        let addr = channel.bind().await.unwrap().to_string();
        let sender = tokio::spawn(async move { send_reply(&addr, "pass 1").await });

        let reply = channel.receive(&CancellationToken::new()).await.unwrap();
        sender.await.unwrap().unwrap();
        assert_eq!(reply, "pass 1");
    }

    #[tokio::test]
    async fn test_send_reply_rejects_oversized_answer() {
        let answer = "x".repeat(MAX_REPLY_BYTES + 1);
        let err = send_reply("127.0.0.1:1", &answer).await.unwrap_err();
        assert!(matches!(err, DialogError::WidgetConfig(_)));
    }

    #[tokio::test]
    async fn test_tcp_channel_receives_one_reply() {
        let mut channel = TcpResponseChannel::new("127.0.0.1:0", Duration::from_millis(20));
        let addr = channel.bind().await.unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"42%2E5").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let cancel = CancellationToken::new();
        let reply = channel.receive(&cancel).await.unwrap();
        client.await.unwrap();
        assert_eq!(reply, "42.5");
    }

    #[tokio::test]
    async fn test_tcp_channel_observes_cancellation() {
        let mut channel = TcpResponseChannel::new("127.0.0.1:0", Duration::from_millis(10));
        channel.bind().await.unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        assert!(matches!(
            channel.receive(&cancel).await,
            Err(DialogError::Interrupted)
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let mut channel = TcpResponseChannel::new(addr.clone(), Duration::from_millis(10));
        match channel.bind().await {
            Err(DialogError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_memory_factory_delivers_in_order() {
        let (factory, replier) = MemoryChannelFactory::new();
        assert!(replier.reply("first"));
        assert!(replier.reply("second"));
        let cancel = CancellationToken::new();
        assert_eq!(factory.open().receive(&cancel).await.unwrap(), "first");
        assert_eq!(factory.open().receive(&cancel).await.unwrap(), "second");
    }
}
