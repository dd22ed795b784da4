//! Socket seams for the two coordinator endpoints.
//!
//! The monitor loop talks to an [`EventSource`] obtained from a
//! [`MonitorConnector`], so tests can replace the network with an in-memory
//! channel. Command calls use a short-lived [`RequestSocket`] per request.
//!
//! Both sockets announce themselves by sending their identity as the first
//! message after connecting.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;
use zero_protocol::{Multipart, MultipartCodec, ProtocolError};

/// Maximum time allowed for establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the socket layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {address} timed out")]
    ConnectTimeout { address: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("connection closed by peer")]
    Closed,
}

impl TransportError {
    /// OS error code behind this failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Connect { source, .. } => source.raw_os_error(),
            Self::Protocol(ProtocolError::Io(source)) => source.raw_os_error(),
            _ => None,
        }
    }
}

// ============================================================================
// Monitor seam
// ============================================================================

/// A subscribed monitor connection.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn next_message(&mut self) -> Result<Option<Multipart>, TransportError>;
}

/// Opens monitor connections.
#[async_trait]
pub trait MonitorConnector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        identity: &[u8],
    ) -> Result<Box<dyn EventSource>, TransportError>;
}

/// TCP implementation of [`MonitorConnector`].
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    codec: MultipartCodec,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorConnector for TcpConnector {
    async fn connect(
        &self,
        address: &str,
        identity: &[u8],
    ) -> Result<Box<dyn EventSource>, TransportError> {
        let framed = open(address, identity, self.codec.clone()).await?;
        debug!(%address, "Monitor subscriber connected");
        Ok(Box::new(TcpSubscriber { framed }))
    }
}

/// A monitor subscription over TCP.
pub struct TcpSubscriber {
    framed: Framed<TcpStream, MultipartCodec>,
}

#[async_trait]
impl EventSource for TcpSubscriber {
    async fn next_message(&mut self) -> Result<Option<Multipart>, TransportError> {
        match self.framed.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Request socket
// ============================================================================

/// One-shot request connection to the management endpoint.
///
/// Every outgoing message gets the bound service key appended as its last
/// frame. Dropping the socket closes the connection.
pub struct RequestSocket {
    framed: Framed<TcpStream, MultipartCodec>,
    service_key: Bytes,
}

impl RequestSocket {
    pub async fn connect(
        address: &str,
        service_key: Bytes,
        identity: &[u8],
    ) -> Result<Self, TransportError> {
        let framed = open(address, identity, MultipartCodec::new()).await?;
        Ok(Self {
            framed,
            service_key,
        })
    }

    /// Sends `message` with the service-key frame appended.
    pub async fn send(&mut self, mut message: Multipart) -> Result<(), TransportError> {
        message.push(self.service_key.clone());
        self.framed.send(message).await?;
        Ok(())
    }

    /// Waits for one reply message.
    pub async fn receive(&mut self) -> Result<Multipart, TransportError> {
        match self.framed.next().await {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => Err(e.into()),
            None => Err(TransportError::Closed),
        }
    }
}

async fn open(
    address: &str,
    identity: &[u8],
    codec: MultipartCodec,
) -> Result<Framed<TcpStream, MultipartCodec>, TransportError> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            address: address.to_string(),
        })?
        .map_err(|source| TransportError::Connect {
            address: address.to_string(),
            source,
        })?;
    // Not critical if this fails
    let _ = stream.set_nodelay(true);

    let mut framed = Framed::new(stream, codec);
    framed.send(vec![Bytes::copy_from_slice(identity)]).await?;
    Ok(framed)
}
