// crates/tictactwo-client/src/transport.rs

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tictactwo_protocol::bus::{decode_frame, encode_frame, frame_len, FRAME_HEADER_LEN};
use tictactwo_protocol::{ClientFrame, ConnectionPurpose, ServerFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

/// Who is connecting and why; sent as the `connect` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub identity: String,
    pub purpose: ConnectionPurpose,
}

/// A bidirectional frame stream to the broker.
///
/// `recv` must be cancel safe: the connection driver polls it inside
/// `tokio::select!`.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: ClientFrame) -> Result<()>;

    /// Next frame, or `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<ServerFrame>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens transports. One call per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}

/// Send `connect` and wait for `connected`, skipping heartbeats.
pub async fn handshake(transport: &mut dyn Transport, hello: &Handshake) -> Result<String> {
    transport
        .send(ClientFrame::Connect {
            identity: hello.identity.clone(),
            purpose: hello.purpose,
        })
        .await?;

    loop {
        match transport.recv().await {
            Some(Ok(ServerFrame::Connected { session })) => return Ok(session),
            Some(Ok(ServerFrame::Heartbeat)) => continue,
            Some(Ok(ServerFrame::Error { message })) => return Err(ClientError::Broker(message)),
            Some(Ok(other)) => {
                debug!("Ignoring {:?} before handshake completed", other);
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(ClientError::Transport(
                    "closed during handshake".to_string(),
                ))
            }
        }
    }
}

/// Connects to the broker over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    server_addr: String,
}

impl TcpConnector {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let stream = TcpStream::connect(&self.server_addr).await?;
        stream.set_nodelay(true)?;
        debug!("TCP connection open to {}", self.server_addr);
        Ok(Box::new(TcpTransport::new(stream)))
    }
}

/// Length-prefixed JSON frames over a TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    read_buffer: BytesMut,
    write_buffer: Vec<u8>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(65536),
            write_buffer: Vec::with_capacity(4096),
        }
    }

    /// Pop one complete frame off the read buffer, if present.
    fn parse_frame(&mut self) -> Result<Option<ServerFrame>> {
        if self.read_buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let header = [
            self.read_buffer[0],
            self.read_buffer[1],
            self.read_buffer[2],
            self.read_buffer[3],
        ];
        let len = frame_len(header)?;
        if self.read_buffer.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        self.read_buffer.advance(FRAME_HEADER_LEN);
        let payload = self.read_buffer.split_to(len);
        let frame = decode_frame(&payload)?;
        trace!("Received frame: {:?}", frame);
        Ok(Some(frame))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: ClientFrame) -> Result<()> {
        self.write_buffer.clear();
        encode_frame(&frame, &mut self.write_buffer)?;
        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;
        trace!("Sent frame: {:?}", frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerFrame>> {
        loop {
            match self.parse_frame() {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }

            match self.stream.read_buf(&mut self.read_buffer).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_transport_frames_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut header = [0u8; FRAME_HEADER_LEN];
            socket.read_exact(&mut header).await.unwrap();
            let mut payload = vec![0u8; frame_len(header).unwrap()];
            socket.read_exact(&mut payload).await.unwrap();
            let hello: ClientFrame = decode_frame(&payload).unwrap();

            // Two frames in one write exercise partial buffering.
            let mut out = Vec::new();
            encode_frame(&ServerFrame::Heartbeat, &mut out).unwrap();
            encode_frame(
                &ServerFrame::Connected {
                    session: "s-1".into(),
                },
                &mut out,
            )
            .unwrap();
            socket.write_all(&out).await.unwrap();
            hello
        });

        let connector = TcpConnector::new(addr.to_string());
        let mut transport = connector.connect().await.unwrap();
        let hello = Handshake {
            identity: "alice".into(),
            purpose: ConnectionPurpose::Player,
        };
        let session = handshake(transport.as_mut(), &hello).await.unwrap();
        assert_eq!(session, "s-1");

        let seen = broker.await.unwrap();
        assert_eq!(
            seen,
            ClientFrame::Connect {
                identity: "alice".into(),
                purpose: ConnectionPurpose::Player
            }
        );

        // Broker hung up.
        assert!(transport.recv().await.is_none());
    }
}
