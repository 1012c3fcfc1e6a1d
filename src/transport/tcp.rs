use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::protocol::Message;
use crate::transport::Transport;

/// Default timeout for network operations.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum frame size to prevent excessive memory allocation.
const MAX_MESSAGE_SIZE: u32 = 1_000_000;

/// Length-prefixed bincode frames over TCP.
///
/// Any I/O failure or timeout drops the stream, since the frame boundary can
/// no longer be trusted. Transports created with [`TcpTransport::connect`]
/// dial again on the next send; accepted ones stay closed.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: Option<String>,
    timeout_duration: Duration,
    max_message_size: u32,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self::with_timeout(stream, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(stream: TcpStream, timeout_duration: Duration) -> Self {
        Self {
            stream: Some(stream),
            peer: None,
            timeout_duration,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(addr: &str, timeout_duration: Duration) -> anyhow::Result<Self> {
        let mut transport = Self {
            stream: None,
            peer: Some(addr.to_string()),
            timeout_duration,
            max_message_size: MAX_MESSAGE_SIZE,
        };
        transport.writable_stream().await?;
        Ok(transport)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn writable_stream(&mut self) -> anyhow::Result<&mut TcpStream> {
        if self.stream.is_none() {
            let peer = self
                .peer
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Connection closed"))?;
            let stream = timeout(self.timeout_duration, TcpStream::connect(peer))
                .await
                .map_err(|_| anyhow::anyhow!("Connect timeout after {:?}", self.timeout_duration))??;
            debug!("[TcpTransport] connected to {}", peer);
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Connection closed"))
    }
}

fn map_write_err(e: std::io::Error) -> anyhow::Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::ConnectionReset {
        anyhow::anyhow!("Connection closed by peer")
    } else {
        anyhow::anyhow!("Write error: {}", e)
    }
}

fn map_read_err(e: std::io::Error) -> anyhow::Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => anyhow::anyhow!("Connection closed by peer"),
        std::io::ErrorKind::ConnectionReset => anyhow::anyhow!("Connection reset by peer"),
        _ => anyhow::anyhow!("Read error: {}", e),
    }
}

async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> anyhow::Result<()> {
    let len = (data.len() as u32).to_be_bytes();
    stream.write_all(&len).await.map_err(map_write_err)?;
    stream.write_all(data).await.map_err(map_write_err)?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream, max_message_size: u32) -> anyhow::Result<Message> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(map_read_err)?;
    let len = u32::from_be_bytes(len_buf);
    if len > max_message_size {
        return Err(anyhow::anyhow!(
            "Message too large: {} bytes (max: {})",
            len,
            max_message_size
        ));
    }
    if len == 0 {
        return Err(anyhow::anyhow!("Invalid message length: 0"));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await.map_err(map_read_err)?;
    bincode::deserialize(&buf).map_err(|e| anyhow::anyhow!("Deserialization error: {}", e))
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()> {
        let data =
            bincode::serialize(&msg).map_err(|e| anyhow::anyhow!("Serialization error: {}", e))?;
        if data.len() as u64 > self.max_message_size as u64 {
            return Err(anyhow::anyhow!(
                "Message too large: {} bytes (max: {})",
                data.len(),
                self.max_message_size
            ));
        }
        let limit = self.timeout_duration;
        let stream = self.writable_stream().await?;
        let result = match timeout(limit, write_frame(stream, &data)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("Send timeout after {:?}", limit)),
        };
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    async fn recv(&mut self) -> anyhow::Result<Message> {
        let limit = self.timeout_duration;
        let max = self.max_message_size;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Connection closed"))?;
        let result = match timeout(limit, read_frame(stream, max)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("Receive timeout after {:?}", limit)),
        };
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    fn reset(&mut self) {
        self.stream = None;
    }
}
