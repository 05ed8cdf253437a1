//! Build engine endpoints and live connections to them.

use crate::error::{KilnError, Result};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Address of a build engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    /// `unix:///path/to/socket` (a bare absolute path is accepted too)
    Unix(PathBuf),
    /// `tcp://host:port`
    Tcp(String),
}

impl EngineEndpoint {
    /// Open a connection to the engine.
    pub async fn connect(&self) -> io::Result<EngineConnection> {
        let stream = match self {
            #[cfg(unix)]
            Self::Unix(path) => EngineStream::Unix(tokio::net::UnixStream::connect(path).await?),
            #[cfg(not(unix))]
            Self::Unix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not supported on this platform",
                ))
            }
            Self::Tcp(addr) => EngineStream::Tcp(TcpStream::connect(addr.as_str()).await?),
        };
        Ok(EngineConnection { endpoint: self.clone(), stream })
    }

    /// The address part of the endpoint, without scheme.
    pub fn address(&self) -> String {
        match self {
            Self::Unix(path) => path.display().to_string(),
            Self::Tcp(addr) => addr.clone(),
        }
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

impl FromStr for EngineEndpoint {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| KilnError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    return Ok(Self::Tcp(addr.to_string()));
                }
                _ => return Err(invalid("expected tcp://host:port")),
            }
        }
        if s.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }
        Err(invalid("unsupported scheme, expected unix:// or tcp://"))
    }
}

/// A live connection to a build engine.
#[derive(Debug)]
pub struct EngineConnection {
    endpoint: EngineEndpoint,
    stream: EngineStream,
}

impl EngineConnection {
    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    pub fn into_stream(self) -> EngineStream {
        self.stream
    }
}

/// Transport underneath an [`EngineConnection`].
#[derive(Debug)]
pub enum EngineStream {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for EngineConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for EngineConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

impl AsyncRead for EngineStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for EngineStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
