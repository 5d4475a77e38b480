//! Stream transport — a uniform view over TCP and Unix listeners and the
//! buffered per-connection session that travels through the worker queue.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use crate::config::ListenConfig;

/// The daemon's listen socket.
pub(crate) enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// Bind the endpoint named by the configuration.
    pub(crate) async fn bind(listen: &ListenConfig) -> io::Result<Self> {
        if !listen.tcp_info.is_empty() {
            let listener = TcpListener::bind(&listen.tcp_info).await?;
            tracing::info!("listening on tcp {}", listener.local_addr()?);
            Ok(Self::Tcp(listener))
        } else {
            let listener = UnixListener::bind(&listen.socket)?;
            tracing::info!("listening on unix socket {}", listen.socket);
            Ok(Self::Unix(listener))
        }
    }

    /// The bound TCP address, when listening on TCP.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Unix(_) => None,
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<Session> {
        let conn = match self {
            Self::Tcp(listener) => Conn::Tcp(listener.accept().await?.0),
            Self::Unix(listener) => Conn::Unix(listener.accept().await?.0),
        };
        Ok(Session::new(conn))
    }
}

/// One accepted client stream.
pub(crate) enum Conn {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// A client connection travelling through the worker queue.
///
/// The read buffer stays attached to the connection across requeues, so
/// bytes a client pipelined ahead of its turn are never lost. Exactly one
/// worker owns a session at any instant.
pub(crate) struct Session {
    io: BufReader<Conn>,
}

impl Session {
    pub(crate) fn new(conn: Conn) -> Self {
        Self {
            io: BufReader::new(conn),
        }
    }

    /// Read one newline-terminated line, including the terminator.
    ///
    /// `Ok(None)` means the peer closed the stream (either cleanly between
    /// requests or mid-line); `Err` is a genuine I/O failure.
    pub(crate) async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let read = self.io.read_until(b'\n', &mut line).await?;
        if read == 0 || !line.ends_with(b"\n") {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Write a response line to the peer.
    pub(crate) async fn respond(&mut self, response: &protocol::Response) -> io::Result<()> {
        response.write_to(self.io.get_mut()).await
    }
}
