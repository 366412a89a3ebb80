//! Transport-agnostic wrappers around the monocoque ZeroMQ sockets.
//!
//! A node's reply and control endpoints may bind to either a TCP address or
//! a Unix IPC path (`ipc://...`), so every socket here is a thin enum over
//! the TCP- and IPC-flavored `monocoque` socket types. The publish/subscribe
//! fabric is TCP-only, matching `monocoque::zmq::PubSocket`'s listener-based
//! design.

use bytes::Bytes;
use compio::net::{TcpListener, TcpStream};
use monocoque::zmq::{PubSocket, RepSocket, ReqSocket, SubSocket};
use std::io;

#[cfg(unix)]
use compio::net::{UnixListener, UnixStream};

fn strip_ipc(addr: &str) -> Option<&str> {
    addr.strip_prefix("ipc://")
}

/// A dialed connection to a peer's reply endpoint, serialized per the REQ
/// state machine: callers must `recv` before the next `send`.
pub enum ReqClient {
    Tcp(ReqSocket<TcpStream>),
    #[cfg(unix)]
    Ipc(ReqSocket<UnixStream>),
}

impl ReqClient {
    pub async fn connect(addr: &str) -> io::Result<Self> {
        #[cfg(unix)]
        if let Some(path) = strip_ipc(addr) {
            return Ok(Self::Ipc(ReqSocket::connect_ipc(path).await?));
        }
        Ok(Self::Tcp(ReqSocket::connect(addr).await?))
    }

    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        match self {
            Self::Tcp(sock) => sock.send(msg).await,
            #[cfg(unix)]
            Self::Ipc(sock) => sock.send(msg).await,
        }
    }

    pub async fn recv(&mut self) -> Option<Vec<Bytes>> {
        match self {
            Self::Tcp(sock) => sock.recv().await,
            #[cfg(unix)]
            Self::Ipc(sock) => sock.recv().await,
        }
    }

    /// Sends `request` and awaits the single reply frame set. `None` if the
    /// peer closed the connection.
    pub async fn request(&mut self, request: Vec<Bytes>) -> io::Result<Option<Vec<Bytes>>> {
        self.send(request).await?;
        Ok(self.recv().await)
    }
}

/// A single accepted connection on the reply endpoint.
pub enum RepConn {
    Tcp(RepSocket<TcpStream>),
    #[cfg(unix)]
    Ipc(RepSocket<UnixStream>),
}

impl RepConn {
    pub async fn recv(&mut self) -> Option<Vec<Bytes>> {
        match self {
            Self::Tcp(sock) => sock.recv().await,
            #[cfg(unix)]
            Self::Ipc(sock) => sock.recv().await,
        }
    }

    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        match self {
            Self::Tcp(sock) => sock.send(msg).await,
            #[cfg(unix)]
            Self::Ipc(sock) => sock.send(msg).await,
        }
    }
}

/// A bound listener for the reply or control endpoint, accepting one
/// [`RepConn`] per incoming connection.
pub enum RepListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc(UnixListener),
}

impl RepListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        #[cfg(unix)]
        if let Some(path) = strip_ipc(addr) {
            return Ok(Self::Ipc(monocoque_core::ipc::bind(path).await?));
        }
        let raw = addr.strip_prefix("tcp://").unwrap_or(addr);
        Ok(Self::Tcp(TcpListener::bind(raw).await?))
    }

    pub async fn accept(&self) -> io::Result<RepConn> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(RepConn::Tcp(RepSocket::from_tcp(stream).await?))
            }
            #[cfg(unix)]
            Self::Ipc(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(RepConn::Ipc(RepSocket::from_unix_stream(stream).await?))
            }
        }
    }
}

/// The publish endpoint: binds a TCP listener and broadcasts multipart
/// frames to every connected subscriber.
pub struct Publisher {
    socket: PubSocket,
}

impl Publisher {
    pub async fn bind(addr: &str) -> io::Result<(Self, String)> {
        let raw = addr.strip_prefix("tcp://").unwrap_or(addr);
        let socket = PubSocket::bind(raw).await?;
        let local_addr = socket.local_addr()?;
        Ok((Self { socket }, format!("tcp://{local_addr}")))
    }

    /// Accepts a single subscriber connection. Callers loop this, typically
    /// re-locking a shared `Publisher` between iterations so `send` can
    /// interleave.
    pub async fn accept_one(&mut self) -> io::Result<u64> {
        self.socket.accept_subscriber().await
    }

    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        self.socket.send(msg).await
    }
}

/// A subscription to a single peer's publish endpoint.
pub struct Subscriber {
    socket: SubSocket<TcpStream>,
}

impl Subscriber {
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let mut socket = SubSocket::connect(addr).await?;
        socket.subscribe(b"").await?;
        Ok(Self { socket })
    }

    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.socket.recv().await
    }
}
