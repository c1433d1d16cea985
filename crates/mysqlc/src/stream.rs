//! Transport abstraction: TCP, Unix socket, or TLS-wrapped TCP.

use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// The byte stream under a connection.
///
/// `Closed` stands in after `close()` (and between TLS upgrade steps); any
/// I/O against it fails with `NotConnected`.
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "tls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
    Closed,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Tcp(_) => f.write_str("Stream::Tcp"),
            #[cfg(unix)]
            Stream::Unix(_) => f.write_str("Stream::Unix"),
            #[cfg(feature = "tls")]
            Stream::Tls(_) => f.write_str("Stream::Tls"),
            Stream::Closed => f.write_str("Stream::Closed"),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

impl Stream {
    /// Is this stream TLS-wrapped?
    pub(crate) fn is_tls(&self) -> bool {
        #[cfg(feature = "tls")]
        {
            matches!(self, Stream::Tls(_))
        }
        #[cfg(not(feature = "tls"))]
        {
            false
        }
    }

    /// Channels the SHA256 auth plugins accept cleartext passwords on:
    /// TLS, or a local Unix socket.
    pub(crate) fn is_secure_channel(&self) -> bool {
        #[cfg(unix)]
        if matches!(self, Stream::Unix(_)) {
            return true;
        }
        self.is_tls()
    }

    /// Take the underlying TCP stream out, leaving `Closed` behind.
    /// Used by the TLS upgrade; fails on non-TCP transports.
    #[cfg(feature = "tls")]
    pub(crate) fn take_tcp(&mut self) -> Option<TcpStream> {
        match std::mem::replace(self, Stream::Closed) {
            Stream::Tcp(tcp) => Some(tcp),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Drop the transport, releasing the socket.
    pub(crate) fn shutdown(&mut self) {
        match self {
            Stream::Tcp(tcp) => {
                let _ = tcp.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(unix)]
            Stream::Unix(sock) => {
                let _ = sock.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(feature = "tls")]
            Stream::Tls(tls) => {
                let _ = tls.sock.shutdown(std::net::Shutdown::Both);
            }
            Stream::Closed => {}
        }
        *self = Stream::Closed;
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.read(buf),
            Stream::Closed => Err(not_connected()),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.write(buf),
            Stream::Closed => Err(not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.flush(),
            Stream::Closed => Err(not_connected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_stream_refuses_io() {
        let mut stream = Stream::Closed;
        let mut buf = [0u8; 4];
        assert_eq!(
            stream.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert_eq!(
            stream.write(b"x").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert!(!stream.is_tls());
    }
}
