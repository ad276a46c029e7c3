//! Byte link to the remote peer
//!
//! The relay loop never blocks on the peer: [`PeerLink::poll_recv`] only
//! returns what has already arrived. Sending may block until the socket
//! accepts the whole message.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// How long a blocking send may take before the session is abandoned
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between accept attempts while waiting for the peer
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Connection to the remote side of the bridge
pub trait PeerLink {
    /// Send a complete message, failing if it cannot be sent in full
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is available without waiting
    ///
    /// Returns `Ok(0)` when nothing has arrived and
    /// [`BridgeError::PeerDisconnected`] once the peer has closed the
    /// connection.
    fn poll_recv(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<L: PeerLink + ?Sized> PeerLink for &mut L {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn poll_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).poll_recv(buf)
    }
}

/// TCP connection to the peer
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(SEND_TIMEOUT))?;
        Ok(Self { stream })
    }

    /// Listen on all interfaces and accept exactly one connection
    ///
    /// Gives up with [`BridgeError::Interrupted`] once `stop` is set.
    pub fn accept(port: u16, stop: &AtomicBool) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        Self::accept_from(&listener, stop)
    }

    /// Accept exactly one connection on an existing listener
    pub fn accept_from(listener: &TcpListener, stop: &AtomicBool) -> Result<Self> {
        log::info!("Waiting for incoming connection...");
        listener.set_nonblocking(true)?;

        let (stream, peer) = loop {
            match listener.accept() {
                Ok(conn) => break conn,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if stop.load(Ordering::SeqCst) {
                        return Err(BridgeError::Interrupted);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        // Accepted sockets may inherit non-blocking mode from the listener
        stream.set_nonblocking(false)?;
        log::info!("Connected to {}, entering I/O loop", peer);
        Self::from_stream(stream)
    }
}

impl PeerLink for TcpLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        match self.stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WriteZero => Err(BridgeError::PeerDisconnected),
            Err(e) => Err(e.into()),
        }
    }

    fn poll_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.stream.set_nonblocking(true)?;
        let result = match self.stream.read(buf) {
            Ok(0) => Err(BridgeError::PeerDisconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        };
        self.stream.set_nonblocking(false)?;
        result
    }
}
