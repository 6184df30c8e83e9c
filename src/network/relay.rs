//! Relay server TCP channel
//!
//! One persistent TCP connection per call session carrying raw PCM bytes,
//! framed only by the fixed chunk size. The connection is split into a send
//! half and a receive half so each pump loop owns its own direction; read
//! and write timeouts bound every blocking call so the loops can observe
//! cancellation between attempts.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::RelayConfig;
use crate::error::NetworkError;

/// Outcome of a bounded receive
#[derive(Debug)]
pub enum RelayRead {
    /// `n` bytes written into the caller's buffer
    Data(usize),
    /// Nothing arrived within the timeout window
    TimedOut,
    /// Remote end closed the connection
    Closed,
}

/// Outcome of a bounded send
#[derive(Debug)]
pub enum SendStatus {
    /// All bytes were written
    Sent,
    /// No byte could be written within the timeout window
    TimedOut,
}

/// Send half of a relay connection
pub trait RelayTx: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<SendStatus, NetworkError>;
}

/// Receive half of a relay connection
pub trait RelayRx: Send {
    fn recv(&mut self, buf: &mut [u8]) -> Result<RelayRead, NetworkError>;
}

/// Send and receive halves of one established relay connection
pub struct RelayPair {
    pub tx: Box<dyn RelayTx>,
    pub rx: Box<dyn RelayRx>,
}

/// Factory establishing relay connections for the session controller
pub trait RelayConnector: Send + Sync {
    fn connect(&self) -> Result<RelayPair, NetworkError>;
}

/// Connector for the configured relay server over plain TCP
pub struct TcpRelayConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpRelayConnector {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
        }
    }

    fn resolve(&self) -> Result<SocketAddr, NetworkError> {
        let addr_str = format!("{}:{}", self.host, self.port);
        addr_str
            .to_socket_addrs()
            .map_err(|e| NetworkError::ConnectFailed {
                addr: addr_str.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or(NetworkError::ConnectFailed {
                addr: addr_str,
                reason: "no address resolved".to_string(),
            })
    }
}

impl RelayConnector for TcpRelayConnector {
    fn connect(&self) -> Result<RelayPair, NetworkError> {
        let addr = self.resolve()?;
        let addr_str = addr.to_string();
        let connect_err = |e: std::io::Error| NetworkError::ConnectFailed {
            addr: addr_str.clone(),
            reason: e.to_string(),
        };

        let socket =
            Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
                .map_err(connect_err)?;

        socket
            .connect_timeout(&addr.into(), self.connect_timeout)
            .map_err(connect_err)?;
        // Frames are small and latency-sensitive
        socket.set_nodelay(true).map_err(connect_err)?;

        let send_stream: TcpStream = socket.into();
        let recv_stream = send_stream.try_clone().map_err(connect_err)?;

        send_stream
            .set_write_timeout(Some(self.io_timeout))
            .map_err(connect_err)?;
        recv_stream
            .set_read_timeout(Some(self.io_timeout))
            .map_err(connect_err)?;

        Ok(RelayPair {
            tx: Box::new(TcpRelayTx {
                stream: send_stream,
            }),
            rx: Box::new(TcpRelayRx {
                stream: recv_stream,
            }),
        })
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Send half over a cloned `TcpStream` with a write timeout
pub struct TcpRelayTx {
    stream: TcpStream,
}

impl RelayTx for TcpRelayTx {
    fn send(&mut self, bytes: &[u8]) -> Result<SendStatus, NetworkError> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(NetworkError::SendFailed(
                        "connection closed by relay".to_string(),
                    ))
                }
                Ok(n) => written += n,
                Err(ref e) if is_timeout(e) && written == 0 => return Ok(SendStatus::TimedOut),
                Err(ref e) if is_timeout(e) => {
                    // A frame must never be left half-sent; a stall mid-frame
                    // is an unrecoverable channel error
                    return Err(NetworkError::SendFailed(
                        "send timed out mid-frame".to_string(),
                    ));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetworkError::SendFailed(e.to_string())),
            }
        }
        Ok(SendStatus::Sent)
    }
}

/// Receive half over a cloned `TcpStream` with a read timeout
pub struct TcpRelayRx {
    stream: TcpStream,
}

impl RelayRx for TcpRelayRx {
    fn recv(&mut self, buf: &mut [u8]) -> Result<RelayRead, NetworkError> {
        match self.stream.read(buf) {
            Ok(0) => Ok(RelayRead::Closed),
            Ok(n) => Ok(RelayRead::Data(n)),
            Err(ref e) if is_timeout(e) => Ok(RelayRead::TimedOut),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(RelayRead::TimedOut),
            Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
        }
    }
}
