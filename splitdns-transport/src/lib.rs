//! Transport layer for DNS messages: datagram receive/send over shared UDP
//! sockets, the 2-byte length framing DNS uses over TCP, and the SOCKS5
//! CONNECT client that tunnels the TCP leg through a proxy.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

pub mod socks5;
pub mod tcp;
pub mod udp;

pub use splitdns_proto::MAX_MESSAGE_SIZE;

/// Deadline applied to each TCP and SOCKS5 socket operation.
pub const IO_TIMEOUT: Duration = Duration::from_secs(3);

/// A received datagram and the peer it came from.
pub struct Message {
    pub address: SocketAddr,
    pub buffer: [u8; MAX_MESSAGE_SIZE],
    pub size: usize,
}

impl Message {
    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.size]
    }
}

/// Run a socket operation under [`IO_TIMEOUT`].
pub async fn timed<T, F>(operation: F) -> std::io::Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(IO_TIMEOUT, operation).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "socket operation timed out",
        )),
    }
}
