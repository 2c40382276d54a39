//! Minimal SOCKS5 (RFC 1928) client: NO AUTH, CONNECT, concrete IPv4/IPv6
//! targets. The forwarder always connects to a resolved address, so the
//! domain address type (0x03) is never offered.

use crate::timed;
use std::fmt::Display;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_IPV6: u8 = 0x04;

#[derive(Debug)]
pub enum Socks5Error {
    Io(std::io::Error),
    /// The proxy spoke something other than SOCKS version 5.
    Version(u8),
    /// The proxy refused the NO AUTH method.
    Method(u8),
    /// The CONNECT request was rejected with this status.
    Connect(u8),
    /// The reply carried an address type the client cannot consume.
    Address(u8),
}

impl Display for Socks5Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(inner) => write!(f, "socks5 i/o failed: {inner}"),
            Self::Version(version) => write!(f, "socks5 version {version} not supported"),
            Self::Method(method) => write!(f, "socks5 method selection failed ({method:#04x})"),
            Self::Connect(status) => write!(f, "socks5 connect rejected (status {status})"),
            Self::Address(atyp) => write!(f, "socks5 reply address type {atyp} not supported"),
        }
    }
}

impl std::error::Error for Socks5Error {}

impl From<std::io::Error> for Socks5Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<Socks5Error> for std::io::Error {
    fn from(value: Socks5Error) -> Self {
        match value {
            Socks5Error::Io(inner) => inner,
            other => std::io::Error::new(std::io::ErrorKind::ConnectionAborted, other.to_string()),
        }
    }
}

/// Handshake progress. Each state names the last wire action taken, as in
/// the protocol description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    HelloSent,
    HelloRcvd,
    ReqSent,
    Established,
}

/// Open a TCP tunnel to `target` through the proxy. On success the stream is
/// owned by the caller; on any failure it is dropped (closed) here.
pub async fn connect(proxy: SocketAddr, target: SocketAddr) -> Result<TcpStream, Socks5Error> {
    let mut stream = timed(TcpStream::connect(proxy)).await?;
    handshake(&mut stream, target).await?;
    tracing::debug!("socks5 tunnel to {target} established");
    Ok(stream)
}

/// Drive the handshake state machine to completion on an open proxy
/// connection.
async fn handshake<S>(stream: &mut S, target: SocketAddr) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = State::Closed;
    loop {
        state = match state {
            State::Closed => {
                // version, one method, NO AUTH
                timed(stream.write_all(&[VERSION, 1, METHOD_NO_AUTH])).await?;
                State::HelloSent
            }
            State::HelloSent => {
                let mut reply = [0u8; 2];
                timed(stream.read_exact(&mut reply)).await?;
                if reply[0] != VERSION {
                    return Err(Socks5Error::Version(reply[0]));
                }
                if reply[1] != METHOD_NO_AUTH {
                    return Err(Socks5Error::Method(reply[1]));
                }
                State::HelloRcvd
            }
            State::HelloRcvd => {
                let mut request = Vec::with_capacity(22);
                request.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00]);
                match target {
                    SocketAddr::V4(addr) => {
                        request.push(ATYP_IPV4);
                        request.extend_from_slice(&addr.ip().octets());
                    }
                    SocketAddr::V6(addr) => {
                        request.push(ATYP_IPV6);
                        request.extend_from_slice(&addr.ip().octets());
                    }
                }
                request.extend_from_slice(&target.port().to_be_bytes());
                timed(stream.write_all(&request)).await?;
                State::ReqSent
            }
            State::ReqSent => {
                let mut head = [0u8; 4];
                timed(stream.read_exact(&mut head)).await?;
                if head[0] != VERSION {
                    return Err(Socks5Error::Version(head[0]));
                }
                if head[1] != 0x00 {
                    return Err(Socks5Error::Connect(head[1]));
                }
                // drain the bound address and port
                let remaining = match head[3] {
                    ATYP_IPV4 => 4 + 2,
                    ATYP_IPV6 => 16 + 2,
                    other => return Err(Socks5Error::Address(other)),
                };
                let mut bound = [0u8; 18];
                timed(stream.read_exact(&mut bound[..remaining])).await?;
                State::Established
            }
            State::Established => return Ok(()),
        };
    }
}
