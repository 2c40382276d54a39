use super::Event;
use splitdns_transport::{socks5, tcp, timed};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// One query/response exchange with the trusted resolver over TCP, direct or
/// through the SOCKS5 proxy. The connection lives exactly as long as the
/// exchange; the reply (or the failure) is posted back to the core.
pub(crate) async fn exchange(
    target: SocketAddr,
    proxy: Option<SocketAddr>,
    message: Vec<u8>,
    id: u16,
    events: mpsc::Sender<Event>,
) {
    let event = match try_exchange(target, proxy, &message).await {
        Ok(raw) => Event::TrustedReply { raw },
        Err(error) => {
            tracing::debug!("trusted exchange for [{id}] failed: {error:?}");
            Event::TrustedFailed { id }
        }
    };
    let _ = events.send(event).await;
}

async fn try_exchange(
    target: SocketAddr,
    proxy: Option<SocketAddr>,
    message: &[u8],
) -> std::io::Result<Vec<u8>> {
    let mut stream = match proxy {
        Some(proxy) => socks5::connect(proxy, target).await?,
        None => timed(TcpStream::connect(target)).await?,
    };
    timed(tcp::write_message(&mut stream, message)).await?;
    // one response per connection; the socket closes with the stream
    timed(tcp::read_message(&mut stream)).await
}
