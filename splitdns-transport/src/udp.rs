use crate::{Message, MAX_MESSAGE_SIZE};
use async_stream::stream;
use futures_core::stream::Stream;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Receives DNS messages from a shared UDP socket.
#[derive(Debug)]
pub struct Receiver {
    socket: Arc<UdpSocket>,
}

impl Receiver {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    async fn receive(&self) -> std::io::Result<Message> {
        let mut buffer = [0u8; MAX_MESSAGE_SIZE];
        let (size, address) = self.socket.recv_from(&mut buffer).await?;
        Ok(Message {
            address,
            buffer,
            size,
        })
    }

    /// The socket as an endless stream of datagrams. Receive errors are
    /// logged and skipped; a UDP socket recovers from them.
    pub fn into_stream(self) -> impl Stream<Item = Message> {
        stream! {
            loop {
                match self.receive().await {
                    Ok(message) => {
                        tracing::trace!("received message from {:?}", message.address);
                        yield message;
                    }
                    Err(error) => tracing::debug!("datagram receive failed: {error:?}"),
                }
            }
        }
    }
}

/// Sends DNS messages on a shared UDP socket.
#[derive(Debug, Clone)]
pub struct Sender {
    socket: Arc<UdpSocket>,
}

impl Sender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    pub async fn send_to(&self, payload: &[u8], address: SocketAddr) -> std::io::Result<()> {
        tracing::trace!("sending {} bytes to {:?}", payload.len(), address);
        self.socket.send_to(payload, address).await?;
        Ok(())
    }
}
