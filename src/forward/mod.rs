//! The forwarder core: accepts client queries over UDP and TCP, classifies
//! their names by probing, and relays each query to the domestic or the
//! trusted upstream.
//!
//! Everything mutable (the query table, the verdict cache) is owned by the
//! single task running [`Forwarder::run`]; helper tasks only move sockets
//! and bytes, and report back over the event channel.

pub(crate) mod cache;
pub(crate) mod query;
mod trusted;

use crate::config::Config;
use cache::{VerdictCache, VERDICT_KIND};
use futures::StreamExt;
use query::{ClientHandle, QueryContext, QueryTable};
use splitdns_proto::message;
use splitdns_proto::RecordType;
use splitdns_transport::{tcp, timed, udp};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, Notify};

/// Work handed back to the core by its helper tasks.
pub(crate) enum Event {
    /// A framed query read from an accepted TCP client.
    Query { client: ClientHandle, raw: Vec<u8> },
    /// A reply that came back over the trusted TCP path.
    TrustedReply { raw: Vec<u8> },
    /// The trusted path gave up on this wire id.
    TrustedFailed { id: u16 },
}

/// Requests the event loop to stop after the dispatch in progress.
#[derive(Clone)]
pub struct Handle {
    stop: Arc<Notify>,
}

impl Handle {
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

pub struct Forwarder {
    listen_udp: Arc<UdpSocket>,
    listen_tcp: Arc<TcpListener>,
    client_out: udp::Sender,

    probe_sock: Arc<UdpSocket>,
    probe_out: udp::Sender,
    probe_addr: SocketAddr,
    poison_answer: RecordType,

    domestic_sock: Arc<UdpSocket>,
    domestic_out: udp::Sender,
    domestic_addr: SocketAddr,

    trusted_sock: Arc<UdpSocket>,
    trusted_out: udp::Sender,
    trusted_addr: SocketAddr,
    trusted_via_udp: bool,
    socks5_addr: Option<SocketAddr>,

    queries: QueryTable,
    verdicts: VerdictCache,
    stop: Arc<Notify>,
}

async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))
}

/// An unconnected UDP socket in the address family of its upstream.
async fn outbound_socket(target: &SocketAddr) -> io::Result<Arc<UdpSocket>> {
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    Ok(Arc::new(UdpSocket::bind(local).await?))
}

impl Forwarder {
    /// Resolve the upstreams and bind every socket. Failures here are fatal
    /// to startup.
    pub async fn bind(config: Config) -> io::Result<Self> {
        let poison_answer: RecordType = config
            .probe
            .poison_answer
            .parse()
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, format!("{error}")))?;

        let probe_addr = resolve(&config.probe.host, config.probe.port).await?;
        let domestic_addr = resolve(&config.domestic.host, config.domestic.port).await?;
        let trusted_addr = resolve(&config.trusted.host, config.trusted.port).await?;
        let socks5_addr = match &config.socks5 {
            Some(section) => Some(resolve(&section.host, section.port).await?),
            None => None,
        };

        let listen = config.listen.address();
        tracing::info!("starting splitdns on {listen}");
        let listen_udp = Arc::new(UdpSocket::bind(listen).await?);
        let listen_tcp = Arc::new(TcpListener::bind(listen).await?);

        let probe_sock = outbound_socket(&probe_addr).await?;
        let domestic_sock = outbound_socket(&domestic_addr).await?;
        let trusted_sock = outbound_socket(&trusted_addr).await?;

        Ok(Self {
            client_out: udp::Sender::new(Arc::clone(&listen_udp)),
            listen_udp,
            listen_tcp,

            probe_out: udp::Sender::new(Arc::clone(&probe_sock)),
            probe_sock,
            probe_addr,
            poison_answer,

            domestic_out: udp::Sender::new(Arc::clone(&domestic_sock)),
            domestic_sock,
            domestic_addr,

            trusted_out: udp::Sender::new(Arc::clone(&trusted_sock)),
            trusted_sock,
            trusted_addr,
            trusted_via_udp: config.trusted.via_udp,
            socks5_addr,

            queries: QueryTable::new(config.limits.pending_queries),
            verdicts: VerdictCache::new(config.limits.verdict_ttl),
            stop: Arc::new(Notify::new()),
        })
    }

    pub fn handle(&self) -> Handle {
        Handle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Local address of the UDP listener.
    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.listen_udp.local_addr()
    }

    /// Local address of the TCP listener.
    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.listen_tcp.local_addr()
    }

    /// Drive the forwarder until [`Handle::stop`] is called.
    pub async fn run(mut self) {
        let stop = Arc::clone(&self.stop);
        let listen_tcp = Arc::clone(&self.listen_tcp);
        let (events_tx, mut events_rx) = mpsc::channel::<Event>(64);

        let client_stream = udp::Receiver::new(Arc::clone(&self.listen_udp)).into_stream();
        let probe_stream = udp::Receiver::new(Arc::clone(&self.probe_sock)).into_stream();
        let domestic_stream = udp::Receiver::new(Arc::clone(&self.domestic_sock)).into_stream();
        let trusted_stream = udp::Receiver::new(Arc::clone(&self.trusted_sock)).into_stream();
        tokio::pin!(client_stream, probe_stream, domestic_stream, trusted_stream);

        let mut tick = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = stop.notified() => break,
                _ = tick.tick() => self.on_tick(),
                Some(datagram) = client_stream.next() => {
                    let client = ClientHandle::Udp(datagram.address);
                    self.accept_query(client, datagram.bytes().to_vec(), &events_tx).await;
                }
                Some(datagram) = probe_stream.next() => {
                    self.on_probe_reply(datagram.bytes(), &events_tx).await;
                }
                Some(datagram) = domestic_stream.next() => {
                    self.on_reply(datagram.bytes().to_vec()).await;
                }
                Some(datagram) = trusted_stream.next() => {
                    self.on_reply(datagram.bytes().to_vec()).await;
                }
                accepted = listen_tcp.accept() => match accepted {
                    Ok((stream, peer)) => self.on_accept(stream, peer, &events_tx),
                    Err(error) => tracing::error!("accept failed: {error:?}"),
                },
                Some(event) = events_rx.recv() => self.on_event(event, &events_tx).await,
            }
        }

        tracing::info!("exit");
    }

    /// The 1 Hz slow path: ages pending queries and cached verdicts.
    fn on_tick(&mut self) {
        self.queries.tick();
        self.verdicts.tick();
    }

    /// A TCP client serves exactly one query: read it off the connection in
    /// a helper task, then hand the stream back with the bytes.
    fn on_accept(&self, stream: TcpStream, peer: SocketAddr, events: &mpsc::Sender<Event>) {
        tracing::debug!("tcp client connected from {peer:?}");
        let events = events.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            match timed(tcp::read_message(&mut stream)).await {
                Ok(raw) => {
                    let client = ClientHandle::Tcp(stream);
                    let _ = events.send(Event::Query { client, raw }).await;
                }
                Err(error) => tracing::debug!("tcp query from {peer:?} failed: {error:?}"),
            }
        });
    }

    /// Parse and admit a client query, then route it.
    async fn accept_query(
        &mut self,
        client: ClientHandle,
        raw: Vec<u8>,
        events: &mpsc::Sender<Event>,
    ) {
        let (qname, qtype) = match message::parse_query(&raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!("bad query: {error}");
                return;
            }
        };
        let Some(orig_id) = message::message_id(&raw) else {
            return;
        };
        tracing::debug!("query [{orig_id}] [{qtype}] [{qname}]");

        let ctx = QueryContext::new(orig_id, qname, qtype, client, raw);
        match self.queries.add(ctx) {
            Ok(id) => self.route_query(id, events).await,
            Err(ctx) => tracing::warn!(
                "query table full ({} pending), dropping query [{}] [{}]",
                self.queries.len(),
                ctx.orig_id,
                ctx.qname
            ),
        }
    }

    /// Pick the upstream for a freshly admitted query.
    async fn route_query(&mut self, id: u16, events: &mpsc::Sender<Event>) {
        let Some(ctx) = self.queries.get(id) else {
            return;
        };
        let qname = ctx.qname.clone();

        // reverse lookups have nothing worth censoring, skip classification
        if ctx.qtype == RecordType::PTR {
            if let Some(id) = self.queries.renew_id(id) {
                self.send_domestic(id).await;
            }
            return;
        }

        match self.verdicts.search(&qname, VERDICT_KIND) {
            None => {
                let Some(id) = self.queries.renew_id(id) else {
                    return;
                };
                tracing::debug!("detect [{qname}]");
                match message::build_query(&qname, RecordType::SOA) {
                    Ok(mut probe) => {
                        message::set_message_id(&mut probe, id);
                        if let Err(error) = self.probe_out.send_to(&probe, self.probe_addr).await {
                            tracing::error!("probe send failed: {error:?}");
                        }
                    }
                    Err(error) => tracing::warn!("cannot build probe for [{qname}]: {error}"),
                }
            }
            Some(true) => {
                if let Some(id) = self.queries.renew_id(id) {
                    self.send_trusted(id, events).await;
                }
            }
            Some(false) => {
                if let Some(id) = self.queries.renew_id(id) {
                    self.send_domestic(id).await;
                }
            }
        }
    }

    /// Judge a probe reply and dispatch the original query accordingly.
    ///
    /// The probe resolver is expected to never answer an SOA query with the
    /// configured `poison_answer` type; seeing one means something on the
    /// path forged the reply, and the name is poisoned.
    async fn on_probe_reply(&mut self, msg: &[u8], events: &mpsc::Sender<Event>) {
        let Some(id) = message::message_id(msg) else {
            return;
        };
        if self.queries.get(id).is_none() {
            // the query aged out, or a duplicate probe reply
            return;
        }
        let (name, answer) = match message::parse_reply(msg) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!("bad reply: {error}");
                return;
            }
        };
        let blocked = answer == Some(self.poison_answer);

        let Some(id) = self.queries.renew_id(id) else {
            return;
        };
        if blocked {
            tracing::debug!("[{name}] is blocked");
            self.send_trusted(id, events).await;
        } else {
            tracing::debug!("[{name}] is not blocked");
            self.send_domestic(id).await;
        }

        if !self.verdicts.insert(&name, VERDICT_KIND, blocked) {
            tracing::debug!("verdict for [{name}] already cached");
        }
    }

    /// Relay an upstream reply back to the client that asked, restoring the
    /// client's id. The first matching reply wins; anything later no longer
    /// resolves in the table and is dropped.
    async fn on_reply(&mut self, mut raw: Vec<u8>) {
        let Some(id) = message::message_id(&raw) else {
            return;
        };
        match message::parse_reply(&raw) {
            Ok((name, answer)) => {
                let answer = answer.map_or_else(|| String::from("NONE"), |t| t.to_string());
                tracing::debug!("reply [{id}] [{answer}] [{name}]");
            }
            Err(error) => {
                tracing::warn!("bad reply: {error}");
                return;
            }
        }
        let Some(ctx) = self.queries.remove(id) else {
            return;
        };
        message::set_message_id(&mut raw, ctx.orig_id);
        match ctx.client {
            ClientHandle::Udp(address) => {
                if let Err(error) = self.client_out.send_to(&raw, address).await {
                    tracing::error!("reply send failed: {error:?}");
                }
            }
            ClientHandle::Tcp(mut stream) => {
                tokio::spawn(async move {
                    if let Err(error) = timed(tcp::write_message(&mut stream, &raw)).await {
                        tracing::debug!("tcp reply send failed: {error:?}");
                    }
                    // the stream drops here: one reply per connection
                });
            }
        }
    }

    /// Forward the client's raw query (id already remapped) to the domestic
    /// resolver.
    async fn send_domestic(&mut self, id: u16) {
        let Some(ctx) = self.queries.get(id) else {
            return;
        };
        if let Err(error) = self.domestic_out.send_to(&ctx.raw, self.domestic_addr).await {
            tracing::error!("domestic send failed: {error:?}");
        }
    }

    /// Route a poisoned query to the trusted resolver: raw UDP when the
    /// resolver sits on a port the censor ignores, otherwise a fresh query
    /// over TCP or SOCKS5.
    async fn send_trusted(&mut self, id: u16, events: &mpsc::Sender<Event>) {
        let Some(ctx) = self.queries.get(id) else {
            return;
        };
        if self.trusted_via_udp {
            if let Err(error) = self.trusted_out.send_to(&ctx.raw, self.trusted_addr).await {
                tracing::error!("trusted send failed: {error:?}");
            }
            return;
        }
        let message = match message::build_query(&ctx.qname, ctx.qtype) {
            Ok(mut msg) => {
                message::set_message_id(&mut msg, id);
                msg
            }
            Err(error) => {
                tracing::warn!("cannot build trusted query for [{}]: {error}", ctx.qname);
                return;
            }
        };
        tokio::spawn(trusted::exchange(
            self.trusted_addr,
            self.socks5_addr,
            message,
            id,
            events.clone(),
        ));
    }

    async fn on_event(&mut self, event: Event, events: &mpsc::Sender<Event>) {
        match event {
            Event::Query { client, raw } => self.accept_query(client, raw, events).await,
            Event::TrustedReply { raw } => self.on_reply(raw).await,
            Event::TrustedFailed { id } => {
                // same as a failed connect: forget the query, the client
                // retransmits
                self.queries.remove(id);
            }
        }
    }
}
