//! End-to-end scenarios against mock upstream resolvers on the loopback.

use similar_asserts::assert_eq;
use splitdns::config::{Config, Socks5Config};
use splitdns::forward::Forwarder;
use splitdns_proto::message::{build_query, message_id, parse_query, set_message_id};
use splitdns_proto::packet::header::Header;
use splitdns_proto::packet::record::Record;
use splitdns_proto::{DnsPacket, RecordType};
use splitdns_transport::tcp;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

fn client_query(name: &str, qtype: RecordType, id: u16) -> Vec<u8> {
    let mut query = build_query(name, qtype).unwrap();
    set_message_id(&mut query, id);
    query
}

/// A response echoing the query's id and question, with the given answers.
fn answer_reply(query: &[u8], records: Vec<Record>) -> Vec<u8> {
    let packet = DnsPacket::parse(query).unwrap();
    let mut reply = DnsPacket::new(Header::response(packet.header.id));
    reply.header.recursion_desired = packet.header.recursion_desired;
    reply.header.recursion_available = true;
    reply.questions = packet.questions;
    reply.answers = records;
    reply.encode().unwrap()
}

/// Probe resolver mock. Counts the SOA probes it sees; answers them with an
/// A record when playing a poisoned path, with an empty answer section
/// otherwise.
async fn spawn_probe(poisoned: bool, probes: Arc<AtomicUsize>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((size, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            probes.fetch_add(1, Ordering::SeqCst);
            let query = buf[..size].to_vec();
            let (name, qtype) = parse_query(&query).unwrap();
            assert_eq!(qtype, RecordType::SOA);
            let records = if poisoned {
                vec![Record::A {
                    domain: name,
                    addr: Ipv4Addr::new(127, 66, 66, 66),
                    ttl: 300,
                }]
            } else {
                Vec::new()
            };
            let reply = answer_reply(&query, records);
            socket.send_to(&reply, peer).await.unwrap();
        }
    });
    address
}

/// UDP resolver mock answering every query type it is asked about.
async fn spawn_udp_resolver(addr4: Ipv4Addr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((size, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let query = buf[..size].to_vec();
            let (name, qtype) = parse_query(&query).unwrap();
            let records = match qtype {
                RecordType::AAAA => vec![Record::AAAA {
                    domain: name,
                    addr: addr4.to_ipv6_mapped(),
                    ttl: 60,
                }],
                RecordType::PTR => vec![Record::PTR {
                    domain: name,
                    host: "localhost".into(),
                    ttl: 60,
                }],
                _ => vec![Record::A {
                    domain: name,
                    addr: addr4,
                    ttl: 60,
                }],
            };
            let reply = answer_reply(&query, records);
            socket.send_to(&reply, peer).await.unwrap();
        }
    });
    address
}

/// Trusted resolver mock speaking framed DNS over TCP, one exchange per
/// connection.
async fn spawn_tcp_resolver(addr4: Ipv4Addr) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let query = tcp::read_message(&mut stream).await.unwrap();
                let (name, _) = parse_query(&query).unwrap();
                let reply = answer_reply(
                    &query,
                    vec![Record::A {
                        domain: name,
                        addr: addr4,
                        ttl: 60,
                    }],
                );
                tcp::write_message(&mut stream, &reply).await.unwrap();
            });
        }
    });
    address
}

/// SOCKS5 proxy mock: validates the handshake, checks the CONNECT target,
/// then answers the tunneled DNS exchange itself.
async fn spawn_socks5_proxy(expected_target: SocketAddr, addr4: Ipv4Addr) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut hello = [0u8; 3];
                stream.read_exact(&mut hello).await.unwrap();
                assert_eq!(hello, [5, 1, 0]);
                stream.write_all(&[5, 0]).await.unwrap();

                let mut request = [0u8; 10];
                stream.read_exact(&mut request).await.unwrap();
                assert_eq!(&request[..4], &[5, 1, 0, 1]);
                let ip = Ipv4Addr::new(request[4], request[5], request[6], request[7]);
                let port = u16::from_be_bytes([request[8], request[9]]);
                assert_eq!(SocketAddr::from((ip, port)), expected_target);
                stream
                    .write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0])
                    .await
                    .unwrap();

                let query = tcp::read_message(&mut stream).await.unwrap();
                let (name, _) = parse_query(&query).unwrap();
                let reply = answer_reply(
                    &query,
                    vec![Record::A {
                        domain: name,
                        addr: addr4,
                        ttl: 60,
                    }],
                );
                tcp::write_message(&mut stream, &reply).await.unwrap();
            });
        }
    });
    address
}

fn config_for(
    probe: SocketAddr,
    domestic: SocketAddr,
    trusted: SocketAddr,
    socks5: Option<SocketAddr>,
    via_udp: bool,
) -> Config {
    let mut config = Config::default();
    config.listen.port = 0;
    config.probe.host = probe.ip().to_string();
    config.probe.port = probe.port();
    config.domestic.host = domestic.ip().to_string();
    config.domestic.port = domestic.port();
    config.trusted.host = trusted.ip().to_string();
    config.trusted.port = trusted.port();
    config.trusted.via_udp = via_udp;
    config.socks5 = socks5.map(|address| Socks5Config {
        host: address.ip().to_string(),
        port: address.port(),
    });
    config
}

async fn start(config: Config) -> (SocketAddr, SocketAddr) {
    let forwarder = Forwarder::bind(config).await.unwrap();
    let udp = forwarder.udp_addr().unwrap();
    let tcp = forwarder.tcp_addr().unwrap();
    tokio::spawn(forwarder.run());
    (udp, tcp)
}

async fn udp_exchange(server: SocketAddr, query: &[u8]) -> Vec<u8> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(query, server).await.unwrap();
    let mut buf = [0u8; 2048];
    let (size, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("no reply within deadline")
        .unwrap();
    buf[..size].to_vec()
}

fn first_a(reply: &[u8]) -> Ipv4Addr {
    let packet = DnsPacket::parse(reply).unwrap();
    match packet.answers.first() {
        Some(Record::A { addr, .. }) => *addr,
        other => panic!("expected an A answer, got {other:?}"),
    }
}

#[tokio::test]
async fn should_resolve_clean_name_through_domestic() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(false, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(93, 184, 216, 34)).await;
    let trusted = spawn_tcp_resolver(Ipv4Addr::new(9, 9, 9, 9)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, None, false)).await;

    let reply = udp_exchange(udp, &client_query("example.com", RecordType::A, 0x1234)).await;

    assert_eq!(message_id(&reply), Some(0x1234));
    assert_eq!(first_a(&reply), Ipv4Addr::new(93, 184, 216, 34));
    assert_eq!(probes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_resolve_poisoned_name_through_trusted_tcp() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(true, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(127, 66, 66, 66)).await;
    let trusted = spawn_tcp_resolver(Ipv4Addr::new(104, 244, 42, 1)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, None, false)).await;

    let reply = udp_exchange(udp, &client_query("twitter.com", RecordType::A, 0xBEEF)).await;

    assert_eq!(message_id(&reply), Some(0xBEEF));
    assert_eq!(first_a(&reply), Ipv4Addr::new(104, 244, 42, 1));
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    // the verdict is cached: the next query goes straight to the trusted path
    let reply = udp_exchange(udp, &client_query("twitter.com", RecordType::A, 0xBEF0)).await;
    assert_eq!(message_id(&reply), Some(0xBEF0));
    assert_eq!(first_a(&reply), Ipv4Addr::new(104, 244, 42, 1));
    assert_eq!(probes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_resolve_poisoned_name_through_socks5() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(true, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(127, 66, 66, 66)).await;
    // nothing listens on the trusted address; the proxy answers in its place
    let trusted: SocketAddr = "192.0.2.77:53".parse().unwrap();
    let proxy = spawn_socks5_proxy(trusted, Ipv4Addr::new(104, 244, 42, 65)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, Some(proxy), false)).await;

    let reply = udp_exchange(udp, &client_query("twitter.com", RecordType::A, 0x7777)).await;

    assert_eq!(message_id(&reply), Some(0x7777));
    assert_eq!(first_a(&reply), Ipv4Addr::new(104, 244, 42, 65));
}

#[tokio::test]
async fn should_resolve_poisoned_name_through_trusted_udp() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(true, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(127, 66, 66, 66)).await;
    // a trusted resolver on a non-standard UDP port, reached directly
    let trusted = spawn_udp_resolver(Ipv4Addr::new(104, 244, 42, 129)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, None, true)).await;

    let reply = udp_exchange(udp, &client_query("twitter.com", RecordType::A, 0x4242)).await;

    assert_eq!(message_id(&reply), Some(0x4242));
    assert_eq!(first_a(&reply), Ipv4Addr::new(104, 244, 42, 129));
}

#[tokio::test]
async fn should_reuse_verdict_across_query_types() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(false, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(93, 184, 216, 34)).await;
    let trusted = spawn_tcp_resolver(Ipv4Addr::new(9, 9, 9, 9)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, None, false)).await;

    let reply = udp_exchange(udp, &client_query("example.com", RecordType::A, 1)).await;
    assert_eq!(first_a(&reply), Ipv4Addr::new(93, 184, 216, 34));
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    // same name, different type: the verdict is keyed by name only
    let reply = udp_exchange(udp, &client_query("example.com", RecordType::AAAA, 2)).await;
    let packet = DnsPacket::parse(&reply).unwrap();
    assert!(matches!(
        packet.answers.first(),
        Some(Record::AAAA { .. })
    ));
    assert_eq!(probes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_forward_ptr_queries_without_probing() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(false, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(127, 0, 0, 1)).await;
    let trusted = spawn_tcp_resolver(Ipv4Addr::new(9, 9, 9, 9)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, None, false)).await;

    let query = client_query("1.0.0.127.in-addr.arpa", RecordType::PTR, 0x0127);
    let reply = udp_exchange(udp, &query).await;

    assert_eq!(message_id(&reply), Some(0x0127));
    let packet = DnsPacket::parse(&reply).unwrap();
    assert!(matches!(
        packet.answers.first(),
        Some(Record::PTR { host, .. }) if host == "localhost"
    ));
    assert_eq!(probes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn should_serve_tcp_client_and_close_after_reply() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(false, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(93, 184, 216, 34)).await;
    let trusted = spawn_tcp_resolver(Ipv4Addr::new(9, 9, 9, 9)).await;
    let (_, tcp_addr) = start(config_for(probe, domestic, trusted, None, false)).await;

    let mut stream = TcpStream::connect(tcp_addr).await.unwrap();
    let query = client_query("example.com", RecordType::A, 0x0001);
    tcp::write_message(&mut stream, &query).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), tcp::read_message(&mut stream))
        .await
        .expect("no reply within deadline")
        .unwrap();
    assert_eq!(message_id(&reply), Some(0x0001));
    assert_eq!(first_a(&reply), Ipv4Addr::new(93, 184, 216, 34));

    // one query per connection: the forwarder closes its end
    let mut scratch = [0u8; 16];
    let size = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut scratch))
        .await
        .expect("no close within deadline")
        .unwrap();
    assert_eq!(size, 0);
}

#[tokio::test]
async fn should_answer_concurrent_clients_with_matching_ids() {
    let probes = Arc::new(AtomicUsize::new(0));
    let probe = spawn_probe(false, Arc::clone(&probes)).await;
    let domestic = spawn_udp_resolver(Ipv4Addr::new(93, 184, 216, 34)).await;
    let trusted = spawn_tcp_resolver(Ipv4Addr::new(9, 9, 9, 9)).await;
    let (udp, _) = start(config_for(probe, domestic, trusted, None, false)).await;

    let mut clients = Vec::new();
    for id in 1..=8u16 {
        let name = format!("host-{id}.example.com");
        clients.push(tokio::spawn(async move {
            let reply = udp_exchange(udp, &client_query(&name, RecordType::A, id)).await;
            assert_eq!(message_id(&reply), Some(id));
            assert_eq!(first_a(&reply), Ipv4Addr::new(93, 184, 216, 34));
        }));
    }
    for client in clients {
        client.await.unwrap();
    }
}
