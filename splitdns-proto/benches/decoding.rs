use criterion::{black_box, criterion_group, criterion_main, Criterion};
use splitdns_proto::packet::header::Header;
use splitdns_proto::packet::question::Question;
use splitdns_proto::packet::record::Record;
use splitdns_proto::{DnsPacket, RecordType};
use std::net::Ipv4Addr;

fn query_packet() -> Vec<u8> {
    let mut packet = DnsPacket::new(Header::question(38005));
    packet.header.recursion_desired = true;
    packet
        .questions
        .push(Question::new("app.datadoghq.com".into(), RecordType::A));
    packet.encode().unwrap()
}

fn response_packet() -> Vec<u8> {
    let mut packet = DnsPacket::new(Header::response(38005))
        .with_question(Question::new("app.datadoghq.com".into(), RecordType::A))
        .with_answer(Record::CNAME {
            domain: "app.datadoghq.com".into(),
            host: "alb-web-2019-shard0-1497967001.us-east-1.elb.amazonaws.com".into(),
            ttl: 39,
        });
    for host in 0..8u8 {
        packet = packet.with_answer(Record::A {
            domain: "alb-web-2019-shard0-1497967001.us-east-1.elb.amazonaws.com".into(),
            addr: Ipv4Addr::new(3, 233, 151, 128 + host),
            ttl: 60,
        });
    }
    packet.encode().unwrap()
}

fn decoding(packet: &[u8]) {
    let _ = DnsPacket::parse(packet).unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("decoding query packet", |b| {
        let packet = query_packet();
        b.iter(|| decoding(black_box(&packet)))
    });
    c.bench_function("decoding response packet", |b| {
        let packet = response_packet();
        b.iter(|| decoding(black_box(&packet)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
