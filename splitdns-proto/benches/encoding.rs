use criterion::{black_box, criterion_group, criterion_main, Criterion};
use splitdns_proto::packet::header::Header;
use splitdns_proto::packet::question::Question;
use splitdns_proto::packet::record::Record;
use splitdns_proto::{DnsPacket, RecordType};
use std::net::Ipv4Addr;

fn query_packet() -> DnsPacket {
    let mut packet = DnsPacket::new(Header::question(38005));
    packet.header.recursion_desired = true;
    packet
        .questions
        .push(Question::new("app.datadoghq.com".into(), RecordType::A));
    packet
}

fn response_packet() -> DnsPacket {
    let mut packet = DnsPacket::new(Header::response(38005))
        .with_question(Question::new("app.datadoghq.com".into(), RecordType::A));
    for host in 0..8u8 {
        packet = packet.with_answer(Record::A {
            domain: "app.datadoghq.com".into(),
            addr: Ipv4Addr::new(3, 233, 151, 128 + host),
            ttl: 60,
        });
    }
    packet
}

fn encoding(mut packet: DnsPacket) {
    let _buffer = packet.create_buffer().unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("encoding query packet", |b| {
        let packet = query_packet();
        b.iter(|| encoding(black_box(packet.clone())))
    });
    c.bench_function("encoding response packet", |b| {
        let packet = response_packet();
        b.iter(|| encoding(black_box(packet.clone())))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
