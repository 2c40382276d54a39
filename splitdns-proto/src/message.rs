//! Message-level operations the forwarder performs on raw query and reply
//! bytes. Id handling works directly on the first two octets so a reply can
//! be relayed without re-encoding it.

use crate::buffer::{ReaderError, WriterError};
use crate::packet::header::Header;
use crate::packet::question::Question;
use crate::packet::{DnsPacket, RecordType};

/// The transaction id of a message, if there is room for one.
pub fn message_id(msg: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*msg.first()?, *msg.get(1)?]))
}

/// Overwrite the transaction id in place. Short fragments are left alone;
/// they will never parse anyway.
pub fn set_message_id(msg: &mut [u8], id: u16) {
    if msg.len() >= 2 {
        msg[..2].copy_from_slice(&id.to_be_bytes());
    }
}

/// Build a recursion-desired query for `qname` with a single IN question and
/// a random id. The caller stamps the id it actually wants with
/// [`set_message_id`].
pub fn build_query(qname: &str, qtype: RecordType) -> Result<Vec<u8>, WriterError> {
    let mut packet = DnsPacket::new(Header::question(rand::random()));
    packet.header.recursion_desired = true;
    packet
        .questions
        .push(Question::new(qname.to_string(), qtype));
    packet.encode()
}

/// Name and type of the first question of a query.
pub fn parse_query(msg: &[u8]) -> Result<(String, RecordType), ReaderError> {
    let packet = DnsPacket::parse(msg)?;
    let question = packet
        .questions
        .into_iter()
        .next()
        .ok_or(ReaderError::NoQuestion)?;
    Ok((question.name, question.qtype))
}

/// Name of the first question of a reply, plus the type of the first answer
/// record; `None` when the answer section is empty.
///
/// Only the first answer is examined: a reply opening with a CNAME chain is
/// judged by the CNAME, not by the addresses behind it.
pub fn parse_reply(msg: &[u8]) -> Result<(String, Option<RecordType>), ReaderError> {
    let packet = DnsPacket::parse(msg)?;
    let question = packet
        .questions
        .into_iter()
        .next()
        .ok_or(ReaderError::NoQuestion)?;
    let answer = packet.answers.first().map(|record| record.rtype());
    Ok((question.name, answer))
}

#[cfg(test)]
mod tests {
    use super::{build_query, message_id, parse_query, parse_reply, set_message_id};
    use crate::buffer::ReaderError;
    use crate::packet::header::Header;
    use crate::packet::question::Question;
    use crate::packet::record::Record;
    use crate::packet::{DnsPacket, RecordType};
    use std::net::Ipv4Addr;

    #[test]
    fn should_read_and_write_message_id() {
        let mut query = build_query("example.com", RecordType::A).unwrap();
        set_message_id(&mut query, 0x1234);
        assert_eq!(message_id(&query), Some(0x1234));
    }

    #[test]
    fn should_ignore_short_fragment() {
        let mut fragment = [0x42u8];
        set_message_id(&mut fragment, 7);
        assert_eq!(fragment, [0x42]);
        assert_eq!(message_id(&fragment), None);
    }

    #[test]
    fn should_parse_built_query() {
        let query = build_query("example.com", RecordType::SOA).unwrap();
        let (name, qtype) = parse_query(&query).unwrap();
        assert_eq!(name, "example.com");
        assert_eq!(qtype, RecordType::SOA);

        let packet = DnsPacket::parse(&query).unwrap();
        assert!(packet.header.recursion_desired);
        assert!(!packet.header.response);
        assert_eq!(packet.header.opcode, 0);
        assert_eq!(packet.header.questions, 1);
        assert_eq!(packet.header.answers, 0);
    }

    #[test]
    fn should_canonicalize_parsed_names() {
        // case is preserved, the root comes back as "."
        let query = build_query("ExAmPle.COM", RecordType::A).unwrap();
        assert_eq!(parse_query(&query).unwrap().0, "ExAmPle.COM");

        let root = build_query(".", RecordType::NS).unwrap();
        assert_eq!(parse_query(&root).unwrap().0, ".");
    }

    #[test]
    fn should_reject_query_without_question() {
        let mut packet = DnsPacket::new(Header::question(7));
        let encoded = packet.encode().unwrap();
        assert_eq!(parse_query(&encoded).unwrap_err(), ReaderError::NoQuestion);
    }

    #[test]
    fn should_reject_truncated_query() {
        let query = build_query("example.com", RecordType::A).unwrap();
        assert!(parse_query(&query[..10]).is_err());
    }

    #[test]
    fn should_report_first_answer_type() {
        let mut packet = DnsPacket::new(Header::response(9))
            .with_question(Question::new("example.com".into(), RecordType::SOA))
            .with_answer(Record::A {
                domain: "example.com".into(),
                addr: Ipv4Addr::new(10, 10, 10, 10),
                ttl: 60,
            });
        let encoded = packet.encode().unwrap();
        let (name, answer) = parse_reply(&encoded).unwrap();
        assert_eq!(name, "example.com");
        assert_eq!(answer, Some(RecordType::A));
    }

    #[test]
    fn should_report_empty_answer_section() {
        let mut packet = DnsPacket::new(Header::response(9))
            .with_question(Question::new("example.com".into(), RecordType::SOA));
        let encoded = packet.encode().unwrap();
        let (_, answer) = parse_reply(&encoded).unwrap();
        assert_eq!(answer, None);
    }

    #[test]
    fn should_roundtrip_random_names() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x736e_7364);
        let alphabet: Vec<char> = ('a'..='z').chain('0'..='9').chain(['-']).collect();
        for _ in 0..200 {
            let labels = rng.gen_range(1..=5);
            let name = (0..labels)
                .map(|_| {
                    let len = rng.gen_range(1..=12);
                    (0..len)
                        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                        .collect::<String>()
                })
                .collect::<Vec<_>>()
                .join(".");
            let qtype = RecordType::from_num(rng.gen_range(1..=40));

            let query = build_query(&name, qtype).unwrap();
            let (parsed, parsed_type) = parse_query(&query).unwrap();
            assert_eq!(parsed, name);
            assert_eq!(parsed_type, qtype);
        }
    }
}
