pub mod header;
pub mod question;
pub mod record;

use crate::buffer::{PacketBuffer, ReaderError, WriterError};
use std::fmt::Display;
use std::str::FromStr;

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    Unknown(u16),
    /// a host address
    A, // 1
    /// an authoritative name server
    NS, // 2
    /// the canonical name for an alias
    CNAME, // 5
    /// start of a zone of authority
    SOA, // 6
    /// a domain name pointer
    PTR, // 12
    /// mail exchange
    MX, // 15
    /// an IPv6 host address
    AAAA, // 28
}

impl RecordType {
    pub fn into_num(self) -> u16 {
        match self {
            RecordType::Unknown(x) => x,
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::AAAA => 28,
        }
    }

    pub fn from_num(num: u16) -> RecordType {
        match num {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            28 => RecordType::AAAA,
            _ => RecordType::Unknown(num),
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::Unknown(num) => write!(f, "TYPE{num}"),
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::AAAA => write!(f, "AAAA"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidRecordType(pub String);

impl Display for InvalidRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid record type {:?}", self.0)
    }
}

impl std::error::Error for InvalidRecordType {}

impl FromStr for RecordType {
    type Err = InvalidRecordType;

    /// Accepts mnemonic names (`"A"`, `"aaaa"`) and raw type numbers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "PTR" => Ok(RecordType::PTR),
            "MX" => Ok(RecordType::MX),
            "AAAA" => Ok(RecordType::AAAA),
            other => other
                .parse::<u16>()
                .map(RecordType::from_num)
                .map_err(|_| InvalidRecordType(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DnsPacket {
    pub header: header::Header,
    pub questions: Vec<question::Question>,
    pub answers: Vec<record::Record>,
    pub authorities: Vec<record::Record>,
    pub resources: Vec<record::Record>,
}

impl TryFrom<PacketBuffer> for DnsPacket {
    type Error = ReaderError;

    fn try_from(mut buffer: PacketBuffer) -> Result<Self, Self::Error> {
        let header = header::Header::read(&mut buffer)?;

        let mut questions = Vec::with_capacity(header.questions.min(16) as usize);
        for _ in 0..header.questions {
            questions.push(question::Question::read(&mut buffer)?);
        }

        let mut answers = Vec::with_capacity(header.answers.min(16) as usize);
        for _ in 0..header.answers {
            answers.push(record::Record::read(&mut buffer)?);
        }

        let mut authorities = Vec::with_capacity(header.authoritative_entries.min(16) as usize);
        for _ in 0..header.authoritative_entries {
            authorities.push(record::Record::read(&mut buffer)?);
        }

        let mut resources = Vec::with_capacity(header.resource_entries.min(16) as usize);
        for _ in 0..header.resource_entries {
            resources.push(record::Record::read(&mut buffer)?);
        }

        Ok(DnsPacket {
            header,
            questions,
            answers,
            authorities,
            resources,
        })
    }
}

impl DnsPacket {
    pub fn new(header: header::Header) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    pub fn with_question(mut self, question: question::Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_answer(mut self, record: record::Record) -> Self {
        self.answers.push(record);
        self
    }

    /// Decode a packet from raw message bytes.
    pub fn parse(msg: &[u8]) -> Result<Self, ReaderError> {
        Self::try_from(PacketBuffer::from_slice(msg)?)
    }

    pub fn create_buffer(&mut self) -> Result<PacketBuffer, WriterError> {
        let mut buffer = PacketBuffer::default();
        self.header.questions = self.questions.len() as u16;
        self.header.answers = self.answers.len() as u16;
        self.header.authoritative_entries = self.authorities.len() as u16;
        self.header.resource_entries = self.resources.len() as u16;

        self.header.write(&mut buffer)?;

        for question in &self.questions {
            question.write(&mut buffer)?;
        }
        for rec in &self.answers {
            rec.write(&mut buffer)?;
        }
        for rec in &self.authorities {
            rec.write(&mut buffer)?;
        }
        for rec in &self.resources {
            rec.write(&mut buffer)?;
        }

        Ok(buffer)
    }

    /// Encode the packet into raw message bytes.
    pub fn encode(&mut self) -> Result<Vec<u8>, WriterError> {
        Ok(self.create_buffer()?.bytes().to_vec())
    }
}
