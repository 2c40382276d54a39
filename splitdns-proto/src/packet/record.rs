use super::RecordType;
use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::PacketBuffer;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Record {
    Unknown {
        domain: String,
        qtype: u16,
        data_len: u16,
        ttl: u32,
    }, // 0
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    }, // 1
    NS {
        domain: String,
        host: String,
        ttl: u32,
    }, // 2
    CNAME {
        domain: String,
        host: String,
        ttl: u32,
    }, // 5
    SOA {
        domain: String,
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
        ttl: u32,
    }, // 6
    PTR {
        domain: String,
        host: String,
        ttl: u32,
    }, // 12
    MX {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    }, // 15
    AAAA {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    }, // 28
}

impl Record {
    /// The owner name of the record.
    pub fn domain(&self) -> &str {
        match self {
            Self::Unknown { domain, .. }
            | Self::A { domain, .. }
            | Self::NS { domain, .. }
            | Self::CNAME { domain, .. }
            | Self::SOA { domain, .. }
            | Self::PTR { domain, .. }
            | Self::MX { domain, .. }
            | Self::AAAA { domain, .. } => domain,
        }
    }

    /// The wire type of the record. This is what the poisoning probe judges
    /// a reply by.
    pub fn rtype(&self) -> RecordType {
        match self {
            Self::Unknown { qtype, .. } => RecordType::from_num(*qtype),
            Self::A { .. } => RecordType::A,
            Self::NS { .. } => RecordType::NS,
            Self::CNAME { .. } => RecordType::CNAME,
            Self::SOA { .. } => RecordType::SOA,
            Self::PTR { .. } => RecordType::PTR,
            Self::MX { .. } => RecordType::MX,
            Self::AAAA { .. } => RecordType::AAAA,
        }
    }

    pub fn read(buffer: &mut PacketBuffer) -> Result<Record, ReaderError> {
        // NAME the domain name to which this resource record pertains.
        let domain = buffer.read_qname()?;

        // TYPE and CLASS, two octets each. The class of a pseudo record
        // (EDNS OPT) carries a payload size, so it is not validated here.
        let qtype_num = buffer.read_u16()?;
        let qtype = RecordType::from_num(qtype_num);
        let _qclass = buffer.read_u16()?;

        // TTL, then RDLENGTH, the length in octets of the RDATA field.
        let ttl = buffer.read_u32()?;
        let data_len = buffer.read_u16()?;

        match qtype {
            RecordType::A => {
                let raw_addr = buffer.read_u32()?;
                let addr = Ipv4Addr::from(raw_addr);

                Ok(Record::A { domain, addr, ttl })
            }
            RecordType::AAAA => {
                let mut segments = [0u16; 8];
                for segment in segments.iter_mut() {
                    *segment = buffer.read_u16()?;
                }
                let addr = Ipv6Addr::from(segments);

                Ok(Record::AAAA { domain, addr, ttl })
            }
            RecordType::NS => {
                let host = buffer.read_qname()?;

                Ok(Record::NS { domain, host, ttl })
            }
            RecordType::CNAME => {
                let host = buffer.read_qname()?;

                Ok(Record::CNAME { domain, host, ttl })
            }
            RecordType::PTR => {
                let host = buffer.read_qname()?;

                Ok(Record::PTR { domain, host, ttl })
            }
            RecordType::SOA => {
                let mname = buffer.read_qname()?;
                let rname = buffer.read_qname()?;
                let serial = buffer.read_u32()?;
                let refresh = buffer.read_u32()?;
                let retry = buffer.read_u32()?;
                let expire = buffer.read_u32()?;
                let minimum = buffer.read_u32()?;

                Ok(Record::SOA {
                    domain,
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                    ttl,
                })
            }
            RecordType::MX => {
                let priority = buffer.read_u16()?;
                let host = buffer.read_qname()?;

                Ok(Record::MX {
                    domain,
                    priority,
                    host,
                    ttl,
                })
            }
            RecordType::Unknown(_) => {
                buffer.step(data_len as usize)?;

                Ok(Record::Unknown {
                    domain,
                    qtype: qtype_num,
                    data_len,
                    ttl,
                })
            }
        }
    }

    pub fn write(&self, buffer: &mut PacketBuffer) -> Result<usize, WriterError> {
        let start_pos = buffer.pos();

        match *self {
            Record::A {
                ref domain,
                ref addr,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(RecordType::A.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(4)?;

                buffer.write_u32(u32::from(*addr))?;
            }
            Record::AAAA {
                ref domain,
                ref addr,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(RecordType::AAAA.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(16)?;

                for segment in &addr.segments() {
                    buffer.write_u16(*segment)?;
                }
            }
            Record::NS {
                ref domain,
                ref host,
                ttl,
            } => {
                write_host_record(buffer, domain, RecordType::NS, None, host, ttl)?;
            }
            Record::CNAME {
                ref domain,
                ref host,
                ttl,
            } => {
                write_host_record(buffer, domain, RecordType::CNAME, None, host, ttl)?;
            }
            Record::PTR {
                ref domain,
                ref host,
                ttl,
            } => {
                write_host_record(buffer, domain, RecordType::PTR, None, host, ttl)?;
            }
            Record::MX {
                ref domain,
                priority,
                ref host,
                ttl,
            } => {
                write_host_record(buffer, domain, RecordType::MX, Some(priority), host, ttl)?;
            }
            Record::SOA {
                ref domain,
                ref mname,
                ref rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(RecordType::SOA.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let rdlen_pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(mname)?;
                buffer.write_qname(rname)?;
                buffer.write_u32(serial)?;
                buffer.write_u32(refresh)?;
                buffer.write_u32(retry)?;
                buffer.write_u32(expire)?;
                buffer.write_u32(minimum)?;

                let size = buffer.pos() - (rdlen_pos + 2);
                buffer.set_u16(rdlen_pos, size as u16)?;
            }
            Record::Unknown { .. } => {
                tracing::debug!("skipping unknown record: {self:?}");
            }
        }

        Ok(buffer.pos() - start_pos)
    }
}

/// NS/CNAME/PTR/MX share the name-in-rdata layout; the length field is
/// patched once the (possibly compressed) host name is written.
fn write_host_record(
    buffer: &mut PacketBuffer,
    domain: &str,
    qtype: RecordType,
    priority: Option<u16>,
    host: &str,
    ttl: u32,
) -> Result<(), WriterError> {
    buffer.write_qname(domain)?;
    buffer.write_u16(qtype.into_num())?;
    buffer.write_u16(1)?;
    buffer.write_u32(ttl)?;

    let rdlen_pos = buffer.pos();
    buffer.write_u16(0)?;

    if let Some(priority) = priority {
        buffer.write_u16(priority)?;
    }
    buffer.write_qname(host)?;

    let size = buffer.pos() - (rdlen_pos + 2);
    buffer.set_u16(rdlen_pos, size as u16)?;

    Ok(())
}
