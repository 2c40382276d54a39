use super::RecordType;
use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::PacketBuffer;

/// CLASS fields appear in questions and resource records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum DnsClass {
    /// IN - the Internet
    Internet = 1,
    /// CS - the CSNET class (Obsolete - used only for examples in some obsolete RFCs)
    Csnet = 2,
    /// CH - the CHAOS class
    Chaos = 3,
    /// HS - Hesiod [Dyer 87]
    Hesiod = 4,
    /// NONE - RFC 2136 prerequisite sections
    None = 254,
    /// ANY (QCLASS only)
    Any = 255,
}

impl Default for DnsClass {
    fn default() -> Self {
        Self::Internet
    }
}

impl TryFrom<u16> for DnsClass {
    type Error = ReaderError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Internet),
            2 => Ok(Self::Csnet),
            3 => Ok(Self::Chaos),
            4 => Ok(Self::Hesiod),
            254 => Ok(Self::None),
            255 => Ok(Self::Any),
            other => Err(ReaderError::InvalidClass(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    /// QNAME in canonical presentation form.
    pub name: String,
    /// QTYPE - the type of the query.
    pub qtype: RecordType,
    /// QCLASS - the class of the query, IN for the Internet.
    pub qclass: DnsClass,
}

impl Question {
    pub fn new(name: String, qtype: RecordType) -> Self {
        Self {
            name,
            qtype,
            qclass: Default::default(),
        }
    }

    pub fn read(buffer: &mut PacketBuffer) -> Result<Self, ReaderError> {
        let name = buffer.read_qname()?;
        let qtype = RecordType::from_num(buffer.read_u16()?);
        let qclass = DnsClass::try_from(buffer.read_u16()?)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, buffer: &mut PacketBuffer) -> Result<(), WriterError> {
        buffer.write_qname(&self.name)?;
        buffer.write_u16(self.qtype.into_num())?;
        buffer.write_u16(self.qclass as u16)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DnsClass, Question};
    use crate::buffer::PacketBuffer;
    use crate::packet::RecordType;

    #[test]
    fn should_roundtrip_question() {
        let question = Question::new("example.com".into(), RecordType::SOA);
        let mut buffer = PacketBuffer::default();
        question.write(&mut buffer).unwrap();

        let mut decoder = PacketBuffer::from_slice(buffer.bytes()).unwrap();
        assert_eq!(Question::read(&mut decoder).unwrap(), question);
    }

    #[test]
    fn should_reject_unknown_class() {
        let mut buffer = PacketBuffer::default();
        buffer.write_qname("example.com").unwrap();
        buffer.write_u16(1).unwrap();
        buffer.write_u16(42).unwrap();

        let mut decoder = PacketBuffer::from_slice(buffer.bytes()).unwrap();
        let error = Question::read(&mut decoder).unwrap_err();
        assert_eq!(error, crate::buffer::ReaderError::InvalidClass(42));
    }
}
