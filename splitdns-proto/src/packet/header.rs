use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::PacketBuffer;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError = 0,
    /// Format error - The name server was unable to interpret the query.
    FormatError = 1,
    /// Server failure - The name server was unable to process this query due to a problem with the name server.
    ServerFailure = 2,
    /// Name Error - the domain name referenced in the query does not exist.
    /// Previously named NXDOMAIN
    NameError = 3,
    /// Not Implemented - The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// Refused - The name server refuses to perform the specified operation for policy reasons.
    Refused = 5,
    /// RFC 2136 - Some name that ought not to exist, does exist.
    YxDomain = 6,
    /// RFC 2136 - Some RRset that ought not to exist, does exist.
    YxRrSet = 7,
    /// RFC 2136 - Some RRset that ought to exist, does not exist.
    NxRrSet = 8,
    /// RFC 2136 - The server is not authoritative for the zone named in the Zone Section.
    NotAuth = 9,
    /// RFC 2136 - A name used in the Prerequisite or Update Section is not within the zone.
    NotZone = 10,
}

impl Default for ResponseCode {
    fn default() -> Self {
        Self::NoError
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::NoError),
            1 => Ok(ResponseCode::FormatError),
            2 => Ok(ResponseCode::ServerFailure),
            3 => Ok(ResponseCode::NameError),
            4 => Ok(ResponseCode::NotImplemented),
            5 => Ok(ResponseCode::Refused),
            6 => Ok(ResponseCode::YxDomain),
            7 => Ok(ResponseCode::YxRrSet),
            8 => Ok(ResponseCode::NxRrSet),
            9 => Ok(ResponseCode::NotAuth),
            10 => Ok(ResponseCode::NotZone),
            other => Err(ReaderError::InvalidResponseCode(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates the query,
    /// copied into the corresponding reply so the requester can match
    /// replies to outstanding queries.
    pub id: u16, // 16 bits

    /// RD Recursion Desired - this bit may be set in a query and is copied into the response.
    pub recursion_desired: bool, // 1 bit
    /// TC TrunCation - this message was truncated by the transmission channel.
    pub truncated_message: bool, // 1 bit
    /// AA Authoritative Answer - the responding name server is an authority
    /// for the domain name in the question section.
    pub authoritative_answer: bool, // 1 bit
    /// OPCODE - kind of query, set by the originator and copied into the
    /// response. 0 is a standard query.
    pub opcode: u8, // 4 bits
    /// QR - whether this message is a query (0) or a response (1).
    pub response: bool, // 1 bit

    /// Response code - set as part of responses.
    pub response_code: ResponseCode, // 4 bits
    pub checking_disabled: bool, // 1 bit
    pub authed_data: bool,       // 1 bit
    /// Z Reserved for future use. Must be zero in all queries and responses.
    pub z: bool, // 1 bit
    /// RA Recursion Available - set in a response when the server supports
    /// recursion.
    pub recursion_available: bool, // 1 bit

    /// QDCOUNT - number of entries in the question section.
    pub questions: u16,
    /// ANCOUNT - number of records in the answer section.
    pub answers: u16,
    /// NSCOUNT - number of records in the authority section.
    pub authoritative_entries: u16,
    /// ARCOUNT - number of records in the additional section.
    pub resource_entries: u16,
}

impl Header {
    pub fn question(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn response(id: u16) -> Self {
        Self {
            id,
            response: true,
            ..Default::default()
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,

            recursion_desired: false,
            truncated_message: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,

            questions: 0,
            answers: 0,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }
}

impl Header {
    /// Reads the first 12 bytes
    pub fn read(buffer: &mut PacketBuffer) -> Result<Self, ReaderError> {
        let id = buffer.read_u16()?;

        let head = buffer.read()?;
        let tail = buffer.read()?;

        Ok(Self {
            id,
            recursion_desired: (head & (1 << 0)) > 0,
            truncated_message: (head & (1 << 1)) > 0,
            authoritative_answer: (head & (1 << 2)) > 0,
            opcode: (head >> 3) & 0x0F,
            response: (head & (1 << 7)) > 0,
            response_code: ResponseCode::try_from(tail & 0x0F)?,
            checking_disabled: (tail & (1 << 4)) > 0,
            authed_data: (tail & (1 << 5)) > 0,
            z: (tail & (1 << 6)) > 0,
            recursion_available: (tail & (1 << 7)) > 0,
            questions: buffer.read_u16()?,
            answers: buffer.read_u16()?,
            authoritative_entries: buffer.read_u16()?,
            resource_entries: buffer.read_u16()?,
        })
    }

    pub fn write(&self, buffer: &mut PacketBuffer) -> Result<(), WriterError> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        buffer.write_u8(
            (self.response_code as u8)
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }
}
