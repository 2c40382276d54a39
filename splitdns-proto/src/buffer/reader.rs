use std::fmt::Display;

use super::PacketBuffer;
use crate::name::{self, NameError};

#[derive(Debug, PartialEq, Eq)]
pub enum ReaderError {
    EndOfBuffer,
    MessageTooLarge(usize),
    /// A compressed name chased pointers for longer than the whole message.
    CompressionLoop,
    Name(NameError),
    NoQuestion,
    InvalidResponseCode(u8),
    InvalidClass(u16),
}

impl Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfBuffer => write!(f, "end of buffer"),
            Self::MessageTooLarge(size) => write!(f, "message of {size} bytes too large"),
            Self::CompressionLoop => write!(f, "compression pointer loop"),
            Self::Name(inner) => inner.fmt(f),
            Self::NoQuestion => write!(f, "no question section"),
            Self::InvalidResponseCode(code) => write!(f, "invalid response code {code}"),
            Self::InvalidClass(code) => write!(f, "invalid class {code}"),
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<NameError> for ReaderError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}

impl From<ReaderError> for std::io::Error {
    fn from(value: ReaderError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, value.to_string())
    }
}

impl PacketBuffer {
    /// Step the buffer position forward a specific number of steps
    pub fn step(&mut self, steps: usize) -> Result<(), ReaderError> {
        if self.pos + steps > self.len {
            return Err(ReaderError::EndOfBuffer);
        }
        self.pos += steps;

        Ok(())
    }

    /// Read a single byte and move the position one step forward
    pub fn read(&mut self) -> Result<u8, ReaderError> {
        if self.pos >= self.len {
            return Err(ReaderError::EndOfBuffer);
        }
        let res = self.buf[self.pos];
        self.pos += 1;

        Ok(res)
    }

    /// Get a single byte, without changing the buffer position
    fn get(&self, pos: usize) -> Result<u8, ReaderError> {
        if pos >= self.len {
            return Err(ReaderError::EndOfBuffer);
        }
        Ok(self.buf[pos])
    }

    /// Get a range of bytes
    pub fn get_range(&self, start: usize, len: usize) -> Result<&[u8], ReaderError> {
        let end = start + len;
        if end > self.len {
            return Err(ReaderError::EndOfBuffer);
        }
        Ok(&self.buf[start..end])
    }

    /// Read two bytes, stepping two steps forward
    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let res = ((self.read()? as u16) << 8) | (self.read()? as u16);

        Ok(res)
    }

    /// Read four bytes, stepping four steps forward
    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let res = ((self.read()? as u32) << 24)
            | ((self.read()? as u32) << 16)
            | ((self.read()? as u32) << 8)
            | (self.read()? as u32);

        Ok(res)
    }

    /// Read a possibly-compressed name and render it in canonical
    /// presentation form.
    pub fn read_qname(&mut self) -> Result<String, ReaderError> {
        let mut wire = [0u8; name::MAX_WIRE_LEN];
        let len = self.unpack_name(&mut wire)?;
        Ok(name::to_presentation(&wire[..len])?)
    }

    /// Expand the name at the current position into `dst`, following
    /// compression pointers. The cursor advances past the name as it appears
    /// in place (up to and including the first pointer).
    ///
    /// Packets are untrusted: a crafted message can form a pointer cycle.
    /// The cumulative count of bytes examined is capped at the message
    /// length, which any loop-free name satisfies.
    fn unpack_name(&mut self, dst: &mut [u8]) -> Result<usize, ReaderError> {
        let mut src = self.pos;
        let mut written = 0usize;
        let mut checked = 0usize;
        let mut end: Option<usize> = None;

        loop {
            let kind = self.get(src)?;
            src += 1;
            if kind == 0 {
                if written >= dst.len() {
                    return Err(NameError::TooLong.into());
                }
                dst[written] = 0;
                written += 1;
                break;
            }
            match kind & 0xC0 {
                0x00 | 0x40 => {
                    let data_len = name::label_len(&self.buf[src - 1..self.len])?;
                    if written + 1 + data_len >= dst.len() {
                        return Err(NameError::TooLong.into());
                    }
                    let data = self.get_range(src, data_len)?;
                    dst[written] = kind;
                    dst[written + 1..written + 1 + data_len].copy_from_slice(data);
                    written += 1 + data_len;
                    src += data_len;
                    checked += 1 + data_len;
                }
                0xC0 => {
                    let low = self.get(src)? as usize;
                    src += 1;
                    if end.is_none() {
                        end = Some(src);
                    }
                    let offset = ((kind as usize & 0x3F) << 8) | low;
                    if offset >= self.len {
                        return Err(ReaderError::EndOfBuffer);
                    }
                    src = offset;
                    checked += 2;
                    if checked >= self.len {
                        return Err(ReaderError::CompressionLoop);
                    }
                }
                other => return Err(NameError::IllegalLabel(other).into()),
            }
        }

        self.pos = end.unwrap_or(src);
        Ok(written)
    }
}
