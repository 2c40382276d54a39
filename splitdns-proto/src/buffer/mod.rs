pub mod reader;
pub mod writer;

pub use reader::ReaderError;
pub use writer::WriterError;

use std::collections::HashMap;

/// Largest DNS message handled, over UDP or a length-prefixed TCP stream.
/// The transport truncates anything longer before it reaches the codec.
pub const MAX_MESSAGE_SIZE: usize = 2048;

/// Fixed-size packet buffer with a read/write cursor.
///
/// Decoding is bounded by the length of the received message, encoding by the
/// buffer capacity. The `compress_index` maps name suffixes already written
/// to their offsets so later names can point at them.
#[cfg_attr(feature = "fuzzing", derive(Debug))]
pub struct PacketBuffer {
    pub buf: [u8; MAX_MESSAGE_SIZE],
    len: usize,
    pos: usize,
    compress_index: HashMap<Vec<u8>, usize>,
}

impl Default for PacketBuffer {
    /// A fresh buffer for encoding a packet.
    fn default() -> Self {
        Self {
            buf: [0; MAX_MESSAGE_SIZE],
            len: 0,
            pos: 0,
            compress_index: HashMap::new(),
        }
    }
}

impl PacketBuffer {
    /// Wrap a received message for decoding.
    pub fn from_slice(src: &[u8]) -> Result<Self, ReaderError> {
        if src.len() > MAX_MESSAGE_SIZE {
            return Err(ReaderError::MessageTooLarge(src.len()));
        }
        let mut buffer = Self::default();
        buffer.buf[..src.len()].copy_from_slice(src);
        buffer.len = src.len();
        Ok(buffer)
    }

    /// Current position within the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Length of the message held in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The encoded/received message bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

#[cfg(feature = "fuzzing")]
impl<'a> arbitrary::Arbitrary<'a> for PacketBuffer {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let data = u.arbitrary::<&[u8]>()?;
        let len = data.len().min(MAX_MESSAGE_SIZE);
        Ok(Self::from_slice(&data[..len]).expect("len is capped"))
    }
}
