pub mod buffer;
pub mod message;
pub mod name;
pub mod packet;

pub use buffer::{PacketBuffer, ReaderError, WriterError, MAX_MESSAGE_SIZE};
pub use packet::{DnsPacket, RecordType};
