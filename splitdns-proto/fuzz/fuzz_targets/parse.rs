#![no_main]

use splitdns_proto::{DnsPacket, PacketBuffer};

libfuzzer_sys::fuzz_target!(|buffer: PacketBuffer| {
    let _ = DnsPacket::try_from(buffer);
});
