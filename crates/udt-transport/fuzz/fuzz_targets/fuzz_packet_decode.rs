#![no_main]

use libfuzzer_sys::fuzz_target;
use udt_transport::wire::{ControlBody, Packet};

/// Fuzz the datagram decoder.
///
/// Decoding must never panic. Anything that decodes must encode again, and a
/// NAK's loss information must expand without blowing up.
fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    let Ok(packet) = Packet::decode(&mut buf) else {
        return;
    };
    if let Packet::Control(ctrl) = &packet {
        if let ControlBody::Nak(nak) = &ctrl.body {
            let _ = nak.decoded_loss_info();
        }
    }
    let _ = packet.encode();
});
