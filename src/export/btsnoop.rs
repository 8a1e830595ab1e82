//! BTSnoop export for HCI captures
//!
//! Protocol analyzers (Wireshark, Frontline) ingest the BTSnoop capture
//! format, so the workbench exports framed tap logs as `.cfa` files.
//! File layout, record headers big-endian per the format:
//!
//! ```text
//! "btsnoop\0" | version=1 u32 | datalink=1002 (HCI UART) u32
//! per packet: original len u32 | included len u32 | flags u32 |
//!             cumulative drops u32 | timestamp u64 | H4 bytes
//! ```
//!
//! Timestamps are microseconds since year 0 AD; the constant below is
//! the offset of the Unix epoch on that axis.

use crate::types::{HciDirection, HciPacket, HciPacketKind, HciPacketSequence};
use std::io::{self, Write};

/// BTSnoop file identifier
pub const BTSNOOP_MAGIC: &[u8; 8] = b"btsnoop\0";

/// Format version written to the header
const BTSNOOP_VERSION: u32 = 1;

/// Datalink code for HCI UART (H4) captures
const DATALINK_HCI_UART: u32 = 1002;

/// Microseconds from year 0 AD to the Unix epoch
const UNIX_EPOCH_DELTA_US: u64 = 0x00DC_DDB3_0F2F_8000;

/// Serialize a framed capture into an in-memory BTSnoop file
pub fn to_btsnoop_bytes(sequence: &HciPacketSequence) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_btsnoop(sequence, &mut out);
    out
}

/// Write a framed capture as a BTSnoop file
pub fn write_btsnoop<W: Write>(sequence: &HciPacketSequence, w: &mut W) -> io::Result<()> {
    w.write_all(BTSNOOP_MAGIC)?;
    w.write_all(&BTSNOOP_VERSION.to_be_bytes())?;
    w.write_all(&DATALINK_HCI_UART.to_be_bytes())?;

    let base_us = sequence.header.captured_at.timestamp().max(0) as u64 * 1_000_000;
    for packet in &sequence.packets {
        let data = packet.to_h4_bytes();
        let timestamp = UNIX_EPOCH_DELTA_US + base_us + packet.timestamp_us.unwrap_or(0);
        w.write_all(&(data.len() as u32).to_be_bytes())?; // original length
        w.write_all(&(data.len() as u32).to_be_bytes())?; // included length
        w.write_all(&record_flags(packet).to_be_bytes())?;
        w.write_all(&0u32.to_be_bytes())?; // cumulative drops
        w.write_all(&timestamp.to_be_bytes())?;
        w.write_all(&data)?;
    }
    tracing::debug!(packets = sequence.packets.len(), "BTSnoop export written");
    Ok(())
}

/// BTSnoop record flags: bit 0 direction (1 = received), bit 1 channel
/// (1 = command/event)
fn record_flags(packet: &HciPacket) -> u32 {
    let channel = match packet.kind {
        HciPacketKind::Command | HciPacketKind::Event => 0x02,
        HciPacketKind::AclData | HciPacketKind::ScoData => 0x00,
    };
    let direction = match packet.direction.unwrap_or(match packet.kind {
        // Captures without direction metadata: commands can only go
        // out, events can only come in, data defaults to outgoing.
        HciPacketKind::Event => HciDirection::ControllerToHost,
        _ => HciDirection::HostToController,
    }) {
        HciDirection::HostToController => 0x00,
        HciDirection::ControllerToHost => 0x01,
    };
    channel | direction
}
