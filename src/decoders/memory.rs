//! Memory trace decoder
//!
//! The instrumented allocator streams its activity into a flash ring
//! which the workbench pulls off the device as one blob. Layout, all
//! integers little-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  magic "MTRC"
//!      4     2  format version
//!      6     4  device id
//!     10     4  event count
//!     14   22n  events
//! ```
//!
//! Each event: op u8 (1 alloc, 2 free), flags u8 (bit 0: call site
//! valid), address u32, size u32, call site u32, timestamp u64 (µs).
//!
//! Unlike live HCI taps the blob is written atomically by the device,
//! so a short buffer or an unknown op code is a structural violation,
//! not salvageable truncation.

use crate::error::{Result, TraceError};
use crate::reader::{ByteReader, Endian};
use crate::registry::TraceDecoder;
use crate::symbols::SymbolTable;
use crate::types::{
    MemoryEvent, MemoryEventSequence, MemoryOp, RawTrace, RecordHeader, TraceFormat, TraceRecord,
};

/// Magic marker opening every memory trace blob
pub const MEMORY_TRACE_MAGIC: &[u8; 4] = b"MTRC";

/// Newest blob version this decoder understands
pub const SUPPORTED_VERSION: u16 = 1;

/// Flag bit: the event's call-site field is valid
const FLAG_HAS_CALL_SITE: u8 = 0x01;

/// Decoder for binary allocator event streams
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTraceDecoder;

impl MemoryTraceDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TraceDecoder for MemoryTraceDecoder {
    fn format(&self) -> TraceFormat {
        TraceFormat::MemoryTrace
    }

    fn decode(&self, raw: &RawTrace, _symbols: Option<&SymbolTable>) -> Result<TraceRecord> {
        let mut r = ByteReader::new(raw.bytes());

        let magic = r.read_bytes(4).map_err(|e| e.tagged(self.format()))?;
        if magic != MEMORY_TRACE_MAGIC {
            return Err(TraceError::decode(self.format(), 0, "bad magic"));
        }
        let version = r.read_u16(Endian::Little).map_err(|e| e.tagged(self.format()))?;
        if version > SUPPORTED_VERSION {
            return Err(TraceError::UnsupportedVersion {
                format: self.format(),
                version,
                supported: SUPPORTED_VERSION,
            });
        }

        let inner = |r: &mut ByteReader<'_>| -> Result<(u32, Vec<MemoryEvent>)> {
            let device_id = r.read_u32(Endian::Little)?;
            let count = r.read_u32(Endian::Little)?;
            let mut events = Vec::with_capacity(count.min(1 << 20) as usize);
            for _ in 0..count {
                let op_offset = r.position();
                let op = match r.read_u8()? {
                    1 => MemoryOp::Alloc,
                    2 => MemoryOp::Free,
                    other => {
                        return Err(TraceError::decode(
                            TraceFormat::MemoryTrace,
                            op_offset,
                            format!("unknown allocator op {:#04x}", other),
                        ))
                    }
                };
                let flags = r.read_u8()?;
                let address = r.read_u32(Endian::Little)?;
                let size = r.read_u32(Endian::Little)?;
                let call_site = r.read_u32(Endian::Little)?;
                let timestamp_us = r.read_u64(Endian::Little)?;
                events.push(MemoryEvent {
                    op,
                    address,
                    size,
                    call_site: (flags & FLAG_HAS_CALL_SITE != 0).then_some(call_site),
                    timestamp_us,
                });
            }
            Ok((device_id, events))
        };
        let (device_id, events) = inner(&mut r).map_err(|e| e.tagged(self.format()))?;

        tracing::debug!(events = events.len(), "memory trace decoded");
        Ok(TraceRecord::Memory(MemoryEventSequence {
            header: RecordHeader {
                captured_at: raw.captured_at(),
                device_id: Some(device_id),
                format_version: version,
            },
            events,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) struct EventSpec {
        pub op: u8,
        pub flags: u8,
        pub address: u32,
        pub size: u32,
        pub call_site: u32,
        pub timestamp_us: u64,
    }

    pub(super) fn build_blob(events: &[EventSpec]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MEMORY_TRACE_MAGIC);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0x42u32.to_le_bytes());
        out.extend_from_slice(&(events.len() as u32).to_le_bytes());
        for e in events {
            out.push(e.op);
            out.push(e.flags);
            out.extend_from_slice(&e.address.to_le_bytes());
            out.extend_from_slice(&e.size.to_le_bytes());
            out.extend_from_slice(&e.call_site.to_le_bytes());
            out.extend_from_slice(&e.timestamp_us.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_decode_alloc_and_free() {
        let blob = build_blob(&[
            EventSpec {
                op: 1,
                flags: 1,
                address: 0x2000_1000,
                size: 64,
                call_site: 0x0800_0123,
                timestamp_us: 1_000,
            },
            EventSpec {
                op: 2,
                flags: 0,
                address: 0x2000_1000,
                size: 0,
                call_site: 0,
                timestamp_us: 2_000,
            },
        ]);
        let record = MemoryTraceDecoder::new()
            .decode(&RawTrace::new(blob), None)
            .unwrap();
        let TraceRecord::Memory(seq) = record else {
            panic!("expected memory record");
        };
        assert_eq!(seq.header.device_id, Some(0x42));
        assert_eq!(seq.events.len(), 2);
        assert_eq!(seq.events[0].op, MemoryOp::Alloc);
        assert_eq!(seq.events[0].call_site, Some(0x0800_0123));
        assert_eq!(seq.events[1].op, MemoryOp::Free);
        assert_eq!(seq.events[1].call_site, None);
    }

    #[test]
    fn test_unknown_op_fails_with_offset() {
        let mut blob = build_blob(&[EventSpec {
            op: 1,
            flags: 0,
            address: 0,
            size: 8,
            call_site: 0,
            timestamp_us: 0,
        }]);
        blob[14] = 9; // first event's op byte
        let err = MemoryTraceDecoder::new()
            .decode(&RawTrace::new(blob), None)
            .unwrap_err();
        match err {
            TraceError::DecodeFailed { offset, reason, .. } => {
                assert_eq!(offset, 14);
                assert!(reason.contains("0x09"));
            }
            other => panic!("expected DecodeFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_count_exceeding_buffer_fails() {
        let mut blob = build_blob(&[EventSpec {
            op: 1,
            flags: 0,
            address: 0,
            size: 8,
            call_site: 0,
            timestamp_us: 0,
        }]);
        blob[10..14].copy_from_slice(&5u32.to_le_bytes());
        let err = MemoryTraceDecoder::new()
            .decode(&RawTrace::new(blob), None)
            .unwrap_err();
        assert!(matches!(
            err,
            TraceError::DecodeFailed {
                format: TraceFormat::MemoryTrace,
                ..
            }
        ));
    }
}
