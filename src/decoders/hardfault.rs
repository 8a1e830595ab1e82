//! Hardfault record decoder
//!
//! The fault handler writes a binary crash blob to flash before
//! resetting. Layout, all integers little-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  magic "HFLT"
//!      4     2  format version
//!      6     2  fault kind code
//!      8     4  device id
//!     12     8  uptime at capture (ms)
//!     20    16  CFSR, HFSR, MMFAR, BFAR
//!     36    52  r0..r12
//!     88    16  sp, lr, pc, xpsr
//!    104     4  stack snapshot base address
//!    108   4+n  length-prefixed stack snapshot
//! ```
//!
//! When a symbol table is available the decoder also reconstructs the
//! call stack from the snapshot, walking the r7 frame chain the
//! device's toolchain maintains.

use crate::config::UnwindConfig;
use crate::error::{Result, TraceError};
use crate::reader::{ByteReader, Endian};
use crate::registry::TraceDecoder;
use crate::symbols::SymbolTable;
use crate::types::{CortexRegisters, HardfaultRecord, RawTrace, RecordHeader, TraceFormat, TraceRecord};
use crate::unwind::{StackSnapshot, Unwinder};

/// Magic marker opening every hardfault blob
pub const HARDFAULT_MAGIC: &[u8; 4] = b"HFLT";

/// Newest blob version this decoder understands
pub const SUPPORTED_VERSION: u16 = 1;

/// Decoder for binary hardfault crash blobs
#[derive(Debug, Clone)]
pub struct HardfaultLogDecoder {
    unwind: UnwindConfig,
}

impl HardfaultLogDecoder {
    /// Create a decoder that unwinds with the given configuration
    pub fn new(unwind: UnwindConfig) -> Self {
        Self { unwind }
    }
}

impl Default for HardfaultLogDecoder {
    fn default() -> Self {
        Self::new(UnwindConfig::default())
    }
}

impl TraceDecoder for HardfaultLogDecoder {
    fn format(&self) -> TraceFormat {
        TraceFormat::HardfaultLog
    }

    fn decode(&self, raw: &RawTrace, symbols: Option<&SymbolTable>) -> Result<TraceRecord> {
        let mut r = ByteReader::new(raw.bytes());

        let magic = r.read_bytes(4).map_err(|e| e.tagged(self.format()))?;
        if magic != HARDFAULT_MAGIC {
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

        let inner = |r: &mut ByteReader<'_>| -> Result<(HardfaultRecord, u32)> {
            let fault_kind = r.read_u16(Endian::Little)?;
            let device_id = r.read_u32(Endian::Little)?;
            let uptime_ms = r.read_u64(Endian::Little)?;
            let cfsr = r.read_u32(Endian::Little)?;
            let hfsr = r.read_u32(Endian::Little)?;
            let mmfar = r.read_u32(Endian::Little)?;
            let bfar = r.read_u32(Endian::Little)?;

            let mut gp = [0u32; 13];
            for reg in gp.iter_mut() {
                *reg = r.read_u32(Endian::Little)?;
            }
            let sp = r.read_u32(Endian::Little)?;
            let lr = r.read_u32(Endian::Little)?;
            let pc = r.read_u32(Endian::Little)?;
            let xpsr = r.read_u32(Endian::Little)?;

            let stack_base = r.read_u32(Endian::Little)?;
            let snapshot_bytes = r.read_blob(Endian::Little)?;

            let registers = CortexRegisters {
                r: gp,
                sp,
                lr,
                pc,
                xpsr,
            };
            let record = HardfaultRecord {
                header: RecordHeader {
                    captured_at: raw.captured_at(),
                    device_id: Some(device_id),
                    format_version: version,
                },
                fault_kind,
                uptime_ms,
                cfsr,
                hfsr,
                mmfar,
                bfar,
                registers,
                stack: StackSnapshot::new(stack_base as u64, snapshot_bytes.to_vec()),
                call_stack: None,
            };
            Ok((record, gp[7]))
        };

        let (mut record, frame_pointer) = inner(&mut r).map_err(|e| e.tagged(self.format()))?;

        if let Some(table) = symbols {
            let unwinder = Unwinder::new(self.unwind.layout, self.unwind.max_depth);
            let stack = unwinder.unwind(
                record.registers.pc as u64,
                frame_pointer as u64,
                &record.stack,
                table,
            );
            tracing::info!(
                frames = stack.frames.len(),
                truncated = stack.truncated,
                "hardfault call stack reconstructed"
            );
            record.call_stack = Some(stack);
        }

        Ok(TraceRecord::Hardfault(record))
    }
}
