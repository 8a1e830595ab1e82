//! Core data types for firmtrace
//!
//! This module contains the data model shared by the whole pipeline:
//! raw ingested captures, the closed set of supported trace formats, and
//! the fully decoded record types handed to the presentation layer.
//!
//! # Main Types
//!
//! - [`TraceFormat`] - Closed enum of the supported capture classes
//! - [`RawTrace`] - An immutable ingested byte capture
//! - [`TraceRecord`] - Tagged union over the decoded record kinds
//! - [`ExceptionRecord`] / [`HardfaultRecord`] - Crash captures with
//!   register dumps and (for hardfaults) a reconstructed call stack
//! - [`HciPacketSequence`] - Framed Bluetooth HCI traffic
//! - [`MemoryEventSequence`] - Allocator activity for leak analysis
//!
//! # Ownership
//!
//! All record types are value-like: the pipeline builds them, the caller
//! owns them. No record keeps a reference into the raw capture buffer,
//! so a record outlives the decode call that produced it and can cross
//! thread boundaries freely. Every record kind serializes with serde so
//! the shell can persist or display it without touching the core again.

use crate::symbols::SymbolMatch;
use crate::unwind::{CallStack, StackSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of trace capture classes the engine understands
///
/// Adding a format means adding a variant here, a signature in the
/// detector, and a decoder in the registry. Nothing else enumerates the
/// formats: shells iterate whatever the registry has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceFormat {
    /// ASCII exception banner plus general-purpose register dump
    ExceptionLog,
    /// Binary hardfault crash blob written to flash by the fault handler
    HardfaultLog,
    /// Bluetooth HCI traffic captured from the device's UART tap
    HciLog,
    /// Binary allocator event stream
    MemoryTrace,
}

impl TraceFormat {
    /// All supported formats, in detection-priority order
    pub fn all() -> &'static [TraceFormat] {
        &[
            TraceFormat::HardfaultLog,
            TraceFormat::MemoryTrace,
            TraceFormat::ExceptionLog,
            TraceFormat::HciLog,
        ]
    }
}

impl std::fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceFormat::ExceptionLog => write!(f, "ExceptionLog"),
            TraceFormat::HardfaultLog => write!(f, "HardfaultLog"),
            TraceFormat::HciLog => write!(f, "HciLog"),
            TraceFormat::MemoryTrace => write!(f, "MemoryTrace"),
        }
    }
}

/// An ingested capture: immutable bytes plus ingestion metadata
///
/// The caller performs all I/O; the core only ever sees an in-memory
/// buffer. The buffer is never mutated and is owned by exactly one
/// decode call at a time.
#[derive(Debug, Clone)]
pub struct RawTrace {
    bytes: Vec<u8>,
    /// Format declared by the caller, bypassing detection when set
    declared_format: Option<TraceFormat>,
    /// When the capture was taken (falls back to ingestion time)
    captured_at: DateTime<Utc>,
}

impl RawTrace {
    /// Wrap a capture buffer, stamping it with the current time
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            declared_format: None,
            captured_at: Utc::now(),
        }
    }

    /// Declare the format up front, skipping signature detection
    pub fn with_format(mut self, format: TraceFormat) -> Self {
        self.declared_format = Some(format);
        self
    }

    /// Override the capture timestamp (e.g. from file metadata)
    pub fn with_captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }

    /// The raw capture bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Caller-declared format, if any
    pub fn declared_format(&self) -> Option<TraceFormat> {
        self.declared_format
    }

    /// Capture timestamp
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Capture size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the capture is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Metadata common to every decoded record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// When the capture was taken
    pub captured_at: DateTime<Utc>,
    /// Device identifier, when the format carries one
    pub device_id: Option<u32>,
    /// Format version of the decoded record
    pub format_version: u16,
}

/// A fully decoded, symbol-resolved trace record
///
/// Decode either fully succeeds and yields one of these, or fails and
/// yields nothing: no variant is ever partially populated.
#[derive(Debug, Clone, Serialize)]
pub enum TraceRecord {
    /// Decoded exception banner and register dump
    Exception(ExceptionRecord),
    /// Decoded hardfault blob with optional reconstructed call stack
    Hardfault(HardfaultRecord),
    /// Framed HCI packet sequence
    Hci(HciPacketSequence),
    /// Decoded allocator event sequence
    Memory(MemoryEventSequence),
}

impl TraceRecord {
    /// The format this record was decoded from
    pub fn format(&self) -> TraceFormat {
        match self {
            TraceRecord::Exception(_) => TraceFormat::ExceptionLog,
            TraceRecord::Hardfault(_) => TraceFormat::HardfaultLog,
            TraceRecord::Hci(_) => TraceFormat::HciLog,
            TraceRecord::Memory(_) => TraceFormat::MemoryTrace,
        }
    }

    /// The common record header
    pub fn header(&self) -> &RecordHeader {
        match self {
            TraceRecord::Exception(r) => &r.header,
            TraceRecord::Hardfault(r) => &r.header,
            TraceRecord::Hci(r) => &r.header,
            TraceRecord::Memory(r) => &r.header,
        }
    }
}

/// ABI names of the RISC-V general-purpose registers, x0 through x31
pub const RISCV_REG_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// What kind of exception the device reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionKind {
    /// Synchronous fault: the banner carries a cause code and EPC
    Fault,
    /// Watchdog reset: only a partial register set is saved
    WatchdogReset,
}

/// Decoded exception banner and register dump
///
/// The watchdog path saves only part of the register file, so register
/// slots are optional; `None` means the device did not save that slot.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionRecord {
    /// Common record metadata
    pub header: RecordHeader,
    /// The raw banner line the dump started with
    pub banner: String,
    /// Fault or watchdog reset
    pub kind: ExceptionKind,
    /// Cause code parsed from the banner, when present
    pub cause: Option<u32>,
    /// Exception program counter parsed from the banner, when present
    pub epc: Option<u32>,
    /// x0..x31 in index order; `None` for slots the device did not save
    pub registers: [Option<u32>; 32],
    /// Symbolicated EPC, when a symbol table was available
    pub epc_symbol: Option<SymbolMatch>,
    /// Symbolicated return address (x1), when available
    pub ra_symbol: Option<SymbolMatch>,
}

impl ExceptionRecord {
    /// Iterate saved registers as (ABI name, value) pairs
    pub fn saved_registers(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        self.registers
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (RISCV_REG_NAMES[i], v)))
    }
}

/// The Cortex-M register file captured by the hardfault handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CortexRegisters {
    /// r0 through r12
    pub r: [u32; 13],
    /// Stack pointer at the fault
    pub sp: u32,
    /// Link register at the fault
    pub lr: u32,
    /// Program counter at the fault
    pub pc: u32,
    /// Program status register at the fault
    pub xpsr: u32,
}

/// Decoded hardfault crash blob
#[derive(Debug, Clone, Serialize)]
pub struct HardfaultRecord {
    /// Common record metadata
    pub header: RecordHeader,
    /// Device-specific fault kind code
    pub fault_kind: u16,
    /// Device uptime at capture, milliseconds
    pub uptime_ms: u64,
    /// Configurable fault status register
    pub cfsr: u32,
    /// Hardfault status register
    pub hfsr: u32,
    /// MemManage fault address register
    pub mmfar: u32,
    /// Bus fault address register
    pub bfar: u32,
    /// Captured register file
    pub registers: CortexRegisters,
    /// Raw stack memory snapshot taken by the fault handler
    pub stack: StackSnapshot,
    /// Call stack reconstructed from the snapshot, when a symbol table
    /// was available at decode time
    pub call_stack: Option<CallStack>,
}

/// Bluetooth HCI packet classes, per the H4 transport type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HciPacketKind {
    /// Host-to-controller command (H4 type 0x01)
    Command,
    /// ACL data in either direction (H4 type 0x02)
    AclData,
    /// SCO data in either direction (H4 type 0x03)
    ScoData,
    /// Controller-to-host event (H4 type 0x04)
    Event,
}

impl HciPacketKind {
    /// The H4 transport type byte for this packet kind
    pub fn h4_byte(&self) -> u8 {
        match self {
            HciPacketKind::Command => 0x01,
            HciPacketKind::AclData => 0x02,
            HciPacketKind::ScoData => 0x03,
            HciPacketKind::Event => 0x04,
        }
    }

    /// Map an H4 transport type byte to a packet kind
    pub fn from_h4(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(HciPacketKind::Command),
            0x02 => Some(HciPacketKind::AclData),
            0x03 => Some(HciPacketKind::ScoData),
            0x04 => Some(HciPacketKind::Event),
            _ => None,
        }
    }
}

impl std::fmt::Display for HciPacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HciPacketKind::Command => write!(f, "CMD"),
            HciPacketKind::AclData => write!(f, "ACL"),
            HciPacketKind::ScoData => write!(f, "SCO"),
            HciPacketKind::Event => write!(f, "EVT"),
        }
    }
}

/// Transfer direction of an HCI packet, when the capture records it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HciDirection {
    /// Host to controller (logged as `=>`)
    HostToController,
    /// Controller to host (logged as `<=`)
    ControllerToHost,
}

/// One framed HCI packet
///
/// `body` holds everything after the H4 type byte (the type-specific
/// header plus parameters), so the original wire bytes can always be
/// reconstructed as `[kind.h4_byte()] + body`. Opcode, handle and event
/// code are parsed out for filtering; deeper protocol decoding is the
/// presentation layer's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HciPacket {
    /// Packet class
    pub kind: HciPacketKind,
    /// Command opcode (commands only)
    pub opcode: Option<u16>,
    /// Connection handle (ACL and SCO data only)
    pub handle: Option<u16>,
    /// Event code (events only)
    pub event_code: Option<u8>,
    /// Type-specific header plus parameter bytes
    pub body: Vec<u8>,
    /// Transfer direction, when the capture records it
    pub direction: Option<HciDirection>,
    /// Capture-relative timestamp in microseconds, when recorded
    pub timestamp_us: Option<u64>,
}

impl HciPacket {
    /// Reassemble the packet's H4 wire bytes
    pub fn to_h4_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.body.len());
        out.push(self.kind.h4_byte());
        out.extend_from_slice(&self.body);
        out
    }
}

/// A framed HCI capture, in arrival order
#[derive(Debug, Clone, Serialize)]
pub struct HciPacketSequence {
    /// Common record metadata
    pub header: RecordHeader,
    /// Packets in arrival order
    pub packets: Vec<HciPacket>,
    /// True when framing stopped early on a malformed length; the
    /// packets preceding the corruption are still valid
    pub truncated: bool,
}

/// Allocator operations recorded by the memory trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryOp {
    /// A block was allocated
    Alloc,
    /// A block was freed
    Free,
}

/// One allocator event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Operation kind
    pub op: MemoryOp,
    /// Block address
    pub address: u32,
    /// Block size in bytes (zero for frees)
    pub size: u32,
    /// Address of the allocating/freeing call site, when recorded
    pub call_site: Option<u32>,
    /// Device-relative timestamp in microseconds
    pub timestamp_us: u64,
}

/// A decoded allocator event stream, in event order
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEventSequence {
    /// Common record metadata
    pub header: RecordHeader,
    /// Events in device order
    pub events: Vec<MemoryEvent>,
}
