//! Format-specific trace decoders
//!
//! One decoder per [`TraceFormat`](crate::types::TraceFormat), each
//! turning a detected capture into a fully populated
//! [`TraceRecord`](crate::types::TraceRecord). Decoders are pure
//! functions of the capture buffer and an optional symbol table: they
//! retain nothing, so records can outlive both the buffer and the
//! decoder.
//!
//! Structural violations abort the decode with byte-offset context.
//! The HCI decoder is the exception to strictness: live captures are
//! routinely cut off mid-packet, so it returns everything framed before
//! the corruption and flags the sequence truncated instead.

pub mod exception;
pub mod hardfault;
pub mod hci;
pub mod memory;

pub use exception::ExceptionLogDecoder;
pub use hardfault::HardfaultLogDecoder;
pub use hci::{frame_h4_stream, FramedPackets, HciLogDecoder};
pub use memory::MemoryTraceDecoder;
