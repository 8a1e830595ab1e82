//! Analyses over decoded trace records
//!
//! Decoders produce structured event data; the analyses here turn that
//! data into the reports the workbench actually shows. Each analysis is
//! a pure, single-pass function over a decoded record.

pub mod memory;

pub use memory::{analyze_memory_events, LeakEntry, MemoryAnomaly, MemoryReport};
