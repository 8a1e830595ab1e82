//! # firmtrace: firmware trace decoding and symbolication
//!
//! The analysis core of a desktop diagnostic workbench for embedded
//! devices. It ingests raw, device-produced byte captures — exception
//! dumps, hardfault crash blobs, Bluetooth HCI taps, allocator traces —
//! and turns them into verified, symbol-resolved, serializable records:
//! register dumps, reconstructed call stacks, packet timelines, leak
//! reports.
//!
//! ## Architecture
//!
//! - **Reader**: bounds-checked cursor every decoder reads through
//! - **Detector**: classifies a capture by its header window
//! - **Registry**: format tag to decoder dispatch, the extensibility point
//! - **Symbols**: immutable address-range table with ELF/DWARF loading
//! - **Unwinder**: best-effort frame-chain walks over stack snapshots
//! - **Worker**: runs sessions off an interactive shell's thread
//!
//! The core never does I/O of its own: callers load files and device
//! transfers into memory and hand buffers in, which keeps every decode
//! pure, cancellable by discarding the result, and trivially testable.
//!
//! ## Example
//!
//! ```ignore
//! use firmtrace::{AnalysisConfig, AnalysisSession, RawTrace};
//! use firmtrace::symbols::load_elf_symbols;
//! use std::sync::Arc;
//!
//! let elf = std::fs::read("firmware.elf")?;
//! let session = AnalysisSession::new(AnalysisConfig::default())?
//!     .with_symbol_table(Arc::new(load_elf_symbols(&elf)?));
//!
//! let capture = std::fs::read("hardfault.bin")?;
//! let record = session.analyze(&RawTrace::new(capture))?;
//! println!("{}", serde_json::to_string_pretty(&record)?);
//! ```

pub mod analysis;
pub mod config;
pub mod decoders;
pub mod detect;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod symbols;
pub mod types;
pub mod unwind;
pub mod worker;

// Re-export commonly used types
pub use analysis::memory::MemoryReport;
pub use config::{AnalysisConfig, HciLogOptions, UnwindConfig};
pub use error::{Result, TraceError};
pub use pipeline::AnalysisSession;
pub use symbols::{SymbolMatch, SymbolRange, SymbolTable};
pub use types::{RawTrace, TraceFormat, TraceRecord};
pub use unwind::{CallStack, FrameLayout, StackFrame};
pub use worker::{AnalysisCommand, AnalysisEvent, AnalysisWorker, WorkerHandle};
