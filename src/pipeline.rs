//! Analysis session: the one-call decode pipeline
//!
//! An [`AnalysisSession`] wires the detector, the registry and an
//! optional symbol table together behind a single
//! [`analyze`](AnalysisSession::analyze) entry point:
//!
//! ```text
//! RawTrace -> detect -> dispatch -> decode -> symbolicate -> TraceRecord
//! ```
//!
//! A session is one unit of analysis state: concurrent analyses each
//! own their own session. The symbol table is shared by `Arc` — it is
//! immutable after load, so sessions on different threads can point at
//! the same one without locking.

use crate::analysis::memory::{analyze_memory_events, MemoryReport};
use crate::config::AnalysisConfig;
use crate::decoders::{ExceptionLogDecoder, HardfaultLogDecoder, HciLogDecoder, MemoryTraceDecoder};
use crate::detect::FormatDetector;
use crate::error::Result;
use crate::registry::DecoderRegistry;
use crate::symbols::SymbolTable;
use crate::types::{MemoryEventSequence, RawTrace, TraceFormat, TraceRecord};
use std::sync::Arc;

/// Detector + registry + symbol table for one analysis session
pub struct AnalysisSession {
    detector: FormatDetector,
    registry: DecoderRegistry,
    symbols: Option<Arc<SymbolTable>>,
}

impl AnalysisSession {
    /// Build a session with decoders for the configured formats
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let detector = FormatDetector::for_formats(&config.formats)?;
        let mut registry = DecoderRegistry::new();
        for format in &config.formats {
            match format {
                TraceFormat::ExceptionLog => {
                    registry.register(Box::new(ExceptionLogDecoder::new()))?
                }
                TraceFormat::HardfaultLog => {
                    registry.register(Box::new(HardfaultLogDecoder::new(config.unwind)))?
                }
                TraceFormat::HciLog => registry.register(Box::new(HciLogDecoder::new(config.hci)))?,
                TraceFormat::MemoryTrace => {
                    registry.register(Box::new(MemoryTraceDecoder::new()))?
                }
            }
        }
        Ok(Self {
            detector,
            registry,
            symbols: None,
        })
    }

    /// Session with every format enabled and default settings
    pub fn with_defaults() -> Result<Self> {
        Self::new(AnalysisConfig::default())
    }

    /// Attach a symbol table (builder form)
    pub fn with_symbol_table(mut self, table: Arc<SymbolTable>) -> Self {
        self.set_symbol_table(table);
        self
    }

    /// Attach or replace the session's symbol table
    pub fn set_symbol_table(&mut self, table: Arc<SymbolTable>) {
        tracing::info!(symbols = table.len(), "symbol table attached to session");
        self.symbols = Some(table);
    }

    /// The attached symbol table, if any
    pub fn symbol_table(&self) -> Option<&SymbolTable> {
        self.symbols.as_deref()
    }

    /// Formats this session can decode, in detection-priority order
    pub fn formats(&self) -> Vec<TraceFormat> {
        self.registry.formats()
    }

    /// Classify and decode one capture into a resolved record
    ///
    /// A format declared on the capture bypasses detection; otherwise
    /// the detector classifies the header window. The record is fully
    /// populated or the call fails — never both.
    pub fn analyze(&self, raw: &RawTrace) -> Result<TraceRecord> {
        let format = match raw.declared_format() {
            Some(declared) => declared,
            None => self.detector.detect(raw)?,
        };
        let record = self.registry.decode(format, raw, self.symbols.as_deref())?;
        tracing::info!(%format, bytes = raw.len(), "capture decoded");
        Ok(record)
    }

    /// Run the leak/fragmentation analysis over a decoded event stream
    ///
    /// Call sites are symbolicated through the session's symbol table
    /// when one is attached.
    pub fn memory_report(&self, sequence: &MemoryEventSequence) -> MemoryReport {
        analyze_memory_events(&sequence.events, self.symbols.as_deref())
    }
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("formats", &self.formats())
            .field("symbols", &self.symbols.as_ref().map(|t| t.len()))
            .finish()
    }
}
