//! Decoder registry
//!
//! Maps each [`TraceFormat`] to the decoder bound to it. The registry is
//! the crate's extensibility point: adding a format means implementing
//! [`TraceDecoder`] and registering it — callers iterate
//! [`DecoderRegistry::formats`] instead of hardcoding the list.
//!
//! Registration refuses duplicate tags; there is no silent override.
//! Errors escaping a decoder are tagged with the format so the caller
//! always knows which decode failed and where.

use crate::error::{Result, TraceError};
use crate::symbols::SymbolTable;
use crate::types::{RawTrace, TraceFormat, TraceRecord};
use std::collections::HashMap;

/// A format-specific decoder
///
/// Implementations must be pure: a decoder reads the capture through
/// the buffer it is handed, resolves addresses through the symbol table
/// it is handed, and retains neither beyond the call.
pub trait TraceDecoder: Send + Sync {
    /// The format tag this decoder handles
    fn format(&self) -> TraceFormat;

    /// Decode a capture into a fully populated record
    fn decode(&self, raw: &RawTrace, symbols: Option<&SymbolTable>) -> Result<TraceRecord>;
}

/// Format tag to decoder mapping
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<TraceFormat, Box<dyn TraceDecoder>>,
}

impl DecoderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a decoder to its format tag
    ///
    /// Fails with `DuplicateDecoder` when the tag is already bound.
    pub fn register(&mut self, decoder: Box<dyn TraceDecoder>) -> Result<()> {
        let format = decoder.format();
        if self.decoders.contains_key(&format) {
            return Err(TraceError::DuplicateDecoder(format));
        }
        self.decoders.insert(format, decoder);
        Ok(())
    }

    /// Whether a decoder is bound to the format
    pub fn contains(&self, format: TraceFormat) -> bool {
        self.decoders.contains_key(&format)
    }

    /// Registered formats, in detection-priority order
    pub fn formats(&self) -> Vec<TraceFormat> {
        TraceFormat::all()
            .iter()
            .copied()
            .filter(|f| self.decoders.contains_key(f))
            .collect()
    }

    /// Dispatch a capture to the decoder bound to `format`
    pub fn decode(
        &self,
        format: TraceFormat,
        raw: &RawTrace,
        symbols: Option<&SymbolTable>,
    ) -> Result<TraceRecord> {
        let decoder = self
            .decoders
            .get(&format)
            .ok_or(TraceError::DecoderUnavailable(format))?;
        decoder.decode(raw, symbols).map_err(|e| e.tagged(format))
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}
