//! Symbol table for address-to-name resolution
//!
//! A [`SymbolTable`] is an ordered set of non-overlapping address ranges
//! mapping to function name, source file and line. It is built once per
//! analysis session from an external debug-info source — either
//! already-structured ranges from any provider, or an ELF artifact via
//! [`elf::load_elf_symbols`] — and is immutable afterwards, so it can be
//! shared read-only across concurrent analyses without locking.
//!
//! Lookup is a binary search over the sorted ranges: O(log n) per
//! address, O(n log n) to build.

pub mod elf;

pub use elf::{demangle_name, load_elf_symbols};

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};

/// One address range covered by a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRange {
    /// First address covered by the symbol
    pub start: u64,
    /// One past the last covered address
    pub end: u64,
    /// Demangled symbol name
    pub name: String,
    /// Source file, when debug info carries it
    pub file: Option<String>,
    /// Source line, when debug info carries it
    pub line: Option<u32>,
}

impl SymbolRange {
    /// A range with no source location
    pub fn new(start: u64, end: u64, name: impl Into<String>) -> Self {
        Self {
            start,
            end,
            name: name.into(),
            file: None,
            line: None,
        }
    }

    /// Attach a source location
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// A successful symbol lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMatch {
    /// Demangled symbol name
    pub name: String,
    /// Source file, when known
    pub file: Option<String>,
    /// Source line, when known
    pub line: Option<u32>,
    /// Byte offset of the looked-up address from the symbol start
    pub offset: u64,
}

impl std::fmt::Display for SymbolMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.offset == 0 {
            write!(f, "{}", self.name)?;
        } else {
            write!(f, "{}+{:#x}", self.name, self.offset)?;
        }
        if let Some(ref file) = self.file {
            write!(f, " ({}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Sorted, non-overlapping symbol ranges with binary-search lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    ranges: Vec<SymbolRange>,
}

impl SymbolTable {
    /// An empty table; every lookup resolves to `None`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from ranges in any order
    ///
    /// The ranges are sorted by start address and then verified: an
    /// empty range or any overlap fails with `InvalidSymbolMap`.
    /// Overlap is always an error, never resolved by priority.
    pub fn from_ranges(mut ranges: Vec<SymbolRange>) -> Result<Self> {
        ranges.sort_by_key(|r| r.start);
        for r in &ranges {
            if r.start >= r.end {
                return Err(TraceError::InvalidSymbolMap(format!(
                    "empty range for symbol {} ({:#x}..{:#x})",
                    r.name, r.start, r.end
                )));
            }
        }
        for pair in ranges.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(TraceError::InvalidSymbolMap(format!(
                    "symbol {} ({:#x}..{:#x}) overlaps {} ({:#x}..{:#x})",
                    pair[0].name,
                    pair[0].start,
                    pair[0].end,
                    pair[1].name,
                    pair[1].start,
                    pair[1].end
                )));
            }
        }
        tracing::info!(symbols = ranges.len(), "symbol table built");
        Ok(Self { ranges })
    }

    /// Resolve an address to the symbol range containing it
    ///
    /// Returns the symbol plus the byte offset from the range start, or
    /// `None` when no range contains the address.
    pub fn lookup(&self, address: u64) -> Option<SymbolMatch> {
        // Index of the first range starting after `address`; the
        // candidate is the one before it.
        let idx = self.ranges.partition_point(|r| r.start <= address);
        let range = self.ranges[..idx].last()?;
        if address >= range.end {
            return None;
        }
        Some(SymbolMatch {
            name: range.name.clone(),
            file: range.file.clone(),
            line: range.line,
            offset: address - range.start,
        })
    }

    /// The span of known code addresses, for return-address validation
    ///
    /// `None` when the table is empty.
    pub fn code_bounds(&self) -> Option<(u64, u64)> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some((first.start, last.end))
    }

    /// Whether an address lies inside the known code bounds
    pub fn contains_code_address(&self, address: u64) -> bool {
        match self.code_bounds() {
            Some((lo, hi)) => address >= lo && address < hi,
            None => false,
        }
    }

    /// Number of ranges in the table
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the table has no ranges
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The sorted ranges
    pub fn ranges(&self) -> &[SymbolRange] {
        &self.ranges
    }
}
