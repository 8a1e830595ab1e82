//! Call-stack reconstruction from raw stack memory
//!
//! Crash captures carry a snapshot of stack memory plus the register
//! values at the fault. [`Unwinder`] walks the saved frame chain through
//! that snapshot, resolving each program counter against the symbol
//! table as it goes.
//!
//! The walk is deliberately best-effort: corrupt captures are the
//! dominant real-world input, and a truncated stack is far more useful
//! for diagnosis than no stack. A candidate return address that falls
//! outside the symbol table's code bounds, or a frame pointer that
//! leaves the snapshot, stops the walk and marks the result
//! [`CallStack::truncated`] instead of failing the whole decode.
//!
//! Unwinding is pure: the same (PC, FP, snapshot, table) inputs always
//! produce the same stack, and the walk never exceeds the configured
//! depth bound.

use crate::reader::Endian;
use crate::symbols::{SymbolMatch, SymbolTable};
use serde::{Deserialize, Serialize};

/// Architecture-specific frame chain layout
///
/// Describes where a frame stores the saved frame pointer and return
/// address, relative to the frame pointer itself, and how wide a stack
/// word is. Supplied by the caller as configuration; the defaults match
/// the 32-bit little-endian targets the workbench ships for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Byte offset from the frame pointer to the saved caller FP
    pub saved_fp_offset: u64,
    /// Byte offset from the frame pointer to the saved return address
    pub return_addr_offset: u64,
    /// Stack word width in bytes (4 or 8)
    pub word_size: u8,
    /// Byte order of stack words
    pub endian: Endian,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            saved_fp_offset: 0,
            return_addr_offset: 4,
            word_size: 4,
            endian: Endian::Little,
        }
    }
}

/// A raw snapshot of stack memory anchored at a base address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSnapshot {
    /// Device address of the first snapshot byte
    pub base: u64,
    /// The captured bytes, ascending addresses
    pub data: Vec<u8>,
}

impl StackSnapshot {
    /// Wrap captured stack bytes
    pub fn new(base: u64, data: Vec<u8>) -> Self {
        Self { base, data }
    }

    /// One past the last captured address
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Read one stack word at a device address, `None` outside the snapshot
    pub fn read_word(&self, address: u64, layout: &FrameLayout) -> Option<u64> {
        let width = layout.word_size as u64;
        if address < self.base || address + width > self.end() {
            return None;
        }
        let off = (address - self.base) as usize;
        let bytes = &self.data[off..off + layout.word_size as usize];
        Some(match (layout.word_size, layout.endian) {
            (4, Endian::Little) => u32::from_le_bytes(bytes.try_into().ok()?) as u64,
            (4, Endian::Big) => u32::from_be_bytes(bytes.try_into().ok()?) as u64,
            (8, Endian::Little) => u64::from_le_bytes(bytes.try_into().ok()?),
            (8, Endian::Big) => u64::from_be_bytes(bytes.try_into().ok()?),
            _ => return None,
        })
    }
}

/// One reconstructed frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Frame index; 0 is the faulting (innermost) frame
    pub index: u32,
    /// Program counter for this frame
    pub pc: u64,
    /// Symbol match for the PC, when the table resolves it
    pub symbol: Option<SymbolMatch>,
}

/// Why the unwind walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnwindStop {
    /// A zero return address marked the stack base
    ReturnSentinel,
    /// The configured depth bound was reached
    DepthLimit,
    /// A candidate return address fell outside the known code bounds
    InvalidReturnAddress,
    /// The frame chain left the captured snapshot
    SnapshotExhausted,
}

/// An ordered call stack, innermost frame first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStack {
    /// Frames from the faulting PC outwards
    pub frames: Vec<StackFrame>,
    /// Why the walk stopped
    pub stopped: UnwindStop,
    /// True when the walk stopped on corruption rather than naturally
    pub truncated: bool,
}

impl CallStack {
    /// Multi-line display of the stack, one frame per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for frame in &self.frames {
            match &frame.symbol {
                Some(sym) => {
                    out.push_str(&format!("#{:<2} {:#010x} {}\n", frame.index, frame.pc, sym))
                }
                None => out.push_str(&format!(
                    "#{:<2} {:#010x} <unknown>\n",
                    frame.index, frame.pc
                )),
            }
        }
        if self.truncated {
            out.push_str("    (truncated)\n");
        }
        out
    }
}

/// Frame-chain walker over a stack snapshot
#[derive(Debug, Clone)]
pub struct Unwinder {
    layout: FrameLayout,
    max_depth: usize,
}

impl Unwinder {
    /// Create an unwinder for the given frame layout and depth bound
    pub fn new(layout: FrameLayout, max_depth: usize) -> Self {
        Self { layout, max_depth }
    }

    /// Reconstruct the call stack from the fault context
    ///
    /// Starts at `pc`/`fp`, reads each caller's saved return address and
    /// frame pointer out of the snapshot, and validates every candidate
    /// return address against the symbol table's code bounds. Always
    /// returns within `max_depth` iterations.
    pub fn unwind(
        &self,
        pc: u64,
        fp: u64,
        snapshot: &StackSnapshot,
        symbols: &SymbolTable,
    ) -> CallStack {
        let mut frames = Vec::new();
        let mut current_fp = fp;
        let mut stopped = UnwindStop::DepthLimit;

        frames.push(StackFrame {
            index: 0,
            pc,
            symbol: symbols.lookup(pc),
        });

        while frames.len() < self.max_depth {
            let saved_fp = snapshot.read_word(current_fp + self.layout.saved_fp_offset, &self.layout);
            let return_addr =
                snapshot.read_word(current_fp + self.layout.return_addr_offset, &self.layout);
            let (Some(next_fp), Some(ra)) = (saved_fp, return_addr) else {
                stopped = UnwindStop::SnapshotExhausted;
                break;
            };
            if ra == 0 {
                stopped = UnwindStop::ReturnSentinel;
                break;
            }
            if !symbols.contains_code_address(ra) {
                stopped = UnwindStop::InvalidReturnAddress;
                break;
            }
            frames.push(StackFrame {
                index: frames.len() as u32,
                pc: ra,
                symbol: symbols.lookup(ra),
            });
            // A frame chain must move toward the stack base; a stuck or
            // descending pointer would otherwise walk the same frame
            // until the depth bound.
            if next_fp <= current_fp {
                stopped = UnwindStop::SnapshotExhausted;
                break;
            }
            current_fp = next_fp;
        }

        let truncated = matches!(
            stopped,
            UnwindStop::InvalidReturnAddress | UnwindStop::SnapshotExhausted
        );
        if truncated {
            tracing::warn!(frames = frames.len(), ?stopped, "unwind truncated");
        }
        CallStack {
            frames,
            stopped,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolRange;

    fn symbols() -> SymbolTable {
        SymbolTable::from_ranges(vec![
            SymbolRange::new(0x0800_0000, 0x0800_0100, "fault_handler"),
            SymbolRange::new(0x0800_0100, 0x0800_0200, "middle"),
            SymbolRange::new(0x0800_0200, 0x0800_0300, "main"),
        ])
        .unwrap()
    }

    /// Snapshot with a two-deep frame chain ending at a zero sentinel.
    fn chained_snapshot() -> StackSnapshot {
        let base = 0x2000_0000u64;
        let mut data = vec![0u8; 64];
        // Frame at 0x2000_0000: saved FP -> 0x2000_0010, RA -> middle+0x10
        data[0..4].copy_from_slice(&0x2000_0010u32.to_le_bytes());
        data[4..8].copy_from_slice(&0x0800_0110u32.to_le_bytes());
        // Frame at 0x2000_0010: saved FP -> 0x2000_0020, RA -> main+0x20
        data[16..20].copy_from_slice(&0x2000_0020u32.to_le_bytes());
        data[20..24].copy_from_slice(&0x0800_0220u32.to_le_bytes());
        // Frame at 0x2000_0020: zero RA marks the stack base
        data[32..36].copy_from_slice(&0x2000_0030u32.to_le_bytes());
        data[36..40].copy_from_slice(&0u32.to_le_bytes());
        StackSnapshot::new(base, data)
    }

    #[test]
    fn test_unwind_full_chain() {
        let unwinder = Unwinder::new(FrameLayout::default(), 64);
        let stack = unwinder.unwind(0x0800_0040, 0x2000_0000, &chained_snapshot(), &symbols());
        assert_eq!(stack.frames.len(), 3);
        assert!(!stack.truncated);
        assert_eq!(stack.stopped, UnwindStop::ReturnSentinel);
        assert_eq!(
            stack.frames[0].symbol.as_ref().unwrap().name,
            "fault_handler"
        );
        assert_eq!(stack.frames[1].symbol.as_ref().unwrap().name, "middle");
        assert_eq!(stack.frames[1].symbol.as_ref().unwrap().offset, 0x10);
        assert_eq!(stack.frames[2].symbol.as_ref().unwrap().name, "main");
    }

    #[test]
    fn test_unwind_is_idempotent() {
        let unwinder = Unwinder::new(FrameLayout::default(), 64);
        let snapshot = chained_snapshot();
        let table = symbols();
        let first = unwinder.unwind(0x0800_0040, 0x2000_0000, &snapshot, &table);
        let second = unwinder.unwind(0x0800_0040, 0x2000_0000, &snapshot, &table);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unwind_invalid_return_address_truncates() {
        let base = 0x2000_0000u64;
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&0x2000_0008u32.to_le_bytes());
        // RA outside any known code range
        data[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let snapshot = StackSnapshot::new(base, data);

        let unwinder = Unwinder::new(FrameLayout::default(), 64);
        let stack = unwinder.unwind(0x0800_0040, base, &snapshot, &symbols());
        assert_eq!(stack.frames.len(), 1);
        assert!(stack.truncated);
        assert_eq!(stack.stopped, UnwindStop::InvalidReturnAddress);
    }

    #[test]
    fn test_unwind_frame_pointer_leaving_snapshot_truncates() {
        let unwinder = Unwinder::new(FrameLayout::default(), 64);
        // FP points below the snapshot base
        let stack = unwinder.unwind(0x0800_0040, 0x1000_0000, &chained_snapshot(), &symbols());
        assert_eq!(stack.frames.len(), 1);
        assert!(stack.truncated);
        assert_eq!(stack.stopped, UnwindStop::SnapshotExhausted);
    }

    #[test]
    fn test_unwind_respects_depth_bound() {
        // Self-referential chain: saved FP advances by 8 each frame and
        // every RA is valid, so only the depth bound can stop the walk.
        let base = 0x2000_0000u64;
        let mut data = vec![0u8; 8 * 256];
        for frame in 0..256u64 {
            let off = (frame * 8) as usize;
            let next_fp = base + (frame + 1) * 8;
            data[off..off + 4].copy_from_slice(&(next_fp as u32).to_le_bytes());
            data[off + 4..off + 8].copy_from_slice(&0x0800_0150u32.to_le_bytes());
        }
        let snapshot = StackSnapshot::new(base, data);

        let unwinder = Unwinder::new(FrameLayout::default(), 16);
        let stack = unwinder.unwind(0x0800_0040, base, &snapshot, &symbols());
        assert_eq!(stack.frames.len(), 16);
        assert_eq!(stack.stopped, UnwindStop::DepthLimit);
        assert!(!stack.truncated);
    }

    #[test]
    fn test_snapshot_word_reads() {
        let layout = FrameLayout::default();
        let snapshot = StackSnapshot::new(0x100, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(snapshot.read_word(0x100, &layout), Some(0x1234_5678));
        assert_eq!(snapshot.read_word(0x101, &layout), None);
        assert_eq!(snapshot.read_word(0xFF, &layout), None);
    }

    #[test]
    fn test_render_marks_truncation() {
        let stack = CallStack {
            frames: vec![StackFrame {
                index: 0,
                pc: 0x0800_0040,
                symbol: None,
            }],
            stopped: UnwindStop::InvalidReturnAddress,
            truncated: true,
        };
        let rendered = stack.render();
        assert!(rendered.contains("<unknown>"));
        assert!(rendered.contains("(truncated)"));
    }
}
