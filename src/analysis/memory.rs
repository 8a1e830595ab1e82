//! Leak and fragmentation analysis over allocator event streams
//!
//! A single deterministic pass over the decoded [`MemoryEvent`]s
//! maintains the working set of outstanding allocations. Frees that hit
//! nothing are collected as anomalies — double frees and frees of
//! unknown addresses are diagnostic signal, not a reason to abort the
//! analysis. Whatever is still outstanding at the end of the stream is
//! reported as a potential leak with its original call site and age.
//!
//! O(n) in event count, O(log k) per event for the working-set lookup
//! where k is the number of currently outstanding allocations.

use crate::symbols::{SymbolMatch, SymbolTable};
use crate::types::{MemoryEvent, MemoryOp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A block still outstanding at the end of the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakEntry {
    /// Block address
    pub address: u32,
    /// Block size in bytes
    pub size: u32,
    /// Allocating call site, when the trace recorded one
    pub call_site: Option<u32>,
    /// Symbolicated call site, when a symbol table was available
    pub call_site_symbol: Option<SymbolMatch>,
    /// Time from allocation to the end of the stream, microseconds
    pub age_us: u64,
}

/// A sequencing violation observed during the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryAnomaly {
    /// A free hit an address with no outstanding allocation: either a
    /// double free or a free of something never traced
    DoubleFreeOrUnknownFree {
        /// Freed address
        address: u32,
        /// When the offending free happened, microseconds
        timestamp_us: u64,
    },
}

/// The analysis result handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryReport {
    /// Number of events analyzed
    pub event_count: usize,
    /// Bytes still allocated at the end of the stream
    pub total_outstanding_bytes: u64,
    /// Highest number of bytes simultaneously allocated
    pub peak_outstanding_bytes: u64,
    /// Outstanding blocks, largest first
    pub leaks: Vec<LeakEntry>,
    /// Sequencing violations, in event order
    pub anomalies: Vec<MemoryAnomaly>,
    /// Share of the live address span not covered by live blocks,
    /// 0.0 (contiguous) to 1.0; 0.0 when fewer than two blocks remain
    pub fragmentation: f64,
}

struct LiveAllocation {
    size: u32,
    timestamp_us: u64,
    call_site: Option<u32>,
}

/// Run the leak/fragmentation pass over an event stream
pub fn analyze_memory_events(
    events: &[MemoryEvent],
    symbols: Option<&SymbolTable>,
) -> MemoryReport {
    let mut working: BTreeMap<u32, LiveAllocation> = BTreeMap::new();
    let mut anomalies = Vec::new();
    let mut outstanding: u64 = 0;
    let mut peak: u64 = 0;
    let mut end_ts: u64 = 0;

    for event in events {
        end_ts = end_ts.max(event.timestamp_us);
        match event.op {
            MemoryOp::Alloc => {
                outstanding += event.size as u64;
                peak = peak.max(outstanding);
                working.insert(
                    event.address,
                    LiveAllocation {
                        size: event.size,
                        timestamp_us: event.timestamp_us,
                        call_site: event.call_site,
                    },
                );
            }
            MemoryOp::Free => match working.remove(&event.address) {
                Some(live) => outstanding -= live.size as u64,
                None => anomalies.push(MemoryAnomaly::DoubleFreeOrUnknownFree {
                    address: event.address,
                    timestamp_us: event.timestamp_us,
                }),
            },
        }
    }

    let fragmentation = live_fragmentation(&working);

    let mut leaks: Vec<LeakEntry> = working
        .into_iter()
        .map(|(address, live)| LeakEntry {
            address,
            size: live.size,
            call_site: live.call_site,
            call_site_symbol: live
                .call_site
                .zip(symbols)
                .and_then(|(site, table)| table.lookup(site as u64)),
            age_us: end_ts.saturating_sub(live.timestamp_us),
        })
        .collect();
    leaks.sort_by(|a, b| b.size.cmp(&a.size).then(a.address.cmp(&b.address)));

    if !leaks.is_empty() || !anomalies.is_empty() {
        tracing::warn!(
            leaks = leaks.len(),
            anomalies = anomalies.len(),
            outstanding,
            "memory analysis found issues"
        );
    }

    MemoryReport {
        event_count: events.len(),
        total_outstanding_bytes: outstanding,
        peak_outstanding_bytes: peak,
        leaks,
        anomalies,
        fragmentation,
    }
}

/// Gap share of the address span covered by the live working set
fn live_fragmentation(working: &BTreeMap<u32, LiveAllocation>) -> f64 {
    if working.len() < 2 {
        return 0.0;
    }
    // BTreeMap iterates in address order
    let (Some(&first), Some((&last_addr, last))) =
        (working.keys().next(), working.iter().next_back())
    else {
        return 0.0;
    };
    let span = (last_addr as u64 + last.size as u64).saturating_sub(first as u64);
    if span == 0 {
        return 0.0;
    }
    let live: u64 = working.values().map(|a| a.size as u64).sum();
    1.0 - (live.min(span) as f64 / span as f64)
}
