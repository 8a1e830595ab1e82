//! Exception log decoder
//!
//! The device prints an ASCII banner when an exception or watchdog
//! reset is recorded, followed by a whitespace-separated hex dump of
//! the general-purpose registers:
//!
//! ```text
//! ERR:5 EPC:81021C34
//! 00000000 08012345 20004FF0 ...
//! ```
//!
//! A fault banner (`ERR:` + `EPC:`) is followed by all 32 registers in
//! x0..x31 order. A watchdog banner (`WDT_RST:`) is followed by the
//! partial set the reset path saves: ra, tp and the t/s/a block up to
//! x17, then x28..x31. Unsaved slots stay `None` in the record.

use crate::error::{Result, TraceError};
use crate::registry::TraceDecoder;
use crate::symbols::SymbolTable;
use crate::types::{
    ExceptionKind, ExceptionRecord, RawTrace, RecordHeader, TraceFormat, TraceRecord,
};

/// Register slots the watchdog reset path saves, in dump order
const WDT_SAVED_SLOTS: [usize; 19] = [
    1, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 28, 29, 30, 31,
];

/// Decoder for ASCII exception banners and register dumps
#[derive(Debug, Default)]
pub struct ExceptionLogDecoder;

impl ExceptionLogDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TraceDecoder for ExceptionLogDecoder {
    fn format(&self) -> TraceFormat {
        TraceFormat::ExceptionLog
    }

    fn decode(&self, raw: &RawTrace, symbols: Option<&SymbolTable>) -> Result<TraceRecord> {
        let text = String::from_utf8_lossy(raw.bytes());

        let mut banner: Option<String> = None;
        let mut kind = ExceptionKind::Fault;
        let mut registers: [Option<u32>; 32] = [None; 32];
        // Remaining register slots to fill, in dump order
        let mut pending: &[usize] = &[];

        for line in text.split(['\r', '\n']) {
            if banner.is_some() {
                let mut tokens_ok = true;
                for token in line.split_whitespace() {
                    let Some(&slot) = pending.first() else {
                        break;
                    };
                    match u32::from_str_radix(token, 16) {
                        Ok(value) => {
                            registers[slot] = Some(value);
                            pending = &pending[1..];
                        }
                        Err(_) => {
                            tokens_ok = false;
                            break;
                        }
                    }
                }
                if pending.is_empty() {
                    break;
                }
                if tokens_ok {
                    continue;
                }
                // Corrupt dump: forget it and scan for the next banner
                tracing::debug!(?kind, "register dump interrupted, rescanning");
                banner = None;
                registers = [None; 32];
                pending = &[];
            }

            if line.contains("ERR:") && line.contains("EPC:") {
                banner = Some(line.to_string());
                kind = ExceptionKind::Fault;
                registers = [None; 32];
                pending = &FULL_SLOTS;
            } else if line.contains("WDT_RST:") {
                banner = Some(line.to_string());
                kind = ExceptionKind::WatchdogReset;
                registers = [None; 32];
                pending = &WDT_SAVED_SLOTS;
            }
        }

        let Some(banner) = banner else {
            return Err(TraceError::decode(
                TraceFormat::ExceptionLog,
                0,
                "no exception banner found",
            ));
        };
        if !pending.is_empty() {
            return Err(TraceError::decode(
                TraceFormat::ExceptionLog,
                raw.len(),
                format!("register dump incomplete ({} slots missing)", pending.len()),
            ));
        }

        let cause = parse_banner_field(&banner, "ERR:");
        let epc = parse_banner_field(&banner, "EPC:");

        let epc_symbol = epc
            .zip(symbols)
            .and_then(|(epc, table)| table.lookup(epc as u64));
        let ra_symbol = registers[1]
            .zip(symbols)
            .and_then(|(ra, table)| table.lookup(ra as u64));

        Ok(TraceRecord::Exception(ExceptionRecord {
            header: RecordHeader {
                captured_at: raw.captured_at(),
                device_id: None,
                format_version: 1,
            },
            banner,
            kind,
            cause,
            epc,
            registers,
            epc_symbol,
            ra_symbol,
        }))
    }
}

/// All 32 slots, x0..x31
const FULL_SLOTS: [usize; 32] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31,
];

/// Parse a `NAME:<hex>` field out of the banner line
fn parse_banner_field(banner: &str, name: &str) -> Option<u32> {
    let rest = &banner[banner.find(name)? + name.len()..];
    let token = rest.split_whitespace().next()?;
    let token = token.strip_prefix("0x").unwrap_or(token);
    u32::from_str_radix(token, 16).ok()
}
