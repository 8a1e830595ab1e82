//! Common test utilities: synthetic capture builders
//!
//! Builders for device-shaped captures so integration tests exercise
//! the same byte layouts the decoders see in the field.

#![allow(dead_code)] // Test utilities may not all be used in every test file

use firmtrace::{SymbolRange, SymbolTable};

/// A symbol table shaped like a small firmware image
pub fn firmware_symbols() -> SymbolTable {
    SymbolTable::from_ranges(vec![
        SymbolRange::new(0x0800_0000, 0x0800_0100, "hardfault_handler")
            .with_location("fault.c", 12),
        SymbolRange::new(0x0800_0100, 0x0800_0200, "spi_transfer").with_location("spi.c", 88),
        SymbolRange::new(0x0800_0200, 0x0800_0300, "sensor_poll").with_location("sensor.c", 41),
        SymbolRange::new(0x0800_0300, 0x0800_0400, "main").with_location("main.c", 5),
    ])
    .unwrap()
}

/// A version-1 hardfault blob with the given fault context
pub fn build_hardfault_blob(pc: u32, r7: u32, stack_base: u32, stack: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"HFLT");
    out.extend_from_slice(&1u16.to_le_bytes()); // version
    out.extend_from_slice(&2u16.to_le_bytes()); // fault kind
    out.extend_from_slice(&0x00C0_FFEEu32.to_le_bytes()); // device id
    out.extend_from_slice(&90_000u64.to_le_bytes()); // uptime ms
    for status in [0x0000_8200u32, 0x4000_0000, 0, 0x2000_0040] {
        out.extend_from_slice(&status.to_le_bytes()); // cfsr hfsr mmfar bfar
    }
    for i in 0..13u32 {
        let value = if i == 7 { r7 } else { 0x1000 + i };
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&stack_base.to_le_bytes()); // sp
    out.extend_from_slice(&0xFFFF_FFF9u32.to_le_bytes()); // lr
    out.extend_from_slice(&pc.to_le_bytes());
    out.extend_from_slice(&0x2100_0003u32.to_le_bytes()); // xpsr
    out.extend_from_slice(&stack_base.to_le_bytes());
    out.extend_from_slice(&(stack.len() as u32).to_le_bytes());
    out.extend_from_slice(stack);
    out
}

/// A stack snapshot with a frame chain through the given return
/// addresses, terminated by a zero sentinel
pub fn build_frame_chain(base: u32, return_addrs: &[u32]) -> Vec<u8> {
    let frame_stride = 16u32;
    let total = (return_addrs.len() as u32 + 1) * frame_stride;
    let mut data = vec![0u8; total as usize];
    for (i, ra) in return_addrs.iter().enumerate() {
        let off = i as u32 * frame_stride;
        let next_fp = base + off + frame_stride;
        data[off as usize..off as usize + 4].copy_from_slice(&next_fp.to_le_bytes());
        data[off as usize + 4..off as usize + 8].copy_from_slice(&ra.to_le_bytes());
    }
    let last = return_addrs.len() as u32 * frame_stride;
    data[last as usize..last as usize + 4]
        .copy_from_slice(&(base + last + frame_stride).to_le_bytes());
    data[last as usize + 4..last as usize + 8].copy_from_slice(&0u32.to_le_bytes());
    data
}

/// One allocator event for [`build_memory_blob`]
pub struct MemoryEventSpec {
    pub is_alloc: bool,
    pub address: u32,
    pub size: u32,
    pub call_site: Option<u32>,
    pub timestamp_us: u64,
}

impl MemoryEventSpec {
    pub fn alloc(address: u32, size: u32, call_site: u32, timestamp_us: u64) -> Self {
        Self {
            is_alloc: true,
            address,
            size,
            call_site: Some(call_site),
            timestamp_us,
        }
    }

    pub fn free(address: u32, timestamp_us: u64) -> Self {
        Self {
            is_alloc: false,
            address,
            size: 0,
            call_site: None,
            timestamp_us,
        }
    }
}

/// A version-1 memory trace blob
pub fn build_memory_blob(events: &[MemoryEventSpec]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"MTRC");
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0x00C0_FFEEu32.to_le_bytes());
    out.extend_from_slice(&(events.len() as u32).to_le_bytes());
    for e in events {
        out.push(if e.is_alloc { 1 } else { 2 });
        out.push(if e.call_site.is_some() { 1 } else { 0 });
        out.extend_from_slice(&e.address.to_le_bytes());
        out.extend_from_slice(&e.size.to_le_bytes());
        out.extend_from_slice(&e.call_site.unwrap_or(0).to_le_bytes());
        out.extend_from_slice(&e.timestamp_us.to_le_bytes());
    }
    out
}

/// An exception log with a fault banner and a full 32-register dump
pub fn build_exception_log(epc: u32) -> String {
    let mut log = format!("boot: core up\nERR:5 EPC:{:08X}\n", epc);
    for chunk in (0..32u32).collect::<Vec<_>>().chunks(8) {
        let line: Vec<String> = chunk
            .iter()
            .map(|i| format!("{:08X}", 0x2000_0000 + i))
            .collect();
        log.push_str(&line.join(" "));
        log.push('\n');
    }
    log
}

/// An HCI tap log with `count` command/event line pairs
pub fn build_hci_tap_log(count: usize) -> String {
    let mut log = String::from("bt stack ready\n");
    for i in 0..count {
        log.push_str(&format!(
            "[00:00:{:02}.{:03}] CMD => 03 0c 00\n",
            i / 1000,
            i % 1000
        ));
        log.push_str(&format!(
            "[00:00:{:02}.{:03}] EVT <= 0e 04 01 03 0c 00\n",
            i / 1000,
            (i % 1000) + 1
        ));
    }
    log
}
