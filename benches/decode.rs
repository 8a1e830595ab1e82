//! Decode and unwind benchmarks over synthetic captures

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use firmtrace::{AnalysisSession, RawTrace, SymbolRange, SymbolTable};
use std::sync::Arc;

fn build_symbols(functions: usize) -> SymbolTable {
    let ranges = (0..functions as u64)
        .map(|i| {
            SymbolRange::new(
                0x0800_0000 + i * 0x80,
                0x0800_0000 + (i + 1) * 0x80,
                format!("fn_{}", i),
            )
        })
        .collect();
    SymbolTable::from_ranges(ranges).unwrap()
}

fn build_hardfault_blob(frames: usize) -> Vec<u8> {
    let stack_base = 0x2000_0000u32;
    let stride = 16u32;
    let mut stack = vec![0u8; (frames + 1) * stride as usize];
    for i in 0..frames {
        let off = i * stride as usize;
        let next_fp = stack_base + (i as u32 + 1) * stride;
        stack[off..off + 4].copy_from_slice(&next_fp.to_le_bytes());
        stack[off + 4..off + 8].copy_from_slice(&(0x0800_0040 + i as u32 * 0x80).to_le_bytes());
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"HFLT");
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&0xC0FFEEu32.to_le_bytes());
    out.extend_from_slice(&90_000u64.to_le_bytes());
    for status in [0u32; 4] {
        out.extend_from_slice(&status.to_le_bytes());
    }
    for i in 0..13u32 {
        let value = if i == 7 { stack_base } else { i };
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&stack_base.to_le_bytes());
    out.extend_from_slice(&0xFFFF_FFF9u32.to_le_bytes());
    out.extend_from_slice(&0x0800_0010u32.to_le_bytes());
    out.extend_from_slice(&0x2100_0000u32.to_le_bytes());
    out.extend_from_slice(&stack_base.to_le_bytes());
    out.extend_from_slice(&(stack.len() as u32).to_le_bytes());
    out.extend_from_slice(&stack);
    out
}

fn build_h4_stream(packets: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..packets {
        match i % 3 {
            0 => out.extend_from_slice(&[0x01, 0x03, 0x0C, 0x00]),
            1 => out.extend_from_slice(&[0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]),
            _ => out.extend_from_slice(&[0x02, 0x40, 0x20, 0x03, 0x00, 0xAA, 0xBB, 0xCC]),
        }
    }
    out
}

fn bench_hardfault_decode_and_unwind(c: &mut Criterion) {
    let session = AnalysisSession::with_defaults()
        .unwrap()
        .with_symbol_table(Arc::new(build_symbols(512)));
    let blob = build_hardfault_blob(32);

    c.bench_function("hardfault_decode_unwind_32_frames", |b| {
        b.iter(|| {
            let raw = RawTrace::new(black_box(blob.clone()));
            black_box(session.analyze(&raw).unwrap())
        })
    });
}

fn bench_hci_framing(c: &mut Criterion) {
    let stream = build_h4_stream(10_000);
    c.bench_function("hci_frame_10k_packets", |b| {
        b.iter(|| black_box(firmtrace::decoders::frame_h4_stream(black_box(&stream))))
    });
}

fn bench_symbol_lookup(c: &mut Criterion) {
    let table = build_symbols(10_000);
    c.bench_function("symbol_lookup_10k_ranges", |b| {
        let mut addr = 0x0800_0000u64;
        b.iter(|| {
            addr = 0x0800_0000 + ((addr + 0x97) % (10_000 * 0x80));
            black_box(table.lookup(black_box(addr)))
        })
    });
}

criterion_group!(
    benches,
    bench_hardfault_decode_and_unwind,
    bench_hci_framing,
    bench_symbol_lookup
);
criterion_main!(benches);
