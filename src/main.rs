//! firmtrace command-line shell
//!
//! Loads a capture file, runs it through an analysis session, and
//! prints the decoded record as a human summary or JSON. This is the
//! minimal shell around the core; the desktop workbench drives the same
//! [`AnalysisSession`] API.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use firmtrace::analysis::memory::MemoryReport;
use firmtrace::export::write_btsnoop;
use firmtrace::symbols::load_elf_symbols;
use firmtrace::{AnalysisConfig, AnalysisSession, RawTrace, TraceRecord};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "firmtrace", version, about = "Decode firmware trace captures")]
struct Args {
    /// Capture file to analyze
    trace: PathBuf,

    /// Firmware ELF to load symbols from
    #[arg(long)]
    elf: Option<PathBuf>,

    /// Analysis configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the decoded record as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Write an HCI capture out as a BTSnoop file
    #[arg(long)]
    btsnoop: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let mut session = AnalysisSession::new(config)?;
    if let Some(elf_path) = &args.elf {
        let elf = std::fs::read(elf_path)
            .with_context(|| format!("failed to read ELF {}", elf_path.display()))?;
        session.set_symbol_table(Arc::new(load_elf_symbols(&elf)?));
    }

    let bytes = std::fs::read(&args.trace)
        .with_context(|| format!("failed to read capture {}", args.trace.display()))?;
    let captured_at = std::fs::metadata(&args.trace)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let raw = RawTrace::new(bytes).with_captured_at(captured_at);

    let record = session.analyze(&raw)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_summary(&session, &record);
    }

    if let Some(path) = &args.btsnoop {
        match &record {
            TraceRecord::Hci(sequence) => {
                let mut file = std::fs::File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                write_btsnoop(sequence, &mut file)?;
                println!("wrote {} packets to {}", sequence.packets.len(), path.display());
            }
            other => {
                tracing::warn!(
                    format = %other.format(),
                    "--btsnoop only applies to HCI captures"
                );
            }
        }
    }

    Ok(())
}

fn print_summary(session: &AnalysisSession, record: &TraceRecord) {
    match record {
        TraceRecord::Exception(rec) => {
            println!("exception: {}", rec.banner);
            if let Some(sym) = &rec.epc_symbol {
                println!("  epc: {}", sym);
            } else if let Some(epc) = rec.epc {
                println!("  epc: {:#010x}", epc);
            }
            if let Some(sym) = &rec.ra_symbol {
                println!("  ra:  {}", sym);
            }
            for (name, value) in rec.saved_registers() {
                println!("  {:<4} {:#010x}", name, value);
            }
        }
        TraceRecord::Hardfault(rec) => {
            println!(
                "hardfault: kind {} at pc {:#010x} (uptime {} ms)",
                rec.fault_kind, rec.registers.pc, rec.uptime_ms
            );
            println!(
                "  cfsr {:#010x}  hfsr {:#010x}  mmfar {:#010x}  bfar {:#010x}",
                rec.cfsr, rec.hfsr, rec.mmfar, rec.bfar
            );
            match &rec.call_stack {
                Some(stack) => print!("{}", stack.render()),
                None => println!("  (no symbols loaded; pass --elf to unwind)"),
            }
        }
        TraceRecord::Hci(sequence) => {
            println!(
                "hci capture: {} packets{}",
                sequence.packets.len(),
                if sequence.truncated { " (truncated)" } else { "" }
            );
            for packet in &sequence.packets {
                let id = packet
                    .opcode
                    .map(|op| format!("opcode {:#06x}", op))
                    .or_else(|| packet.handle.map(|h| format!("handle {:#06x}", h)))
                    .or_else(|| packet.event_code.map(|e| format!("event {:#04x}", e)))
                    .unwrap_or_default();
                println!(
                    "  {} {} len {}",
                    packet.kind,
                    id,
                    packet.body.len()
                );
            }
        }
        TraceRecord::Memory(sequence) => {
            let report: MemoryReport = session.memory_report(sequence);
            println!(
                "memory trace: {} events, {} bytes outstanding (peak {})",
                report.event_count, report.total_outstanding_bytes, report.peak_outstanding_bytes
            );
            for leak in &report.leaks {
                let site = leak
                    .call_site_symbol
                    .as_ref()
                    .map(|s| s.to_string())
                    .or_else(|| leak.call_site.map(|s| format!("{:#010x}", s)))
                    .unwrap_or_else(|| "<unknown>".to_string());
                println!(
                    "  leak {:#010x}: {} bytes, age {} us, from {}",
                    leak.address, leak.size, leak.age_us, site
                );
            }
            for anomaly in &report.anomalies {
                match anomaly {
                    firmtrace::analysis::memory::MemoryAnomaly::DoubleFreeOrUnknownFree {
                        address,
                        timestamp_us,
                    } => println!(
                        "  anomaly: free of {:#010x} at {} us hit no allocation",
                        address, timestamp_us
                    ),
                }
            }
            println!("  fragmentation: {:.1}%", report.fragmentation * 100.0);
        }
    }
}
