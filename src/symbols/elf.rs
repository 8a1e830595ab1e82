//! ELF/DWARF symbol loader
//!
//! Loads function ranges from an ELF debug artifact: addresses and sizes
//! from the symbol table via `object`, source file and line from the
//! DWARF line program via `gimli`, names demangled for both Rust and
//! C++ toolchains.
//!
//! Line info is best-effort: a stripped ELF still yields usable name
//! ranges, just without file/line attribution. Aliased symbols (two
//! names at one address) and overlapping size claims are normalized
//! before the table is built, since [`SymbolTable::from_ranges`] treats
//! any remaining overlap as a hard error.

use crate::error::{Result, TraceError};
use crate::symbols::{SymbolRange, SymbolTable};
use cpp_demangle::Symbol as CppSymbol;
use gimli::{EndianRcSlice, Reader, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use std::borrow::Cow;
use std::rc::Rc;

type DwarfReader = EndianRcSlice<RunTimeEndian>;

/// Load a symbol table from an in-memory ELF image
pub fn load_elf_symbols(data: &[u8]) -> Result<SymbolTable> {
    let obj = object::File::parse(data)
        .map_err(|e| TraceError::InvalidSymbolMap(format!("failed to parse ELF: {}", e)))?;

    let mut ranges: Vec<SymbolRange> = obj
        .symbols()
        .filter(|sym| sym.kind() == SymbolKind::Text && sym.size() > 0)
        .filter_map(|sym| {
            let name = sym.name().ok()?;
            Some(SymbolRange::new(
                sym.address(),
                sym.address() + sym.size(),
                demangle_name(name),
            ))
        })
        .collect();
    ranges = normalize_function_ranges(ranges);

    match load_line_rows(&obj) {
        Ok(rows) => attach_source_locations(&mut ranges, &rows),
        Err(e) => {
            tracing::warn!("no line info from DWARF: {}", e);
        }
    }

    tracing::info!(functions = ranges.len(), "loaded ELF symbols");
    SymbolTable::from_ranges(ranges)
}

/// Demangle a Rust or C++ symbol name, passing plain names through
pub fn demangle_name(name: &str) -> String {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return format!("{:#}", demangled);
    }
    if name.starts_with("_Z") || name.starts_with("__Z") {
        if let Ok(sym) = CppSymbol::new(name) {
            return sym.to_string();
        }
    }
    name.to_string()
}

/// Drop aliases and clamp overlapping size claims
///
/// Linkers routinely emit several names for one address and sizes that
/// spill into the next function's padding. The first name per address
/// wins and each range is clipped at the next function's start, which
/// keeps the result loadable by the strict table constructor.
fn normalize_function_ranges(mut ranges: Vec<SymbolRange>) -> Vec<SymbolRange> {
    ranges.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let before = ranges.len();
    ranges.dedup_by_key(|r| r.start);
    let mut next_start = u64::MAX;
    for r in ranges.iter_mut().rev() {
        if r.end > next_start {
            r.end = next_start;
        }
        next_start = r.start;
    }
    ranges.retain(|r| r.start < r.end);
    if ranges.len() < before {
        tracing::debug!(dropped = before - ranges.len(), "normalized aliased symbols");
    }
    ranges
}

/// One resolved line-program row: (address, file, line)
type LineRow = (u64, Option<String>, Option<u32>);

fn load_line_rows(obj: &object::File<'_>) -> std::result::Result<Vec<LineRow>, gimli::Error> {
    let endian = if obj.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let load_section = |id: gimli::SectionId| -> std::result::Result<DwarfReader, gimli::Error> {
        let data = obj
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[][..]));
        Ok(EndianRcSlice::new(Rc::from(&*data), endian))
    };

    let dwarf = gimli::Dwarf::load(load_section)?;

    let mut rows: Vec<LineRow> = Vec::new();
    let mut units = dwarf.units();
    while let Some(header) = units.next()? {
        let unit = dwarf.unit(header)?;
        let Some(program) = unit.line_program.clone() else {
            continue;
        };
        let (program, sequences) = program.sequences()?;
        for sequence in &sequences {
            let mut sm = program.resume_from(sequence);
            while let Some((header, row)) = sm.next_row()? {
                if row.end_sequence() {
                    continue;
                }
                let file = row
                    .file(header)
                    .and_then(|f| dwarf.attr_string(&unit, f.path_name()).ok())
                    .and_then(|s| s.to_string_lossy().ok().map(|c| c.into_owned()));
                let line = row.line().map(|l| l.get() as u32);
                rows.push((row.address(), file, line));
            }
        }
    }
    rows.sort_by_key(|(addr, _, _)| *addr);
    Ok(rows)
}

/// Attach the file/line of each function's entry address
fn attach_source_locations(ranges: &mut [SymbolRange], rows: &[LineRow]) {
    for range in ranges.iter_mut() {
        let idx = rows.partition_point(|(addr, _, _)| *addr <= range.start);
        if let Some((addr, file, line)) = rows[..idx].last() {
            // Only accept a row inside the function itself
            if *addr >= range.start && *addr < range.end {
                range.file = file.clone();
                range.line = *line;
            }
        }
    }
}
