//! Format detection over capture headers
//!
//! The detector inspects a fixed-size window at the start of a capture
//! and declares which decoder applies. Binary formats carry a magic
//! marker at offset 0; the textual device logs are recognized by their
//! banner or line shape inside the window.
//!
//! Priority is longest-specific-first: binary magics are tested before
//! text shapes, longer magics before shorter ones. Magic overlap (one
//! magic a prefix of another) would make priority ambiguous, so it is
//! rejected when the detector is built rather than checked per call.

use crate::error::{Result, TraceError};
use crate::types::{RawTrace, TraceFormat};

/// Size of the header window the detector inspects
pub const HEADER_WINDOW: usize = 256;

/// How a format announces itself inside the header window
#[derive(Debug, Clone, Copy)]
enum SignatureRule {
    /// Exact byte marker at offset 0
    Magic(&'static [u8]),
    /// An `ERR:`+`EPC:` or `WDT_RST:` exception banner line
    ExceptionBanner,
    /// A `[hh:mm:ss.frac] KIND => ..` HCI tap line
    HciTapLine,
}

#[derive(Debug, Clone, Copy)]
struct Signature {
    format: TraceFormat,
    rule: SignatureRule,
}

fn signature_for(format: TraceFormat) -> Signature {
    let rule = match format {
        TraceFormat::HardfaultLog => SignatureRule::Magic(crate::decoders::hardfault::HARDFAULT_MAGIC),
        TraceFormat::MemoryTrace => SignatureRule::Magic(crate::decoders::memory::MEMORY_TRACE_MAGIC),
        TraceFormat::ExceptionLog => SignatureRule::ExceptionBanner,
        TraceFormat::HciLog => SignatureRule::HciTapLine,
    };
    Signature { format, rule }
}

/// Classifies captures by their header window
#[derive(Debug, Clone)]
pub struct FormatDetector {
    /// Signatures in match-priority order
    signatures: Vec<Signature>,
}

impl FormatDetector {
    /// Detector for every supported format
    pub fn new() -> Result<Self> {
        Self::for_formats(TraceFormat::all())
    }

    /// Detector for an enabled subset of formats
    ///
    /// Signatures are ordered by specificity regardless of the order
    /// formats are passed in: magics first (longest first), then text
    /// shapes.
    pub fn for_formats(formats: &[TraceFormat]) -> Result<Self> {
        let mut signatures: Vec<Signature> = formats.iter().copied().map(signature_for).collect();
        signatures.sort_by_key(|sig| match sig.rule {
            SignatureRule::Magic(magic) => (0, usize::MAX - magic.len()),
            SignatureRule::ExceptionBanner => (1, 0),
            SignatureRule::HciTapLine => (1, 1),
        });
        Self::verify_no_magic_overlap(&signatures)?;
        Ok(Self { signatures })
    }

    /// Reject magic sets where one marker is a prefix of another
    fn verify_no_magic_overlap(signatures: &[Signature]) -> Result<()> {
        let magics: Vec<(TraceFormat, &'static [u8])> = signatures
            .iter()
            .filter_map(|sig| match sig.rule {
                SignatureRule::Magic(magic) => Some((sig.format, magic)),
                _ => None,
            })
            .collect();
        for (i, (format_a, a)) in magics.iter().enumerate() {
            for (format_b, b) in &magics[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(TraceError::Config(format!(
                        "magic signatures for {} and {} overlap",
                        format_a, format_b
                    )));
                }
            }
        }
        Ok(())
    }

    /// Formats this detector can declare, in priority order
    pub fn formats(&self) -> Vec<TraceFormat> {
        self.signatures.iter().map(|sig| sig.format).collect()
    }

    /// Classify a capture, or fail with `DetectionFailed`
    pub fn detect(&self, raw: &RawTrace) -> Result<TraceFormat> {
        let bytes = raw.bytes();
        let window = &bytes[..bytes.len().min(HEADER_WINDOW)];

        for sig in &self.signatures {
            let matched = match sig.rule {
                SignatureRule::Magic(magic) => window.starts_with(magic),
                SignatureRule::ExceptionBanner => {
                    let text = String::from_utf8_lossy(window);
                    text.lines().any(|line| {
                        (line.contains("ERR:") && line.contains("EPC:"))
                            || line.contains("WDT_RST:")
                    })
                }
                SignatureRule::HciTapLine => {
                    let text = String::from_utf8_lossy(window);
                    text.lines().any(is_hci_tap_line)
                }
            };
            if matched {
                tracing::debug!(format = %sig.format, "capture classified");
                return Ok(sig.format);
            }
        }
        Err(TraceError::DetectionFailed)
    }
}

/// Shape check for one HCI tap line: `[ts] KIND arrow hex..`
fn is_hci_tap_line(line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return false;
    }
    parts[0].starts_with('[')
        && parts[0].ends_with(']')
        && matches!(parts[1], "CMD" | "ACL" | "SCO" | "EVT")
        && matches!(parts[2], "=>" | "<=")
        && parts[3..]
            .iter()
            .all(|p| u8::from_str_radix(p, 16).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(bytes: &[u8]) -> Result<TraceFormat> {
        FormatDetector::new().unwrap().detect(&RawTrace::new(bytes.to_vec()))
    }

    #[test]
    fn test_binary_magics() {
        assert_eq!(
            detect(b"HFLT\x01\x00rest").unwrap(),
            TraceFormat::HardfaultLog
        );
        assert_eq!(detect(b"MTRC\x01\x00rest").unwrap(), TraceFormat::MemoryTrace);
    }

    #[test]
    fn test_exception_banner() {
        assert_eq!(
            detect(b"boot ok\nERR:5 EPC:08012345\n0000").unwrap(),
            TraceFormat::ExceptionLog
        );
        assert_eq!(
            detect(b"WDT_RST: task=idle\n").unwrap(),
            TraceFormat::ExceptionLog
        );
    }

    #[test]
    fn test_hci_tap_line() {
        assert_eq!(
            detect(b"[00:00:02.740] CMD => 03 0c 00\n").unwrap(),
            TraceFormat::HciLog
        );
    }

    #[test]
    fn test_short_buffers_never_match() {
        for len in 0..4 {
            let err = detect(&b"HFLT"[..len]).unwrap_err();
            assert!(matches!(err, TraceError::DetectionFailed), "len {}", len);
        }
        assert!(matches!(detect(b"[00:"), Err(TraceError::DetectionFailed)));
    }

    #[test]
    fn test_unrecognized_input_fails() {
        assert!(matches!(
            detect(b"\x7fELF\x01\x01\x01\x00"),
            Err(TraceError::DetectionFailed)
        ));
        assert!(matches!(
            detect(b"random boot chatter\n"),
            Err(TraceError::DetectionFailed)
        ));
    }

    #[test]
    fn test_disabled_formats_do_not_match() {
        let detector = FormatDetector::for_formats(&[TraceFormat::HciLog]).unwrap();
        let raw = RawTrace::new(b"HFLT\x01\x00".to_vec());
        assert!(matches!(
            detector.detect(&raw),
            Err(TraceError::DetectionFailed)
        ));
    }

    #[test]
    fn test_formats_are_priority_ordered() {
        let detector = FormatDetector::new().unwrap();
        let formats = detector.formats();
        // Binary magics come before the text shapes
        assert_eq!(
            &formats[..2],
            &[TraceFormat::HardfaultLog, TraceFormat::MemoryTrace]
        );
    }
}
