//! Analysis configuration
//!
//! The knobs a shell exposes to the user: which formats are enabled,
//! how the unwinder walks frames on the target architecture, and how
//! the HCI tap lines are wrapped by the firmware build. Persisted as a
//! TOML file next to the shell's own settings; every field has a
//! conservative default so a missing or partial file still yields a
//! working session.

use crate::error::{Result, TraceError};
use crate::types::TraceFormat;
use crate::unwind::FrameLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bound on reconstructed call-stack depth
pub const DEFAULT_MAX_UNWIND_DEPTH: usize = 64;

/// Stack unwinding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwindConfig {
    /// Maximum frames to reconstruct before stopping
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Target architecture's frame chain layout
    #[serde(default)]
    pub layout: FrameLayout,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_UNWIND_DEPTH
}

impl Default for UnwindConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_UNWIND_DEPTH,
            layout: FrameLayout::default(),
        }
    }
}

/// Firmware-build-specific wrapping of the HCI tap lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HciLogOptions {
    /// Fixed number of prefix characters to drop from every line
    #[serde(default)]
    pub skip_chars: u32,
    /// Strip a leading `(hh:mm:ss.mmm)` wrapper timestamp
    #[serde(default)]
    pub strip_parenthesized_ts: bool,
}

/// Top-level analysis session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Formats the session registers decoders for
    #[serde(default = "default_formats")]
    pub formats: Vec<TraceFormat>,
    /// Unwinder settings
    #[serde(default)]
    pub unwind: UnwindConfig,
    /// HCI tap line options
    #[serde(default)]
    pub hci: HciLogOptions,
}

fn default_formats() -> Vec<TraceFormat> {
    TraceFormat::all().to_vec()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            unwind: UnwindConfig::default(),
            hci: HciLogOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text)
            .map_err(|e| TraceError::Config(format!("failed to parse config: {}", e)))
    }

    /// Save the configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| TraceError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }
}
