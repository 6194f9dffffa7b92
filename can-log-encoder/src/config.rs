//! Converter configuration types
//!
//! This module defines the knobs of the CSV parser and the BLF writer. The
//! defaults reproduce the plain six-column conversion: strict boolean flags,
//! the DLC column ignored, no cross-field checks, channel 1.

use serde::{Deserialize, Serialize};

/// How the IsExtendedID / IsRemoteFrame columns are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagParsing {
    /// Only "true"/"false" (any case) are accepted
    #[default]
    Strict,
    /// "true" (any case) is true, every other value is false
    Permissive,
}

/// Configuration for the converter library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Boolean column parsing mode
    #[serde(default)]
    pub flag_parsing: FlagParsing,

    /// Validate the DLC column against the payload length
    #[serde(default)]
    pub check_dlc: bool,

    /// Reject standard IDs above 0x7FF and remote frames carrying data
    #[serde(default)]
    pub check_frame_consistency: bool,

    /// BLF channel number written for every frame (1-based)
    #[serde(default = "default_channel")]
    pub channel: u16,

    /// Application ID stored in the BLF file header
    #[serde(default = "default_application_id")]
    pub application_id: u8,

    /// Buffered object bytes that trigger a log container flush
    #[serde(default = "default_max_container_size")]
    pub max_container_size: usize,
}

fn default_channel() -> u16 {
    1
}

fn default_application_id() -> u8 {
    5
}

fn default_max_container_size() -> usize {
    128 * 1024
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            flag_parsing: FlagParsing::default(),
            check_dlc: false,
            check_frame_consistency: false,
            channel: default_channel(),
            application_id: default_application_id(),
            max_container_size: default_max_container_size(),
        }
    }
}

impl ConverterConfig {
    /// Create a new converter configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set boolean column parsing mode
    pub fn with_flag_parsing(mut self, mode: FlagParsing) -> Self {
        self.flag_parsing = mode;
        self
    }

    /// Builder method: enable or disable DLC validation
    pub fn with_dlc_check(mut self, enabled: bool) -> Self {
        self.check_dlc = enabled;
        self
    }

    /// Builder method: enable or disable cross-field frame checks
    pub fn with_frame_consistency_check(mut self, enabled: bool) -> Self {
        self.check_frame_consistency = enabled;
        self
    }

    /// Builder method: set the BLF channel (0 is mapped to 1)
    pub fn with_channel(mut self, channel: u16) -> Self {
        self.channel = channel.max(1);
        self
    }

    /// Builder method: set the BLF application ID
    pub fn with_application_id(mut self, application_id: u8) -> Self {
        self.application_id = application_id;
        self
    }

    /// Builder method: set the log container flush threshold
    pub fn with_max_container_size(mut self, size: usize) -> Self {
        self.max_container_size = size;
        self
    }
}
