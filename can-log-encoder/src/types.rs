//! Core types for the CAN log encoder library
//!
//! This module defines the records that flow from the CSV parser into the BLF
//! writer, the per-run conversion report, and the error types of the library.
//! Row-level problems are [`RejectionReason`]s and never abort a run; the
//! [`ConverterError`] and [`EncodeError`] types are fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type for converter operations
pub type Result<T> = std::result::Result<T, ConverterError>;

/// Largest identifier representable in the 11-bit standard format
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest identifier representable in the 29-bit extended format
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum payload of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Latest timestamp (seconds since the Unix epoch) whose nanosecond count
/// fits in a `u64`, around the year 2554
pub const MAX_TIMESTAMP: f64 = 18_446_744_073.0;

/// True for timestamps a BLF object can carry without loss of range
pub fn timestamp_in_range(timestamp: f64) -> bool {
    (0.0..=MAX_TIMESTAMP).contains(&timestamp)
}

/// A single CAN frame as read from one CSV row
///
/// The data length code is never stored; it is always `payload.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Absolute timestamp in seconds
    pub timestamp: f64,
    /// CAN arbitration ID (11-bit or 29-bit)
    pub arbitration_id: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// True if this is a remote frame
    pub is_remote_frame: bool,
    /// Frame data bytes (0-8 bytes)
    pub payload: Vec<u8>,
}

impl FrameRecord {
    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Width of the identifier space selected by the extended flag
    pub fn id_bits(&self) -> u8 {
        if self.is_extended {
            29
        } else {
            11
        }
    }
}

impl fmt::Display for FrameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended {
            write!(f, "({:.6}) {:08X}", self.timestamp, self.arbitration_id)?;
        } else {
            write!(f, "({:.6}) {:03X}", self.timestamp, self.arbitration_id)?;
        }
        if self.is_remote_frame {
            return write!(f, "#R{}", self.dlc());
        }
        write!(f, "#{}", hex::encode_upper(&self.payload))
    }
}

/// Why a single CSV row was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind")]
pub enum RejectionReason {
    #[error("missing columns: expected 6, found {found}")]
    MissingColumns { found: usize },

    #[error("invalid timestamp '{value}'")]
    InvalidTimestamp { value: String },

    #[error("invalid arbitration ID '{value}'")]
    InvalidArbitrationId { value: String },

    #[error("invalid boolean flag '{value}' in column {column}")]
    InvalidBooleanFlag { column: usize, value: String },

    #[error("invalid payload hex '{value}'")]
    InvalidPayloadHex { value: String },

    #[error("payload of {len} bytes exceeds 8 bytes")]
    PayloadTooLong { len: usize },

    #[error("DLC '{value}' does not match payload length {len}")]
    DlcMismatch { value: String, len: usize },

    #[error("arbitration ID 0x{id:X} does not fit the 11-bit standard format")]
    IdExceedsStandardRange { id: u32 },

    #[error("remote frame carries {len} data bytes")]
    RemoteFrameWithData { len: usize },
}

/// A rejected row with its diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Line number in the input file (the header is line 1)
    pub row: u64,
    /// Why the row was rejected
    pub reason: RejectionReason,
    /// The trimmed fields of the row
    pub content: Vec<String>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Skipping row {} due to {}. Row: {:?}",
            self.row, self.reason, self.content
        )
    }
}

/// Statistics of a finalized BLF file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    /// Number of CAN objects written
    pub object_count: u32,
    /// Timestamp of the first object, if any
    pub first_timestamp: Option<f64>,
    /// Timestamp of the last object, if any
    pub last_timestamp: Option<f64>,
    /// Total size of the file in bytes
    pub file_size: u64,
}

/// Outcome of a full conversion run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Header fields of the input, echoed verbatim
    pub header: Vec<String>,
    /// Rows successfully converted and written
    pub converted: usize,
    /// Rows dropped
    pub rejected: usize,
    /// One entry per dropped row, in input order
    pub rejections: Vec<Rejection>,
    /// Statistics of the written file
    pub summary: LogSummary,
}

impl ConversionReport {
    /// Total number of data rows seen
    pub fn rows(&self) -> usize {
        self.converted + self.rejected
    }
}

/// Errors raised by the BLF writer
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("BLF sink failure: {0}")]
    SinkFailure(#[from] std::io::Error),

    #[error("BLF writer is in a failed state after an earlier sink failure")]
    Failed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Errors raised while reading a BLF file
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid BLF signature: {0:?}")]
    BadSignature([u8; 4]),

    #[error("Invalid object signature at offset {0}")]
    BadObjectSignature(u64),

    #[error("Unsupported container compression method {0}")]
    UnsupportedCompression(u16),

    #[error("Malformed object: {0}")]
    Malformed(String),
}

/// Fatal errors of a conversion run
#[derive(Debug, thiserror::Error)]
pub enum ConverterError {
    #[error("Input CSV file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("CSV file is empty or contains only a header.")]
    EmptyInput,

    #[error("CSV file contains no data rows after the header.")]
    NoDataRows,

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
