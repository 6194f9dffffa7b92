//! CAN Log Encoder Library
//!
//! Converts CSV tables of CAN frames into Vector BLF (Binary Logging Format)
//! files.
//!
//! # Architecture
//!
//! - The CSV parser turns each row into a [`FrameRecord`] or a
//!   [`RejectionReason`]; a bad row never affects its neighbours
//! - The BLF writer appends frames in input order as uncompressed log
//!   containers and seals the file header on close (or on drop)
//! - The BLF reader loads the frames back for verification
//!
//! # Example Usage
//!
//! ```no_run
//! use can_log_encoder::{Converter, ConverterConfig, FlagParsing};
//! use std::path::Path;
//!
//! let config = ConverterConfig::new()
//!     .with_flag_parsing(FlagParsing::Permissive)
//!     .with_channel(1);
//!
//! let report = Converter::with_config(config)
//!     .convert_files(Path::new("trace.csv"), Path::new("trace.blf"))
//!     .unwrap();
//!
//! println!("{} converted, {} rejected", report.converted, report.rejected);
//! for rejection in &report.rejections {
//!     eprintln!("{}", rejection);
//! }
//! ```

// Public modules
pub mod config;
pub mod converter;
pub mod formats;
pub mod parser;
pub mod types;

// Re-export main types for convenience
pub use config::{ConverterConfig, FlagParsing};
pub use converter::Converter;
pub use formats::{BlfReader, BlfWriter, FileStats, FrameSink};
pub use parser::{CsvFrameReader, RowOutcome};
pub use types::{
    ConversionReport, ConverterError, EncodeError, FrameRecord, LogSummary, ReadError,
    Rejection, RejectionReason, Result,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
