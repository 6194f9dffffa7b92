//! Log file formats (BLF)
//!
//! This module contains the BLF writer that serializes frame records and the
//! reader that loads them back.

use crate::types::{EncodeError, FrameRecord};
use std::io::{Seek, Write};

pub mod blf;
pub mod blf_reader;

// Re-export format types
pub use blf::{BlfWriter, SysTime};
pub use blf_reader::{BlfReader, FileStats};

/// Destination for converted frames
///
/// Frames are appended in call order; implementations never reorder or
/// rewrite them.
pub trait FrameSink {
    /// Append one frame to the log
    fn append(&mut self, frame: &FrameRecord) -> Result<(), EncodeError>;
}

impl<W: Write + Seek> FrameSink for BlfWriter<W> {
    fn append(&mut self, frame: &FrameRecord) -> Result<(), EncodeError> {
        BlfWriter::append(self, frame)
    }
}
