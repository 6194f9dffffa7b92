//! CSV record parser
//!
//! Converts the rows of a six-column CAN table into [`FrameRecord`]s:
//!
//! ```text
//! Timestamp,ArbitrationID,IsExtendedID,IsRemoteFrame,DLC,Data
//! 1678886400.123,10A,False,False,8,0102AABB00000000
//! 1678886400.456,1A2B3C4D,True,False,,DEADBEEF
//! ```
//!
//! The first line is a header and is discarded without validation. Every
//! following row is converted independently; a row that fails conversion is
//! reported as a [`RejectionReason`] and never affects its neighbours.

use crate::config::{ConverterConfig, FlagParsing};
use crate::types::{
    timestamp_in_range, ConverterError, FrameRecord, Rejection, RejectionReason, Result,
    MAX_EXTENDED_ID, MAX_PAYLOAD_LEN, MAX_STANDARD_ID,
};
use csv::StringRecord;
use std::fs::File;
use std::io;
use std::path::Path;

/// Number of columns a data row must have
pub const COLUMN_COUNT: usize = 6;

const COL_TIMESTAMP: usize = 0;
const COL_ID: usize = 1;
const COL_EXTENDED: usize = 2;
const COL_REMOTE: usize = 3;
const COL_DLC: usize = 4;
const COL_DATA: usize = 5;

/// Parse one row of fields into a frame record
///
/// Fields are trimmed before conversion. Extra columns beyond the sixth are
/// ignored.
pub fn parse_row<S: AsRef<str>>(
    fields: &[S],
    config: &ConverterConfig,
) -> std::result::Result<FrameRecord, RejectionReason> {
    if fields.len() < COLUMN_COUNT {
        return Err(RejectionReason::MissingColumns {
            found: fields.len(),
        });
    }
    let timestamp = parse_timestamp(field(fields, COL_TIMESTAMP))?;
    let arbitration_id = parse_arbitration_id(field(fields, COL_ID))?;
    let is_extended = parse_flag(
        field(fields, COL_EXTENDED),
        COL_EXTENDED + 1,
        config.flag_parsing,
    )?;
    let is_remote_frame = parse_flag(
        field(fields, COL_REMOTE),
        COL_REMOTE + 1,
        config.flag_parsing,
    )?;
    let payload = parse_payload(field(fields, COL_DATA))?;

    if config.check_dlc {
        check_dlc(field(fields, COL_DLC), payload.len())?;
    }

    let frame = FrameRecord {
        timestamp,
        arbitration_id,
        is_extended,
        is_remote_frame,
        payload,
    };

    if config.check_frame_consistency {
        check_consistency(&frame)?;
    }

    Ok(frame)
}

fn field<S: AsRef<str>>(fields: &[S], idx: usize) -> &str {
    fields[idx].as_ref().trim()
}

/// Parse a timestamp in seconds (decimal or scientific notation)
///
/// Negative values and values past [`crate::types::MAX_TIMESTAMP`] are rejected.
pub fn parse_timestamp(value: &str) -> std::result::Result<f64, RejectionReason> {
    match value.parse::<f64>() {
        Ok(ts) if timestamp_in_range(ts) => Ok(ts),
        _ => Err(RejectionReason::InvalidTimestamp {
            value: value.to_string(),
        }),
    }
}

/// Parse a hexadecimal arbitration ID
///
/// An optional `0x` prefix is tolerated. IDs that do not fit 29 bits are
/// rejected since no frame format can carry them.
pub fn parse_arbitration_id(value: &str) -> std::result::Result<u32, RejectionReason> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    u32::from_str_radix(digits, 16)
        .ok()
        .filter(|id| *id <= MAX_EXTENDED_ID)
        .ok_or_else(|| RejectionReason::InvalidArbitrationId {
            value: value.to_string(),
        })
}

/// Parse a boolean column
///
/// `column` is the 1-based column number used in the diagnostic.
pub fn parse_flag(
    value: &str,
    column: usize,
    mode: FlagParsing,
) -> std::result::Result<bool, RejectionReason> {
    if value.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    match mode {
        FlagParsing::Permissive => Ok(false),
        FlagParsing::Strict if value.eq_ignore_ascii_case("false") => Ok(false),
        FlagParsing::Strict => Err(RejectionReason::InvalidBooleanFlag {
            column,
            value: value.to_string(),
        }),
    }
}

/// Parse a hex byte string
///
/// Whitespace may separate bytes but not the two digits of one byte, so
/// `"de ad"` is accepted and `"d ead"` is not.
pub fn parse_payload(value: &str) -> std::result::Result<Vec<u8>, RejectionReason> {
    let mut payload = Vec::new();
    for chunk in value.split_ascii_whitespace() {
        let bytes = hex::decode(chunk).map_err(|_| RejectionReason::InvalidPayloadHex {
            value: value.to_string(),
        })?;
        payload.extend_from_slice(&bytes);
    }

    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(RejectionReason::PayloadTooLong { len: payload.len() });
    }
    Ok(payload)
}

fn check_dlc(value: &str, len: usize) -> std::result::Result<(), RejectionReason> {
    if value.is_empty() {
        return Ok(());
    }
    match value.parse::<usize>() {
        Ok(dlc) if dlc == len => Ok(()),
        _ => Err(RejectionReason::DlcMismatch {
            value: value.to_string(),
            len,
        }),
    }
}

fn check_consistency(frame: &FrameRecord) -> std::result::Result<(), RejectionReason> {
    if !frame.is_extended && frame.arbitration_id > MAX_STANDARD_ID {
        return Err(RejectionReason::IdExceedsStandardRange {
            id: frame.arbitration_id,
        });
    }
    if frame.is_remote_frame && !frame.payload.is_empty() {
        return Err(RejectionReason::RemoteFrameWithData {
            len: frame.payload.len(),
        });
    }
    Ok(())
}

/// Result of converting one data row
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    /// Line number in the input (the header is line 1)
    pub row: u64,
    /// Trimmed fields of the row
    pub content: Vec<String>,
    /// The converted frame or the reason it was rejected
    pub result: std::result::Result<FrameRecord, RejectionReason>,
}

impl RowOutcome {
    /// Turn a failed outcome into a rejection entry
    pub fn rejection(&self) -> Option<Rejection> {
        self.result.as_ref().err().map(|reason| Rejection {
            row: self.row,
            reason: reason.clone(),
            content: self.content.clone(),
        })
    }
}

/// Reader of CAN frame rows from CSV input
///
/// Construction consumes the header and looks ahead one row, so an input
/// without data rows is refused before any output is produced.
pub struct CsvFrameReader<R> {
    rdr: csv::Reader<R>,
    header: Vec<String>,
    pending: Option<StringRecord>,
    config: ConverterConfig,
    rows_read: u64,
}

impl CsvFrameReader<File> {
    /// Open a CSV file for reading
    pub fn from_path(path: &Path, config: &ConverterConfig) -> Result<Self> {
        log::info!("Opening CSV file: {:?}", path);

        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConverterError::InputNotFound(path.to_path_buf()),
            _ => ConverterError::Io(e),
        })?;
        Self::from_reader(file, config)
    }
}

impl<R: io::Read> CsvFrameReader<R> {
    /// Create a reader over any byte source
    pub fn from_reader(reader: R, config: &ConverterConfig) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut header = StringRecord::new();
        if !rdr.read_record(&mut header)? {
            return Err(ConverterError::EmptyInput);
        }
        let header: Vec<String> = header.iter().map(|f| f.trim().to_string()).collect();
        log::debug!("CSV header: {:?}", header);

        let mut first = StringRecord::new();
        if !rdr.read_record(&mut first)? {
            return Err(ConverterError::NoDataRows);
        }

        Ok(Self {
            rdr,
            header,
            pending: Some(first),
            config: config.clone(),
            rows_read: 1,
        })
    }

    /// The header fields, trimmed
    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn next_record(&mut self) -> Result<Option<StringRecord>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        let mut record = StringRecord::new();
        if self.rdr.read_record(&mut record)? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Advance and convert the next data row
    pub fn next_row(&mut self) -> Result<Option<RowOutcome>> {
        let record = match self.next_record()? {
            Some(record) => record,
            None => return Ok(None),
        };
        self.rows_read += 1;

        let row = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(self.rows_read);
        let content: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        let result = parse_row(&content, &self.config);

        Ok(Some(RowOutcome {
            row,
            content,
            result,
        }))
    }
}

impl<R: io::Read> Iterator for CsvFrameReader<R> {
    type Item = Result<RowOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
