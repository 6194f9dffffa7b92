//! BLF (Binary Log Format) file writer
//!
//! Writes uncompressed Vector BLF files that python-can and Vector tools
//! can read. All fields are little endian.
//!
//! ## File layout
//! - File statistics header (144 bytes, signature `LOGG`). Written as zeros
//!   when the file is opened and rewritten when it is sealed.
//! - A sequence of log container objects (type 10, uncompressed), each
//!   holding a run of whole CAN message objects.
//!
//! ## CAN message object (type 1, 48 bytes)
//! ```text
//! "LOBJ" | u16 header size (32) | u16 header version (1) | u32 object size | u32 type
//! u32 flags (TIME_ONE_NANS) | u16 client index | u16 version | u64 timestamp ns
//! u16 channel | u8 flags | u8 dlc | u32 id (bit 31 = extended) | [u8; 8] data
//! ```
//!
//! Object timestamps are nanoseconds relative to the measurement start stored
//! in the file header. The start is the first frame's timestamp truncated to
//! whole milliseconds, which is the resolution of the header's SYSTEMTIME.

use crate::config::ConverterConfig;
use crate::types::{
    timestamp_in_range, EncodeError, FrameRecord, LogSummary, MAX_EXTENDED_ID, MAX_PAYLOAD_LEN,
};
use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

pub const FILE_SIGNATURE: &[u8; 4] = b"LOGG";
pub const OBJECT_SIGNATURE: &[u8; 4] = b"LOBJ";

/// Size of the file statistics header
pub const FILE_HEADER_SIZE: usize = 144;
/// Size of the packed statistics fields at the start of the header
pub const FILE_HEADER_FIELDS_SIZE: usize = 72;
/// "LOBJ" + header size + header version + object size + object type
pub const OBJ_HEADER_BASE_SIZE: usize = 16;
/// flags + client index + object version + timestamp
pub const OBJ_HEADER_V1_SIZE: usize = 16;
/// compression method + reserved + uncompressed size + reserved
pub const LOG_CONTAINER_HEADER_SIZE: usize = 16;
/// channel + flags + dlc + id + data
pub const CAN_MESSAGE_BODY_SIZE: usize = 16;
/// Full size of an encoded CAN message object
pub const CAN_MESSAGE_OBJECT_SIZE: usize =
    OBJ_HEADER_BASE_SIZE + OBJ_HEADER_V1_SIZE + CAN_MESSAGE_BODY_SIZE;

pub const OBJECT_TYPE_CAN_MESSAGE: u32 = 1;
pub const OBJECT_TYPE_LOG_CONTAINER: u32 = 10;
pub const OBJECT_TYPE_CAN_MESSAGE2: u32 = 86;

pub const TIME_TEN_MICS: u32 = 0x01;
pub const TIME_ONE_NANS: u32 = 0x02;

pub const NO_COMPRESSION: u16 = 0;

/// Extended ID flag in the id field
pub const CAN_MSG_EXT: u32 = 0x8000_0000;
/// Remote frame flag in the flags field
pub const REMOTE_FLAG: u8 = 0x80;
/// Direction flag (0=RX, 1=TX)
pub const DIR_FLAG: u8 = 0x01;

const BINLOG_VERSION: [u8; 4] = [2, 6, 8, 1];

/// Upper bound for `max_container_size`; container sizes are stored as u32
pub const MAX_CONTAINER_SIZE: usize = 64 * 1024 * 1024;

/// SYSTEMTIME cannot express dates before 1990; such starts are stored as zeros
const SYSTEMTIME_MIN_MS: i64 = 631_152_000_000;
const SYSTEMTIME_MAX_YEAR: i32 = 30827;

/// Windows SYSTEMTIME as stored in the BLF header (UTC)
///
/// Fields: year, month, day of week (0 = Sunday), day, hour, minute,
/// second, millisecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysTime(pub [u16; 8]);

impl SysTime {
    /// Build from milliseconds since the Unix epoch
    pub fn from_unix_millis(ms: i64) -> Self {
        if ms < SYSTEMTIME_MIN_MS {
            return Self::default();
        }
        match DateTime::from_timestamp_millis(ms) {
            Some(dt) if dt.year() <= SYSTEMTIME_MAX_YEAR => Self([
                dt.year() as u16,
                dt.month() as u16,
                dt.weekday().num_days_from_sunday() as u16,
                dt.day() as u16,
                dt.hour() as u16,
                dt.minute() as u16,
                dt.second() as u16,
                (dt.timestamp_subsec_millis() % 1000) as u16,
            ]),
            _ => Self::default(),
        }
    }

    /// Milliseconds since the Unix epoch, or `None` for an unset time
    pub fn to_unix_millis(&self) -> Option<i64> {
        let [year, month, _, day, hour, minute, second, milli] = self.0;
        if year == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|d| d.and_hms_milli_opt(hour as u32, minute as u32, second as u32, milli as u32))
            .map(|dt| dt.and_utc().timestamp_millis())
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for field in self.0 {
            w.write_u16::<LittleEndian>(field)?;
        }
        Ok(())
    }
}

/// Measurement start in whole milliseconds, never later than `first`
fn measurement_start_ms(first: f64) -> i64 {
    let mut ms = (first * 1000.0).floor() as i64;
    if ms < SYSTEMTIME_MIN_MS {
        return 0;
    }
    if ms as f64 / 1000.0 > first {
        ms -= 1;
    }
    ms
}

fn floor_millis(timestamp: f64) -> i64 {
    (timestamp * 1000.0).floor() as i64
}

fn write_object_header<W: Write>(
    w: &mut W,
    header_size: usize,
    object_size: usize,
    object_type: u32,
) -> io::Result<()> {
    w.write_all(OBJECT_SIGNATURE)?;
    w.write_u16::<LittleEndian>(header_size as u16)?;
    w.write_u16::<LittleEndian>(1)?;
    w.write_u32::<LittleEndian>(object_size as u32)?;
    w.write_u32::<LittleEndian>(object_type)
}

/// Encode one CAN message object
fn write_can_message<W: Write>(
    w: &mut W,
    frame: &FrameRecord,
    channel: u16,
    timestamp_ns: u64,
) -> io::Result<()> {
    write_object_header(
        w,
        OBJ_HEADER_BASE_SIZE + OBJ_HEADER_V1_SIZE,
        CAN_MESSAGE_OBJECT_SIZE,
        OBJECT_TYPE_CAN_MESSAGE,
    )?;
    w.write_u32::<LittleEndian>(TIME_ONE_NANS)?;
    w.write_u16::<LittleEndian>(0)?; // client index
    w.write_u16::<LittleEndian>(0)?; // object version
    w.write_u64::<LittleEndian>(timestamp_ns)?;

    let flags = if frame.is_remote_frame { REMOTE_FLAG } else { 0 };
    let id = if frame.is_extended {
        frame.arbitration_id | CAN_MSG_EXT
    } else {
        frame.arbitration_id
    };
    let mut data = [0u8; MAX_PAYLOAD_LEN];
    data[..frame.payload.len()].copy_from_slice(&frame.payload);

    w.write_u16::<LittleEndian>(channel)?;
    w.write_u8(flags)?;
    w.write_u8(frame.dlc())?;
    w.write_u32::<LittleEndian>(id)?;
    w.write_all(&data)
}

/// Counters of what the file header describes
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    object_count: u32,
    last_timestamp: Option<f64>,
    /// Sink offset right after the last fully written container
    end_offset: u64,
    uncompressed_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Failed,
    Sealed,
}

/// Streaming BLF writer
///
/// Frames are buffered and written as log containers. The file header is
/// rewritten after every container, so the file on disk is valid at each
/// container boundary; [`BlfWriter::close`] writes the remaining frames and
/// the final header, and a writer dropped without being closed does the same
/// on drop. After a sink failure every call returns [`EncodeError::Failed`]
/// and the header only describes containers that reached the sink.
pub struct BlfWriter<W: Write + Seek> {
    sink: Option<W>,
    channel: u16,
    application_id: u8,
    max_container_size: usize,
    state: WriterState,
    buffer: Vec<u8>,
    buffered_objects: u32,
    buffered_last_timestamp: Option<f64>,
    start_ms: Option<i64>,
    first_timestamp: Option<f64>,
    committed: Progress,
}

impl BlfWriter<BufWriter<File>> {
    /// Create a BLF file, truncating any existing file
    pub fn create(path: &Path, config: &ConverterConfig) -> Result<Self, EncodeError> {
        log::info!("Creating BLF file: {:?}", path);
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), config)
    }
}

impl<W: Write + Seek> BlfWriter<W> {
    /// Wrap a sink positioned at its start and write an empty file header
    ///
    /// `max_container_size` is capped at [`MAX_CONTAINER_SIZE`].
    pub fn new(sink: W, config: &ConverterConfig) -> Result<Self, EncodeError> {
        let max_container_size = config.max_container_size.min(MAX_CONTAINER_SIZE);
        if max_container_size < config.max_container_size {
            log::warn!(
                "max_container_size {} is too large, using {}",
                config.max_container_size,
                max_container_size
            );
        }

        let mut writer = Self {
            sink: Some(sink),
            channel: config.channel.max(1),
            application_id: config.application_id,
            max_container_size,
            state: WriterState::Open,
            buffer: Vec::new(),
            buffered_objects: 0,
            buffered_last_timestamp: None,
            start_ms: None,
            first_timestamp: None,
            committed: Progress {
                end_offset: FILE_HEADER_SIZE as u64,
                uncompressed_size: FILE_HEADER_SIZE as u64,
                ..Progress::default()
            },
        };
        if let Err(e) = writer.write_header() {
            writer.sink = None;
            return Err(e);
        }
        Ok(writer)
    }

    /// Number of frames appended so far
    pub fn object_count(&self) -> u32 {
        self.committed.object_count + self.buffered_objects
    }

    /// True once a sink failure has been observed
    pub fn is_failed(&self) -> bool {
        self.state == WriterState::Failed
    }

    /// Append one frame
    ///
    /// Frames the format cannot carry (payload over 8 bytes, ID over 29
    /// bits, timestamp negative or past `MAX_TIMESTAMP`) are refused with
    /// [`EncodeError::InvalidFrame`] without affecting the writer.
    pub fn append(&mut self, frame: &FrameRecord) -> Result<(), EncodeError> {
        if self.state != WriterState::Open {
            return Err(EncodeError::Failed);
        }
        if frame.payload.len() > MAX_PAYLOAD_LEN {
            return Err(EncodeError::InvalidFrame(format!(
                "payload of {} bytes",
                frame.payload.len()
            )));
        }
        if frame.arbitration_id > MAX_EXTENDED_ID {
            return Err(EncodeError::InvalidFrame(format!(
                "arbitration ID 0x{:X}",
                frame.arbitration_id
            )));
        }
        if !timestamp_in_range(frame.timestamp) {
            return Err(EncodeError::InvalidFrame(format!(
                "timestamp {}",
                frame.timestamp
            )));
        }

        let start_ms = *self.start_ms.get_or_insert_with(|| {
            let start = measurement_start_ms(frame.timestamp);
            log::debug!("Measurement start: {} ms", start);
            start
        });
        self.first_timestamp.get_or_insert(frame.timestamp);

        let offset = frame.timestamp - start_ms as f64 / 1000.0;
        let timestamp_ns = if offset < 0.0 {
            log::warn!(
                "Frame at {:.6}s precedes the measurement start, clamping to offset 0",
                frame.timestamp
            );
            0
        } else {
            (offset * 1e9).round() as u64
        };

        write_can_message(&mut self.buffer, frame, self.channel, timestamp_ns)?;
        self.buffered_objects += 1;
        self.buffered_last_timestamp = Some(frame.timestamp);

        if self.buffer.len() >= self.max_container_size {
            self.flush_container()?;
        }
        Ok(())
    }

    /// Write the buffered objects as one log container, then the header
    fn flush_container(&mut self) -> Result<(), EncodeError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let sink = self.sink.as_mut().ok_or(EncodeError::Failed)?;

        let data_len = self.buffer.len();
        let object_size = OBJ_HEADER_BASE_SIZE + LOG_CONTAINER_HEADER_SIZE + data_len;
        let padding = object_size % 4;

        let written = (|| -> io::Result<()> {
            write_object_header(sink, OBJ_HEADER_BASE_SIZE, object_size, OBJECT_TYPE_LOG_CONTAINER)?;
            sink.write_u16::<LittleEndian>(NO_COMPRESSION)?;
            sink.write_all(&[0u8; 6])?;
            sink.write_u32::<LittleEndian>(data_len as u32)?;
            sink.write_all(&[0u8; 4])?;
            sink.write_all(&self.buffer)?;
            sink.write_all(&[0u8; 3][..padding])?;
            sink.flush()
        })();

        if let Err(e) = written {
            log::error!("Failed to write BLF log container: {}", e);
            self.state = WriterState::Failed;
            return Err(EncodeError::SinkFailure(e));
        }

        log::debug!(
            "Wrote log container: {} objects, {} bytes",
            self.buffered_objects,
            data_len
        );

        self.committed.object_count += self.buffered_objects;
        self.committed.last_timestamp = self.buffered_last_timestamp;
        self.committed.end_offset += (object_size + padding) as u64;
        self.committed.uncompressed_size +=
            (OBJ_HEADER_V1_SIZE + LOG_CONTAINER_HEADER_SIZE + data_len) as u64;
        self.buffer.clear();
        self.buffered_objects = 0;
        self.write_header()
    }

    /// File header describing the committed progress
    fn encode_header(&self) -> io::Result<Vec<u8>> {
        let progress = self.committed;
        let start = match progress.object_count {
            0 => SysTime::default(),
            _ => SysTime::from_unix_millis(self.start_ms.unwrap_or(0)),
        };
        let stop = progress
            .last_timestamp
            .map(|ts| SysTime::from_unix_millis(floor_millis(ts)))
            .unwrap_or_default();

        let mut header = Vec::with_capacity(FILE_HEADER_SIZE);
        header.write_all(FILE_SIGNATURE)?;
        header.write_u32::<LittleEndian>(FILE_HEADER_SIZE as u32)?;
        header.write_u8(self.application_id)?;
        header.write_all(&[0, 0, 0])?; // application version
        header.write_all(&BINLOG_VERSION)?;
        header.write_u64::<LittleEndian>(progress.end_offset)?;
        header.write_u64::<LittleEndian>(progress.uncompressed_size)?;
        header.write_u32::<LittleEndian>(progress.object_count)?;
        header.write_u32::<LittleEndian>(0)?; // objects read
        start.write_to(&mut header)?;
        stop.write_to(&mut header)?;
        header.resize(FILE_HEADER_SIZE, 0);
        Ok(header)
    }

    /// Rewrite the file header and return to the end of the committed data
    fn write_header(&mut self) -> Result<(), EncodeError> {
        let header = self.encode_header()?;
        let end_offset = self.committed.end_offset;
        let sink = self.sink.as_mut().ok_or(EncodeError::Failed)?;

        let written = (|| -> io::Result<()> {
            sink.seek(SeekFrom::Start(0))?;
            sink.write_all(&header)?;
            sink.seek(SeekFrom::Start(end_offset))?;
            sink.flush()
        })();

        if let Err(e) = written {
            log::error!("Failed to write BLF file header: {}", e);
            self.state = WriterState::Failed;
            return Err(EncodeError::SinkFailure(e));
        }
        Ok(())
    }

    fn seal(&mut self) -> Result<LogSummary, EncodeError> {
        self.write_header()?;
        if self.state == WriterState::Open {
            self.state = WriterState::Sealed;
        }

        let progress = self.committed;
        Ok(LogSummary {
            object_count: progress.object_count,
            first_timestamp: self.first_timestamp.filter(|_| progress.object_count > 0),
            last_timestamp: progress.last_timestamp,
            file_size: progress.end_offset,
        })
    }

    fn close_inner(&mut self) -> Result<LogSummary, EncodeError> {
        if self.state != WriterState::Open {
            return Err(EncodeError::Failed);
        }
        self.flush_container()?;
        let summary = self.seal()?;
        log::info!(
            "BLF file sealed: {} objects, {} bytes",
            summary.object_count,
            summary.file_size
        );
        Ok(summary)
    }

    /// Flush the remaining frames and write the file header
    pub fn close(mut self) -> Result<LogSummary, EncodeError> {
        self.close_inner()
    }

    /// Like [`BlfWriter::close`], also handing back the sink
    pub fn finish(mut self) -> Result<(LogSummary, W), EncodeError> {
        let summary = self.close_inner()?;
        let sink = self.sink.take().ok_or(EncodeError::Failed)?;
        Ok((summary, sink))
    }
}

impl<W: Write + Seek> Drop for BlfWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_none() || self.state == WriterState::Sealed {
            return;
        }
        if self.state == WriterState::Open {
            if let Err(e) = self.flush_container() {
                log::warn!("Dropping buffered BLF objects: {}", e);
            }
        }
        match self.seal() {
            Ok(summary) => log::debug!(
                "BLF file sealed on drop: {} objects",
                summary.object_count
            ),
            Err(e) => log::warn!("Failed to seal BLF file on drop: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_TIMESTAMP;
    use std::io::Cursor;

    fn frame(timestamp: f64, id: u32, payload: &[u8]) -> FrameRecord {
        FrameRecord {
            timestamp,
            arbitration_id: id,
            is_extended: false,
            is_remote_frame: false,
            payload: payload.to_vec(),
        }
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u64_at(bytes: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
    }

    #[test]
    fn test_systime_conversion() {
        // 2023-03-15 13:20:00.123 UTC, a Wednesday
        let st = SysTime::from_unix_millis(1_678_886_400_123);
        assert_eq!(st.0, [2023, 3, 3, 15, 13, 20, 0, 123]);
        assert_eq!(st.to_unix_millis(), Some(1_678_886_400_123));

        assert_eq!(SysTime::from_unix_millis(1_500), SysTime::default());
        assert_eq!(SysTime::default().to_unix_millis(), None);
    }

    #[test]
    fn test_measurement_start() {
        let start = measurement_start_ms(1678886400.123);
        assert!(start as f64 / 1000.0 <= 1678886400.123);
        assert!(1678886400.123 - start as f64 / 1000.0 < 0.001);

        assert_eq!(measurement_start_ms(12.5), 0);
        assert_eq!(measurement_start_ms(-3.0), 0);
    }

    #[test]
    fn test_can_message_layout() {
        let mut buf = Vec::new();
        let frame = FrameRecord {
            timestamp: 0.0,
            arbitration_id: 0x1A2B3C4D,
            is_extended: true,
            is_remote_frame: false,
            payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        write_can_message(&mut buf, &frame, 1, 1_500).unwrap();

        assert_eq!(buf.len(), CAN_MESSAGE_OBJECT_SIZE);
        assert_eq!(&buf[0..4], b"LOBJ");
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), 32);
        assert_eq!(u32_at(&buf, 8), 48);
        assert_eq!(u32_at(&buf, 12), OBJECT_TYPE_CAN_MESSAGE);
        assert_eq!(u32_at(&buf, 16), TIME_ONE_NANS);
        assert_eq!(u64_at(&buf, 24), 1_500);
        assert_eq!(u16::from_le_bytes([buf[32], buf[33]]), 1);
        assert_eq!(buf[34], 0);
        assert_eq!(buf[35], 4);
        assert_eq!(u32_at(&buf, 36), 0x1A2B3C4D | CAN_MSG_EXT);
        assert_eq!(&buf[40..48], &[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0]);
    }

    #[test]
    fn test_remote_flag() {
        let mut buf = Vec::new();
        let frame = FrameRecord {
            is_remote_frame: true,
            ..frame(0.0, 0x10A, &[])
        };
        write_can_message(&mut buf, &frame, 2, 0).unwrap();
        assert_eq!(buf[34], REMOTE_FLAG);
        assert_eq!(buf[35], 0);
        assert_eq!(u32_at(&buf, 36), 0x10A);
    }

    #[test]
    fn test_file_structure() {
        let config = ConverterConfig::new();
        let mut writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();
        writer.append(&frame(1678886400.123, 0x10A, &[1, 2, 3, 4])).unwrap();
        writer.append(&frame(1678886400.456, 0x10B, &[])).unwrap();
        let (summary, sink) = writer.finish().unwrap();
        let bytes = sink.into_inner();

        assert_eq!(summary.object_count, 2);
        assert_eq!(summary.first_timestamp, Some(1678886400.123));
        assert_eq!(summary.last_timestamp, Some(1678886400.456));
        assert_eq!(summary.file_size, bytes.len() as u64);

        // header + one container with two objects, no padding needed
        assert_eq!(bytes.len(), FILE_HEADER_SIZE + 32 + 2 * CAN_MESSAGE_OBJECT_SIZE);
        assert_eq!(&bytes[0..4], b"LOGG");
        assert_eq!(u32_at(&bytes, 4), 144);
        assert_eq!(bytes[8], 5);
        assert_eq!(&bytes[12..16], &BINLOG_VERSION);
        assert_eq!(u64_at(&bytes, 16), bytes.len() as u64);
        assert_eq!(u32_at(&bytes, 32), 2);

        let container = &bytes[FILE_HEADER_SIZE..];
        assert_eq!(&container[0..4], b"LOBJ");
        assert_eq!(u32_at(container, 12), OBJECT_TYPE_LOG_CONTAINER);
        assert_eq!(u16::from_le_bytes([container[16], container[17]]), NO_COMPRESSION);
        assert_eq!(u32_at(container, 24), 2 * CAN_MESSAGE_OBJECT_SIZE as u32);
        assert_eq!(&container[32..36], b"LOBJ");
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = ConverterConfig::new();
        let writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();
        let (summary, sink) = writer.finish().unwrap();
        let bytes = sink.into_inner();

        assert_eq!(summary.object_count, 0);
        assert_eq!(summary.first_timestamp, None);
        assert_eq!(bytes.len(), FILE_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"LOGG");
        assert_eq!(u32_at(&bytes, 32), 0);
    }

    #[test]
    fn test_container_flush_threshold() {
        let config = ConverterConfig::new().with_max_container_size(CAN_MESSAGE_OBJECT_SIZE * 2);
        let mut writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();
        for i in 0..5 {
            writer.append(&frame(i as f64, 0x100 + i, &[i as u8])).unwrap();
        }
        assert_eq!(writer.object_count(), 5);
        let (summary, sink) = writer.finish().unwrap();
        let bytes = sink.into_inner();

        // containers of 2 + 2 + 1 objects
        let expected = FILE_HEADER_SIZE + 3 * 32 + 5 * CAN_MESSAGE_OBJECT_SIZE;
        assert_eq!(bytes.len(), expected);
        assert_eq!(summary.object_count, 5);
    }

    #[test]
    fn test_invalid_frame_is_not_terminal() {
        let config = ConverterConfig::new();
        let mut writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();

        let long = frame(1.0, 0x10A, &[0; 9]);
        assert!(matches!(writer.append(&long), Err(EncodeError::InvalidFrame(_))));
        let wide = frame(1.0, 0x2000_0000, &[]);
        assert!(matches!(writer.append(&wide), Err(EncodeError::InvalidFrame(_))));

        writer.append(&frame(1.0, 0x10A, &[1])).unwrap();
        assert!(!writer.is_failed());
        assert_eq!(writer.close().unwrap().object_count, 1);
    }

    #[test]
    fn test_out_of_range_timestamp_is_refused() {
        let config = ConverterConfig::new();
        let mut writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();

        for ts in [-5.0, 2.2e12, 1e20, f64::NAN] {
            assert!(matches!(
                writer.append(&frame(ts, 0x10A, &[])),
                Err(EncodeError::InvalidFrame(_))
            ));
        }
        assert!(!writer.is_failed());

        writer.append(&frame(MAX_TIMESTAMP, 0x10A, &[1])).unwrap();
        let (summary, _) = writer.finish().unwrap();
        assert_eq!(summary.object_count, 1);
        assert_eq!(summary.first_timestamp, Some(MAX_TIMESTAMP));
    }

    #[test]
    fn test_systime_beyond_year_30827_is_unset() {
        // 2554-07-21, still representable
        assert_eq!(SysTime::from_unix_millis(18_446_744_073_000).0[0], 2554);
        // past the last year SYSTEMTIME can hold
        assert_eq!(
            SysTime::from_unix_millis(2_006_000_000_000_000),
            SysTime::default()
        );
    }

    #[test]
    fn test_oversized_container_limit_is_capped() {
        let config = ConverterConfig::new().with_max_container_size(usize::MAX);
        let mut writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();
        assert_eq!(writer.max_container_size, MAX_CONTAINER_SIZE);

        for i in 0..3 {
            writer.append(&frame(1.0 + i as f64, 0x100 + i, &[])).unwrap();
        }
        let (summary, sink) = writer.finish().unwrap();
        let bytes = sink.into_inner();

        assert_eq!(summary.object_count, 3);
        assert_eq!(bytes.len(), FILE_HEADER_SIZE + 32 + 3 * CAN_MESSAGE_OBJECT_SIZE);
        assert_eq!(u32_at(&bytes[FILE_HEADER_SIZE..], 8), (32 + 3 * CAN_MESSAGE_OBJECT_SIZE) as u32);
    }

    #[test]
    fn test_header_is_valid_before_close() {
        let config = ConverterConfig::new().with_max_container_size(1);
        let mut writer = BlfWriter::new(Cursor::new(Vec::new()), &config).unwrap();
        writer.append(&frame(1.0, 0x10A, &[1])).unwrap();
        writer.append(&frame(2.0, 0x10B, &[2])).unwrap();

        let bytes = writer.sink.as_ref().unwrap().get_ref().clone();
        assert_eq!(&bytes[0..4], b"LOGG");
        assert_eq!(u32_at(&bytes, 32), 2);
        assert_eq!(u64_at(&bytes, 16), bytes.len() as u64);
        assert_eq!(writer.sink.as_ref().unwrap().position(), bytes.len() as u64);
    }

    #[test]
    fn test_dropped_writer_seals_file() {
        let config = ConverterConfig::new();
        let mut bytes = Vec::new();
        {
            let mut writer = BlfWriter::new(Cursor::new(&mut bytes), &config).unwrap();
            writer.append(&frame(1.0, 0x10A, &[1])).unwrap();
        }
        assert_eq!(&bytes[0..4], b"LOGG");
        assert_eq!(u32_at(&bytes, 32), 1);
        assert_eq!(bytes.len(), FILE_HEADER_SIZE + 32 + CAN_MESSAGE_OBJECT_SIZE);
    }
}
