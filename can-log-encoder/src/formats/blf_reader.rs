//! BLF file reader
//!
//! Reads back the CAN frames of a BLF file. Only uncompressed log containers
//! are supported, which covers every file produced by [`super::BlfWriter`].
//!
//! ## Supported Object Types
//! - Type 1 (CanMessage) and type 86 (CanMessage2)
//! - Type 10 (LogContainer), unpacked; objects may span container boundaries
//!
//! Other object types are skipped with a warning logged once per type.

use super::blf::{
    SysTime, CAN_MSG_EXT, FILE_HEADER_FIELDS_SIZE, FILE_SIGNATURE, LOG_CONTAINER_HEADER_SIZE,
    NO_COMPRESSION, OBJECT_SIGNATURE, OBJECT_TYPE_CAN_MESSAGE, OBJECT_TYPE_CAN_MESSAGE2,
    OBJECT_TYPE_LOG_CONTAINER, OBJ_HEADER_BASE_SIZE, OBJ_HEADER_V1_SIZE, REMOTE_FLAG,
    TIME_TEN_MICS,
};
use crate::types::{FrameRecord, ReadError, MAX_EXTENDED_ID, MAX_PAYLOAD_LEN};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;

/// Contents of the BLF file statistics header
#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub header_size: u32,
    pub application_id: u8,
    pub application_version: (u8, u8, u8),
    pub binlog_version: [u8; 4],
    pub file_size: u64,
    pub uncompressed_size: u64,
    pub object_count: u32,
    pub objects_read: u32,
    pub measurement_start: SysTime,
    pub last_object_time: SysTime,
}

impl FileStats {
    /// Parse the statistics header, leaving the reader at the first object
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        if &signature != FILE_SIGNATURE {
            return Err(ReadError::BadSignature(signature));
        }

        let header_size = reader.read_u32::<LittleEndian>()?;
        if (header_size as usize) < FILE_HEADER_FIELDS_SIZE {
            return Err(ReadError::Malformed(format!(
                "file header of {} bytes",
                header_size
            )));
        }

        let mut rest = vec![0u8; header_size as usize - 8];
        reader.read_exact(&mut rest)?;
        let mut cur = Cursor::new(rest);

        let application_id = cur.read_u8()?;
        let application_version = (cur.read_u8()?, cur.read_u8()?, cur.read_u8()?);
        let mut binlog_version = [0u8; 4];
        cur.read_exact(&mut binlog_version)?;
        let file_size = cur.read_u64::<LittleEndian>()?;
        let uncompressed_size = cur.read_u64::<LittleEndian>()?;
        let object_count = cur.read_u32::<LittleEndian>()?;
        let objects_read = cur.read_u32::<LittleEndian>()?;
        let measurement_start = read_systime(&mut cur)?;
        let last_object_time = read_systime(&mut cur)?;

        Ok(FileStats {
            header_size,
            application_id,
            application_version,
            binlog_version,
            file_size,
            uncompressed_size,
            object_count,
            objects_read,
            measurement_start,
            last_object_time,
        })
    }

    /// Measurement start in seconds since the Unix epoch (0 when unset)
    pub fn measurement_start_secs(&self) -> f64 {
        self.measurement_start
            .to_unix_millis()
            .map(|ms| ms as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

fn read_systime<R: Read>(reader: &mut R) -> io::Result<SysTime> {
    let mut fields = [0u16; 8];
    reader.read_u16_into::<LittleEndian>(&mut fields)?;
    Ok(SysTime(fields))
}

/// Decode a complete CAN message object, `None` for other object types
fn decode_object(bytes: &[u8], start_secs: f64) -> Result<Option<FrameRecord>, ReadError> {
    let mut cur = Cursor::new(bytes);
    cur.set_position(4);
    let header_size = cur.read_u16::<LittleEndian>()? as u64;
    let _header_version = cur.read_u16::<LittleEndian>()?;
    let _object_size = cur.read_u32::<LittleEndian>()?;
    let object_type = cur.read_u32::<LittleEndian>()?;

    if object_type != OBJECT_TYPE_CAN_MESSAGE && object_type != OBJECT_TYPE_CAN_MESSAGE2 {
        return Ok(None);
    }
    if header_size < (OBJ_HEADER_BASE_SIZE + OBJ_HEADER_V1_SIZE) as u64 {
        return Err(ReadError::Malformed(format!(
            "CAN message with header size {}",
            header_size
        )));
    }

    let flags = cur.read_u32::<LittleEndian>()?;
    let _client_index = cur.read_u16::<LittleEndian>()?;
    let _object_version = cur.read_u16::<LittleEndian>()?;
    let raw_timestamp = cur.read_u64::<LittleEndian>()?;
    let offset = if flags & TIME_TEN_MICS != 0 {
        raw_timestamp as f64 * 1e-5
    } else {
        raw_timestamp as f64 * 1e-9
    };

    cur.set_position(header_size);
    let _channel = cur.read_u16::<LittleEndian>()?;
    let msg_flags = cur.read_u8()?;
    let dlc = cur.read_u8()?;
    let id = cur.read_u32::<LittleEndian>()?;
    let mut data = [0u8; MAX_PAYLOAD_LEN];
    cur.read_exact(&mut data)?;

    let len = (dlc as usize).min(MAX_PAYLOAD_LEN);
    Ok(Some(FrameRecord {
        timestamp: start_secs + offset,
        arbitration_id: id & MAX_EXTENDED_ID,
        is_extended: id & CAN_MSG_EXT != 0,
        is_remote_frame: msg_flags & REMOTE_FLAG != 0,
        payload: data[..len].to_vec(),
    }))
}

/// Iterator over the CAN frames of a BLF file
pub struct BlfReader<R: Read> {
    reader: R,
    stats: FileStats,
    start_secs: f64,
    /// Absolute offset of the next outer object
    position: u64,
    /// Unpacked container bytes not yet consumed
    carry: Vec<u8>,
    carry_pos: usize,
    skipped_types: HashSet<u32>,
    done: bool,
}

impl BlfReader<BufReader<File>> {
    /// Open a BLF file
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        log::info!("Reading BLF file: {:?}", path);
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read> BlfReader<R> {
    /// Read the file header from a reader positioned at the start of a file
    pub fn from_reader(mut reader: R) -> Result<Self, ReadError> {
        let stats = FileStats::read(&mut reader)?;
        log::debug!(
            "BLF header: {} objects, {} bytes",
            stats.object_count,
            stats.file_size
        );

        Ok(Self {
            reader,
            start_secs: stats.measurement_start_secs(),
            position: stats.header_size as u64,
            stats,
            carry: Vec::new(),
            carry_pos: 0,
            skipped_types: HashSet::new(),
            done: false,
        })
    }

    /// The file statistics header
    pub fn stats(&self) -> &FileStats {
        &self.stats
    }

    fn at_end(&self) -> bool {
        self.stats.file_size > 0 && self.position >= self.stats.file_size
    }

    /// Take the next complete object out of the unpacked container data
    fn next_buffered_object(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        let available = &self.carry[self.carry_pos..];
        if available.len() < OBJ_HEADER_BASE_SIZE {
            return Ok(None);
        }
        if &available[0..4] != OBJECT_SIGNATURE {
            return Err(ReadError::Malformed(
                "missing object signature inside log container".to_string(),
            ));
        }
        let object_size =
            u32::from_le_bytes([available[8], available[9], available[10], available[11]]) as usize;
        if object_size < OBJ_HEADER_BASE_SIZE {
            return Err(ReadError::Malformed(format!("object size {}", object_size)));
        }
        if available.len() < object_size {
            return Ok(None);
        }

        let object = available[..object_size].to_vec();
        let padding = object_size % 4;
        self.carry_pos = (self.carry_pos + object_size + padding).min(self.carry.len());
        Ok(Some(object))
    }

    /// Read the next outer object, unpacking log containers into `carry`.
    /// Returns a standalone object, or `None` when a container was unpacked.
    fn read_outer_object(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        let mut base = [0u8; OBJ_HEADER_BASE_SIZE];
        self.reader.read_exact(&mut base)?;
        if &base[0..4] != OBJECT_SIGNATURE {
            return Err(ReadError::BadObjectSignature(self.position));
        }
        let object_size = u32::from_le_bytes([base[8], base[9], base[10], base[11]]) as usize;
        let object_type = u32::from_le_bytes([base[12], base[13], base[14], base[15]]);
        if object_size < OBJ_HEADER_BASE_SIZE {
            return Err(ReadError::Malformed(format!("object size {}", object_size)));
        }

        let mut body = vec![0u8; object_size - OBJ_HEADER_BASE_SIZE];
        self.reader.read_exact(&mut body)?;
        let padding = object_size % 4;
        let mut pad = [0u8; 3];
        self.reader.read_exact(&mut pad[..padding])?;
        self.position += (object_size + padding) as u64;

        if object_type != OBJECT_TYPE_LOG_CONTAINER {
            let mut object = base.to_vec();
            object.extend_from_slice(&body);
            return Ok(Some(object));
        }

        if body.len() < LOG_CONTAINER_HEADER_SIZE {
            return Err(ReadError::Malformed("truncated log container".to_string()));
        }
        let method = u16::from_le_bytes([body[0], body[1]]);
        if method != NO_COMPRESSION {
            return Err(ReadError::UnsupportedCompression(method));
        }

        self.carry.drain(..self.carry_pos);
        self.carry_pos = 0;
        self.carry.extend_from_slice(&body[LOG_CONTAINER_HEADER_SIZE..]);
        Ok(None)
    }

    fn next_frame(&mut self) -> Result<Option<FrameRecord>, ReadError> {
        loop {
            let object = match self.next_buffered_object()? {
                Some(object) => object,
                None => {
                    if self.at_end() {
                        return Ok(None);
                    }
                    match self.read_outer_object() {
                        Ok(Some(object)) => object,
                        Ok(None) => continue,
                        Err(ReadError::Io(e))
                            if e.kind() == io::ErrorKind::UnexpectedEof
                                && self.stats.file_size == 0 =>
                        {
                            return Ok(None)
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            match decode_object(&object, self.start_secs)? {
                Some(frame) => return Ok(Some(frame)),
                None => {
                    let object_type =
                        u32::from_le_bytes([object[12], object[13], object[14], object[15]]);
                    if self.skipped_types.insert(object_type) {
                        log::warn!(
                            "Skipping unsupported BLF object type {} (size {} bytes)",
                            object_type,
                            object.len()
                        );
                    }
                }
            }
        }
    }
}

impl<R: Read> Iterator for BlfReader<R> {
    type Item = Result<FrameRecord, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_frame().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
