//! Record and wire frame codec.
//!
//! A record is exactly [`RECORD_SIZE`] bytes: a [`KEY_SIZE`]-byte key followed by a [`VALUE_SIZE`]-byte value.
//! On the wire every record is wrapped into a [`FRAME_SIZE`]-byte frame:
//!
//! | offset | length | meaning                                        |
//! |--------|--------|------------------------------------------------|
//! | 0      | 1      | control: `0x00` data frame, `0x01` terminator  |
//! | 1      | 10     | key (data frames only)                         |
//! | 11     | 90     | value (data frames only)                       |

use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::io;
use std::io::prelude::*;

pub const KEY_SIZE: usize = 10;
pub const VALUE_SIZE: usize = 90;
pub const RECORD_SIZE: usize = KEY_SIZE + VALUE_SIZE;
pub const FRAME_SIZE: usize = RECORD_SIZE + 1;

const CONTROL_DATA: u8 = 0;
const CONTROL_TERMINATOR: u8 = 1;

/// Fixed-size record. Records are ordered by their raw bytes, so the key decides the order
/// and the value only breaks ties.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record([u8; RECORD_SIZE]);

impl Record {
    pub fn new(key: [u8; KEY_SIZE], value: [u8; VALUE_SIZE]) -> Self {
        let mut bytes = [0; RECORD_SIZE];
        bytes[..KEY_SIZE].copy_from_slice(&key);
        bytes[KEY_SIZE..].copy_from_slice(&value);
        Record(bytes)
    }

    pub fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Record(bytes)
    }

    pub fn key(&self) -> &[u8] {
        &self.0[..KEY_SIZE]
    }

    pub fn value(&self) -> &[u8] {
        &self.0[KEY_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.0
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record(key=")?;
        for byte in self.key() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Consumer of records.
pub trait RecordSink {
    /// Takes ownership of a record.
    fn accept(&mut self, record: Record) -> io::Result<()>;
}

impl RecordSink for Vec<Record> {
    fn accept(&mut self, record: Record) -> io::Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Carries one record.
    Data(Record),
    /// No more frames follow on the connection.
    Terminator,
}

impl Frame {
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0; FRAME_SIZE];
        match self {
            Frame::Data(record) => {
                buf[0] = CONTROL_DATA;
                buf[1..].copy_from_slice(record.as_bytes());
            }
            Frame::Terminator => buf[0] = CONTROL_TERMINATOR,
        }
        return buf;
    }

    /// Decodes a complete frame. The terminator payload is ignored.
    pub fn decode(buf: &[u8; FRAME_SIZE]) -> Result<Frame, FrameError> {
        match buf[0] {
            CONTROL_DATA => {
                let mut bytes = [0; RECORD_SIZE];
                bytes.copy_from_slice(&buf[1..]);
                Ok(Frame::Data(Record(bytes)))
            }
            CONTROL_TERMINATOR => Ok(Frame::Terminator),
            control => Err(FrameError::UnknownControl(control)),
        }
    }
}

/// Frame decoding error.
#[derive(Debug)]
pub enum FrameError {
    /// Stream closed on a frame boundary before a terminator was received.
    Closed,
    /// Stream closed in the middle of a frame.
    Truncated(usize),
    /// Control byte is neither data nor terminator.
    UnknownControl(u8),
    /// Underlying stream error.
    IO(io::Error),
}

impl Error for FrameError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            FrameError::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            FrameError::Closed => write!(f, "stream closed before terminator frame"),
            FrameError::Truncated(received) => {
                write!(f, "stream closed mid-frame ({} of {} bytes received)", received, FRAME_SIZE)
            }
            FrameError::UnknownControl(control) => write!(f, "unknown frame control byte: {:#04x}", control),
            FrameError::IO(err) => write!(f, "frame I/O error: {}", err),
        }
    }
}

/// Reads until `buf` is full or the stream ends. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    return Ok(filled);
}

/// Reads exactly one frame, tolerating short reads.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut buf = [0; FRAME_SIZE];
    match read_full(reader, &mut buf).map_err(FrameError::IO)? {
        FRAME_SIZE => Frame::decode(&buf),
        0 => Err(FrameError::Closed),
        received => Err(FrameError::Truncated(received)),
    }
}

/// Writes a frame as a single unit.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    writer.write_all(&frame.encode())
}

/// Iterator over the records of a raw shard stream.
pub struct RecordReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        RecordReader { reader, done: false }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut bytes = [0; RECORD_SIZE];
        match read_full(&mut self.reader, &mut bytes) {
            Ok(RECORD_SIZE) => Some(Ok(Record(bytes))),
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(received) => {
                self.done = true;
                Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("trailing partial record ({} of {} bytes)", received, RECORD_SIZE),
                )))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
