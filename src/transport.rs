//! # Transport Module
//!
//! Pulls newline-delimited text frames off a byte stream.
//!
//! ## Key Components
//! - `FrameSource`: the seam the acquisition loop reads from
//! - `LineFramer`: splits raw bytes into lines, decoding permissively
//! - `ReaderSource`: adapts any `Read` (serial port, file, in-memory buffer)
//! - `open_serial` / `list_ports`: serial device helpers
//!
//! Serial reads time out regularly when the sensor is quiet; a timeout is
//! reported as "no frame yet", never as an error.

use crate::config::Config;
use crate::error::TransportError;
use std::io::{ErrorKind, Read};
use std::time::Duration;

/// Longest line accepted before the buffer is considered garbage
pub const MAX_LINE_BYTES: usize = 4096;

pub trait FrameSource {
    /// Next complete frame, or `Ok(None)` if none is available yet
    fn read_frame(&mut self) -> Result<Option<String>, TransportError>;
}

/// Splits a byte stream into text lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    // Set after an unterminated overflow until the next newline
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next non-blank line, without its terminator
    ///
    /// Invalid UTF-8 is replaced rather than rejected. An unterminated run
    /// longer than [`MAX_LINE_BYTES`] is dropped and reported, and so is the
    /// rest of that line when its newline finally arrives.
    pub fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.discarding {
                    self.buffer.clear();
                } else if self.buffer.len() > MAX_LINE_BYTES {
                    let discarded = self.buffer.len();
                    self.buffer.clear();
                    self.discarding = true;
                    return Err(TransportError::Overflow { discarded });
                }
                return Ok(None);
            };

            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            if self.discarding {
                self.discarding = false;
                log::debug!("Dropped {} trailing bytes of an oversized line", line.len());
                continue;
            }
            if line.len() > MAX_LINE_BYTES {
                return Err(TransportError::Overflow {
                    discarded: line.len(),
                });
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if !text.trim().is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
}

/// Frame source over any byte reader
pub struct ReaderSource<R> {
    reader: R,
    framer: LineFramer,
    chunk: [u8; 256],
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            chunk: [0u8; 256],
        }
    }
}

impl<R: Read> FrameSource for ReaderSource<R> {
    fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        if let Some(frame) = self.framer.next_frame()? {
            return Ok(Some(frame));
        }

        match self.reader.read(&mut self.chunk) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.framer.push(&self.chunk[..n]);
                self.framer.next_frame()
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::Read(e)),
        }
    }
}

pub type SerialSource = ReaderSource<Box<dyn serialport::SerialPort>>;

/// Open the configured serial port and drop whatever it buffered before we arrived
pub fn open_serial(config: &Config) -> Result<SerialSource, TransportError> {
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|e| TransportError::Open {
            port: config.port.clone(),
            reason: e.to_string(),
        })?;

    if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
        log::warn!("Could not clear input buffer on {}: {}", config.port, e);
    }

    log::info!("Opened {} at {} baud", config.port, config.baud_rate);
    Ok(ReaderSource::new(port))
}

/// Names of serial ports present on this machine
pub fn list_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drain<S: FrameSource>(source: &mut S) -> Vec<String> {
        let mut frames = Vec::new();
        // Enough polls for the reader to hit EOF
        for _ in 0..32 {
            if let Ok(Some(frame)) = source.read_frame() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_framer_handles_partial_lines() {
        let mut framer = LineFramer::new();
        framer.push(b"1.0,2");
        assert!(framer.next_frame().unwrap().is_none());
        framer.push(b".0\r\n3.0,");
        assert_eq!(framer.next_frame().unwrap().as_deref(), Some("1.0,2.0"));
        assert!(framer.next_frame().unwrap().is_none());
        framer.push(b"4.0\n");
        assert_eq!(framer.next_frame().unwrap().as_deref(), Some("3.0,4.0"));
    }

    #[test]
    fn test_framer_skips_blank_lines() {
        let mut framer = LineFramer::new();
        framer.push(b"\r\n\n  \n5\n");
        assert_eq!(framer.next_frame().unwrap().as_deref(), Some("5"));
    }

    #[test]
    fn test_framer_replaces_invalid_utf8() {
        let mut framer = LineFramer::new();
        framer.push(b"1.0,\xff2.0\n");
        let frame = framer.next_frame().unwrap().unwrap();
        assert!(frame.starts_with("1.0,"));
        assert!(frame.contains('\u{FFFD}'));
    }

    #[test]
    fn test_framer_overflow() {
        let mut framer = LineFramer::new();
        framer.push(&vec![b'7'; MAX_LINE_BYTES + 1]);
        assert!(matches!(
            framer.next_frame(),
            Err(TransportError::Overflow { .. })
        ));
        // The tail of the oversized line goes too, even across pushes
        framer.push(b"777");
        assert!(framer.next_frame().unwrap().is_none());
        framer.push(b"77\n8\n");
        assert_eq!(framer.next_frame().unwrap().as_deref(), Some("8"));
        assert!(framer.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_reader_source_yields_frames_in_order() {
        let mut source = ReaderSource::new(Cursor::new(b"1,2\r\n3,4\n5,6\n".to_vec()));
        assert_eq!(drain(&mut source), vec!["1,2", "3,4", "5,6"]);
        assert!(source.read_frame().unwrap().is_none());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    struct TimeoutReader;

    impl Read for TimeoutReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::TimedOut, "quiet"))
        }
    }

    #[test]
    fn test_read_errors() {
        let mut source = ReaderSource::new(FailingReader);
        assert!(matches!(source.read_frame(), Err(TransportError::Read(_))));

        let mut source = ReaderSource::new(TimeoutReader);
        assert!(source.read_frame().unwrap().is_none());
    }
}
