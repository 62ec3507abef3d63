//! # Frame Parsing Module
//!
//! Turns one newline-stripped text frame from the sensor into a validated
//! [`Sample`]. A frame either parses completely or is rejected as a whole.
//!
//! ## Encodings
//! - `Csv`: bare comma-separated floats, e.g. `1021.0,998.5`
//! - `KeyValue`: comma-separated `key=value` pairs, e.g. `red=5.0,ir=6.0`;
//!   only the value half is parsed and values keep their field order
//!
//! ## Validation order
//! 1. A frame without a single digit is `NotNumeric` (boot banners, blank noise)
//! 2. Field count must equal the configured channel count (`WrongArity`)
//! 3. Every field must convert to a finite `f64` (`ConversionFailed`)

use crate::error::{ParseError, ParseErrorKind};
use serde::{Deserialize, Serialize};

/// Wire encoding of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEncoding {
    Csv,
    KeyValue,
}

impl std::str::FromStr for FrameEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(FrameEncoding::Csv),
            "key_value" | "key-value" | "kv" => Ok(FrameEncoding::KeyValue),
            other => Err(format!("unknown encoding '{}' (expected csv or key_value)", other)),
        }
    }
}

/// One validated reading: capture time in wall-clock seconds plus channel values
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    timestamp: f64,
    values: Vec<f64>,
}

impl Sample {
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Channel values in configured order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[cfg(test)]
    pub fn from_parts(timestamp: f64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
}

/// Current wall-clock time as fractional Unix seconds
pub fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

#[derive(Debug, Clone)]
pub struct FrameParser {
    encoding: FrameEncoding,
    channels: usize,
}

impl FrameParser {
    pub fn new(encoding: FrameEncoding, channels: usize) -> Self {
        Self { encoding, channels }
    }

    /// Parse a frame, stamping it with the current wall-clock time
    pub fn parse(&self, line: &str) -> Result<Sample, ParseError> {
        self.parse_at(line, wall_clock_seconds())
    }

    pub fn parse_at(&self, line: &str, timestamp: f64) -> Result<Sample, ParseError> {
        let trimmed = line.trim();

        if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
            return Err(ParseError::new(ParseErrorKind::NotNumeric, line));
        }

        let fields: Vec<&str> = trimmed.split(',').collect();
        if fields.len() != self.channels {
            return Err(ParseError::new(
                ParseErrorKind::WrongArity {
                    expected: self.channels,
                    found: fields.len(),
                },
                line,
            ));
        }

        let mut values = Vec::with_capacity(self.channels);
        for (index, field) in fields.iter().enumerate() {
            let text = match self.encoding {
                FrameEncoding::Csv => Some(*field),
                FrameEncoding::KeyValue => field.split_once('=').map(|(_, value)| value),
            };

            let value = text
                .and_then(|t| t.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    ParseError::new(ParseErrorKind::ConversionFailed { field: index }, line)
                })?;
            values.push(value);
        }

        Ok(Sample { timestamp, values })
    }
}
