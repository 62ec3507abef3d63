//! # Error Types Module
//!
//! Centralized error handling for the recorder.
//! Each stage of the pipeline has its own error type so callers can decide
//! locally whether a failure is recoverable.
//!
//! ## Error Types
//! - `ParseError`: a frame that failed validation (always recovered by discarding it)
//! - `TransportError`: serial read or framing failures (logged, loop continues)
//! - `SessionError`: recording file I/O failures (fatal to the session only)
//! - `RenameError`: final rename failures (session keeps its provisional name)
//! - `ConfigError`: configuration file I/O, parsing and validation errors
//! - `AppError`: top-level startup failures reported by `main`

use std::fmt;
use std::path::PathBuf;

/// Why a frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Frame carries no numeric content at all
    NotNumeric,
    /// Field count does not match the configured channel count
    WrongArity { expected: usize, found: usize },
    /// A field could not be converted to a finite float
    ConversionFailed { field: usize },
}

/// A rejected frame together with the raw text that caused it
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub raw: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::NotNumeric => write!(f, "non-numeric data"),
            ParseErrorKind::WrongArity { expected, found } => {
                write!(f, "expected {} fields, found {}", expected, found)
            }
            ParseErrorKind::ConversionFailed { field } => {
                write!(f, "field {} is not a finite number", field)
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Escape the raw frame so control characters from a noisy line stay visible
        write!(f, "{}: {:?}", self.kind, self.raw)
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while pulling frames off the transport
#[derive(Debug)]
pub enum TransportError {
    /// Failed to open the serial device
    Open { port: String, reason: String },
    /// Read from the underlying stream failed
    Read(std::io::Error),
    /// A line grew past the framing limit without a terminator
    Overflow { discarded: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Open { port, reason } => {
                write!(f, "Failed to open serial port {}: {}", port, reason)
            }
            TransportError::Read(e) => write!(f, "Serial read error: {}", e),
            TransportError::Overflow { discarded } => {
                write!(f, "Discarded {} bytes of unterminated input", discarded)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Read(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors that end the current recording session
#[derive(Debug)]
pub enum SessionError {
    /// Failed to create the output directory or file
    Create { path: PathBuf, source: std::io::Error },
    /// Failed to write or flush a row
    Write { path: PathBuf, source: std::io::Error },
    /// Failed to flush and release the file handle
    Close { path: PathBuf, source: std::io::Error },
    /// Session already hit a write failure and refuses further rows
    Broken { path: PathBuf },
    /// File handle was already released
    Closed { path: PathBuf },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Create { path, source } => {
                write!(f, "Failed to create recording {}: {}", path.display(), source)
            }
            SessionError::Write { path, source } => {
                write!(f, "Failed to write to recording {}: {}", path.display(), source)
            }
            SessionError::Close { path, source } => {
                write!(f, "Failed to close recording {}: {}", path.display(), source)
            }
            SessionError::Broken { path } => {
                write!(f, "Recording {} stopped after an earlier write failure", path.display())
            }
            SessionError::Closed { path } => {
                write!(f, "Recording {} is already closed", path.display())
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Create { source, .. }
            | SessionError::Write { source, .. }
            | SessionError::Close { source, .. } => Some(source),
            SessionError::Broken { .. } | SessionError::Closed { .. } => None,
        }
    }
}

/// Errors from moving a closed recording to its final name
#[derive(Debug)]
pub enum RenameError {
    /// Another file already holds the requested name
    TargetExists(PathBuf),
    /// The filesystem refused the move
    Io { target: PathBuf, source: std::io::Error },
}

impl fmt::Display for RenameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameError::TargetExists(target) => {
                write!(f, "{} already exists", target.display())
            }
            RenameError::Io { target, source } => {
                write!(f, "Failed to rename to {}: {}", target.display(), source)
            }
        }
    }
}

impl std::error::Error for RenameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenameError::TargetExists(_) => None,
            RenameError::Io { source, .. } => Some(source),
        }
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// Config parsed but holds unusable values
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Startup failures that stop the process
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Transport(TransportError),
    /// Installing the interrupt handler failed
    Signal(String),
    /// Spawning a worker thread failed
    Thread(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Transport(e) => write!(f, "{}", e),
            AppError::Signal(msg) => write!(f, "Failed to install Ctrl-C handler: {}", msg),
            AppError::Thread(e) => write!(f, "Failed to spawn worker thread: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Transport(e) => Some(e),
            AppError::Signal(_) => None,
            AppError::Thread(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        AppError::Transport(e)
    }
}
