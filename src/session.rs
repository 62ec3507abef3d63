//! # Recording Session Module
//!
//! Owns the lifecycle of one CSV recording file.
//!
//! ## Lifecycle
//! 1. `open`: create `<output_dir>/<unix seconds>.<millis>.csv`, write the
//!    `Time,<channel...>` header and flush it
//! 2. `append`: one row per sample, flushed immediately so a crash loses
//!    at most the row being written
//! 3. `close`: flush and release the file handle, then move the file to
//!    `<sanitized name>.csv`
//!
//! The rename only ever happens after the handle is dropped. A failed rename
//! leaves the recording at its provisional path. Closing twice is a no-op.

use crate::error::{RenameError, SessionError};
use crate::frame::Sample;
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const TIME_COLUMN: &str = "Time";
pub const EXTENSION: &str = "csv";

/// Why a closed session kept its provisional name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    /// Operator entered nothing usable
    EmptyName,
    /// The move failed; the message describes why
    RenameFailed(String),
}

/// Where a session ended up after `close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    Renamed(PathBuf),
    Kept { path: PathBuf, reason: KeepReason },
    /// Session was closed before; nothing was done
    AlreadyClosed(PathBuf),
}

impl Finalized {
    pub fn path(&self) -> &Path {
        match self {
            Finalized::Renamed(path) => path,
            Finalized::Kept { path, .. } => path,
            Finalized::AlreadyClosed(path) => path,
        }
    }
}

/// Provisional file stem derived from the capture start time
pub fn provisional_stem(started: DateTime<Utc>) -> String {
    format!("{}.{:03}", started.timestamp(), started.timestamp_subsec_millis())
}

/// Keep `[A-Za-z0-9_-]`, replace everything else (whitespace included) with `_`
///
/// Returns `None` for an empty name.
pub fn sanitize_name(name: &str) -> Option<String> {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Byte sink underneath a session's CSV writer
pub trait Sink: Write + Send {
    /// Push everything written so far down to the storage device
    fn sync(&mut self) -> io::Result<()>;
}

impl Sink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

pub struct RecordingSession {
    dir: PathBuf,
    path: PathBuf,
    header: Vec<String>,
    writer: Option<csv::Writer<Box<dyn Sink>>>,
    rows: usize,
    broken: bool,
    finalized: bool,
}

impl RecordingSession {
    /// Start a new recording named after the current time
    pub fn open(dir: impl AsRef<Path>, channels: &[String]) -> Result<Self, SessionError> {
        Self::open_named(dir, &provisional_stem(Utc::now()), channels)
    }

    pub fn open_named(
        dir: impl AsRef<Path>,
        stem: &str,
        channels: &[String],
    ) -> Result<Self, SessionError> {
        Self::open_with(dir, stem, channels, |file| Box::new(file))
    }

    fn open_with<F>(
        dir: impl AsRef<Path>,
        stem: &str,
        channels: &[String],
        wrap: F,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce(File) -> Box<dyn Sink>,
    {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(format!("{}.{}", stem, EXTENSION));

        fs::create_dir_all(&dir).map_err(|source| SessionError::Create {
            path: dir.clone(),
            source,
        })?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| SessionError::Create {
                path: path.clone(),
                source,
            })?;

        let mut header = Vec::with_capacity(channels.len() + 1);
        header.push(TIME_COLUMN.to_string());
        header.extend(channels.iter().cloned());

        let mut session = Self {
            dir,
            path,
            header,
            writer: Some(csv::Writer::from_writer(wrap(file))),
            rows: 0,
            broken: false,
            finalized: false,
        };

        let header = session.header.clone();
        if let Err(e) = session.write_row(header) {
            // Don't leave a headerless file behind
            let path = session.path.clone();
            drop(session);
            if let Err(remove) = fs::remove_file(&path) {
                log::warn!("Could not remove {}: {}", path.display(), remove);
            }
            return Err(match e {
                SessionError::Write { path, source } => SessionError::Create { path, source },
                other => other,
            });
        }

        log::info!("Recording to {}", session.path.display());
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows written, header excluded
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Append `[timestamp, channel_0, ...]` and flush it
    pub fn append(&mut self, sample: &Sample) -> Result<(), SessionError> {
        let row = std::iter::once(sample.timestamp())
            .chain(sample.values().iter().copied())
            .map(|v| v.to_string());
        self.write_row(row)?;
        self.rows += 1;
        Ok(())
    }

    fn write_row<I>(&mut self, row: I) -> Result<(), SessionError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        if self.broken {
            return Err(SessionError::Broken {
                path: self.path.clone(),
            });
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(SessionError::Closed {
                path: self.path.clone(),
            });
        };

        let result = writer
            .write_record(row)
            .map_err(io::Error::from)
            .and_then(|_| writer.flush());

        result.map_err(|source| {
            self.broken = true;
            SessionError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Flush and release the file handle without renaming
    ///
    /// Safe to call repeatedly; the handle is dropped even when the flush fails.
    pub fn seal(&mut self) -> Result<(), SessionError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let mut sink = writer.into_inner().map_err(|e| SessionError::Close {
            path: self.path.clone(),
            source: io::Error::new(e.error().kind(), e.error().to_string()),
        })?;
        sink.sync().map_err(|source| SessionError::Close {
            path: self.path.clone(),
            source,
        })?;
        drop(sink);

        log::debug!("Released {} after {} rows", self.path.display(), self.rows);
        Ok(())
    }

    /// Seal the file, then move it to `<sanitized user_name>.csv`
    ///
    /// Only a failure to flush the file is returned as an error. Naming
    /// problems are reported through [`Finalized::Kept`].
    pub fn close(&mut self, user_name: &str) -> Result<Finalized, SessionError> {
        if self.finalized {
            return Ok(Finalized::AlreadyClosed(self.path.clone()));
        }
        self.finalized = true;
        self.seal()?;

        let Some(stem) = sanitize_name(user_name) else {
            log::warn!(
                "Invalid filename, keeping the timestamp-based name {}",
                self.path.display()
            );
            return Ok(Finalized::Kept {
                path: self.path.clone(),
                reason: KeepReason::EmptyName,
            });
        };

        match self.rename_to(&stem) {
            Ok(()) => {
                log::info!("Recording saved as {}", self.path.display());
                Ok(Finalized::Renamed(self.path.clone()))
            }
            Err(e) => {
                log::warn!("Error renaming {}: {}", self.path.display(), e);
                Ok(Finalized::Kept {
                    path: self.path.clone(),
                    reason: KeepReason::RenameFailed(e.to_string()),
                })
            }
        }
    }

    fn rename_to(&mut self, stem: &str) -> Result<(), RenameError> {
        let target = self.dir.join(format!("{}.{}", stem, EXTENSION));
        if target == self.path {
            return Ok(());
        }
        // fs::rename silently replaces an existing file on Unix
        if target.exists() {
            return Err(RenameError::TargetExists(target));
        }
        fs::rename(&self.path, &target).map_err(|source| RenameError::Io {
            target: target.clone(),
            source,
        })?;
        self.path = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("trial#1").as_deref(), Some("trial_1"));
        assert_eq!(sanitize_name("run-2_b").as_deref(), Some("run-2_b"));
        assert_eq!(sanitize_name("a b.c").as_deref(), Some("a_b_c"));
        assert_eq!(sanitize_name(""), None);
        // Whitespace is replaced like any other character
        assert_eq!(sanitize_name("  ").as_deref(), Some("__"));
        assert_eq!(sanitize_name(" a b ").as_deref(), Some("_a_b_"));
    }

    #[test]
    fn test_provisional_stem_uses_millis() {
        let started = DateTime::from_timestamp(1_700_000_000, 42_000_000).unwrap();
        assert_eq!(provisional_stem(started), "1700000000.042");
    }

    #[test]
    fn test_header_written_on_open() {
        let dir = tempdir().unwrap();
        let session = RecordingSession::open(dir.path().join("recordings"), &channels(&["Red", "IR"]))
            .unwrap();
        assert!(session.is_open());
        let contents = fs::read_to_string(session.path()).unwrap();
        assert_eq!(contents, "Time,Red,IR\n");
    }

    #[test]
    fn test_round_trip_and_rename() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::open_named(dir.path(), "169999", &channels(&["Red", "IR"])).unwrap();
        assert_eq!(session.path(), dir.path().join("169999.csv"));

        let samples = vec![
            Sample::from_parts(1.5, vec![1.0, 2.0]),
            Sample::from_parts(2.5, vec![3.25, -4.0]),
            Sample::from_parts(3.5, vec![5.0, 6.0]),
        ];
        for sample in &samples {
            session.append(sample).unwrap();
        }
        assert_eq!(session.rows(), 3);

        let finalized = session.close("trial#1").unwrap();
        let final_path = dir.path().join("trial_1.csv");
        assert_eq!(finalized, Finalized::Renamed(final_path.clone()));
        assert!(!dir.path().join("169999.csv").exists());

        let mut reader = csv::Reader::from_path(&final_path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, vec!["Time", "Red", "IR"]);

        let rows: Vec<Vec<f64>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows.len(), samples.len());
        for (row, sample) in rows.iter().zip(&samples) {
            assert_eq!(row[0], sample.timestamp());
            assert_eq!(&row[1..], sample.values());
        }
    }

    #[test]
    fn test_close_twice_renames_once() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::open_named(dir.path(), "100", &channels(&["IR"])).unwrap();

        let first = session.close("first").unwrap();
        assert_eq!(first, Finalized::Renamed(dir.path().join("first.csv")));

        let second = session.close("second").unwrap();
        assert_eq!(second, Finalized::AlreadyClosed(dir.path().join("first.csv")));
        assert!(!dir.path().join("second.csv").exists());
    }

    #[test]
    fn test_empty_name_keeps_provisional() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::open_named(dir.path(), "200", &channels(&["IR"])).unwrap();
        let finalized = session.close("").unwrap();
        assert_eq!(
            finalized,
            Finalized::Kept {
                path: dir.path().join("200.csv"),
                reason: KeepReason::EmptyName,
            }
        );
        assert!(dir.path().join("200.csv").exists());
    }

    #[test]
    fn test_blank_name_is_sanitized_not_dropped() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::open_named(dir.path(), "210", &channels(&["IR"])).unwrap();
        let finalized = session.close("  ").unwrap();
        assert_eq!(finalized, Finalized::Renamed(dir.path().join("__.csv")));
        assert!(!dir.path().join("210.csv").exists());
    }

    #[test]
    fn test_rename_collision_keeps_provisional() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("taken.csv"), "existing").unwrap();

        let mut session =
            RecordingSession::open_named(dir.path(), "300", &channels(&["IR"])).unwrap();
        let finalized = session.close("taken").unwrap();

        assert!(matches!(
            finalized,
            Finalized::Kept {
                reason: KeepReason::RenameFailed(_),
                ..
            }
        ));
        assert_eq!(finalized.path(), dir.path().join("300.csv"));
        assert_eq!(fs::read_to_string(dir.path().join("taken.csv")).unwrap(), "existing");
    }

    #[test]
    fn test_append_after_seal_is_rejected() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::open_named(dir.path(), "400", &channels(&["IR"])).unwrap();
        session.seal().unwrap();
        session.seal().unwrap();
        assert!(!session.is_open());

        let err = session.append(&Sample::from_parts(0.0, vec![1.0])).unwrap_err();
        assert!(matches!(err, SessionError::Closed { .. }));
    }

    #[test]
    fn test_open_refuses_to_clobber() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("500.csv"), "old").unwrap();
        let result = RecordingSession::open_named(dir.path(), "500", &channels(&["IR"]));
        assert!(matches!(result, Err(SessionError::Create { .. })));
    }

    #[test]
    fn test_failed_header_removes_file() {
        let dir = tempdir().unwrap();
        let result = testing::flaky_session(
            dir.path(),
            "600",
            &channels(&["IR"]),
            testing::switch(true),
        );
        assert!(matches!(result, Err(SessionError::Create { .. })));
        assert!(!dir.path().join("600.csv").exists());
    }

    #[test]
    fn test_write_failure_marks_session_broken() {
        let dir = tempdir().unwrap();
        let failing = testing::switch(false);
        let mut session =
            testing::flaky_session(dir.path(), "700", &channels(&["IR"]), failing.clone())
                .unwrap();
        session.append(&Sample::from_parts(0.0, vec![1.0])).unwrap();

        failing.store(true, Ordering::SeqCst);
        let err = session.append(&Sample::from_parts(1.0, vec![2.0])).unwrap_err();
        assert!(matches!(err, SessionError::Write { .. }));
        assert!(session.is_broken());
        assert_eq!(session.rows(), 1);

        // Later appends are refused without touching the sink
        failing.store(false, Ordering::SeqCst);
        let err = session.append(&Sample::from_parts(2.0, vec![3.0])).unwrap_err();
        assert!(matches!(err, SessionError::Broken { .. }));
    }
}
