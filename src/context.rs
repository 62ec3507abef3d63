//! Shared state handed to every thread of the recorder.
//!
//! Three pieces of state cross thread boundaries: the latest-sample slot, the
//! recording flag, and the active session. The session sits behind a mutex
//! that the writer holds for each append and the controller holds while
//! detaching a session, so a close never overlaps a write.

use crate::session::RecordingSession;
use crate::slot::SampleSlot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub struct RecorderContext {
    pub slot: SampleSlot,
    recording: AtomicBool,
    shutdown: AtomicBool,
    session: Mutex<Option<RecordingSession>>,
}

impl RecorderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn session(&self) -> MutexGuard<'_, Option<RecordingSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a freshly opened session and start recording into it
    pub fn attach(&self, session: RecordingSession) {
        *self.session() = Some(session);
        self.set_recording(true);
    }

    /// Stop recording and take the session away from the writer
    ///
    /// Blocks until any append in progress has finished.
    pub fn detach(&self) -> Option<RecordingSession> {
        self.set_recording(false);
        self.session().take()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Ask every loop to exit and wake the writer
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.slot.close();
    }
}
