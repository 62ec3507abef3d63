//! # Control Toggle Module
//!
//! Debounced start/stop state machine. Owns session creation and
//! finalization; the writer only ever appends to what this module attaches.
//!
//! ## States
//! - `Idle --toggle--> Recording`: open a new session, start recording
//! - `Recording --toggle--> Idle`: stop recording, detach and seal the
//!   session, ask the operator for a name, rename
//!
//! Toggles arriving within the debounce window of the last *accepted*
//! toggle are ignored outright.

use crate::context::RecorderContext;
use crate::error::SessionError;
use crate::session::{Finalized, RecordingSession};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the final file name, asked once per stop
pub trait NamePrompt {
    /// `None` when the operator gave no answer (input closed or interrupted)
    fn ask_name(&mut self) -> Option<String>;
}

impl<F> NamePrompt for F
where
    F: FnMut() -> Option<String>,
{
    fn ask_name(&mut self) -> Option<String> {
        self()
    }
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started(PathBuf),
    Stopped(Finalized),
}

pub struct Controller {
    context: Arc<RecorderContext>,
    state: ControlState,
    debouncer: Debouncer,
    output_dir: PathBuf,
    channels: Vec<String>,
}

impl Controller {
    pub fn new(
        context: Arc<RecorderContext>,
        output_dir: PathBuf,
        channels: Vec<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            context,
            state: ControlState::Idle,
            debouncer: Debouncer::new(debounce),
            output_dir,
            channels,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Feed one toggle signal observed at `now`
    ///
    /// Returns `Ok(None)` when the signal was debounced away.
    pub fn toggle<P: NamePrompt>(
        &mut self,
        now: Instant,
        prompt: &mut P,
    ) -> Result<Option<Transition>, SessionError> {
        if !self.debouncer.accept(now) {
            log::debug!("Toggle ignored (debounce)");
            return Ok(None);
        }

        match self.state {
            ControlState::Idle => self.start().map(Some),
            ControlState::Recording => self.stop(prompt),
        }
    }

    fn start(&mut self) -> Result<Transition, SessionError> {
        log::info!("Starting recording");
        let session = RecordingSession::open(&self.output_dir, &self.channels)?;
        let path = session.path().to_path_buf();

        // Readings taken before the start belong to no session
        self.context.slot.clear();
        self.context.attach(session);
        self.state = ControlState::Recording;
        Ok(Transition::Started(path))
    }

    fn stop<P: NamePrompt>(&mut self, prompt: &mut P) -> Result<Option<Transition>, SessionError> {
        log::info!("Stopping recording");
        self.state = ControlState::Idle;

        let Some(mut session) = self.context.detach() else {
            log::warn!("No active recording to stop");
            return Ok(None);
        };

        if let Err(e) = session.seal() {
            log::error!("{}", e);
        }
        if session.is_broken() {
            log::warn!(
                "{} is incomplete: writing failed after {} rows",
                session.path().display(),
                session.rows()
            );
        }
        log::info!("Data saved ({} rows)", session.rows());

        let name = prompt.ask_name().unwrap_or_default();
        session.close(&name).map(|finalized| Some(Transition::Stopped(finalized)))
    }

    /// Finalize an open session under its provisional name
    pub fn shutdown(&mut self) -> Option<Finalized> {
        if self.state != ControlState::Recording {
            return None;
        }
        self.state = ControlState::Idle;

        let mut session = self.context.detach()?;
        match session.close("") {
            Ok(finalized) => Some(finalized),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }
}
