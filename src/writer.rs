//! # Writer Loop
//!
//! Consumes samples from the shared slot and appends them to the active
//! recording session, at most once per minimum write interval.
//!
//! Samples taken while idle, or inside the rate-limit window, are dropped.
//! The file therefore logs the latest value at a capped cadence rather than
//! every frame the sensor sends.

use crate::context::RecorderContext;
use crate::frame::Sample;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Admits one write per `min_interval`
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_write: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_write: None,
        }
    }

    /// Returns true and records `now` if a write is allowed at `now`
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_write {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last_write = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_write = None;
    }
}

/// What the writer did with one taken sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Idle,
    RateLimited,
    Failed,
}

pub struct Writer {
    context: Arc<RecorderContext>,
    limiter: RateLimiter,
    written: u64,
}

impl Writer {
    pub fn new(context: Arc<RecorderContext>, min_interval: Duration) -> Self {
        Self {
            context,
            limiter: RateLimiter::new(min_interval),
            written: 0,
        }
    }

    /// Spawn the writer on its own thread
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<u64>> {
        thread::Builder::new()
            .name("writer".into())
            .spawn(move || self.run())
    }

    /// Run until shutdown, returning the number of rows written
    pub fn run(mut self) -> u64 {
        log::debug!("Writer thread started");
        // The slot hands back None once shutdown closes it
        while let Some(sample) = self.context.slot.wait_and_take() {
            if self.context.is_shutting_down() {
                break;
            }
            self.handle(&sample, Instant::now());
        }
        log::debug!("Writer thread stopped");
        self.written
    }

    pub fn handle(&mut self, sample: &Sample, now: Instant) -> WriteOutcome {
        if !self.context.is_recording() {
            self.limiter.reset();
            return WriteOutcome::Idle;
        }

        let mut guard = self.context.session();
        let Some(session) = guard.as_mut() else {
            return WriteOutcome::Idle;
        };
        if session.is_broken() || !session.is_open() {
            return WriteOutcome::Idle;
        }
        if !self.limiter.admit(now) {
            log::trace!("Rate limited sample at {}", sample.timestamp());
            return WriteOutcome::RateLimited;
        }

        match session.append(sample) {
            Ok(()) => {
                self.written += 1;
                WriteOutcome::Written
            }
            Err(e) => {
                log::error!("{}; recording stopped, toggle to finalize the file", e);
                self.context.set_recording(false);
                WriteOutcome::Failed
            }
        }
    }
}
