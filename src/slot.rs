//! Single-capacity, overwrite-on-publish mailbox between the acquisition
//! thread and the writer thread.
//!
//! The publisher never blocks on the consumer: a newer sample replaces an
//! unconsumed older one. The consumer waits on a condition variable until a
//! sample arrives or the slot is closed for shutdown.

use crate::frame::Sample;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
#[cfg(test)]
use std::time::{Duration, Instant};

#[derive(Default)]
struct SlotState {
    pending: Option<Sample>,
    closed: bool,
}

#[derive(Default)]
pub struct SampleSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl SampleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the latest sample, replacing any unconsumed one
    ///
    /// Returns true when an unconsumed sample was overwritten.
    pub fn publish(&self, sample: Sample) -> bool {
        let overwritten = {
            let mut state = self.lock();
            state.pending.replace(sample).is_some()
        };
        self.ready.notify_one();
        overwritten
    }

    /// Block until a sample is published, then take it
    ///
    /// Returns `None` once the slot has been closed.
    pub fn wait_and_take(&self) -> Option<Sample> {
        let mut state = self.lock();
        loop {
            if let Some(sample) = state.pending.take() {
                return Some(sample);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_and_take`](Self::wait_and_take) but gives up after `timeout`
    #[cfg(test)]
    pub fn wait_and_take_timeout(&self, timeout: Duration) -> Option<Sample> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(sample) = state.pending.take() {
                return Some(sample);
            }
            let now = Instant::now();
            if state.closed || now >= deadline {
                return None;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Drop any pending sample without consuming it
    pub fn clear(&self) {
        self.lock().pending = None;
    }

    /// Wake every waiter and make future waits return `None` once drained
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn sample(v: f64) -> Sample {
        Sample::from_parts(0.0, vec![v])
    }

    #[test]
    fn test_last_write_wins() {
        let slot = SampleSlot::new();
        assert!(!slot.publish(sample(1.0)));
        assert!(slot.publish(sample(2.0)));
        assert_eq!(slot.wait_and_take().unwrap().values(), &[2.0]);
        assert!(slot.wait_and_take_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_clear_drops_pending() {
        let slot = SampleSlot::new();
        slot.publish(sample(1.0));
        slot.clear();
        assert!(slot.wait_and_take_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_waiter_wakes_on_publish() {
        let slot = Arc::new(SampleSlot::new());
        let reader = {
            let slot = slot.clone();
            thread::spawn(move || slot.wait_and_take())
        };
        thread::sleep(Duration::from_millis(20));
        slot.publish(sample(7.0));
        let taken = reader.join().unwrap();
        assert_eq!(taken.unwrap().values(), &[7.0]);
    }

    #[test]
    fn test_close_releases_waiter() {
        let slot = Arc::new(SampleSlot::new());
        let reader = {
            let slot = slot.clone();
            thread::spawn(move || slot.wait_and_take())
        };
        thread::sleep(Duration::from_millis(20));
        slot.close();
        assert!(reader.join().unwrap().is_none());
    }
}
