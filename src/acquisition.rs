//! # Acquisition Loop
//!
//! Reads frames from the transport, validates them and publishes accepted
//! samples to the shared slot. Neither bad frames nor transport errors stop
//! the loop; only the shutdown flag does.

use crate::context::RecorderContext;
use crate::frame::FrameParser;
use crate::transport::FrameSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Back-off after a transport error, so an unplugged device doesn't spin
const ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Counters shared with whoever spawned the loop
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub overwritten: AtomicU64,
    pub transport_errors: AtomicU64,
}

impl AcquisitionStats {
    pub fn summary(&self) -> String {
        format!(
            "{} frames accepted ({} overwritten before write), {} rejected, {} transport errors",
            self.accepted.load(Ordering::Relaxed),
            self.overwritten.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.transport_errors.load(Ordering::Relaxed),
        )
    }
}

pub struct Acquisition<S> {
    source: S,
    parser: FrameParser,
    context: Arc<RecorderContext>,
    stats: Arc<AcquisitionStats>,
    idle_backoff: Duration,
}

impl<S: FrameSource + Send + 'static> Acquisition<S> {
    pub fn new(
        source: S,
        parser: FrameParser,
        context: Arc<RecorderContext>,
        idle_backoff: Duration,
    ) -> Self {
        Self {
            source,
            parser,
            context,
            stats: Arc::new(AcquisitionStats::default()),
            idle_backoff,
        }
    }

    pub fn stats(&self) -> Arc<AcquisitionStats> {
        self.stats.clone()
    }

    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        log::debug!("Acquisition thread started");
        while !self.context.is_shutting_down() {
            if !self.poll_once() {
                thread::sleep(self.idle_backoff);
            }
        }
        log::debug!("Acquisition thread stopped");
    }

    /// Handle at most one frame; returns false when nothing was available
    pub fn poll_once(&mut self) -> bool {
        let line = match self.source.read_frame() {
            Ok(Some(line)) => line,
            Ok(None) => return false,
            Err(e) => {
                self.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}", e);
                thread::sleep(ERROR_BACKOFF);
                return false;
            }
        };

        match self.parser.parse(&line) {
            Ok(sample) => {
                log::debug!("data: {:?}", sample.values());
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                if self.context.slot.publish(sample) {
                    self.stats.overwritten.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("Ignored frame: {}", e);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::frame::FrameEncoding;
    use crate::transport::ReaderSource;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Replays a scripted sequence of transport results
    struct Scripted(VecDeque<Result<Option<String>, TransportError>>);

    impl FrameSource for Scripted {
        fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    #[test]
    fn test_bad_frame_is_discarded() {
        let context = Arc::new(RecorderContext::new());
        let source = ReaderSource::new(Cursor::new(b"1.0,2.0\n3.0,x\n".to_vec()));
        let parser = FrameParser::new(FrameEncoding::Csv, 2);
        let mut acquisition = Acquisition::new(source, parser, context.clone(), Duration::ZERO);
        let stats = acquisition.stats();

        assert!(acquisition.poll_once());
        let sample = context.slot.wait_and_take_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(sample.values(), &[1.0, 2.0]);

        assert!(acquisition.poll_once());
        assert!(context.slot.wait_and_take_timeout(Duration::from_millis(10)).is_none());
        assert_eq!(stats.accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_transport_error_is_not_fatal() {
        let context = Arc::new(RecorderContext::new());
        let script = VecDeque::from(vec![
            Err(TransportError::Overflow { discarded: 9000 }),
            Ok(Some("red=5.0,ir=6.0".to_string())),
        ]);
        let parser = FrameParser::new(FrameEncoding::KeyValue, 2);
        let mut acquisition = Acquisition::new(Scripted(script), parser, context.clone(), Duration::ZERO);
        let stats = acquisition.stats();

        assert!(!acquisition.poll_once());
        assert!(acquisition.poll_once());
        assert_eq!(stats.transport_errors.load(Ordering::Relaxed), 1);
        let sample = context.slot.wait_and_take_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(sample.values(), &[5.0, 6.0]);
    }

    #[test]
    fn test_unread_samples_are_overwritten() {
        let context = Arc::new(RecorderContext::new());
        let source = ReaderSource::new(Cursor::new(b"1\n2\n3\n".to_vec()));
        let parser = FrameParser::new(FrameEncoding::Csv, 1);
        let mut acquisition = Acquisition::new(source, parser, context.clone(), Duration::ZERO);
        let stats = acquisition.stats();

        while acquisition.poll_once() {}
        assert_eq!(stats.overwritten.load(Ordering::Relaxed), 2);
        let sample = context.slot.wait_and_take_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(sample.values(), &[3.0]);
    }

    #[test]
    fn test_thread_stops_on_shutdown() {
        let context = Arc::new(RecorderContext::new());
        let source = ReaderSource::new(Cursor::new(Vec::new()));
        let parser = FrameParser::new(FrameEncoding::Csv, 2);
        let handle = Acquisition::new(source, parser, context.clone(), Duration::from_millis(1))
            .spawn()
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        context.request_shutdown();
        assert!(handle.join().is_ok());
    }
}
