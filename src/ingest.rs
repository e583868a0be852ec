use crate::buffer::LatestValueBuffer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::protocol::{self, Framed, LineAssembler};
use crate::transport::{SerialTransport, Transport};
use crate::types::Grid;
use crate::{Result, TofError};
use std::time::Duration;

const READ_CHUNK: usize = 1024;

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Non-blank lines handed to the decoder.
    pub lines: u64,
    /// Lines that decoded and were published.
    pub decoded: u64,
    /// Lines the decoder rejected.
    pub dropped: u64,
    /// Lines discarded for exceeding the length limit.
    pub oversized: u64,
    /// Successful re-opens after a link fault.
    pub reconnects: u32,
}

/// Reads frames off the link and publishes every good one.
///
/// Bad lines are logged and skipped. A read error drops the transport and
/// triggers up to `reconnect_attempts` re-opens, `reconnect_delay` apart;
/// when those run out the run ends with [`TofError::LinkLost`].
#[derive(Debug, Clone)]
pub struct SerialIngestor {
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl SerialIngestor {
    pub fn new(reconnect_attempts: u32, reconnect_delay: Duration) -> Self {
        Self {
            reconnect_attempts,
            reconnect_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.reconnect_attempts, config.reconnect_delay)
    }

    /// Open the serial port named in `config` and ingest until cancelled.
    pub fn run_serial(
        config: &Config,
        sink: &LatestValueBuffer<Grid>,
        cancel: &CancelToken,
    ) -> Result<IngestReport> {
        Self::from_config(config).run(|| SerialTransport::from_config(config), sink, cancel)
    }

    /// Ingest until `cancel` fires or the link is lost for good.
    ///
    /// `open` is called once up front and again for each reconnect. A
    /// failure on the first call is returned as-is: nothing has been
    /// published and the caller should not start rendering.
    ///
    /// The transport is dropped, closing the port, on every exit path.
    pub fn run<T, F>(
        &self,
        mut open: F,
        sink: &LatestValueBuffer<Grid>,
        cancel: &CancelToken,
    ) -> Result<IngestReport>
    where
        T: Transport,
        F: FnMut() -> Result<T>,
    {
        let mut port = open()?;
        let mut lines = LineAssembler::new();
        let mut report = IngestReport::default();
        let mut buf = [0u8; READ_CHUNK];

        log::info!("Ingest started on {}", port.name());

        loop {
            if cancel.is_cancelled() {
                log::info!("Ingest stopping (cancelled)");
                break;
            }

            let n = match port.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(e) => {
                    log::warn!("Serial read error on {}: {}", port.name(), e);
                    drop(port);
                    lines.reset();

                    match self.reconnect(&mut open, cancel) {
                        Ok(Some(reopened)) => {
                            port = reopened;
                            report.reconnects += 1;
                            continue;
                        }
                        Ok(None) => {
                            log::info!("Ingest stopping (cancelled during reconnect)");
                            log_summary(&report);
                            return Ok(report);
                        }
                        Err(e) => {
                            log_summary(&report);
                            return Err(e);
                        }
                    }
                }
            };

            for framed in lines.push(&buf[..n]) {
                handle_framed(framed, sink, &mut report);
            }
        }

        log_summary(&report);
        Ok(report)
    }

    /// `Ok(None)` if cancelled while waiting between attempts.
    fn reconnect<T, F>(&self, open: &mut F, cancel: &CancelToken) -> Result<Option<T>>
    where
        T: Transport,
        F: FnMut() -> Result<T>,
    {
        for attempt in 1..=self.reconnect_attempts {
            if cancel.sleep(self.reconnect_delay) {
                return Ok(None);
            }
            match open() {
                Ok(port) => {
                    log::info!("Re-opened {} (attempt {})", port.name(), attempt);
                    return Ok(Some(port));
                }
                Err(e) => {
                    log::warn!(
                        "Reconnect attempt {}/{} failed: {}",
                        attempt,
                        self.reconnect_attempts,
                        e
                    );
                }
            }
        }

        log::error!(
            "Serial link lost, giving up after {} reconnect attempts",
            self.reconnect_attempts
        );
        Err(TofError::LinkLost {
            attempts: self.reconnect_attempts,
        })
    }
}

fn handle_framed(framed: Framed, sink: &LatestValueBuffer<Grid>, report: &mut IngestReport) {
    match framed {
        Framed::Line(line) if line.is_empty() => {}
        Framed::Line(line) => {
            report.lines += 1;
            match protocol::decode_bytes(&line) {
                Ok(grid) => {
                    log::trace!("Frame decoded ({} valid zones)", grid.valid_count());
                    sink.publish(grid);
                    report.decoded += 1;
                }
                Err(e) => {
                    log::warn!("Dropping frame: {}", e);
                    report.dropped += 1;
                }
            }
        }
        Framed::Oversized(len) => {
            log::warn!("Dropping {} byte line (over {} byte limit)", len, protocol::MAX_LINE_LEN);
            report.oversized += 1;
        }
    }
}

fn log_summary(report: &IngestReport) {
    log::info!(
        "Ingest summary: {} lines, {} decoded, {} dropped, {} oversized, {} reconnects",
        report.lines,
        report.decoded,
        report.dropped,
        report.oversized,
        report.reconnects
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::transport::MockTransport;
    use crate::types::ZONE_COUNT;
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn line_of(entry: &str, count: usize) -> String {
        format!("{{\"data\": [{}]}}", vec![entry; count].join(","))
    }

    fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn quick() -> SerialIngestor {
        SerialIngestor::new(2, Duration::from_millis(5))
    }

    #[test]
    fn test_startup_open_failure_is_fatal() {
        let sink = LatestValueBuffer::new();
        let result = quick().run(
            || -> Result<MockTransport> {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such port").into())
            },
            &sink,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(TofError::Io(_))));
        assert_eq!(sink.published(), 0);
    }

    #[test]
    fn test_publishes_good_frames_and_skips_bad_ones() {
        let device = MockTransport::new();
        device.inject_line(&line_of("100", ZONE_COUNT));
        device.inject_line("not json");
        device.inject_line("");
        device.inject_line(&line_of("100", ZONE_COUNT - 1));
        device.inject(b"{\"data\": [");
        device.inject(format!("{}]}}\r\n", vec!["null"; ZONE_COUNT].join(",")).as_bytes());

        let sink = Arc::new(LatestValueBuffer::new());
        let cancel = CancelToken::new();
        let handle = {
            let (device, sink, cancel) = (device.clone(), sink.clone(), cancel.clone());
            thread::spawn(move || quick().run(|| Ok(device.connect()?), &sink, &cancel))
        };

        wait_until("two publishes", || sink.published() == 2);
        wait_until("script drained", || device.pending() == 0);
        cancel.cancel();
        let report = handle.join().unwrap().unwrap();

        assert_eq!(
            report,
            IngestReport {
                lines: 4,
                decoded: 2,
                dropped: 2,
                oversized: 0,
                reconnects: 0,
            }
        );
        assert_eq!(sink.take_latest(), Some(Grid::empty()));
        assert_eq!(device.open_handles(), 0);
    }

    #[test]
    fn test_length_mismatch_leaves_buffer_untouched() {
        let short = line_of("5", ZONE_COUNT - 1);
        assert_eq!(
            protocol::decode(&short),
            Err(DecodeError::LengthMismatch { found: 63 })
        );

        let device = MockTransport::new();
        device.inject_line(&short);
        let sink = Arc::new(LatestValueBuffer::new());
        let cancel = CancelToken::new();
        let handle = {
            let (device, sink, cancel) = (device.clone(), sink.clone(), cancel.clone());
            thread::spawn(move || quick().run(|| Ok(device.connect()?), &sink, &cancel))
        };

        wait_until("script drained", || device.pending() == 0);
        cancel.cancel();
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(sink.published(), 0);
        assert!(!sink.is_pending());
    }

    #[test]
    fn test_reconnects_after_transient_fault() {
        let device = MockTransport::new();
        device.inject(b"{\"data\": [1,2");
        device.inject_fault(io::ErrorKind::BrokenPipe);
        device.inject_line(&line_of("7", ZONE_COUNT));

        let sink = Arc::new(LatestValueBuffer::new());
        let cancel = CancelToken::new();
        let handle = {
            let (device, sink, cancel) = (device.clone(), sink.clone(), cancel.clone());
            thread::spawn(move || quick().run(|| Ok(device.connect()?), &sink, &cancel))
        };

        wait_until("publish after reconnect", || sink.published() == 1);
        cancel.cancel();
        let report = handle.join().unwrap().unwrap();

        // The partial line from before the fault must not corrupt the next one.
        assert_eq!(report.reconnects, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(device.connects(), 2);
        assert_eq!(sink.take_latest().map(|g| g.zone(0, 0)), Some(Some(7.0)));
    }

    #[test]
    fn test_link_lost_after_reconnects_exhausted() {
        let device = MockTransport::new();
        device.inject_line(&line_of("300", ZONE_COUNT));

        let sink = Arc::new(LatestValueBuffer::new());
        let cancel = CancelToken::new();
        let handle = {
            let (device, sink, cancel) = (device.clone(), sink.clone(), cancel.clone());
            thread::spawn(move || quick().run(|| Ok(device.connect()?), &sink, &cancel))
        };

        wait_until("first publish", || sink.published() == 1);
        device.set_present(false);
        let result = handle.join().unwrap();

        assert!(matches!(result, Err(TofError::LinkLost { attempts: 2 })));
        assert_eq!(device.open_handles(), 0);
        assert_eq!(device.connects(), 1);
        assert!(sink.is_pending());
    }

    #[test]
    fn test_zero_reconnect_attempts_fails_on_first_fault() {
        let device = MockTransport::new();
        device.inject_fault(io::ErrorKind::PermissionDenied);
        let sink = LatestValueBuffer::new();
        let result = SerialIngestor::new(0, Duration::from_millis(5)).run(
            || Ok(device.connect()?),
            &sink,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(TofError::LinkLost { attempts: 0 })));
        assert_eq!(device.open_handles(), 0);
    }

    #[test]
    fn test_cancel_during_reconnect_wait_stops_cleanly() {
        let device = MockTransport::new();
        let cancel = CancelToken::new();
        let sink = Arc::new(LatestValueBuffer::new());

        // Unplugging queues a read fault and refuses every reconnect.
        let mut first = Some(device.connect().unwrap());
        device.set_present(false);

        let ingestor = SerialIngestor::new(1_000, Duration::from_millis(20));
        let handle = {
            let (device, sink, cancel) = (device.clone(), sink.clone(), cancel.clone());
            thread::spawn(move || {
                ingestor.run(
                    || match first.take() {
                        Some(port) => Ok(port),
                        None => Ok(device.connect()?),
                    },
                    &sink,
                    &cancel,
                )
            })
        };

        thread::sleep(Duration::from_millis(60));
        cancel.cancel();
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.reconnects, 0);
        assert_eq!(device.open_handles(), 0);
    }
}
