//! Scriptable in-memory link for tests and the simulator demo.

use super::Transport;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

enum Event {
    Data(Vec<u8>),
    Fault(io::ErrorKind),
}

struct Inner {
    script: VecDeque<Event>,
    present: bool,
    connects: u32,
    open_handles: u32,
}

/// Mock transport handle, created by [`MockTransport::connect`].
///
/// Reads drain the shared script in order. An empty script behaves like a
/// serial read timeout: a short sleep and `Ok(0)`. Clones share the
/// script; only connected handles count as open.
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    connected: bool,
}

impl MockTransport {
    /// A device that is plugged in with nothing to say yet.
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(Inner {
                script: VecDeque::new(),
                present: true,
                connects: 0,
                open_handles: 0,
            })),
            connected: false,
        }
    }

    /// Open a new handle on the same script, the way the ingestor opens a
    /// port. Fails with `NotFound` while the device is unplugged.
    pub fn connect(&self) -> io::Result<MockTransport> {
        let mut inner = self.lock();
        if !inner.present {
            return Err(io::Error::new(io::ErrorKind::NotFound, "mock device not present"));
        }
        inner.connects += 1;
        inner.open_handles += 1;
        Ok(MockTransport {
            inner: self.inner.clone(),
            connected: true,
        })
    }

    /// Queue raw bytes.
    pub fn inject(&self, data: &[u8]) {
        self.lock().script.push_back(Event::Data(data.to_vec()));
    }

    /// Queue one line followed by `\n`.
    pub fn inject_line(&self, line: &str) {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.lock().script.push_back(Event::Data(data));
    }

    /// Queue a read error after everything already queued.
    pub fn inject_fault(&self, kind: io::ErrorKind) {
        self.lock().script.push_back(Event::Fault(kind));
    }

    /// Plug or unplug the device. Unplugging also fails the next read.
    pub fn set_present(&self, present: bool) {
        let mut inner = self.lock();
        inner.present = present;
        if !present {
            inner.script.push_back(Event::Fault(io::ErrorKind::BrokenPipe));
        }
    }

    /// Script entries not yet consumed.
    pub fn pending(&self) -> usize {
        self.lock().script.len()
    }

    /// Successful `connect` calls so far.
    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    /// Handles from `connect` that have not been dropped.
    pub fn open_handles(&self) -> u32 {
        self.lock().open_handles
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        MockTransport {
            inner: self.inner.clone(),
            connected: false,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if self.connected {
            let mut inner = self.lock();
            inner.open_handles = inner.open_handles.saturating_sub(1);
        }
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.lock().script.pop_front();
        match next {
            Some(Event::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.lock().script.push_front(Event::Data(rest));
                }
                Ok(n)
            }
            Some(Event::Fault(kind)) => Err(io::Error::new(kind, "mock link fault")),
            None => {
                std::thread::sleep(Duration::from_millis(1));
                Ok(0)
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
