//! C FFI layer for tofgrid.
//!
//! Lets a renderer written in C/C++ (or anything with a C FFI) pull grids
//! at its own frame rate while ingestion runs on a Rust thread. The C
//! header is written to `include/tofgrid.h` by cbindgen.

use crate::buffer::LatestValueBuffer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::LastError;
use crate::ingest::{IngestReport, SerialIngestor};
use crate::protocol;
use crate::transport::SerialTransport;
use crate::types::{Grid, ZONE_COUNT};
use crate::{Result, TofError};
use std::ffi::{c_char, c_int, CStr};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// One 8x8 frame in C-compatible layout, row-major.
#[repr(C)]
pub struct TgGrid {
    /// Distance in millimetres; 0 where `valid` is 0.
    pub distance_mm: [f32; ZONE_COUNT],
    /// 1 if the zone holds a valid reading, else 0.
    pub valid: [u8; ZONE_COUNT],
}

impl From<&Grid> for TgGrid {
    fn from(grid: &Grid) -> Self {
        let mut out = TgGrid {
            distance_mm: [0.0; ZONE_COUNT],
            valid: [0; ZONE_COUNT],
        };
        for (i, sample) in grid.samples().iter().enumerate() {
            if let Some(mm) = sample {
                out.distance_mm[i] = *mm;
                out.valid[i] = 1;
            }
        }
        out
    }
}

/// Opaque handle to a running ingest thread.
pub struct TgIngest {
    buffer: Arc<LatestValueBuffer<Grid>>,
    cancel: CancelToken,
    thread: Option<JoinHandle<Result<IngestReport>>>,
}

impl TgIngest {
    fn start(config: Config) -> Result<TgIngest> {
        let port = SerialTransport::from_config(&config)?;
        let buffer = Arc::new(LatestValueBuffer::new());
        let cancel = CancelToken::new();

        let thread = {
            let (buffer, cancel) = (buffer.clone(), cancel.clone());
            let mut first = Some(port);
            std::thread::Builder::new()
                .name("tofgrid-ingest".into())
                .spawn(move || {
                    let open = || match first.take() {
                        Some(port) => Ok(port),
                        None => SerialTransport::from_config(&config),
                    };
                    SerialIngestor::from_config(&config).run(open, &buffer, &cancel)
                })
                .map_err(|e| {
                    TofError::ThreadSpawn(format!("Failed to spawn ingest thread: {}", e))
                })?
        };

        Ok(TgIngest {
            buffer,
            cancel,
            thread: Some(thread),
        })
    }

    /// Join the thread if it has ended and record why.
    fn reap(&mut self) {
        let finished = self.thread.as_ref().is_some_and(|h| h.is_finished());
        if !finished {
            return;
        }
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => LAST_ERROR.set(&e),
                Err(_) => LAST_ERROR.set(&TofError::ThreadPanicked("ingest")),
            }
        }
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TgIngest {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decode one wire line (without its newline).
/// Returns 0 on success, -1 on error (see `tg_last_error()`).
///
/// # Safety
/// `line` must be a null-terminated string and `out` a valid `TgGrid`
/// pointer, or either may be null.
#[no_mangle]
pub unsafe extern "C" fn tg_decode_line(line: *const c_char, out: *mut TgGrid) -> c_int {
    if line.is_null() || out.is_null() {
        return -1;
    }
    let line = CStr::from_ptr(line);

    match protocol::decode_bytes(line.to_bytes()) {
        Ok(grid) => {
            out.write(TgGrid::from(&grid));
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Open a serial port and start ingesting in the background.
/// `baud_rate` of 0 uses the configured default. Other settings come from
/// the `TOFGRID_*` environment variables.
/// Returns NULL on error (check `tg_last_error()`).
///
/// # Safety
/// `port` must be a null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn tg_ingest_start(port: *const c_char, baud_rate: u32) -> *mut TgIngest {
    if port.is_null() {
        return std::ptr::null_mut();
    }

    let mut config = Config::from_env();
    config.port = CStr::from_ptr(port).to_string_lossy().into_owned();
    if baud_rate != 0 {
        config.baud_rate = baud_rate;
    }

    match TgIngest::start(config) {
        Ok(ingest) => Box::into_raw(Box::new(ingest)),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Take the newest grid, if one arrived since the last call.
/// Returns 1 when `out` was written, 0 when nothing new is waiting, and
/// -1 once ingestion has ended with nothing left to take (link lost; see
/// `tg_last_error()`).
///
/// # Safety
/// `ingest` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn tg_ingest_take_latest(ingest: *mut TgIngest, out: *mut TgGrid) -> c_int {
    if ingest.is_null() || out.is_null() {
        return -1;
    }
    let ingest = &mut *ingest;

    if let Some(grid) = ingest.buffer.take_latest() {
        out.write(TgGrid::from(&grid));
        return 1;
    }

    ingest.reap();
    if ingest.thread.is_none() {
        -1
    } else {
        0
    }
}

/// Check whether the ingest thread is still reading.
///
/// # Safety
/// `ingest` must be a valid handle pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tg_ingest_is_active(ingest: *const TgIngest) -> bool {
    if ingest.is_null() {
        return false;
    }
    let ingest = &*ingest;
    ingest.thread.as_ref().is_some_and(|h| !h.is_finished())
}

/// Stop ingesting, close the port, and free the handle.
///
/// # Safety
/// `ingest` must be a pointer returned by `tg_ingest_start`, or null.
#[no_mangle]
pub unsafe extern "C" fn tg_ingest_stop(ingest: *mut TgIngest) {
    if !ingest.is_null() {
        drop(Box::from_raw(ingest));
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next tofgrid API call.
#[no_mangle]
pub extern "C" fn tg_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
