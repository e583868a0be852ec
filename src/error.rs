use std::fmt;

/// Reasons a single wire line is rejected by the frame decoder.
///
/// All of these are recoverable: the ingestor drops the offending line
/// and keeps reading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    MalformedSyntax(String),

    #[error("frame has no \"data\" array")]
    MissingField,

    #[error("frame has {found} entries, expected 64")]
    LengthMismatch { found: usize },

    #[error("zone {index} is not a non-negative number or null")]
    InvalidEntry { index: usize },
}

/// Errors surfaced by the ingestion and rendering pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TofError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Serial link lost after {attempts} reconnect attempts")]
    LinkLost { attempts: u32 },

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &dyn std::error::Error) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
