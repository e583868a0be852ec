//! Wire format of the ranging firmware.
//!
//! One JSON document per `\n`-terminated line:
//!
//! ```text
//! {"data": [120.5, null, 980.0, ...]}
//! ```
//!
//! `data` holds exactly 64 zone distances in millimetres, row-major, with
//! `null` wherever the sensor reported a non-valid target status.

use crate::error::DecodeError;
use crate::types::{Grid, ZONE_COUNT};
use serde_json::Value;

// -- Link defaults --
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Ranging frequency the reference firmware configures.
pub const FIRMWARE_RANGING_HZ: u32 = 15;

// -- Record layout --
pub const DATA_FIELD: &str = "data";

/// Longest line the assembler will buffer. A full frame of 64 four-digit
/// floats is well under 1 KiB.
pub const MAX_LINE_LEN: usize = 4096;

/// Decode one stripped line into a validated grid.
///
/// Checks run in order: JSON syntax, presence of the `data` array, entry
/// count, then each entry. The first failure wins and nothing partial is
/// returned.
pub fn decode(line: &str) -> Result<Grid, DecodeError> {
    let doc: Value =
        serde_json::from_str(line).map_err(|e| DecodeError::MalformedSyntax(e.to_string()))?;

    let entries = doc
        .get(DATA_FIELD)
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField)?;

    if entries.len() != ZONE_COUNT {
        return Err(DecodeError::LengthMismatch {
            found: entries.len(),
        });
    }

    let mut samples = [None; ZONE_COUNT];
    for (index, (slot, entry)) in samples.iter_mut().zip(entries).enumerate() {
        *slot = parse_entry(entry).ok_or(DecodeError::InvalidEntry { index })?;
    }

    Ok(Grid::new(samples))
}

/// Decode a raw line that has not been checked for UTF-8 yet.
pub fn decode_bytes(line: &[u8]) -> Result<Grid, DecodeError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| DecodeError::MalformedSyntax(format!("invalid UTF-8: {}", e)))?;
    decode(text)
}

/// `Some(None)` for null, `Some(Some(mm))` for a usable distance, `None`
/// when the entry is not allowed.
fn parse_entry(entry: &Value) -> Option<Option<f32>> {
    match entry {
        Value::Null => Some(None),
        Value::Number(n) => {
            let mm = n.as_f64()?;
            if (0.0..=f32::MAX as f64).contains(&mm) {
                Some(Some(mm as f32))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Encode a grid the way the firmware prints it (without the newline).
pub fn encode(grid: &Grid) -> String {
    let samples: &[Option<f32>] = grid.samples();
    serde_json::json!({ DATA_FIELD: samples }).to_string()
}

/// Output of [`LineAssembler::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framed {
    /// A complete line with the terminator and surrounding whitespace
    /// stripped. May be empty.
    Line(Vec<u8>),
    /// A line that ran past [`MAX_LINE_LEN`] and was thrown away. Carries
    /// the number of bytes discarded.
    Oversized(usize),
}

/// Splits a byte stream into `\n`-terminated lines.
///
/// Reads from the port arrive in arbitrary chunks, so a line may span
/// several pushes and one push may complete several lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
    discarded: usize,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Framed> {
        let mut out = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                if self.discarded > 0 {
                    out.push(Framed::Oversized(self.discarded));
                    self.discarded = 0;
                } else {
                    out.push(Framed::Line(self.pending.trim_ascii().to_vec()));
                }
                self.pending.clear();
                continue;
            }

            if self.discarded > 0 {
                self.discarded += 1;
            } else if self.pending.len() >= MAX_LINE_LEN {
                self.discarded = self.pending.len() + 1;
                self.pending.clear();
            } else {
                self.pending.push(byte);
            }
        }

        out
    }

    /// Bytes buffered toward the next line.
    pub fn pending_len(&self) -> usize {
        self.pending.len() + self.discarded
    }

    /// Drop any partial line, e.g. after the link was re-opened.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.discarded = 0;
    }
}
