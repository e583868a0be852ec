use std::fmt;

/// Number of zones along one side of the sensor matrix.
pub const GRID_WIDTH: usize = 8;

/// Total zones per frame (8x8, row-major).
pub const ZONE_COUNT: usize = GRID_WIDTH * GRID_WIDTH;

/// One zone reading in millimetres. `None` when the sensor flagged the
/// zone as not status-valid.
pub type Sample = Option<f32>;

/// One decoded 8x8 distance frame.
///
/// Zone `i` sits at `row = i / 8, col = i % 8`. Row 0 is the bottom row
/// of the sensor's field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    samples: [Sample; ZONE_COUNT],
}

impl Grid {
    pub const fn new(samples: [Sample; ZONE_COUNT]) -> Self {
        Self { samples }
    }

    /// A grid with every zone invalid.
    pub const fn empty() -> Self {
        Self {
            samples: [None; ZONE_COUNT],
        }
    }

    /// Reading for a zone by row and column. Panics if either is >= 8.
    pub fn zone(&self, row: usize, col: usize) -> Sample {
        assert!(row < GRID_WIDTH && col < GRID_WIDTH, "zone out of range");
        self.samples[row * GRID_WIDTH + col]
    }

    /// All 64 readings in zone-index order.
    pub fn samples(&self) -> &[Sample; ZONE_COUNT] {
        &self.samples
    }

    /// Rows from row 0 (bottom) to row 7 (top).
    pub fn rows(&self) -> impl Iterator<Item = &[Sample]> {
        self.samples.chunks_exact(GRID_WIDTH)
    }

    /// Number of zones carrying a valid reading.
    pub fn valid_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }

    /// Smallest valid distance in the frame, if any zone is valid.
    pub fn nearest(&self) -> Option<f32> {
        self.samples.iter().flatten().copied().reduce(f32::min)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<[Sample; ZONE_COUNT]> for Grid {
    fn from(samples: [Sample; ZONE_COUNT]) -> Self {
        Self::new(samples)
    }
}

/// Prints the matrix as the sensor sees it: top row first, invalid zones
/// as `--`.
impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<&[Sample]> = self.rows().collect();
        for (i, row) in rows.iter().rev().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for (col, sample) in row.iter().enumerate() {
                if col > 0 {
                    write!(f, " ")?;
                }
                match sample {
                    Some(mm) => write!(f, "{:>5.0}", mm)?,
                    None => write!(f, "{:>5}", "--")?,
                }
            }
        }
        Ok(())
    }
}

/// What the render scheduler does on a tick with no fresh grid.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPolicy {
    /// Re-render the last grid seen (nothing until the first frame).
    #[default]
    HoldLast = 0,
    /// Leave the renderer alone for that tick.
    Skip = 1,
    /// Render an all-invalid grid.
    Blank = 2,
}

impl RenderPolicy {
    /// Parse the names accepted in `TOFGRID_RENDER_POLICY`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hold" | "hold-last" | "hold_last" => Some(Self::HoldLast),
            "skip" => Some(Self::Skip),
            "blank" | "clear" | "zeros" => Some(Self::Blank),
            _ => None,
        }
    }
}
