//! # tofgrid - live distance grids from an 8x8 time-of-flight sensor
//!
//! The sensor board prints one JSON frame per line over a serial link.
//! This crate:
//! - frames and validates those lines into 64-zone [`Grid`]s
//! - hands the newest grid from the ingest thread to the render thread
//!   through a single-slot [`LatestValueBuffer`]
//! - drives a [`Renderer`] at a fixed tick rate, independent of how fast
//!   frames arrive
//! - survives malformed frames and short link dropouts
//! - exposes a C API for renderers written in other languages
//!
//! ## Quick Start
//! ```no_run
//! use tofgrid::{Config, Grid, Pipeline};
//!
//! let config = Config::from_env();
//! let mut pipeline = Pipeline::start(&config, |grid: &Grid| {
//!     println!("{}\n", grid);
//! })
//! .unwrap();
//!
//! // Returns when the link is lost for good; the last grid stays on screen.
//! if let Some(Err(e)) = pipeline.wait_ingest() {
//!     eprintln!("ingest stopped: {}", e);
//! }
//! pipeline.stop();
//! ```

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ffi;
pub mod ingest;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transport;
pub mod types;

pub use buffer::LatestValueBuffer;
pub use cancel::CancelToken;
pub use config::Config;
pub use error::{DecodeError, TofError};
pub use ingest::{IngestReport, SerialIngestor};
pub use render::{RenderReport, RenderScheduler, Renderer};
pub use session::{Pipeline, PipelineReport};
pub use types::*;

/// Result type alias for tofgrid operations.
pub type Result<T> = std::result::Result<T, TofError>;
