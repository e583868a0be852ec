//! Run the full pipeline against a simulated sensor board.
//!
//! A firmware thread prints frames at 15 Hz into a mock link, with the
//! occasional corrupt line mixed in, then unplugs after a few seconds.
//! The render thread keeps showing the last frame after the link is lost.
//!
//! Usage: cargo run --example simulate
//! RUST_LOG=debug shows per-frame decisions.

use std::thread;
use std::time::{Duration, Instant};
use tofgrid::protocol::{self, FIRMWARE_RANGING_HZ};
use tofgrid::transport::MockTransport;
use tofgrid::{Config, Grid, Pipeline, Sample, GRID_WIDTH, ZONE_COUNT};

const RUN_FOR: Duration = Duration::from_secs(4);

fn synthetic_frame(n: u32) -> Grid {
    let phase = n as f32 * 0.15;
    let mut samples: [Sample; ZONE_COUNT] = [None; ZONE_COUNT];
    for (i, slot) in samples.iter_mut().enumerate() {
        let (row, col) = (i / GRID_WIDTH, i % GRID_WIDTH);
        // A tilted surface sweeping back and forth, with a few dropouts.
        if (i as u32 + n) % 23 != 0 {
            let mm = 900.0 + 500.0 * (phase + col as f32 * 0.4).sin() + row as f32 * 30.0;
            *slot = Some(mm.max(0.0));
        }
    }
    Grid::new(samples)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let device = MockTransport::new();
    let firmware = {
        let device = device.clone();
        thread::spawn(move || {
            let ticker =
                crossbeam_channel::tick(Duration::from_secs(1) / FIRMWARE_RANGING_HZ);
            let start = Instant::now();
            let mut n = 0u32;
            while start.elapsed() < RUN_FOR {
                let _ = ticker.recv();
                n += 1;
                match n % 20 {
                    7 => device.inject_line("{\"data\": [12"),
                    13 => device.inject_line(&format!(
                        "{{\"data\": [{}]}}",
                        vec!["100"; ZONE_COUNT - 1].join(",")
                    )),
                    _ => device.inject_line(&protocol::encode(&synthetic_frame(n))),
                }
            }
            eprintln!("firmware: unplugging after {} frames", n);
            device.set_present(false);
        })
    };

    let config = Config {
        reconnect_attempts: 2,
        reconnect_delay: Duration::from_millis(200),
        ..Config::from_env()
    };

    let port = match device.connect() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            std::process::exit(1);
        }
    };
    let reopen = {
        let device = device.clone();
        move || -> tofgrid::Result<MockTransport> { Ok(device.connect()?) }
    };

    let renderer = |grid: &Grid| {
        println!("\x1b[2J\x1b[H{}\n\nvalid zones: {}", grid, grid.valid_count());
    };

    let mut pipeline = match Pipeline::start_with(port, reopen, &config, renderer) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to start pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let _ = firmware.join();
    if let Some(result) = pipeline.wait_ingest() {
        eprintln!("ingest ended: {:?}", result);
    }

    // Keep rendering on the held frame for a moment to show the frozen display.
    thread::sleep(Duration::from_millis(500));
    let report = pipeline.stop();
    eprintln!("render: {:?}", report.render);
}
