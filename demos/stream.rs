//! Show live 8x8 distance grids from a serial-attached sensor board.
//!
//! Usage: TOFGRID_PORT=/dev/ttyACM0 cargo run --example stream
//! Other TOFGRID_* variables tune baud, tick rate and render policy.
//! Press Ctrl+C to stop.

use std::io::{self, Write};
use std::time::Instant;
use tofgrid::{Config, Grid, Pipeline};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    eprintln!("Port:     {}", config.port);
    eprintln!("Baud:     {}", config.baud_rate);
    eprintln!("Tick:     {:?}", config.tick_interval);
    eprintln!("Policy:   {:?}", config.render_policy);

    let start = Instant::now();
    let mut frames: u64 = 0;
    let renderer = move |grid: &Grid| {
        frames += 1;
        let stdout = io::stdout();
        let mut out = stdout.lock();
        // Home the cursor and redraw in place.
        let _ = write!(out, "\x1b[2J\x1b[H");
        let _ = writeln!(out, "{}", grid);
        let _ = writeln!(
            out,
            "\nvalid zones: {:2}/64   nearest: {:>6}   draws: {} ({:.1} Hz)",
            grid.valid_count(),
            grid.nearest()
                .map(|mm| format!("{:.0}mm", mm))
                .unwrap_or_else(|| "--".into()),
            frames,
            frames as f64 / start.elapsed().as_secs_f64(),
        );
        let _ = out.flush();
    };

    let mut pipeline = match Pipeline::start(&config, renderer) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open {}: {}", config.port, e);
            std::process::exit(1);
        }
    };

    // Ingestion only returns on its own when the link is gone for good.
    match pipeline.wait_ingest() {
        Some(Err(e)) => eprintln!("\nIngest stopped: {} (display frozen on last frame)", e),
        Some(Ok(report)) => eprintln!("\nIngest finished: {:?}", report),
        None => {}
    }

    let report = pipeline.stop();
    if let Ok(render) = report.render {
        eprintln!(
            "Rendered {} ticks ({} fresh, {} held)",
            render.ticks, render.fresh, render.held
        );
    }
}
