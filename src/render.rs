use crate::buffer::LatestValueBuffer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::types::{Grid, RenderPolicy};
use std::time::Duration;

/// The drawing side of the pipeline.
///
/// Called from the render thread once per tick at most. An
/// implementation that takes longer than the tick interval makes the
/// scheduler skip ticks; it never slows ingestion.
pub trait Renderer {
    fn render(&mut self, grid: &Grid);
}

impl<F> Renderer for F
where
    F: FnMut(&Grid),
{
    fn render(&mut self, grid: &Grid) {
        self(grid)
    }
}

/// Per-tick counters for one render run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub ticks: u64,
    /// Ticks that rendered a newly published grid.
    pub fresh: u64,
    /// Ticks that re-rendered the previous grid.
    pub held: u64,
    /// Ticks that rendered an all-invalid grid.
    pub blank: u64,
    /// Ticks where the renderer was not called.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Fresh,
    Held,
    Blank,
    Skipped,
}

/// Drives a [`Renderer`] at a fixed cadence from a [`LatestValueBuffer`].
#[derive(Debug, Clone)]
pub struct RenderScheduler {
    interval: Duration,
    policy: RenderPolicy,
}

impl RenderScheduler {
    pub fn new(interval: Duration, policy: RenderPolicy) -> Self {
        Self { interval, policy }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tick_interval, config.render_policy)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn policy(&self) -> RenderPolicy {
        self.policy
    }

    /// Tick until cancelled.
    ///
    /// Ticks come from a fixed-rate ticker, so the cadence does not drift
    /// with render time. Ticks that elapse while the renderer is busy are
    /// dropped rather than replayed.
    pub fn run<R>(
        &self,
        source: &LatestValueBuffer<Grid>,
        renderer: &mut R,
        cancel: &CancelToken,
    ) -> RenderReport
    where
        R: Renderer + ?Sized,
    {
        let ticker = crossbeam_channel::tick(self.interval);
        let mut last = None;
        let mut report = RenderReport::default();

        log::info!(
            "Render scheduler started ({:?} interval, {:?} policy)",
            self.interval,
            self.policy
        );

        while !cancel.is_cancelled() {
            if ticker.recv().is_err() || cancel.is_cancelled() {
                break;
            }

            report.ticks += 1;
            match self.step(source, renderer, &mut last) {
                Tick::Fresh => report.fresh += 1,
                Tick::Held => report.held += 1,
                Tick::Blank => report.blank += 1,
                Tick::Skipped => report.skipped += 1,
            }
        }

        log::info!(
            "Render scheduler stopped after {} ticks ({} fresh, {} held, {} blank, {} skipped)",
            report.ticks,
            report.fresh,
            report.held,
            report.blank,
            report.skipped
        );
        report
    }

    fn step<R>(
        &self,
        source: &LatestValueBuffer<Grid>,
        renderer: &mut R,
        last: &mut Option<Grid>,
    ) -> Tick
    where
        R: Renderer + ?Sized,
    {
        if let Some(grid) = source.take_latest() {
            renderer.render(&grid);
            *last = Some(grid);
            return Tick::Fresh;
        }

        match (self.policy, last.as_ref()) {
            (RenderPolicy::HoldLast, Some(grid)) => {
                renderer.render(grid);
                Tick::Held
            }
            (RenderPolicy::Blank, _) => {
                renderer.render(&Grid::empty());
                Tick::Blank
            }
            (RenderPolicy::HoldLast, None) | (RenderPolicy::Skip, _) => Tick::Skipped,
        }
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZONE_COUNT;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn grid_of(mm: f32) -> Grid {
        Grid::new([Some(mm); ZONE_COUNT])
    }

    fn drive(policy: RenderPolicy, script: &[Option<Grid>]) -> (Vec<Tick>, Vec<Grid>) {
        let scheduler = RenderScheduler::new(Duration::from_millis(1), policy);
        let source = LatestValueBuffer::new();
        let mut rendered = Vec::new();
        let mut renderer = |grid: &Grid| rendered.push(*grid);
        let mut last = None;

        let mut ticks = Vec::new();
        for publish in script {
            if let Some(grid) = publish {
                source.publish(*grid);
            }
            ticks.push(scheduler.step(&source, &mut renderer, &mut last));
        }
        (ticks, rendered)
    }

    #[test]
    fn test_hold_last_rerenders_previous_grid() {
        let (ticks, rendered) = drive(
            RenderPolicy::HoldLast,
            &[None, Some(grid_of(10.0)), None, None],
        );
        assert_eq!(ticks, vec![Tick::Skipped, Tick::Fresh, Tick::Held, Tick::Held]);
        assert_eq!(rendered, vec![grid_of(10.0); 3]);
    }

    #[test]
    fn test_skip_leaves_renderer_idle() {
        let (ticks, rendered) = drive(RenderPolicy::Skip, &[Some(grid_of(10.0)), None]);
        assert_eq!(ticks, vec![Tick::Fresh, Tick::Skipped]);
        assert_eq!(rendered, vec![grid_of(10.0)]);
    }

    #[test]
    fn test_blank_renders_empty_grid() {
        let (ticks, rendered) = drive(RenderPolicy::Blank, &[None, Some(grid_of(10.0)), None]);
        assert_eq!(ticks, vec![Tick::Blank, Tick::Fresh, Tick::Blank]);
        assert_eq!(rendered, vec![Grid::empty(), grid_of(10.0), Grid::empty()]);
    }

    #[test]
    fn test_tick_sees_only_latest_of_a_burst() {
        let scheduler = RenderScheduler::new(Duration::from_millis(1), RenderPolicy::Skip);
        let source = LatestValueBuffer::new();
        source.publish(grid_of(100.0));
        source.publish(Grid::empty());

        let mut rendered = Vec::new();
        let mut last = None;
        scheduler.step(&source, &mut |grid: &Grid| rendered.push(*grid), &mut last);
        assert_eq!(rendered, vec![Grid::empty()]);
    }

    #[test]
    fn test_run_ticks_until_cancelled() {
        let source = Arc::new(LatestValueBuffer::new());
        source.publish(grid_of(42.0));
        let cancel = CancelToken::new();

        let handle = {
            let (source, cancel) = (source.clone(), cancel.clone());
            thread::spawn(move || {
                let mut frames = 0u64;
                let scheduler =
                    RenderScheduler::new(Duration::from_millis(5), RenderPolicy::HoldLast);
                let report = scheduler.run(&source, &mut |_: &Grid| frames += 1, &cancel);
                (report, frames)
            })
        };

        thread::sleep(Duration::from_millis(100));
        let stop_requested = Instant::now();
        cancel.cancel();
        let (report, frames) = handle.join().unwrap();

        assert!(stop_requested.elapsed() < Duration::from_secs(1));
        assert!(report.ticks >= 3, "only {} ticks", report.ticks);
        assert_eq!(report.fresh, 1);
        assert_eq!(report.held, report.ticks - 1);
        assert_eq!(frames, report.ticks);
    }

    #[test]
    fn test_slow_renderer_drops_ticks() {
        let source = LatestValueBuffer::new();
        let cancel = CancelToken::new();
        let scheduler = RenderScheduler::new(Duration::from_millis(5), RenderPolicy::Blank);

        let started = Instant::now();
        let mut calls = 0u32;
        let report = scheduler.run(
            &source,
            &mut |_: &Grid| {
                calls += 1;
                thread::sleep(Duration::from_millis(25));
                if calls == 4 {
                    cancel.cancel();
                }
            },
            &cancel,
        );
        let elapsed = started.elapsed();

        // 4 renders of 25ms span ~20 intervals, but only 4 ticks ran.
        assert_eq!(report.ticks, 4);
        assert_eq!(report.blank, 4);
        assert!(elapsed >= Duration::from_millis(100));
    }
}
