// src/session.rs

use anyhow::Result;
use tracing::{info, warn};

use crate::blur::blur_nan;
use crate::capture::Capture;
use crate::display::Display;
use crate::inspector::Inspector;
use crate::overlay;
use crate::sampler::PowerSource;
use crate::spatial_map::SpatialMap;
use crate::tracker::ProbeTracker;
use crate::types::{Command, Frame, ProbeReading, TrackingState};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub blur_sigma: f64,
    /// Whether `reset` also clears the spectrum cache. Off by default:
    /// inspector clicks keep working across a re-baseline.
    pub clear_spectrum_on_reset: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 7.0,
            clear_spectrum_on_reset: false,
        }
    }
}

/// Running totals for the final report. Min/max are over measured readings,
/// not over the last-write-wins map contents, so a hot spot that was later
/// overwritten still shows up in the summary.
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    /// Successful tracking+sampling cycles (map writes).
    pub cycles: u64,
    /// All power readings, including unknown-location ones.
    pub readings: u64,
    pub min_dbm: f64,
    pub max_dbm: f64,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            cycles: 0,
            readings: 0,
            min_dbm: f64::INFINITY,
            max_dbm: f64::NEG_INFINITY,
        }
    }

    fn record(&mut self, dbm: f64) {
        self.readings += 1;
        self.min_dbm = self.min_dbm.min(dbm);
        self.max_dbm = self.max_dbm.max(dbm);
    }
}

/// Drives the per-frame loop: capture, track, sample, write, render, poll.
///
/// All mutable session state (map, baseline, tracker, stats) lives here and
/// is touched by nothing else. Device handles release through `Drop`, so
/// every exit path, including errors mid-loop, cleans up.
pub struct SessionController<C: Capture, S: PowerSource, D: Display> {
    capture: C,
    sampler: S,
    display: D,
    tracker: ProbeTracker,
    inspector: Inspector,
    config: SessionConfig,
    baseline: Option<Frame>,
    map: Option<SpatialMap>,
    stats: SessionStats,
}

impl<C: Capture, S: PowerSource, D: Display> SessionController<C, S, D> {
    pub fn new(
        capture: C,
        sampler: S,
        display: D,
        tracker: ProbeTracker,
        inspector: Inspector,
        config: SessionConfig,
    ) -> Self {
        Self {
            capture,
            sampler,
            display,
            tracker,
            inspector,
            config,
            baseline: None,
            map: None,
            stats: SessionStats::new(),
        }
    }

    /// Run until quit, capture exhaustion, or a fatal error. The final map
    /// is emitted on every exit path that has something to show.
    pub fn run(&mut self) -> Result<SessionStats> {
        match self.run_loop() {
            Ok(()) => {
                self.finish()?;
                Ok(self.stats)
            }
            Err(e) => {
                // Best effort: the error propagates either way and Drop
                // releases the devices.
                let _ = self.finish();
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        while let Some(frame) = self.capture.read_frame()? {
            if self.baseline.is_none() {
                if self.map.is_none() {
                    self.map = Some(SpatialMap::new(
                        frame.height,
                        frame.width,
                        self.config.clear_spectrum_on_reset,
                    ));
                    info!("grids allocated for {}x{} frames", frame.width, frame.height);
                }
                self.baseline = Some(frame);
                continue;
            }
            let Some(map) = self.map.as_mut() else {
                continue;
            };

            // Track and sample. Sampling proceeds on lost frames too; only
            // the geometric write is skipped.
            let mut tracked = None;
            if self.tracker.is_armed() {
                let update = self.tracker.update(&frame)?;
                let (power_dbm, samples) = self.sampler.sample()?;
                self.stats.record(power_dbm);
                let reading = ProbeReading {
                    position: update.map(|bb| bb.center()),
                    power_dbm,
                    samples,
                };
                if let Some(bb) = update {
                    map.write_power(&bb, reading.power_dbm);
                    map.write_spectrum(bb.center(), reading.samples.clone());
                    self.stats.cycles += 1;
                    tracked = Some((bb, reading.power_dbm));
                }
                match reading.position {
                    Some((cx, cy)) => {
                        info!("RMS power {power_dbm:.2} dBm at ({cx:.0}, {cy:.0})")
                    }
                    None => info!("RMS power {power_dbm:.2} dBm at unknown location"),
                }
            }

            let mut live = frame.clone();
            overlay::paint_scanned_region(&mut live, &map.validity());
            self.display.show_live(
                &live,
                tracked.as_ref().map(|(bb, _)| bb),
                tracked.as_ref().map(|(_, p)| *p),
            )?;

            if self.stats.cycles > 0 {
                if let Some(baseline) = &self.baseline {
                    let blurred = blur_nan(map.power_map(), self.config.blur_sigma);
                    let preview = overlay::render_preview(baseline, &blurred);
                    self.display.show_preview(&preview)?;
                }
            }

            for (x, y) in self.display.take_clicks() {
                if let Some(view) = self.inspector.inspect(map, x, y) {
                    self.display.show_spectrum(&view)?;
                }
            }

            match self.display.poll_command()? {
                Some(Command::ArmTracking) => {
                    if self.tracker.state() == TrackingState::Idle {
                        if let Some(bb) = self.display.select_region(&frame)? {
                            self.tracker.arm(&frame, bb)?;
                        }
                    }
                }
                Some(Command::Reset) => {
                    info!("reset: clearing baseline and power map");
                    self.baseline = None;
                    map.reset();
                    self.tracker.reset();
                }
                Some(Command::Quit) => return Ok(()),
                None => {}
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.stats.cycles == 0 {
            warn!("nothing captured, nothing to do");
            return Ok(());
        }
        let (Some(baseline), Some(map)) = (&self.baseline, &self.map) else {
            warn!("no baseline to render the final map against");
            return Ok(());
        };
        let blurred = blur_nan(map.power_map(), self.config.blur_sigma);
        let image = overlay::render_preview(baseline, &blurred);
        let caption = overlay::summary_caption(self.stats.min_dbm, self.stats.max_dbm);
        self.display.show_final(&image, &caption)
    }
}
