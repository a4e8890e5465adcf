// src/main.rs

mod blur;
mod capture;
mod display;
mod inspector;
mod overlay;
mod receiver;
mod sampler;
mod session;
mod spatial_map;
mod tracker;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use capture::CameraCapture;
use display::HighguiDisplay;
use inspector::Inspector;
use receiver::{Receiver, ReceiverConfig, RtlSdrReceiver};
use sampler::PowerSampler;
use session::{SessionConfig, SessionController};
use tracker::{CsrtTracker, ProbeTracker};

/// RTL-SDR sample rate, the chip's stable sweet spot.
const SAMPLE_RATE_HZ: f64 = 2.4e6;

/// EMI mapping with a camera-tracked probe and an RTL-SDR.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Camera id.
    #[arg(short, long, default_value_t = 0)]
    camera: i32,

    /// Center frequency on the SDR, in MHz.
    #[arg(short, long, default_value_t = 300.0)]
    frequency: f64,

    /// SDR tuner gain, in tenths of a dB (496 = 49.6 dB).
    #[arg(short, long, default_value_t = 496)]
    gain: i32,

    /// SDR device index.
    #[arg(short, long, default_value_t = 0)]
    device: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emi_mapper=info".into()),
        )
        .init();

    info!("EMI mapper starting");
    info!("  * press s to select the probe");
    info!("  * press r to reset");
    info!("  * press q to display the EMI map and exit");

    let args = Args::parse();

    // The receiver is mandatory: without it there is nothing to map.
    let receiver = RtlSdrReceiver::open(
        args.device,
        ReceiverConfig {
            center_freq_hz: args.frequency * 1e6,
            sample_rate_hz: SAMPLE_RATE_HZ,
            gain_tenth_db: args.gain,
        },
    )
    .context("failed to open the RTL-SDR receiver")?;

    let inspector = Inspector::new(
        receiver.sample_rate() / 1e6,
        receiver.center_frequency() / 1e6,
    );
    let sampler = PowerSampler::new(receiver);

    // A camera that fails to open degrades to an empty frame stream.
    let capture = CameraCapture::open(args.camera)?;
    let display = HighguiDisplay::new()?;
    let tracker = ProbeTracker::new(Box::new(CsrtTracker::new()));

    let mut session = SessionController::new(
        capture,
        sampler,
        display,
        tracker,
        inspector,
        SessionConfig::default(),
    );

    let stats = session.run()?;
    if stats.cycles > 0 {
        info!(
            "session done: {} readings, {} map writes, {:.2} .. {:.2} dBm",
            stats.readings, stats.cycles, stats.min_dbm, stats.max_dbm
        );
    }

    Ok(())
}
