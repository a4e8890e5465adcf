// src/sampler.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::receiver::Receiver;

/// Samples read per power estimate.
pub const BURST_LEN: usize = 4096;
/// Welch segment length for the live power estimate.
pub const SEGMENT_LEN: usize = 512;

/// Two-sided Welch PSD estimator: Hann window, 50% overlap, per-segment mean
/// removal, density scaling. Frequencies come out in natural FFT order.
pub struct WelchPsd {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    window_power: f64,
    segment_len: usize,
    sample_rate: f64,
}

impl WelchPsd {
    /// `sample_rate` sets the density scaling and the frequency axis; the
    /// power-map pipeline passes it in MHz so dBm values line up with the
    /// session's historical calibration.
    pub fn new(segment_len: usize, sample_rate: f64) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(segment_len);
        // Periodic Hann.
        let window: Vec<f64> = (0..segment_len)
            .map(|i| {
                let n = i as f64 / segment_len as f64;
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * n).cos())
            })
            .collect();
        let window_power = window.iter().map(|w| w * w).sum::<f64>();
        Self {
            fft,
            window,
            window_power,
            segment_len,
            sample_rate,
        }
    }

    /// Averaged two-sided PSD in linear units. Inputs shorter than one
    /// segment produce an all-zero estimate.
    pub fn estimate(&self, samples: &[Complex64]) -> Vec<f64> {
        let n = self.segment_len;
        if samples.len() < n {
            debug!("burst of {} samples shorter than segment {}", samples.len(), n);
            return vec![0.0; n];
        }
        let step = n / 2;
        let num_segments = (samples.len() - n) / step + 1;

        let mut accum = vec![0.0f64; n];
        let mut buf = vec![Complex64::new(0.0, 0.0); n];
        for seg in 0..num_segments {
            let segment = &samples[seg * step..seg * step + n];
            let mean = segment.iter().sum::<Complex64>() / n as f64;
            for (b, (&s, &w)) in buf.iter_mut().zip(segment.iter().zip(self.window.iter())) {
                *b = (s - mean) * w;
            }
            self.fft.process(&mut buf);
            for (a, x) in accum.iter_mut().zip(buf.iter()) {
                *a += x.norm_sqr();
            }
        }

        let scale = 1.0 / (self.sample_rate * self.window_power * num_segments as f64);
        accum.iter_mut().for_each(|a| *a *= scale);
        accum
    }

    /// Frequency of each PSD bin in the same units as `sample_rate`, natural
    /// FFT order (DC first, negative half last).
    pub fn frequencies(&self) -> Vec<f64> {
        let n = self.segment_len;
        (0..n)
            .map(|i| {
                let i = i as f64;
                let n = n as f64;
                if i < n / 2.0 {
                    i * self.sample_rate / n
                } else {
                    (i - n) * self.sample_rate / n
                }
            })
            .collect()
    }
}

/// RMS power, in dBm, of a linear PSD: `10 log10(sqrt(mean(psd^2)))`.
pub fn rms_power_dbm(psd: &[f64]) -> f64 {
    let mean_sq = psd.iter().map(|p| p * p).sum::<f64>() / psd.len() as f64;
    10.0 * mean_sq.sqrt().log10()
}

/// One power estimate plus the raw burst behind it. The session reads this
/// once per armed frame; implementations block until the burst is in.
pub trait PowerSource {
    fn sample(&mut self) -> Result<(f64, Arc<Vec<Complex64>>)>;
}

/// Welch-based power estimator over a radio receiver.
pub struct PowerSampler<R: Receiver> {
    receiver: R,
    welch: WelchPsd,
}

impl<R: Receiver> PowerSampler<R> {
    pub fn new(receiver: R) -> Self {
        let welch = WelchPsd::new(SEGMENT_LEN, receiver.sample_rate() / 1e6);
        Self { receiver, welch }
    }
}

impl<R: Receiver> PowerSource for PowerSampler<R> {
    fn sample(&mut self) -> Result<(f64, Arc<Vec<Complex64>>)> {
        let samples = self
            .receiver
            .read_samples(BURST_LEN)
            .context("receiver sample read failed")?;
        let psd = self.welch.estimate(&samples);
        let power = rms_power_dbm(&psd);
        Ok((power, Arc::new(samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::{Receiver, ReceiverError};

    fn make_tone(n: usize, cycles_per_sample: f64, amplitude: f64) -> Vec<Complex64> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * cycles_per_sample * i as f64;
                Complex64::new(amplitude * phase.cos(), amplitude * phase.sin())
            })
            .collect()
    }

    #[test]
    fn test_tone_peak_lands_on_expected_bin() {
        let welch = WelchPsd::new(64, 64.0);
        let signal = make_tone(512, 0.125, 1.0); // bin 8 of 64
        let psd = welch.estimate(&signal);
        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 8);
    }

    #[test]
    fn test_louder_signal_reads_higher_dbm() {
        let welch = WelchPsd::new(SEGMENT_LEN, 2.4);
        let quiet = welch.estimate(&make_tone(BURST_LEN, 0.1, 0.01));
        let loud = welch.estimate(&make_tone(BURST_LEN, 0.1, 1.0));
        assert!(rms_power_dbm(&loud) > rms_power_dbm(&quiet) + 30.0);
    }

    #[test]
    fn test_short_burst_yields_silence() {
        let welch = WelchPsd::new(512, 2.4);
        let psd = welch.estimate(&make_tone(100, 0.1, 1.0));
        assert_eq!(psd.len(), 512);
        assert!(psd.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_frequencies_two_sided() {
        let welch = WelchPsd::new(8, 8.0);
        let freqs = welch.frequencies();
        assert_eq!(freqs, vec![0.0, 1.0, 2.0, 3.0, -4.0, -3.0, -2.0, -1.0]);
    }

    struct ToneReceiver;

    impl Receiver for ToneReceiver {
        fn read_samples(&mut self, n: usize) -> Result<Vec<Complex64>, ReceiverError> {
            Ok(make_tone(n, 0.2, 0.5))
        }

        fn sample_rate(&self) -> f64 {
            2.4e6
        }

        fn center_frequency(&self) -> f64 {
            300e6
        }
    }

    struct DeadReceiver;

    impl Receiver for DeadReceiver {
        fn read_samples(&mut self, n: usize) -> Result<Vec<Complex64>, ReceiverError> {
            Err(ReceiverError::Read {
                expected: n * 2,
                got: 0,
            })
        }

        fn sample_rate(&self) -> f64 {
            2.4e6
        }

        fn center_frequency(&self) -> f64 {
            300e6
        }
    }

    #[test]
    fn test_sampler_returns_power_and_burst() {
        let mut sampler = PowerSampler::new(ToneReceiver);
        let (power, samples) = sampler.sample().unwrap();
        assert!(power.is_finite());
        assert_eq!(samples.len(), BURST_LEN);
    }

    #[test]
    fn test_sampler_read_failure_is_an_error() {
        let mut sampler = PowerSampler::new(DeadReceiver);
        assert!(sampler.sample().is_err());
    }
}
