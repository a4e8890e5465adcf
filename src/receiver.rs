// src/receiver.rs

use std::ffi::{c_int, c_uint, c_void};
use std::ptr;

use libloading::Library;
use num_complex::Complex64;
use tracing::info;

/// Radio receiver errors, grouped by what the session can do about them:
/// open failures are fatal before the loop starts, read failures are fatal
/// inside it.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("librtlsdr not found - install the rtl-sdr package")]
    LibraryNotFound,

    #[error("failed to open RTL-SDR device #{0}: error code {1}")]
    DeviceOpen(u32, i32),

    #[error("{0} failed: error code {1}")]
    Config(&'static str, i32),

    #[error("sample read failed: got {got} bytes, expected {expected}")]
    Read { expected: usize, got: usize },
}

/// Blocking scalar-sample source. The session owns exactly one and reads it
/// once per armed frame; dropping it releases the hardware.
pub trait Receiver {
    /// Read `n` complex baseband samples. One call consumes hardware state;
    /// a failure is not retried here.
    fn read_samples(&mut self, n: usize) -> Result<Vec<Complex64>, ReceiverError>;

    /// Configured sample rate in Hz.
    fn sample_rate(&self) -> f64;

    /// Tuned center frequency in Hz.
    fn center_frequency(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    /// Tuner gain in tenths of a dB, librtlsdr units (496 = 49.6 dB).
    pub gain_tenth_db: i32,
}

type DevHandle = *mut c_void;

/// librtlsdr entry points, resolved at runtime so the binary builds and runs
/// without the library installed.
struct RtlLib {
    _lib: Library,
    open: unsafe extern "C" fn(*mut DevHandle, c_uint) -> c_int,
    close: unsafe extern "C" fn(DevHandle) -> c_int,
    set_center_freq: unsafe extern "C" fn(DevHandle, c_uint) -> c_int,
    set_sample_rate: unsafe extern "C" fn(DevHandle, c_uint) -> c_int,
    set_tuner_gain_mode: unsafe extern "C" fn(DevHandle, c_int) -> c_int,
    set_tuner_gain: unsafe extern "C" fn(DevHandle, c_int) -> c_int,
    set_agc_mode: unsafe extern "C" fn(DevHandle, c_int) -> c_int,
    reset_buffer: unsafe extern "C" fn(DevHandle) -> c_int,
    read_sync: unsafe extern "C" fn(DevHandle, *mut c_void, c_int, *mut c_int) -> c_int,
}

const LIB_NAMES: &[&str] = &[
    "librtlsdr.so.2",
    "librtlsdr.so.0",
    "librtlsdr.so",
    "librtlsdr.dylib",
    "rtlsdr.dll",
];

impl RtlLib {
    fn load() -> Result<Self, ReceiverError> {
        for name in LIB_NAMES {
            if let Ok(lib) = unsafe { Library::new(name) } {
                // Fn pointers stay valid as long as `_lib` is kept alive.
                let resolved = unsafe {
                    Ok(Self {
                        open: *lib.get(b"rtlsdr_open\0").map_err(|_| ReceiverError::LibraryNotFound)?,
                        close: *lib.get(b"rtlsdr_close\0").map_err(|_| ReceiverError::LibraryNotFound)?,
                        set_center_freq: *lib
                            .get(b"rtlsdr_set_center_freq\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        set_sample_rate: *lib
                            .get(b"rtlsdr_set_sample_rate\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        set_tuner_gain_mode: *lib
                            .get(b"rtlsdr_set_tuner_gain_mode\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        set_tuner_gain: *lib
                            .get(b"rtlsdr_set_tuner_gain\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        set_agc_mode: *lib
                            .get(b"rtlsdr_set_agc_mode\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        reset_buffer: *lib
                            .get(b"rtlsdr_reset_buffer\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        read_sync: *lib
                            .get(b"rtlsdr_read_sync\0")
                            .map_err(|_| ReceiverError::LibraryNotFound)?,
                        _lib: lib,
                    })
                };
                return resolved;
            }
        }
        Err(ReceiverError::LibraryNotFound)
    }
}

/// RTL-SDR receiver over the dynamically loaded librtlsdr.
///
/// The RTL2832U delivers interleaved unsigned 8-bit I/Q with 127.5 as the
/// zero level; samples are normalized to [-1, 1] on read.
pub struct RtlSdrReceiver {
    lib: RtlLib,
    handle: DevHandle,
    config: ReceiverConfig,
}

impl RtlSdrReceiver {
    pub fn open(index: u32, config: ReceiverConfig) -> Result<Self, ReceiverError> {
        let lib = RtlLib::load()?;

        let mut handle: DevHandle = ptr::null_mut();
        let ret = unsafe { (lib.open)(&mut handle, index) };
        if ret != 0 || handle.is_null() {
            return Err(ReceiverError::DeviceOpen(index, ret));
        }

        let dev = Self { lib, handle, config };
        dev.check("set_sample_rate", unsafe {
            (dev.lib.set_sample_rate)(dev.handle, config.sample_rate_hz as c_uint)
        })?;
        dev.check("set_center_freq", unsafe {
            (dev.lib.set_center_freq)(dev.handle, config.center_freq_hz as c_uint)
        })?;
        // Manual gain mode, AGC off: power readings need a fixed gain.
        dev.check("set_tuner_gain_mode", unsafe {
            (dev.lib.set_tuner_gain_mode)(dev.handle, 1)
        })?;
        dev.check("set_tuner_gain", unsafe {
            (dev.lib.set_tuner_gain)(dev.handle, config.gain_tenth_db)
        })?;
        dev.check("set_agc_mode", unsafe { (dev.lib.set_agc_mode)(dev.handle, 0) })?;
        dev.check("reset_buffer", unsafe { (dev.lib.reset_buffer)(dev.handle) })?;

        info!(
            "RTL-SDR #{} open: {:.3} MHz, {:.1} MS/s, gain {:.1} dB",
            index,
            config.center_freq_hz / 1e6,
            config.sample_rate_hz / 1e6,
            config.gain_tenth_db as f64 / 10.0
        );

        Ok(dev)
    }

    fn check(&self, what: &'static str, ret: c_int) -> Result<(), ReceiverError> {
        if ret < 0 {
            Err(ReceiverError::Config(what, ret))
        } else {
            Ok(())
        }
    }
}

impl Receiver for RtlSdrReceiver {
    fn read_samples(&mut self, n: usize) -> Result<Vec<Complex64>, ReceiverError> {
        let expected = n * 2;
        let mut raw = vec![0u8; expected];
        let mut n_read: c_int = 0;
        let ret = unsafe {
            (self.lib.read_sync)(
                self.handle,
                raw.as_mut_ptr() as *mut c_void,
                expected as c_int,
                &mut n_read,
            )
        };
        if ret < 0 || n_read as usize != expected {
            return Err(ReceiverError::Read {
                expected,
                got: n_read.max(0) as usize,
            });
        }

        Ok(raw
            .chunks_exact(2)
            .map(|iq| {
                Complex64::new(
                    (iq[0] as f64 - 127.5) / 127.5,
                    (iq[1] as f64 - 127.5) / 127.5,
                )
            })
            .collect())
    }

    fn sample_rate(&self) -> f64 {
        self.config.sample_rate_hz
    }

    fn center_frequency(&self) -> f64 {
        self.config.center_freq_hz
    }
}

impl Drop for RtlSdrReceiver {
    fn drop(&mut self) {
        unsafe {
            (self.lib.close)(self.handle);
        }
        info!("RTL-SDR released");
    }
}
