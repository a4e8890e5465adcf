// src/capture.rs

use std::time::Duration;

use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{error, info};

use crate::types::Frame;

/// Width every captured frame is resized to before processing; the grids are
/// allocated against the resized dimensions.
pub const TARGET_WIDTH: i32 = 500;

/// Blocking frame source. `Ok(None)` is end-of-stream, not an error.
pub trait Capture {
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Webcam capture via OpenCV.
///
/// A camera that fails to open is kept in a degraded state instead of
/// aborting the session: it simply never yields a frame, the loop ends at
/// once and the session reports nothing captured.
pub struct CameraCapture {
    cap: VideoCapture,
    opened: bool,
}

impl CameraCapture {
    pub fn open(index: i32) -> Result<Self> {
        let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
        let opened = cap.is_opened()?;
        if opened {
            info!("camera #{index} open, warming up");
            std::thread::sleep(Duration::from_secs(2));
        } else {
            error!("unable to open video source {index}");
        }
        Ok(Self { cap, opened })
    }
}

impl Capture for CameraCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Ok(None);
        }

        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        // Resize to a fixed width, preserving aspect ratio.
        let width = mat.cols();
        let height = mat.rows();
        let target_height = (height as f64 * TARGET_WIDTH as f64 / width as f64).round() as i32;
        let mut resized = Mat::default();
        imgproc::resize(
            &mat,
            &mut resized,
            opencv::core::Size::new(TARGET_WIDTH, target_height),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        Ok(Some(Frame {
            data: rgb.data_bytes()?.to_vec(),
            width: TARGET_WIDTH as usize,
            height: target_height as usize,
        }))
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        if self.opened {
            let _ = self.cap.release();
            info!("camera released");
        }
    }
}
