// src/display.rs

use std::sync::{Arc, Mutex};

use anyhow::Result;
use opencv::{
    core::{self, Mat, Point, Rect, Scalar},
    highgui, imgproc,
    prelude::*,
};
use tracing::info;

use crate::inspector::SpectrumView;
use crate::types::{BoundingBox, Command, Frame};

const LIVE_WINDOW: &str = "Frame";
const PREVIEW_WINDOW: &str = "Preview";
const SPECTRUM_WINDOW: &str = "Spectrum";

/// Interactive display surface. The session talks to this once per frame:
/// show, poll, and occasionally prompt for a region.
pub trait Display {
    /// Live frame with the scanned-region indicator already painted; the
    /// tracked box and latest power reading are drawn here.
    fn show_live(
        &mut self,
        frame: &Frame,
        tracked: Option<&BoundingBox>,
        power_dbm: Option<f64>,
    ) -> Result<()>;

    /// Heat-map preview, shown once at least one cycle has completed.
    fn show_preview(&mut self, image: &Frame) -> Result<()>;

    /// Poll key commands; also pumps window events.
    fn poll_command(&mut self) -> Result<Option<Command>>;

    /// Prompt the user to select the initial probe region on `frame`.
    /// `None` when the selection was cancelled.
    fn select_region(&mut self, frame: &Frame) -> Result<Option<BoundingBox>>;

    /// Drain double-clicks received since the last call, display coords.
    fn take_clicks(&mut self) -> Vec<(i32, i32)>;

    fn show_spectrum(&mut self, view: &SpectrumView) -> Result<()>;

    /// Final static image, blocking until the user dismisses it.
    fn show_final(&mut self, image: &Frame, caption: &str) -> Result<()>;
}

/// Convert an RGB frame into a BGR Mat for OpenCV drawing and display.
pub fn to_bgr_mat(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// OpenCV highgui windows: live view, heat-map preview, spectrum pop-up.
pub struct HighguiDisplay {
    clicks: Arc<Mutex<Vec<(i32, i32)>>>,
}

impl HighguiDisplay {
    pub fn new() -> Result<Self> {
        highgui::named_window(LIVE_WINDOW, highgui::WINDOW_AUTOSIZE)?;
        highgui::named_window(PREVIEW_WINDOW, highgui::WINDOW_AUTOSIZE)?;

        let clicks = Arc::new(Mutex::new(Vec::new()));
        let sink = clicks.clone();
        highgui::set_mouse_callback(
            PREVIEW_WINDOW,
            Some(Box::new(move |event, x, y, _flags| {
                if event == highgui::EVENT_LBUTTONDBLCLK {
                    if let Ok(mut clicks) = sink.lock() {
                        clicks.push((x, y));
                    }
                }
            })),
        )?;

        Ok(Self { clicks })
    }
}

impl Display for HighguiDisplay {
    fn show_live(
        &mut self,
        frame: &Frame,
        tracked: Option<&BoundingBox>,
        power_dbm: Option<f64>,
    ) -> Result<()> {
        let mut mat = to_bgr_mat(frame)?;

        if let Some(bb) = tracked {
            imgproc::rectangle(
                &mut mat,
                Rect::new(bb.x as i32, bb.y as i32, bb.w as i32, bb.h as i32),
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                0,
            )?;
        }

        if let Some(dbm) = power_dbm {
            imgproc::put_text(
                &mut mat,
                &format!("RMS power {dbm:.2}"),
                Point::new(10, 40),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.6,
                Scalar::new(0.0, 0.0, 255.0, 0.0),
                2,
                imgproc::LINE_8,
                false,
            )?;
        }

        highgui::imshow(LIVE_WINDOW, &mat)?;
        Ok(())
    }

    fn show_preview(&mut self, image: &Frame) -> Result<()> {
        let mat = to_bgr_mat(image)?;
        highgui::imshow(PREVIEW_WINDOW, &mat)?;
        Ok(())
    }

    fn poll_command(&mut self) -> Result<Option<Command>> {
        let key = highgui::wait_key(1)? & 0xff;
        Ok(match key {
            k if k == 's' as i32 => Some(Command::ArmTracking),
            k if k == 'r' as i32 => Some(Command::Reset),
            k if k == 'q' as i32 => Some(Command::Quit),
            _ => None,
        })
    }

    fn select_region(&mut self, frame: &Frame) -> Result<Option<BoundingBox>> {
        let mat = to_bgr_mat(frame)?;
        let rect = highgui::select_roi_for_window(LIVE_WINDOW, &mat, true, false)?;
        if rect.width <= 0 || rect.height <= 0 {
            return Ok(None);
        }
        Ok(Some(BoundingBox::new(
            rect.x as f64,
            rect.y as f64,
            rect.width as f64,
            rect.height as f64,
        )))
    }

    fn take_clicks(&mut self) -> Vec<(i32, i32)> {
        match self.clicks.lock() {
            Ok(mut clicks) => std::mem::take(&mut *clicks),
            Err(_) => Vec::new(),
        }
    }

    fn show_spectrum(&mut self, view: &SpectrumView) -> Result<()> {
        const W: i32 = 640;
        const H: i32 = 480;
        const MARGIN: i32 = 40;

        let mut plot =
            Mat::new_rows_cols_with_default(H, W, core::CV_8UC3, Scalar::all(255.0))?;

        let lo = view.psd_db.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = view.psd_db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = if (hi - lo).abs() < 1e-9 { 1.0 } else { hi - lo };

        let n = view.psd_db.len();
        let to_point = |i: usize, v: f64| {
            let x = MARGIN + ((W - 2 * MARGIN) as f64 * i as f64 / (n - 1) as f64) as i32;
            let y = H - MARGIN - ((H - 2 * MARGIN) as f64 * (v - lo) / span) as i32;
            Point::new(x, y)
        };

        for i in 1..n {
            imgproc::line(
                &mut plot,
                to_point(i - 1, view.psd_db[i - 1]),
                to_point(i, view.psd_db[i]),
                Scalar::new(180.0, 60.0, 0.0, 0.0),
                1,
                imgproc::LINE_AA,
                0,
            )?;
        }

        let title = format!("spectrum {} {}", view.row, view.col);
        imgproc::put_text(
            &mut plot,
            &title,
            Point::new(MARGIN, 25),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            Scalar::all(0.0),
            1,
            imgproc::LINE_8,
            false,
        )?;

        let axis = format!(
            "{:.2} .. {:.2} MHz | {:.1} .. {:.1} dB",
            view.frequencies_mhz.first().copied().unwrap_or(0.0),
            view.frequencies_mhz.last().copied().unwrap_or(0.0),
            lo,
            hi
        );
        imgproc::put_text(
            &mut plot,
            &axis,
            Point::new(MARGIN, H - 12),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.45,
            Scalar::all(0.0),
            1,
            imgproc::LINE_8,
            false,
        )?;

        highgui::imshow(SPECTRUM_WINDOW, &plot)?;
        Ok(())
    }

    fn show_final(&mut self, image: &Frame, caption: &str) -> Result<()> {
        let mut mat = to_bgr_mat(image)?;
        imgproc::put_text(
            &mut mat,
            caption,
            Point::new(10, 25),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            Scalar::new(255.0, 255.0, 255.0, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
        info!("{caption}");
        highgui::imshow(PREVIEW_WINDOW, &mat)?;
        // Hold the map on screen until a key is pressed.
        highgui::wait_key(0)?;
        Ok(())
    }
}

impl Drop for HighguiDisplay {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}
