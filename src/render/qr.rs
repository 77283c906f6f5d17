//! QR code artifact for the cover page.
//!
//! The code is rasterised into a grayscale PNG so the PDF writer can embed it
//! like any other image. Modules are drawn `SCALE` pixels wide with a
//! four-module quiet zone.

use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use std::path::Path;
use thiserror::Error;

const QUIET_ZONE: usize = 4;
const SCALE: usize = 8;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("QR image write failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Encode `data` as a QR code and save it as a PNG at `dest`.
pub fn write_qr_png(data: &str, dest: &Path) -> Result<(), QrError> {
    let code = QrCode::new(data.as_bytes())?;
    let width = code.width();
    let colors = code.to_colors();

    let side = ((width + 2 * QUIET_ZONE) * SCALE) as u32;
    let img = GrayImage::from_fn(side, side, |x, y| {
        let mx = (x as usize / SCALE).checked_sub(QUIET_ZONE);
        let my = (y as usize / SCALE).checked_sub(QUIET_ZONE);
        match (mx, my) {
            (Some(mx), Some(my)) if mx < width && my < width && colors[my * width + mx] == Color::Dark => {
                Luma([0u8])
            }
            _ => Luma([255u8]),
        }
    });

    img.save_with_format(dest, ImageFormat::Png)?;
    Ok(())
}
