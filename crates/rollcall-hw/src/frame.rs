//! Captured frames and raw pixel format conversion.

use image::GrayImage;

/// Luma below which a pixel counts as dark.
const DARK_PIXEL: u8 = 32;

/// A grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// `width * height` luma bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// View the frame as an `image` buffer for detection.
    ///
    /// `None` if `data` does not hold exactly `width * height` bytes.
    pub fn to_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Packed YUYV 4:2:2 (`[Y0, U, Y1, V]`) to grayscale: keep every Y byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "YUYV",
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// 16-bit little-endian grayscale to 8-bit by keeping the high byte.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "Y16",
            expected,
            actual: y16.len(),
        });
    }
    Ok(y16[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

/// 8-bit grayscale, trimmed to the frame size.
pub fn grey_to_grayscale(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "GREY",
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected].to_vec())
}

/// True when more than `threshold_pct` of the pixels are dark, as with a
/// covered lens or the first frames after the stream starts.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < DARK_PIXEL).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{format} buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}
