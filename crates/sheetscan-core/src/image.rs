//! Image buffer abstractions: stride-aware borrowed views and owned
//! grayscale buffers.

use crate::error::ScanError;

/// A view into a grayscale image buffer with explicit stride support.
/// Allows zero-copy ingestion of buffers with row padding.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    /// Raw pixel data, row-major, one byte per pixel.
    pub data: &'a [u8],
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Distance in bytes between the starts of consecutive rows.
    pub stride: usize,
}

impl<'a> ImageView<'a> {
    /// Create a new view after validating that the buffer size matches the
    /// dimensions and stride.
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, ScanError> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidCapture(format!(
                "zero-sized image ({width}x{height})"
            )));
        }
        if stride < width {
            return Err(ScanError::InvalidCapture(format!(
                "stride ({stride}) cannot be less than width ({width})"
            )));
        }
        let required = (height - 1) * stride + width;
        if data.len() < required {
            return Err(ScanError::InvalidCapture(format!(
                "buffer size ({}) too small for {}x{} image with stride {} (required: {})",
                data.len(),
                width,
                height,
                stride,
                required
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Safe accessor for a specific row.
    #[inline(always)]
    pub fn get_row(&self, y: usize) -> &[u8] {
        assert!(y < self.height, "row index {y} out of bounds");
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Safe accessor for a specific pixel.
    #[inline(always)]
    pub fn get_pixel(&self, x: usize, y: usize) -> u8 {
        assert!(x < self.width, "column index {x} out of bounds");
        self.get_row(y)[x]
    }

    /// Bilinear sample at a subpixel coordinate, treating pixel centers as
    /// integer coordinates. Coordinates outside the image clamp to the edge.
    #[must_use]
    pub fn sample_bilinear(&self, x: f64, y: f64) -> f64 {
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let p00 = f64::from(self.get_pixel(x0, y0));
        let p10 = f64::from(self.get_pixel(x1, y0));
        let p01 = f64::from(self.get_pixel(x0, y1));
        let p11 = f64::from(self.get_pixel(x1, y1));

        let top = p00 * (1.0 - fx) + p10 * fx;
        let bottom = p01 * (1.0 - fx) + p11 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

/// An owned grayscale image buffer. Used for the perspective-corrected
/// canonical-frame image, which lives only for the duration of one scan.
#[derive(Clone, Debug, PartialEq)]
pub struct GrayBuffer {
    /// Row-major pixel data, one byte per pixel.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl GrayBuffer {
    /// Allocate a buffer filled with the given gray level.
    #[must_use]
    pub fn filled(width: usize, height: usize, gray: u8) -> Self {
        Self {
            data: vec![gray; width * height],
            width,
            height,
        }
    }

    /// Borrow the buffer as a stride-aware view.
    ///
    /// # Panics
    /// Never panics: the buffer is constructed consistent with its dimensions.
    #[must_use]
    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

/// A single photographed or scanned image plus capture metadata, as handed
/// over by the client-side capture subsystem. Consumed once per scan attempt.
#[derive(Clone, Debug)]
pub struct RawCapture {
    /// Interleaved pixel data: 1 (gray), 3 (RGB) or 4 (RGBA) bytes per pixel.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Number of channels per pixel.
    pub channels: usize,
}

impl RawCapture {
    /// Convert the capture to a single-channel grayscale buffer using
    /// integer BT.601 luma weights. Alpha is ignored.
    pub fn to_gray(&self) -> Result<GrayBuffer, ScanError> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::InvalidCapture(format!(
                "zero-sized capture ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width * self.height * self.channels;
        if self.data.len() < expected {
            return Err(ScanError::InvalidCapture(format!(
                "capture buffer ({}) smaller than {}x{}x{} ({} bytes)",
                self.data.len(),
                self.width,
                self.height,
                self.channels,
                expected
            )));
        }
        match self.channels {
            1 => Ok(GrayBuffer {
                data: self.data[..self.width * self.height].to_vec(),
                width: self.width,
                height: self.height,
            }),
            3 | 4 => {
                let mut gray = Vec::with_capacity(self.width * self.height);
                for px in self.data.chunks_exact(self.channels) {
                    let r = u32::from(px[0]);
                    let g = u32::from(px[1]);
                    let b = u32::from(px[2]);
                    gray.push(((77 * r + 150 * g + 29 * b) >> 8) as u8);
                }
                Ok(GrayBuffer {
                    data: gray,
                    width: self.width,
                    height: self.height,
                })
            }
            n => Err(ScanError::InvalidCapture(format!(
                "unsupported channel count: {n}"
            ))),
        }
    }
}
