//! Region sampling: pure mapping from template-declared canonical
//! coordinates to pixel neighborhoods in the normalized image.
//!
//! No detection logic lives here; downstream detectors never touch the
//! template's coordinate system directly.

use serde::Serialize;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::image::GrayBuffer;
use crate::template::Template;

/// Identity of a sampled region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RegionId {
    /// One option bubble of a question.
    Bubble {
        /// Question number.
        question: u32,
        /// Option index within the question.
        option: usize,
    },
    /// One digit box of an identifier field.
    Digit {
        /// Index of the identifier field in the template.
        field: usize,
        /// Digit position within the field, most significant first.
        position: usize,
    },
}

/// A pixel neighborhood extracted around one region, plus its identity.
/// Transient: consumed by the detector that classifies it.
#[derive(Clone, Debug)]
pub struct RegionSample {
    /// Which region this sample covers.
    pub id: RegionId,
    /// Row-major grayscale pixels.
    pub pixels: Vec<u8>,
    /// Sample width in pixels.
    pub width: usize,
    /// Sample height in pixels.
    pub height: usize,
    /// Expected mark radius in sample pixels (bubble radius, or half the
    /// smaller digit-box dimension).
    pub radius: f64,
}

/// Samples for one question, option order preserved.
#[derive(Clone, Debug)]
pub struct QuestionSamples {
    /// Question number.
    pub number: u32,
    /// One sample per option.
    pub samples: Vec<RegionSample>,
}

/// Samples for one identifier field, digit order preserved.
#[derive(Clone, Debug)]
pub struct FieldSamples {
    /// Field index in the template.
    pub field: usize,
    /// One sample per digit box.
    pub samples: Vec<RegionSample>,
}

/// All region samples for one sheet.
#[derive(Clone, Debug)]
pub struct SampledSheet {
    /// Per-question bubble samples.
    pub questions: Vec<QuestionSamples>,
    /// Per-field digit samples.
    pub fields: Vec<FieldSamples>,
}

impl SampledSheet {
    /// Total number of leaf region samples.
    #[must_use]
    pub fn num_regions(&self) -> usize {
        self.questions.iter().map(|q| q.samples.len()).sum::<usize>()
            + self.fields.iter().map(|f| f.samples.len()).sum::<usize>()
    }
}

/// Extract every declared region from the normalized image. Pure function of
/// its inputs; fails with [`ScanError::RegionOutOfBounds`] when a region maps
/// outside the image, which indicates a malformed template rather than a bad
/// scan.
pub fn sample_regions(
    img: &GrayBuffer,
    template: &Template,
    config: &ScanConfig,
) -> Result<SampledSheet, ScanError> {
    // The normalized image is resampled at the template's declared
    // dimensions, but rounding can leave a sub-pixel scale difference.
    let scale_x = img.width as f64 / template.page_width;
    let scale_y = img.height as f64 / template.page_height;

    let mut questions = Vec::with_capacity(template.questions.len());
    for q in &template.questions {
        let mut samples = Vec::with_capacity(q.options.len());
        for (oi, opt) in q.options.iter().enumerate() {
            let id = RegionId::Bubble {
                question: q.number,
                option: oi,
            };
            let cx = opt.center[0] * scale_x;
            let cy = opt.center[1] * scale_y;
            let radius = opt.radius * scale_x.min(scale_y);
            let half = radius * config.sample_scale;
            samples.push(extract(img, id, cx, cy, half, half, radius)?);
        }
        questions.push(QuestionSamples {
            number: q.number,
            samples,
        });
    }

    let mut fields = Vec::with_capacity(template.identifiers.len());
    for (fi, field) in template.identifiers.iter().enumerate() {
        let mut samples = Vec::with_capacity(field.boxes.len());
        for (bi, b) in field.boxes.iter().enumerate() {
            let id = RegionId::Digit {
                field: fi,
                position: bi,
            };
            let cx = b.center[0] * scale_x;
            let cy = b.center[1] * scale_y;
            let half_w = b.width * scale_x / 2.0;
            let half_h = b.height * scale_y / 2.0;
            let radius = half_w.min(half_h);
            samples.push(extract(img, id, cx, cy, half_w, half_h, radius)?);
        }
        fields.push(FieldSamples { field: fi, samples });
    }

    Ok(SampledSheet { questions, fields })
}

fn extract(
    img: &GrayBuffer,
    id: RegionId,
    cx: f64,
    cy: f64,
    half_w: f64,
    half_h: f64,
    radius: f64,
) -> Result<RegionSample, ScanError> {
    let x0 = (cx - half_w).floor();
    let y0 = (cy - half_h).floor();
    let x1 = (cx + half_w).ceil();
    let y1 = (cy + half_h).ceil();
    if x0 < 0.0 || y0 < 0.0 || x1 > img.width as f64 || y1 > img.height as f64 {
        return Err(ScanError::RegionOutOfBounds { region: id });
    }
    let x0 = x0 as usize;
    let y0 = y0 as usize;
    let width = x1 as usize - x0;
    let height = y1 as usize - y0;

    let mut pixels = Vec::with_capacity(width * height);
    for y in y0..y0 + height {
        let row_off = y * img.width;
        pixels.extend_from_slice(&img.data[row_off + x0..row_off + x0 + width]);
    }
    Ok(RegionSample {
        id,
        pixels,
        width,
        height,
        radius,
    })
}
