//! Synthetic answer-sheet rendering for tests and benchmarks.
//!
//! Renders a template's fiducials, bubbles and digit boxes into a grayscale
//! buffer, optionally scaled and offset within a larger canvas, with
//! controllable defects: filled options, handwritten-style digits, degraded
//! strokes, shifted or missing markers, and Gaussian noise.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use crate::identifier::{CODEBOOK, GLYPH_COLS, GLYPH_ROWS};
use crate::image::GrayBuffer;
use crate::template::{
    DigitBox, Fiducial, IdentifierField, OptionTarget, QuestionKind, QuestionRegion, Template,
};

const BACKGROUND: u8 = 245;
const INK: u8 = 30;

/// A regular test layout: questions in rows of evenly spaced bubbles, one
/// identifier field below them, corner fiducials sized for reliable
/// detection at scale 1. Fits up to 8 questions.
#[must_use]
pub fn grid_template(num_questions: usize, num_options: usize, id_digits: usize) -> Template {
    assert!(num_questions <= 8, "grid layout fits at most 8 questions");
    let questions = (0..num_questions)
        .map(|qi| QuestionRegion {
            number: (qi + 1) as u32,
            kind: QuestionKind::SingleSelect,
            options: (0..num_options)
                .map(|oi| OptionTarget {
                    center: [90.0 + 44.0 * oi as f64, 90.0 + 36.0 * qi as f64],
                    radius: 9.0,
                })
                .collect(),
            weight: 1.0,
        })
        .collect();

    let identifiers = if id_digits > 0 {
        vec![IdentifierField {
            name: "student_id".into(),
            boxes: (0..id_digits)
                .map(|i| DigitBox {
                    center: [120.0 + 36.0 * i as f64, 400.0],
                    width: 24.0,
                    height: 32.0,
                })
                .collect(),
        }]
    } else {
        Vec::new()
    };

    Template {
        page_width: 400.0,
        page_height: 500.0,
        fiducials: vec![
            Fiducial { center: [30.0, 30.0], size: 28.0 },
            Fiducial { center: [370.0, 30.0], size: 28.0 },
            Fiducial { center: [370.0, 470.0], size: 28.0 },
            Fiducial { center: [30.0, 470.0], size: 28.0 },
        ],
        questions,
        identifiers,
    }
}

/// Canonical-to-canvas placement: uniform scale then translation.
#[derive(Clone, Copy, Debug)]
struct Placement {
    scale: f64,
    dx: f64,
    dy: f64,
}

impl Placement {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [p[0] * self.scale + self.dx, p[1] * self.scale + self.dy]
    }
}

/// A builder for synthetic sheet images over a fixed template.
pub struct SheetBuilder<'a> {
    template: &'a Template,
    fills: Vec<(u32, usize)>,
    field_digits: Vec<(usize, Vec<u8>)>,
    degraded_digits: Vec<(usize, usize)>,
    fiducial_offsets: Vec<(usize, [f64; 2])>,
    omitted_fiducials: Vec<usize>,
    noise_sigma: f64,
    seed: u64,
}

impl<'a> SheetBuilder<'a> {
    /// Start a clean sheet for a template.
    #[must_use]
    pub fn new(template: &'a Template) -> Self {
        Self {
            template,
            fills: Vec::new(),
            field_digits: Vec::new(),
            degraded_digits: Vec::new(),
            fiducial_offsets: Vec::new(),
            omitted_fiducials: Vec::new(),
            noise_sigma: 0.0,
            seed: 7,
        }
    }

    /// Fill one option bubble. Call twice on a question for a double mark.
    #[must_use]
    pub fn fill(mut self, question: u32, option: usize) -> Self {
        self.fills.push((question, option));
        self
    }

    /// Write digits into an identifier field's boxes.
    #[must_use]
    pub fn write_digits(mut self, field: usize, digits: &[u8]) -> Self {
        self.field_digits.push((field, digits.to_vec()));
        self
    }

    /// Render one digit with dropped stroke rows, simulating faint writing.
    #[must_use]
    pub fn degrade_digit(mut self, field: usize, position: usize) -> Self {
        self.degraded_digits.push((field, position));
        self
    }

    /// Shift one fiducial away from its declared position (canonical units).
    #[must_use]
    pub fn offset_fiducial(mut self, index: usize, dx: f64, dy: f64) -> Self {
        self.fiducial_offsets.push((index, [dx, dy]));
        self
    }

    /// Leave one fiducial out entirely.
    #[must_use]
    pub fn omit_fiducial(mut self, index: usize) -> Self {
        self.omitted_fiducials.push(index);
        self
    }

    /// Add seeded Gaussian pixel noise.
    #[must_use]
    pub fn with_noise(mut self, sigma: f64, seed: u64) -> Self {
        self.noise_sigma = sigma;
        self.seed = seed;
        self
    }

    /// Render at canonical scale and alignment.
    #[must_use]
    pub fn build(&self) -> GrayBuffer {
        let (w, h) = self.template.canonical_dims();
        self.render(w, h, Placement { scale: 1.0, dx: 0.0, dy: 0.0 })
    }

    /// Render scaled and offset within a larger canvas, as a camera capture
    /// of the sheet would appear.
    #[must_use]
    pub fn build_placed(&self, width: usize, height: usize, scale: f64, dx: f64, dy: f64) -> GrayBuffer {
        self.render(width, height, Placement { scale, dx, dy })
    }

    fn render(&self, width: usize, height: usize, placement: Placement) -> GrayBuffer {
        let mut img = GrayBuffer::filled(width, height, BACKGROUND);

        for (fi, f) in self.template.fiducials.iter().enumerate() {
            if self.omitted_fiducials.contains(&fi) {
                continue;
            }
            let mut center = f.center;
            if let Some(&(_, off)) = self.fiducial_offsets.iter().find(|&&(i, _)| i == fi) {
                center[0] += off[0];
                center[1] += off[1];
            }
            draw_nested_square(&mut img, placement.apply(center), f.size * placement.scale);
        }

        for q in &self.template.questions {
            for (oi, opt) in q.options.iter().enumerate() {
                let c = placement.apply(opt.center);
                let r = opt.radius * placement.scale;
                draw_ring(&mut img, c, r);
                if self.fills.contains(&(q.number, oi)) {
                    draw_disc(&mut img, c, r * 0.95);
                }
            }
        }

        for &(fi, ref digits) in &self.field_digits {
            let Some(field) = self.template.identifiers.get(fi) else {
                continue;
            };
            for (pos, (&digit, b)) in digits.iter().zip(&field.boxes).enumerate() {
                let degraded = self.degraded_digits.contains(&(fi, pos));
                draw_glyph(
                    &mut img,
                    placement.apply(b.center),
                    b.width * placement.scale * 0.8,
                    b.height * placement.scale * 0.8,
                    digit,
                    degraded,
                );
            }
        }

        if self.noise_sigma > 0.0 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let normal = Normal::new(0.0, self.noise_sigma).expect("valid sigma");
            for px in &mut img.data {
                let v = f64::from(*px) + normal.sample(&mut rng);
                *px = v.clamp(0.0, 255.0) as u8;
            }
        }

        img
    }
}

fn fill_rect(img: &mut GrayBuffer, center: [f64; 2], half: f64, gray: u8) {
    let x0 = ((center[0] - half).floor().max(0.0)) as usize;
    let y0 = ((center[1] - half).floor().max(0.0)) as usize;
    let x1 = ((center[0] + half).ceil() as usize).min(img.width);
    let y1 = ((center[1] + half).ceil() as usize).min(img.height);
    for y in y0..y1 {
        for x in x0..x1 {
            img.data[y * img.width + x] = gray;
        }
    }
}

/// Nested-square fiducial: a dark ring of 1/7-size thickness around a white
/// gap and a dark 3/7-size core.
fn draw_nested_square(img: &mut GrayBuffer, center: [f64; 2], size: f64) {
    fill_rect(img, center, size / 2.0, INK);
    fill_rect(img, center, size * 5.0 / 14.0, BACKGROUND);
    fill_rect(img, center, size * 3.0 / 14.0, INK);
}

fn draw_ring(img: &mut GrayBuffer, center: [f64; 2], radius: f64) {
    let thickness = (radius * 0.14).max(1.2);
    let bound = radius + thickness;
    let x0 = ((center[0] - bound).floor().max(0.0)) as usize;
    let y0 = ((center[1] - bound).floor().max(0.0)) as usize;
    let x1 = ((center[0] + bound).ceil() as usize).min(img.width);
    let y1 = ((center[1] + bound).ceil() as usize).min(img.height);
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f64 + 0.5 - center[0];
            let dy = y as f64 + 0.5 - center[1];
            if ((dx * dx + dy * dy).sqrt() - radius).abs() <= thickness / 2.0 {
                img.data[y * img.width + x] = INK;
            }
        }
    }
}

fn draw_disc(img: &mut GrayBuffer, center: [f64; 2], radius: f64) {
    let x0 = ((center[0] - radius).floor().max(0.0)) as usize;
    let y0 = ((center[1] - radius).floor().max(0.0)) as usize;
    let x1 = ((center[0] + radius).ceil() as usize).min(img.width);
    let y1 = ((center[1] + radius).ceil() as usize).min(img.height);
    let r2 = radius * radius;
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f64 + 0.5 - center[0];
            let dy = y as f64 + 0.5 - center[1];
            if dx * dx + dy * dy <= r2 {
                img.data[y * img.width + x] = INK;
            }
        }
    }
}

/// Draw one digit from the recognition codebook's stroke pattern. Degraded
/// rendering drops the odd glyph rows.
fn draw_glyph(img: &mut GrayBuffer, center: [f64; 2], w: f64, h: f64, digit: u8, degraded: bool) {
    let code = CODEBOOK.code(digit);
    let cell_w = w / GLYPH_COLS as f64;
    let cell_h = h / GLYPH_ROWS as f64;
    let left = center[0] - w / 2.0;
    let top = center[1] - h / 2.0;

    for gr in 0..GLYPH_ROWS {
        if degraded && gr % 2 == 1 {
            continue;
        }
        for gc in 0..GLYPH_COLS {
            if code & (1 << (gr * GLYPH_COLS + gc)) == 0 {
                continue;
            }
            let x0 = (left + cell_w * gc as f64).round().max(0.0) as usize;
            let y0 = (top + cell_h * gr as f64).round().max(0.0) as usize;
            let x1 = ((left + cell_w * (gc + 1) as f64).round() as usize).min(img.width);
            let y1 = ((top + cell_h * (gr + 1) as f64).round() as usize).min(img.height);
            for y in y0..y1 {
                for x in x0..x1 {
                    img.data[y * img.width + x] = INK;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_render_dimensions() {
        let template = grid_template(2, 4, 0);
        let img = SheetBuilder::new(&template).build();
        assert_eq!((img.width, img.height), (400, 500));
        // Fiducial core is ink
        assert_eq!(img.data[30 * 400 + 30], INK);
        // Page center is blank
        assert_eq!(img.data[250 * 400 + 200], BACKGROUND);
    }

    #[test]
    fn test_fill_darkens_bubble() {
        let template = grid_template(1, 4, 0);
        let blank = SheetBuilder::new(&template).build();
        let marked = SheetBuilder::new(&template).fill(1, 0).build();
        // Bubble center of question 1, option 0 at (90, 90)
        assert_eq!(blank.data[90 * 400 + 90], BACKGROUND);
        assert_eq!(marked.data[90 * 400 + 90], INK);
    }

    #[test]
    fn test_noise_is_deterministic() {
        let template = grid_template(1, 4, 0);
        let a = SheetBuilder::new(&template).with_noise(6.0, 11).build();
        let b = SheetBuilder::new(&template).with_noise(6.0, 11).build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_omitted_fiducial_leaves_background() {
        let template = grid_template(1, 4, 0);
        let img = SheetBuilder::new(&template).omit_fiducial(0).build();
        assert_eq!(img.data[30 * 400 + 30], BACKGROUND);
    }
}
