//! Exam layout templates and answer keys.
//!
//! A [`Template`] is authored once at exam-generation time (outside this
//! core), is JSON-serializable, and is immutable for the lifetime of a
//! scanning session. The pipeline only reads it, so one template can be
//! shared freely across concurrently running scans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A printed reference pattern at a known canonical location: a dark outer
/// square ring enclosing a smaller dark square.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    /// Canonical-coordinate center of the marker.
    pub center: [f64; 2],
    /// Side length of the outer square in canonical units.
    pub size: f64,
}

/// Question kind. True/false is a two-option special case of single-select.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Single selection among the declared options.
    SingleSelect,
    /// True/false; exactly two options.
    TrueFalse,
}

/// One answer bubble: the canonical center and radius of the mark target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionTarget {
    /// Canonical-coordinate center of the bubble.
    pub center: [f64; 2],
    /// Bubble radius in canonical units.
    pub radius: f64,
}

/// A question's mark targets in canonical coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionRegion {
    /// Question number, unique within the template.
    pub number: u32,
    /// Question kind.
    pub kind: QuestionKind,
    /// Ordered option targets. Option indices in results and answer keys
    /// refer to positions in this list.
    pub options: Vec<OptionTarget>,
    /// Scoring weight. Defaults to 1.0 when absent from the JSON.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// One digit position of a multi-digit identifier field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigitBox {
    /// Canonical-coordinate center of the box.
    pub center: [f64; 2],
    /// Box width in canonical units.
    pub width: f64,
    /// Box height in canonical units.
    pub height: f64,
}

/// A multi-digit identifier field (e.g. a student ID), ordered most
/// significant digit first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentifierField {
    /// Field name, e.g. "student_id".
    pub name: String,
    /// Ordered digit boxes.
    pub boxes: Vec<DigitBox>,
}

/// One exam layout: canonical page dimensions, fiducial definitions, and the
/// regions of interest declared in canonical coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Canonical page width; the normalized image is resampled to this many
    /// pixels wide.
    pub page_width: f64,
    /// Canonical page height.
    pub page_height: f64,
    /// Ordered fiducial definitions. At least four are required; the four
    /// outermost (one per page quadrant) act as corner markers, any others
    /// as auxiliary correspondences for the robust fit.
    pub fiducials: Vec<Fiducial>,
    /// Ordered question regions.
    pub questions: Vec<QuestionRegion>,
    /// Identifier fields. May be empty.
    #[serde(default)]
    pub identifiers: Vec<IdentifierField>,
}

impl Template {
    /// Validate the template on ingestion. Surfaced as
    /// [`ScanError::InvalidTemplate`], distinct from scan-time failures.
    pub fn validate(&self) -> Result<(), ScanError> {
        if !(self.page_width >= 1.0) || !(self.page_height >= 1.0) {
            return Err(ScanError::InvalidTemplate(format!(
                "page dimensions must be at least 1x1, got {}x{}",
                self.page_width, self.page_height
            )));
        }
        if self.fiducials.len() < 4 {
            return Err(ScanError::InvalidTemplate(format!(
                "at least 4 fiducials required, got {}",
                self.fiducials.len()
            )));
        }
        for f in &self.fiducials {
            if f.size <= 0.0 {
                return Err(ScanError::InvalidTemplate(
                    "fiducial size must be positive".into(),
                ));
            }
            self.check_in_page(f.center, "fiducial")?;
        }
        if self.questions.is_empty() {
            return Err(ScanError::InvalidTemplate(
                "template declares no questions".into(),
            ));
        }
        let mut seen = BTreeMap::new();
        for q in &self.questions {
            if seen.insert(q.number, ()).is_some() {
                return Err(ScanError::InvalidTemplate(format!(
                    "duplicate question number {}",
                    q.number
                )));
            }
            match q.kind {
                QuestionKind::SingleSelect if q.options.len() < 2 => {
                    return Err(ScanError::InvalidTemplate(format!(
                        "question {} needs at least 2 options",
                        q.number
                    )));
                }
                QuestionKind::TrueFalse if q.options.len() != 2 => {
                    return Err(ScanError::InvalidTemplate(format!(
                        "true/false question {} must have exactly 2 options",
                        q.number
                    )));
                }
                _ => {}
            }
            if !(q.weight >= 0.0) {
                return Err(ScanError::InvalidTemplate(format!(
                    "question {} has negative or NaN weight",
                    q.number
                )));
            }
            for opt in &q.options {
                if opt.radius <= 0.0 {
                    return Err(ScanError::InvalidTemplate(format!(
                        "question {} has a non-positive bubble radius",
                        q.number
                    )));
                }
                self.check_in_page(opt.center, "option target")?;
            }
        }
        for field in &self.identifiers {
            if field.boxes.is_empty() {
                return Err(ScanError::InvalidTemplate(format!(
                    "identifier field '{}' has no digit boxes",
                    field.name
                )));
            }
            for b in &field.boxes {
                if b.width <= 0.0 || b.height <= 0.0 {
                    return Err(ScanError::InvalidTemplate(format!(
                        "identifier field '{}' has a degenerate digit box",
                        field.name
                    )));
                }
                self.check_in_page(b.center, "digit box")?;
            }
        }
        Ok(())
    }

    fn check_in_page(&self, p: [f64; 2], what: &str) -> Result<(), ScanError> {
        if p[0] < 0.0 || p[1] < 0.0 || p[0] > self.page_width || p[1] > self.page_height {
            return Err(ScanError::InvalidTemplate(format!(
                "{what} center ({}, {}) outside page bounds",
                p[0], p[1]
            )));
        }
        Ok(())
    }

    /// Canonical pixel dimensions of the normalized image.
    #[must_use]
    pub fn canonical_dims(&self) -> (usize, usize) {
        (
            self.page_width.round() as usize,
            self.page_height.round() as usize,
        )
    }
}

/// Answer key: question number to correct option index, as supplied by exam
/// storage. Ordered map so grading is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKey {
    /// Question number → index into that question's option list.
    pub entries: BTreeMap<u32, usize>,
}

impl AnswerKey {
    /// Build a key from (question number, correct option index) pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(u32, usize)]) -> Self {
        Self {
            entries: pairs.iter().copied().collect(),
        }
    }

    /// Look up the correct option for a question.
    #[must_use]
    pub fn correct_option(&self, question: u32) -> Option<usize> {
        self.entries.get(&question).copied()
    }
}
