//! Quality assessment: turns per-question and per-field detections into an
//! explicit review report instead of burying doubt in numeric scores.
//!
//! Flagging is advisory. Detections are never altered here; a flagged
//! question still grades normally and the report tells a human what to
//! re-check.

use serde::Serialize;

use crate::config::ScanConfig;
use crate::identifier::FieldDetection;
use crate::mark::{QuestionDetection, Selection};

/// Why a question was flagged for review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FlagReason {
    /// Detection confidence fell below the configured threshold.
    LowConfidence,
    /// More than one option was filled.
    MultipleMarks,
}

/// A per-question review flag.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QuestionFlag {
    /// Question number.
    pub number: u32,
    /// Reason for the flag.
    pub reason: FlagReason,
    /// Detection confidence at flagging time.
    pub confidence: f64,
}

/// A sheet-level review condition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum SheetFlag {
    /// The flagged-question fraction exceeded the configured limit,
    /// suggesting a systemic problem (bad scan, wrong template).
    TooManyFlagged {
        /// Number of flagged questions.
        flagged: usize,
        /// Total questions on the sheet.
        total: usize,
    },
    /// An identifier field's confidence fell below the configured threshold.
    LowConfidenceIdentifier {
        /// Field index in the template.
        field: usize,
        /// Field confidence.
        confidence: f64,
    },
}

/// The full quality report for one sheet.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QualityReport {
    /// Per-question flags, in question order.
    pub question_flags: Vec<QuestionFlag>,
    /// Sheet-level flags.
    pub sheet_flags: Vec<SheetFlag>,
}

impl QualityReport {
    /// Whether anything on the sheet warrants human review.
    #[must_use]
    pub fn needs_review(&self) -> bool {
        !self.question_flags.is_empty() || !self.sheet_flags.is_empty()
    }
}

/// Assess detections against the configured thresholds.
///
/// A multiple-mark question is always flagged, whatever its confidence:
/// detection was sure of what it saw, but what it saw cannot be graded as a
/// single answer.
#[must_use]
pub fn assess(
    questions: &[QuestionDetection],
    fields: &[FieldDetection],
    config: &ScanConfig,
) -> QualityReport {
    let mut question_flags = Vec::new();
    for det in questions {
        if det.selection == Selection::Multiple {
            question_flags.push(QuestionFlag {
                number: det.number,
                reason: FlagReason::MultipleMarks,
                confidence: det.confidence,
            });
        } else if det.confidence < config.question_flag_confidence {
            question_flags.push(QuestionFlag {
                number: det.number,
                reason: FlagReason::LowConfidence,
                confidence: det.confidence,
            });
        }
    }

    let mut sheet_flags = Vec::new();
    if !questions.is_empty() {
        let fraction = question_flags.len() as f64 / questions.len() as f64;
        if fraction > config.sheet_flag_fraction {
            sheet_flags.push(SheetFlag::TooManyFlagged {
                flagged: question_flags.len(),
                total: questions.len(),
            });
        }
    }
    for field in fields {
        if field.confidence < config.identifier_flag_confidence {
            sheet_flags.push(SheetFlag::LowConfidenceIdentifier {
                field: field.field,
                confidence: field.confidence,
            });
        }
    }

    QualityReport {
        question_flags,
        sheet_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::DigitDetection;
    use crate::mark::BubbleReading;

    fn detection(number: u32, selection: Selection, confidence: f64) -> QuestionDetection {
        QuestionDetection {
            number,
            selection,
            confidence,
            options: vec![BubbleReading {
                filled: matches!(selection, Selection::Single(_)),
                confidence,
                fill_ratio: 0.5,
            }],
        }
    }

    #[test]
    fn test_clean_sheet_no_flags() {
        let questions = vec![
            detection(1, Selection::Single(0), 0.9),
            detection(2, Selection::Single(2), 0.85),
        ];
        let report = assess(&questions, &[], &ScanConfig::default());
        assert!(!report.needs_review());
    }

    #[test]
    fn test_low_confidence_flagged() {
        let questions = vec![
            detection(1, Selection::Single(0), 0.9),
            detection(2, Selection::NoMark, 0.2),
            detection(3, Selection::Single(1), 0.8),
            detection(4, Selection::Single(1), 0.8),
            detection(5, Selection::Single(1), 0.8),
        ];
        let report = assess(&questions, &[], &ScanConfig::default());
        assert_eq!(
            report.question_flags,
            vec![QuestionFlag {
                number: 2,
                reason: FlagReason::LowConfidence,
                confidence: 0.2,
            }]
        );
        // One flag out of five stays under the sheet-level fraction
        assert!(report.sheet_flags.is_empty());
    }

    #[test]
    fn test_multiple_marks_flagged_despite_confidence() {
        let questions = vec![detection(3, Selection::Multiple, 0.99)];
        let report = assess(&questions, &[], &ScanConfig::default());
        assert_eq!(report.question_flags.len(), 1);
        assert_eq!(report.question_flags[0].reason, FlagReason::MultipleMarks);
    }

    #[test]
    fn test_sheet_flag_when_too_many_flagged() {
        let questions = vec![
            detection(1, Selection::NoMark, 0.1),
            detection(2, Selection::NoMark, 0.1),
            detection(3, Selection::Single(0), 0.9),
            detection(4, Selection::Single(0), 0.9),
        ];
        let report = assess(&questions, &[], &ScanConfig::default());
        assert!(report
            .sheet_flags
            .contains(&SheetFlag::TooManyFlagged { flagged: 2, total: 4 }));
    }

    #[test]
    fn test_weak_identifier_flagged() {
        let fields = vec![FieldDetection {
            field: 0,
            digits: vec![DigitDetection {
                digit: Some(4),
                confidence: 0.3,
            }],
            text: "4".into(),
            confidence: 0.3,
        }];
        let report = assess(&[], &fields, &ScanConfig::default());
        assert_eq!(
            report.sheet_flags,
            vec![SheetFlag::LowConfidenceIdentifier {
                field: 0,
                confidence: 0.3,
            }]
        );
        assert!(report.needs_review());
    }
}
