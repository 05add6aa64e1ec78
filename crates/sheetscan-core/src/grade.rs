//! Grading: combines question detections with an answer key into a score
//! report.
//!
//! Grading is a pure function of its inputs. It never re-reads pixels and it
//! never second-guesses detection: a multiple-mark question earns no credit
//! even if one of the marked options happens to be the keyed answer.

use serde::Serialize;
use tracing::warn;

use crate::identifier::FieldDetection;
use crate::mark::{QuestionDetection, Selection};
use crate::quality::QualityReport;
use crate::template::{AnswerKey, Template};

/// Grading verdict for one question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// The single selected option matches the key.
    Correct,
    /// The single selected option does not match the key.
    Incorrect,
    /// No option was filled.
    Unanswered,
    /// More than one option was filled.
    MultipleMarked,
}

/// Score for one keyed question.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QuestionScore {
    /// Question number.
    pub number: u32,
    /// Grading verdict.
    pub verdict: Verdict,
    /// Selected option, when exactly one was filled.
    pub selected: Option<usize>,
    /// Keyed correct option.
    pub correct: usize,
    /// Points awarded.
    pub awarded: f64,
    /// Points possible (the question's weight).
    pub weight: f64,
    /// Detection confidence carried through for reporting.
    pub confidence: f64,
}

/// The final report for one sheet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreReport {
    /// Recognized identifier strings, template order; unreadable digits
    /// render as `?`.
    pub identifiers: Vec<String>,
    /// Per-question scores for every keyed question, in key order.
    pub questions: Vec<QuestionScore>,
    /// Total points awarded.
    pub score: f64,
    /// Total points possible over the keyed questions.
    pub max_score: f64,
    /// Quality assessment for the sheet.
    pub quality: QualityReport,
}

impl ScoreReport {
    /// Score as a fraction of the maximum, or 0 for an empty key.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.max_score > 0.0 {
            self.score / self.max_score
        } else {
            0.0
        }
    }
}

/// Grade detections against the answer key.
///
/// Only questions present in the key contribute to either the score or the
/// maximum; unkeyed questions are survey items and are skipped entirely. A
/// keyed question with no detection (template/key mismatch) is graded as
/// unanswered.
#[must_use]
pub fn grade(
    questions: &[QuestionDetection],
    fields: &[FieldDetection],
    template: &Template,
    key: &AnswerKey,
    quality: QualityReport,
) -> ScoreReport {
    let mut scores = Vec::with_capacity(key.entries.len());
    let mut score = 0.0;
    let mut max_score = 0.0;

    for (&number, &correct) in &key.entries {
        let detection = questions.iter().find(|d| d.number == number);
        let weight = template
            .questions
            .iter()
            .find(|q| q.number == number)
            .map_or(1.0, |q| q.weight);

        let (verdict, selected, confidence) = match detection {
            Some(det) => match det.selection {
                Selection::Single(i) if i == correct => (Verdict::Correct, Some(i), det.confidence),
                Selection::Single(i) => (Verdict::Incorrect, Some(i), det.confidence),
                Selection::NoMark => (Verdict::Unanswered, None, det.confidence),
                Selection::Multiple => (Verdict::MultipleMarked, None, det.confidence),
            },
            None => {
                warn!(question = number, "keyed question missing from detections");
                (Verdict::Unanswered, None, 0.0)
            }
        };

        let awarded = if verdict == Verdict::Correct { weight } else { 0.0 };
        score += awarded;
        max_score += weight;
        scores.push(QuestionScore {
            number,
            verdict,
            selected,
            correct,
            awarded,
            weight,
            confidence,
        });
    }

    ScoreReport {
        identifiers: fields.iter().map(|f| f.text.clone()).collect(),
        questions: scores,
        score,
        max_score,
        quality,
    }
}
