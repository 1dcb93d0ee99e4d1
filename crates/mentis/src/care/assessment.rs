use serde::Serialize;

use super::domain::AssessmentLevel;
use super::errors::ValidationError;
use super::requests::RawAnswer;

pub const MAX_ANSWER_VALUE: u8 = 4;
pub const ASSESSMENT_QUESTION_COUNT: usize = 10;

/// Score derived from a validated answer sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentScore {
    pub score: u32,
    pub max_score: u32,
    pub percentage: u8,
    pub level: AssessmentLevel,
}

/// Converts answers into a severity classification. Parametric in the number
/// of questions and the answer ceiling; the HTTP contract uses 10 and 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssessmentScorer {
    expected_answers: usize,
    max_value: u8,
}

impl AssessmentScorer {
    pub const fn new(expected_answers: usize, max_value: u8) -> Self {
        Self {
            expected_answers,
            max_value,
        }
    }

    pub const fn standard() -> Self {
        Self::new(ASSESSMENT_QUESTION_COUNT, MAX_ANSWER_VALUE)
    }

    pub fn expected_answers(&self) -> usize {
        self.expected_answers
    }

    /// Validate answers as submitted over HTTP: count first, then each entry
    /// must be a whole number before the range check applies.
    pub fn validate_submitted(&self, raw: &[RawAnswer]) -> Result<Vec<u8>, ValidationError> {
        if raw.len() != self.expected_answers {
            return Err(ValidationError::AnswerCount {
                expected: self.expected_answers,
                found: raw.len(),
            });
        }

        let integers = raw
            .iter()
            .enumerate()
            .map(|(index, answer)| match answer {
                RawAnswer::Integer(value) => Ok(*value),
                RawAnswer::Invalid(value) => Err(ValidationError::AnswerNotInteger {
                    position: index + 1,
                    value: value.clone(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.validate(&integers)
    }

    /// Check count and range before any domain logic runs.
    pub fn validate(&self, raw: &[i64]) -> Result<Vec<u8>, ValidationError> {
        if raw.len() != self.expected_answers {
            return Err(ValidationError::AnswerCount {
                expected: self.expected_answers,
                found: raw.len(),
            });
        }

        raw.iter()
            .enumerate()
            .map(|(index, &value)| {
                if (1..=i64::from(self.max_value)).contains(&value) {
                    Ok(value as u8)
                } else {
                    Err(ValidationError::AnswerOutOfRange {
                        position: index + 1,
                        value,
                        max: self.max_value,
                    })
                }
            })
            .collect()
    }

    /// Score already-validated answers.
    pub fn score(&self, answers: &[u8]) -> AssessmentScore {
        let score: u32 = answers.iter().map(|&value| u32::from(value)).sum();
        let max_score = (answers.len() as u32 * u32::from(self.max_value)).max(1);
        // round-half-up of 100 * score / max_score in integer arithmetic
        let rounded = (200 * u64::from(score) + u64::from(max_score)) / (2 * u64::from(max_score));
        let percentage = rounded.min(100) as u8;

        AssessmentScore {
            score,
            max_score,
            percentage,
            level: classify(percentage),
        }
    }
}

impl Default for AssessmentScorer {
    fn default() -> Self {
        Self::standard()
    }
}

/// First matching upper bound wins, so 25 is mild and 26 moderate.
pub fn classify(percentage: u8) -> AssessmentLevel {
    match percentage {
        0..=25 => AssessmentLevel::Mild,
        26..=50 => AssessmentLevel::Moderate,
        51..=75 => AssessmentLevel::High,
        _ => AssessmentLevel::Severe,
    }
}
