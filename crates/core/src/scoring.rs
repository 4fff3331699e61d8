use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{MultipleChoiceQuestion, OpenEndedQuestion, QuestionNumber, VocabularyWord};

//
// ─── POINT VALUES ──────────────────────────────────────────────────────────────
//

pub const MULTIPLE_CHOICE_POINTS: u32 = 8;
pub const OPEN_ENDED_POINTS: u32 = 10;
pub const VOCABULARY_POINTS: u32 = 2;

/// Minimum share of expected keywords a fallback answer must contain.
pub const KEYWORD_OVERLAP_THRESHOLD: f64 = 0.6;

/// Expected-answer tokens of this length or shorter are ignored.
const MIN_KEYWORD_CHARS: usize = 3;

// Absorbs binary representation error before truncating, so that
// 10 * (0.5 + 0.9) lands on 14 rather than 13.999...
const TRUNCATION_EPSILON: f64 = 1e-9;

/// Points for a graded set: `8·mc + floor(10·Σoe) + 2·vocab`.
#[must_use]
pub fn points_earned(
    multiple_choice_correct: u32,
    open_ended_scores: &[f64],
    vocabulary_correct: u32,
) -> u32 {
    let open_ended_sum: f64 = open_ended_scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .sum();
    let open_ended = (f64::from(OPEN_ENDED_POINTS) * open_ended_sum + TRUNCATION_EPSILON)
        .floor()
        .max(0.0);

    // Scores are clamped to [0, 1] upstream, so the product stays far below u32::MAX.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let open_ended = open_ended as u32;

    MULTIPLE_CHOICE_POINTS
        .saturating_mul(multiple_choice_correct)
        .saturating_add(open_ended)
        .saturating_add(VOCABULARY_POINTS.saturating_mul(vocabulary_correct))
}

/// Maximum points for a question set with exact per-category counts.
#[must_use]
pub fn points_possible(multiple_choice: u32, open_ended: u32, vocabulary: u32) -> u32 {
    MULTIPLE_CHOICE_POINTS
        .saturating_mul(multiple_choice)
        .saturating_add(OPEN_ENDED_POINTS.saturating_mul(open_ended))
        .saturating_add(VOCABULARY_POINTS.saturating_mul(vocabulary))
}

/// `earned / possible`, or `0.0` when nothing was possible. Always within `[0, 1]`.
#[must_use]
pub fn accuracy(earned: u32, possible: u32) -> f64 {
    if possible == 0 {
        return 0.0;
    }
    (f64::from(earned) / f64::from(possible)).clamp(0.0, 1.0)
}

//
// ─── QUESTION TALLY ────────────────────────────────────────────────────────────
//

/// How many questions a finished session offered, used to derive possible points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionTally {
    /// Exact per-category counts. Canonical.
    Exact {
        multiple_choice: u32,
        open_ended: u32,
        vocabulary: u32,
    },
    /// Only a combined count is known; every question is priced as multiple choice.
    #[deprecated(
        note = "approximates open-ended and vocabulary points; use `QuestionTally::Exact`"
    )]
    Total(u32),
}

impl QuestionTally {
    #[must_use]
    pub fn exact(multiple_choice: u32, open_ended: u32, vocabulary: u32) -> Self {
        Self::Exact {
            multiple_choice,
            open_ended,
            vocabulary,
        }
    }

    /// Possible points for this tally.
    #[must_use]
    #[allow(deprecated)]
    pub fn possible_points(&self) -> u32 {
        match *self {
            Self::Exact {
                multiple_choice,
                open_ended,
                vocabulary,
            } => points_possible(multiple_choice, open_ended, vocabulary),
            Self::Total(total) => MULTIPLE_CHOICE_POINTS.saturating_mul(total),
        }
    }
}

//
// ─── KEYWORD OVERLAP ───────────────────────────────────────────────────────────
//

/// Verdict for expected answers that contain no keyword long enough to count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyKeywordPolicy {
    /// Grade the answer as incorrect.
    #[default]
    Reject,
    /// Grade the answer as correct.
    Accept,
}

/// Share of the expected answer's keywords found in the user's answer.
///
/// Both strings are trimmed and lowercased; keywords are whitespace tokens of
/// the expected answer longer than three characters. Returns `None` when the
/// expected answer has no such token.
#[must_use]
pub fn keyword_overlap(user_answer: &str, expected_answer: &str) -> Option<f64> {
    let user = user_answer.trim().to_lowercase();
    let expected = expected_answer.trim().to_lowercase();

    let user_tokens: HashSet<&str> = user.split_whitespace().collect();
    let keywords: Vec<&str> = expected
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_KEYWORD_CHARS)
        .collect();

    if keywords.is_empty() {
        return None;
    }

    let hits = keywords.iter().filter(|k| user_tokens.contains(*k)).count();

    #[allow(clippy::cast_precision_loss)]
    let ratio = hits as f64 / keywords.len() as f64;
    Some(ratio)
}

/// Local fallback grading for open-ended answers.
#[must_use]
pub fn evaluate_by_keyword_overlap(
    user_answer: &str,
    expected_answer: &str,
    policy: EmptyKeywordPolicy,
) -> bool {
    match keyword_overlap(user_answer, expected_answer) {
        Some(ratio) => ratio >= KEYWORD_OVERLAP_THRESHOLD,
        None => policy == EmptyKeywordPolicy::Accept,
    }
}

//
// ─── COMPLETENESS ──────────────────────────────────────────────────────────────
//

/// True when every question in the set has an answer on record.
///
/// Multiple-choice questions only need a selection; open-ended questions and
/// vocabulary words need a non-blank answer.
#[must_use]
pub fn all_completed(
    multiple_choice: &[MultipleChoiceQuestion],
    open_ended: &[OpenEndedQuestion],
    vocabulary: &[VocabularyWord],
    multiple_choice_answers: &HashMap<QuestionNumber, String>,
    open_ended_answers: &HashMap<QuestionNumber, String>,
    vocabulary_answers: &HashMap<String, String>,
) -> bool {
    let non_blank = |answer: Option<&String>| answer.is_some_and(|a| !a.trim().is_empty());

    multiple_choice
        .iter()
        .all(|q| multiple_choice_answers.contains_key(&q.number))
        && open_ended
            .iter()
            .all(|q| non_blank(open_ended_answers.get(&q.number)))
        && vocabulary
            .iter()
            .all(|w| non_blank(vocabulary_answers.get(&w.word)))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(n: u32) -> QuestionNumber {
        QuestionNumber::new(n).unwrap()
    }

    #[test]
    fn points_earned_matches_worked_example() {
        assert_eq!(points_earned(3, &[0.5, 0.9], 2), 42);
    }

    #[test]
    fn points_earned_truncates_partial_open_ended_points() {
        // 10 * 0.35 = 3.5 -> 3
        assert_eq!(points_earned(0, &[0.35], 0), 3);
        assert_eq!(points_earned(0, &[], 0), 0);
    }

    #[test]
    fn points_possible_matches_worked_example() {
        assert_eq!(points_possible(5, 3, 10), 90);
    }

    #[test]
    #[allow(deprecated)]
    fn total_tally_prices_everything_as_multiple_choice() {
        assert_eq!(QuestionTally::Total(6).possible_points(), 48);
        assert_eq!(QuestionTally::exact(5, 3, 10).possible_points(), 90);
    }

    #[test]
    fn accuracy_is_zero_without_possible_points() {
        assert_eq!(accuracy(0, 0), 0.0);
        assert_eq!(accuracy(12, 0), 0.0);
    }

    #[test]
    fn accuracy_is_clamped_to_one() {
        assert_eq!(accuracy(50, 40), 1.0);
        assert!((accuracy(42, 90) - 0.466_666_666).abs() < 1e-6);
    }

    #[test]
    fn overlap_with_only_short_keywords_follows_policy() {
        assert_eq!(keyword_overlap("the cat sat on mat", "The Cat Sat"), None);
        assert!(!evaluate_by_keyword_overlap(
            "the cat sat on mat",
            "The Cat Sat",
            EmptyKeywordPolicy::Reject
        ));
        assert!(evaluate_by_keyword_overlap(
            "the cat sat on mat",
            "The Cat Sat",
            EmptyKeywordPolicy::Accept
        ));
    }

    #[test]
    fn overlap_counts_long_keywords_only() {
        let user = "photosynthesis converts light energy";
        let expected = "plants use photosynthesis energy";
        // keywords: plants, photosynthesis, energy
        let ratio = keyword_overlap(user, expected).unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-12);
        assert!(evaluate_by_keyword_overlap(
            user,
            expected,
            EmptyKeywordPolicy::default()
        ));
    }

    #[test]
    fn overlap_below_threshold_is_incorrect() {
        assert!(!evaluate_by_keyword_overlap(
            "water",
            "rivers carry water downstream quickly",
            EmptyKeywordPolicy::Reject
        ));
    }

    #[test]
    fn overlap_is_case_and_padding_insensitive() {
        assert!(evaluate_by_keyword_overlap(
            "  GLACIERS Carve VALLEYS  ",
            "glaciers carve valleys",
            EmptyKeywordPolicy::Reject
        ));
    }

    #[test]
    fn all_completed_requires_every_category() {
        let mc = vec![MultipleChoiceQuestion {
            number: qn(1),
            text: "Pick".into(),
            options: vec!["a".into(), "b".into()],
            correct_option: "a".into(),
        }];
        let oe = vec![OpenEndedQuestion {
            number: qn(1),
            text: "Explain".into(),
            expected_answer: "because".into(),
        }];
        let vocab = vec![VocabularyWord {
            word: "ephemeral".into(),
            definition: "short-lived".into(),
        }];

        let mut mc_answers = HashMap::new();
        let mut oe_answers = HashMap::new();
        let mut vocab_answers = HashMap::new();
        assert!(!all_completed(&mc, &oe, &vocab, &mc_answers, &oe_answers, &vocab_answers));

        mc_answers.insert(qn(1), "b".to_string());
        oe_answers.insert(qn(1), "   ".to_string());
        vocab_answers.insert("ephemeral".to_string(), "brief".to_string());
        assert!(!all_completed(&mc, &oe, &vocab, &mc_answers, &oe_answers, &vocab_answers));

        oe_answers.insert(qn(1), "it rained".to_string());
        assert!(all_completed(&mc, &oe, &vocab, &mc_answers, &oe_answers, &vocab_answers));
    }

    #[test]
    fn empty_question_set_is_complete() {
        assert!(all_completed(
            &[],
            &[],
            &[],
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new()
        ));
    }
}
