//! Per-scan PSM ranking.
//!
//! Ranking is per scan, not per charge: all candidate matches for one
//! spectrum compete against each other regardless of assumed charge state.

use std::cmp::Ordering;

use crate::psm::NormalizedMatch;

/// Which direction of a source tool's score means "better".
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    /// Similarity / probability scores
    HigherIsBetter,
    /// Error-style scores such as E-values
    LowerIsBetter,
}

impl ScoreDirection {
    /// Better-first ordering of two scores.
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        match self {
            ScoreDirection::HigherIsBetter => b.total_cmp(&a),
            ScoreDirection::LowerIsBetter => a.total_cmp(&b),
        }
    }

    /// True if `score` passes an acceptance cutoff in this direction.
    pub fn passes(&self, score: f64, threshold: f64) -> bool {
        match self {
            ScoreDirection::HigherIsBetter => score >= threshold,
            ScoreDirection::LowerIsBetter => score <= threshold,
        }
    }
}

/// The one tie epsilon used everywhere scores are compared for equality.
/// Scores have usually been through a text round-trip, so raw machine epsilon
/// would split genuine ties.
pub const SCORE_EPSILON: f64 = 1E-10;

/// True if two scores are indistinguishable for ranking purposes.
pub fn scores_tied(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCORE_EPSILON
}

/// Sort the buffer by (scan, better score) and assign dense, tie-aware ranks
/// within each scan group: rank 1 for the best score, the same rank for any
/// score within [`SCORE_EPSILON`] of the previous distinct score, and no gaps.
pub fn assign_ranks(matches: &mut [NormalizedMatch], direction: ScoreDirection) {
    matches.sort_by(|a, b| {
        a.scan
            .cmp(&b.scan)
            .then_with(|| direction.compare(a.score, b.score))
    });

    let mut i = 0;
    while i < matches.len() {
        let scan = matches[i].scan;
        let mut rank = 1;
        let mut last_distinct = matches[i].score;
        matches[i].rank = 1;

        let mut j = i + 1;
        while j < matches.len() && matches[j].scan == scan {
            if !scores_tied(matches[j].score, last_distinct) {
                rank += 1;
                last_distinct = matches[j].score;
            }
            matches[j].rank = rank;
            j += 1;
        }
        i = j;
    }
}
