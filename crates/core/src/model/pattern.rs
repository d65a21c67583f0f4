use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Difficulty, ReviewResult};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("review pattern for {0} needs at least two intervals")]
    TooShort(Difficulty),
    #[error("review pattern for {0} must start at 0 days")]
    NonZeroStart(Difficulty),
    #[error("review pattern for {difficulty} decreases at stage {stage}")]
    Decreasing { difficulty: Difficulty, stage: usize },
    #[error("duplicate review pattern for {0}")]
    Duplicate(Difficulty),
}

//
// ─── REVIEW PATTERN ────────────────────────────────────────────────────────────
//

/// Ordered interval lengths (days) for one difficulty.
///
/// Index 0 is always 0 ("review on the day of solving"); from index 1 the
/// sequence never decreases. Stage `n` schedules the next review
/// `intervals[n]` days out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPattern {
    difficulty: Difficulty,
    intervals: Vec<u32>,
}

impl ReviewPattern {
    /// Validate and build a pattern.
    ///
    /// # Errors
    ///
    /// - `TooShort` with fewer than two entries (a forgotten review needs `intervals[1]`)
    /// - `NonZeroStart` if `intervals[0] != 0`
    /// - `Decreasing` if any later interval is shorter than its predecessor
    pub fn new(difficulty: Difficulty, intervals: Vec<u32>) -> Result<Self, PatternError> {
        if intervals.len() < 2 {
            return Err(PatternError::TooShort(difficulty));
        }
        if intervals[0] != 0 {
            return Err(PatternError::NonZeroStart(difficulty));
        }
        if let Some(pos) = intervals[1..].windows(2).position(|w| w[1] < w[0]) {
            return Err(PatternError::Decreasing {
                difficulty,
                stage: pos + 2,
            });
        }
        Ok(Self {
            difficulty,
            intervals,
        })
    }

    /// Standard sequence shipped with the app for `difficulty`.
    #[must_use]
    pub fn standard(difficulty: Difficulty) -> Self {
        let intervals = match difficulty {
            Difficulty::Easy | Difficulty::Medium => vec![0, 1, 3, 7, 14, 30, 60, 120],
            Difficulty::Hard => vec![0, 1, 2, 4, 8, 16, 32, 64],
        };
        Self {
            difficulty,
            intervals,
        }
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn intervals(&self) -> &[u32] {
        &self.intervals
    }

    /// Highest reachable stage.
    #[must_use]
    pub fn max_stage(&self) -> u32 {
        // new() guarantees len >= 2
        u32::try_from(self.intervals.len() - 1).unwrap_or(u32::MAX)
    }

    /// Clamp an arbitrary stage into the valid index range.
    #[must_use]
    pub fn clamp_stage(&self, stage: u32) -> u32 {
        stage.min(self.max_stage())
    }

    /// Interval for a stage, clamped to the last entry.
    #[must_use]
    pub fn interval_at(&self, stage: u32) -> u32 {
        let idx = usize::try_from(stage)
            .unwrap_or(usize::MAX)
            .min(self.intervals.len() - 1);
        self.intervals[idx]
    }

    /// Stage reached after a review at `current` with `result`.
    ///
    /// Remembering advances one step and sticks at the last stage; forgetting
    /// always drops back to stage 1, including from stage 0.
    #[must_use]
    pub fn next_stage(&self, current: u32, result: ReviewResult) -> u32 {
        match result {
            ReviewResult::Remembered => self.clamp_stage(current.saturating_add(1)),
            ReviewResult::Forgot => 1,
        }
    }
}

//
// ─── PATTERN TABLE ─────────────────────────────────────────────────────────────
//

/// Read-only set of review patterns, at most one per difficulty.
///
/// Loaded once at startup and shared with the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewPatternTable {
    patterns: BTreeMap<Difficulty, ReviewPattern>,
}

impl ReviewPatternTable {
    /// Table holding the standard sequences for every difficulty.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            patterns: Difficulty::ALL
                .into_iter()
                .map(|d| (d, ReviewPattern::standard(d)))
                .collect(),
        }
    }

    /// Build a table from loaded rows.
    ///
    /// Missing difficulties are allowed here; they surface as a
    /// configuration error when a problem of that difficulty is scheduled.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::Duplicate` if two rows share a difficulty.
    pub fn from_patterns(
        patterns: impl IntoIterator<Item = ReviewPattern>,
    ) -> Result<Self, PatternError> {
        let mut map = BTreeMap::new();
        for pattern in patterns {
            let difficulty = pattern.difficulty();
            if map.insert(difficulty, pattern).is_some() {
                return Err(PatternError::Duplicate(difficulty));
            }
        }
        Ok(Self { patterns: map })
    }

    #[must_use]
    pub fn get(&self, difficulty: Difficulty) -> Option<&ReviewPattern> {
        self.patterns.get(&difficulty)
    }

    /// Difficulties without a pattern.
    #[must_use]
    pub fn missing(&self) -> Vec<Difficulty> {
        Difficulty::ALL
            .into_iter()
            .filter(|d| !self.patterns.contains_key(d))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReviewPattern> {
        self.patterns.values()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_sequences_match_shipped_configuration() {
        assert_eq!(
            ReviewPattern::standard(Difficulty::Easy).intervals(),
            &[0, 1, 3, 7, 14, 30, 60, 120]
        );
        assert_eq!(
            ReviewPattern::standard(Difficulty::Medium).intervals(),
            &[0, 1, 3, 7, 14, 30, 60, 120]
        );
        assert_eq!(
            ReviewPattern::standard(Difficulty::Hard).intervals(),
            &[0, 1, 2, 4, 8, 16, 32, 64]
        );
    }

    #[test]
    fn standard_sequences_pass_validation() {
        for d in Difficulty::ALL {
            let std = ReviewPattern::standard(d);
            assert_eq!(ReviewPattern::new(d, std.intervals().to_vec()).unwrap(), std);
        }
    }

    #[test]
    fn rejects_malformed_sequences() {
        assert_eq!(
            ReviewPattern::new(Difficulty::Easy, vec![0]).unwrap_err(),
            PatternError::TooShort(Difficulty::Easy)
        );
        assert_eq!(
            ReviewPattern::new(Difficulty::Easy, vec![1, 2]).unwrap_err(),
            PatternError::NonZeroStart(Difficulty::Easy)
        );
        assert_eq!(
            ReviewPattern::new(Difficulty::Hard, vec![0, 1, 4, 2]).unwrap_err(),
            PatternError::Decreasing {
                difficulty: Difficulty::Hard,
                stage: 3
            }
        );
    }

    #[test]
    fn equal_neighbours_are_allowed() {
        assert!(ReviewPattern::new(Difficulty::Medium, vec![0, 1, 1, 2]).is_ok());
    }

    #[test]
    fn remembered_advances_and_sticks_at_max() {
        let p = ReviewPattern::standard(Difficulty::Easy);
        assert_eq!(p.next_stage(0, ReviewResult::Remembered), 1);
        assert_eq!(p.next_stage(6, ReviewResult::Remembered), 7);
        assert_eq!(p.next_stage(7, ReviewResult::Remembered), 7);
        assert_eq!(p.next_stage(40, ReviewResult::Remembered), 7);
    }

    #[test]
    fn forgot_always_returns_to_stage_one() {
        let p = ReviewPattern::standard(Difficulty::Hard);
        for stage in [0, 1, 4, 7, 99] {
            assert_eq!(p.next_stage(stage, ReviewResult::Forgot), 1);
        }
    }

    #[test]
    fn interval_at_clamps() {
        let p = ReviewPattern::standard(Difficulty::Hard);
        assert_eq!(p.interval_at(3), 4);
        assert_eq!(p.interval_at(100), 64);
    }

    #[test]
    fn table_rejects_duplicates_and_reports_missing() {
        let err = ReviewPatternTable::from_patterns([
            ReviewPattern::standard(Difficulty::Easy),
            ReviewPattern::standard(Difficulty::Easy),
        ])
        .unwrap_err();
        assert_eq!(err, PatternError::Duplicate(Difficulty::Easy));

        let table =
            ReviewPatternTable::from_patterns([ReviewPattern::standard(Difficulty::Hard)]).unwrap();
        assert_eq!(table.missing(), vec![Difficulty::Easy, Difficulty::Medium]);
        assert!(table.get(Difficulty::Hard).is_some());
        assert!(ReviewPatternTable::standard().missing().is_empty());
    }
}
