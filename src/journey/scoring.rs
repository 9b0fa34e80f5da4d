//! Quality scoring
//!
//! Pure functions turning event impacts into scores. Per-event updates are
//! O(1) clamped adds; [`final_score`] is the full recompute used when a
//! journey is reviewed.

use super::model::StageProgress;

/// Lower bound of every score.
pub const MIN_SCORE: f64 = 0.0;

/// Upper bound of every score.
pub const MAX_SCORE: f64 = 100.0;

/// Score a stage starts with on every entry, including repeat entries.
pub const STAGE_ENTRY_SCORE: f64 = 80.0;

/// Starting value of the journey-wide rolling score.
pub const INITIAL_OVERALL_SCORE: f64 = 50.0;

/// Weight of one impact point on the rolling overall score.
pub const OVERALL_IMPACT_WEIGHT: f64 = 0.1;

fn clamp(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCORE;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Applies one event impact to a per-stage score at full weight.
#[must_use]
pub fn apply_stage_impact(current: f64, impact: i32) -> f64 {
    clamp(current + f64::from(impact))
}

/// Applies one event impact to the rolling overall score at one tenth weight.
#[must_use]
pub fn apply_overall_impact(current: f64, impact: i32) -> f64 {
    clamp(current + f64::from(impact) * OVERALL_IMPACT_WEIGHT)
}

/// Arithmetic mean of `quality_score` over completed stages; `0.0` when
/// none are completed.
#[must_use]
pub fn final_score<'a, I>(progress: I) -> f64
where
    I: IntoIterator<Item = &'a StageProgress>,
{
    let (sum, count) = progress
        .into_iter()
        .filter(|p| p.is_completed)
        .fold((0.0, 0u32), |(sum, count), p| (sum + p.quality_score, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::Stage;
    use chrono::Utc;
    use proptest::prelude::*;

    fn progress(score: f64, completed: bool) -> StageProgress {
        let mut p = StageProgress::enter(Stage::Awareness, Utc::now());
        p.quality_score = score;
        p.is_completed = completed;
        p
    }

    #[test]
    fn test_stage_impact_full_weight() {
        assert!((apply_stage_impact(80.0, 5) - 85.0).abs() < f64::EPSILON);
        assert!((apply_stage_impact(80.0, -30) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_impact_tenth_weight() {
        assert!((apply_overall_impact(50.0, 20) - 52.0).abs() < 1e-9);
        assert!((apply_overall_impact(50.0, -50) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_at_bounds() {
        assert!((apply_stage_impact(95.0, 20) - MAX_SCORE).abs() < f64::EPSILON);
        assert!((apply_stage_impact(5.0, -100) - MIN_SCORE).abs() < f64::EPSILON);
        assert!((apply_overall_impact(99.9, 100) - MAX_SCORE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_final_score_mean_of_completed() {
        let stages = [
            progress(90.0, true),
            progress(70.0, true),
            progress(10.0, false),
        ];
        assert!((final_score(&stages) - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_final_score_none_completed() {
        let stages = [progress(90.0, false)];
        assert!(final_score(&stages).abs() < f64::EPSILON);
        assert!(final_score(std::iter::empty()).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn stage_score_stays_in_bounds(start in 0.0f64..=100.0, impacts in prop::collection::vec(-100i32..=100, 0..64)) {
            let score = impacts.iter().fold(start, |s, &i| apply_stage_impact(s, i));
            prop_assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
        }

        #[test]
        fn overall_score_stays_in_bounds(start in 0.0f64..=100.0, impacts in prop::collection::vec(-100i32..=100, 0..256)) {
            let score = impacts.iter().fold(start, |s, &i| apply_overall_impact(s, i));
            prop_assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
        }

        #[test]
        fn any_impact_is_clamped(current in any::<f64>(), impact in any::<i32>()) {
            let stage = apply_stage_impact(current, impact);
            let overall = apply_overall_impact(current, impact);
            prop_assert!((MIN_SCORE..=MAX_SCORE).contains(&stage));
            prop_assert!((MIN_SCORE..=MAX_SCORE).contains(&overall));
        }
    }
}
