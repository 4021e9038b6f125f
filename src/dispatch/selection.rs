// In: src/dispatch/selection.rs

//! Picks the winning candidate from comparison scores.

use crate::config::MetricDirection;

/// Index of the best score under `direction`.
///
/// Only a strictly better score replaces the current best, so ties keep the
/// earliest candidate. NaN never wins. Returns `None` only for empty input;
/// when every score is NaN the first candidate is returned.
pub fn select_best(scores: &[f32], direction: MetricDirection) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, current)) => match direction {
                MetricDirection::HigherIsBetter => score > current,
                MetricDirection::LowerIsBetter => score < current,
            },
        };
        if better {
            best = Some((index, score));
        }
    }

    match best {
        Some((index, _)) => Some(index),
        None => {
            log::warn!(
                "All {} candidate scores are NaN, falling back to the first candidate",
                scores.len()
            );
            Some(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_is_better() {
        assert_eq!(select_best(&[0.81, 0.83], MetricDirection::HigherIsBetter), Some(1));
    }

    #[test]
    fn test_lower_is_better() {
        assert_eq!(select_best(&[0.81, 0.83], MetricDirection::LowerIsBetter), Some(0));
    }

    #[test]
    fn test_tie_keeps_earliest() {
        assert_eq!(select_best(&[0.81, 0.81], MetricDirection::HigherIsBetter), Some(0));
        assert_eq!(select_best(&[0.5, 0.2, 0.2], MetricDirection::LowerIsBetter), Some(1));
    }

    #[test]
    fn test_nan_never_wins() {
        assert_eq!(
            select_best(&[f32::NAN, 0.2, 0.9], MetricDirection::HigherIsBetter),
            Some(2)
        );
        assert_eq!(
            select_best(&[0.4, f32::NAN], MetricDirection::LowerIsBetter),
            Some(0)
        );
        assert_eq!(
            select_best(&[f32::NAN, f32::NAN], MetricDirection::LowerIsBetter),
            Some(0)
        );
        assert_eq!(select_best(&[], MetricDirection::LowerIsBetter), None);
    }
}
