//! Relative duration hints used to split progress between sibling stages.

/// Weight plus indeterminacy of a stage.
///
/// Weights are dimensionless and only compare against siblings within the
/// same chain or router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeEstimate {
    weight: f64,
    indeterminate: bool,
}

impl TimeEstimate {
    pub const INSTANTANEOUS: TimeEstimate = TimeEstimate::fixed(1.0, false);
    pub const SHORT_OPERATION: TimeEstimate = TimeEstimate::fixed(10.0, false);
    pub const LONG_OPERATION: TimeEstimate = TimeEstimate::fixed(100.0, false);
    /// Waits on the user (e.g. a region picker); duration is unknown.
    pub const USER_INTERACTIVE: TimeEstimate = TimeEstimate::fixed(10.0, true);
    pub const INDETERMINATE: TimeEstimate = TimeEstimate::fixed(100.0, true);
    /// Weight of an empty composition.
    pub const NONE: TimeEstimate = TimeEstimate::fixed(0.0, false);

    const fn fixed(weight: f64, indeterminate: bool) -> Self {
        Self {
            weight,
            indeterminate,
        }
    }

    /// Creates an estimate, clamping negative or non-finite weights to zero.
    pub fn new(weight: f64, indeterminate: bool) -> Self {
        let weight = if weight.is_finite() && weight >= 0.0 {
            weight
        } else {
            log::warn!("Invalid time estimate weight {weight}, using 0");
            0.0
        };
        Self {
            weight,
            indeterminate,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_indeterminate(&self) -> bool {
        self.indeterminate
    }

    /// Sequential composition: weights add up.
    pub fn sum<I: IntoIterator<Item = TimeEstimate>>(estimates: I) -> Self {
        estimates
            .into_iter()
            .fold(Self::NONE, |acc, estimate| Self {
                weight: acc.weight + estimate.weight,
                indeterminate: acc.indeterminate || estimate.indeterminate,
            })
    }

    /// Exclusive branches: the slowest branch bounds the duration.
    pub fn max<I: IntoIterator<Item = TimeEstimate>>(estimates: I) -> Self {
        estimates
            .into_iter()
            .fold(Self::NONE, |acc, estimate| Self {
                weight: acc.weight.max(estimate.weight),
                indeterminate: acc.indeterminate || estimate.indeterminate,
            })
    }
}

impl Default for TimeEstimate {
    fn default() -> Self {
        Self::SHORT_OPERATION
    }
}
