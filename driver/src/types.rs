//! Per-pair measurement output: the samples collected on each leg, and the
//! derived RTT estimate or recorded error for a pair.

use serde::Serialize;

use ting_types::{Fingerprint, Sample};

/// Samples collected on each of the three legs for one pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LegSamples {
    pub x: Vec<Sample>,
    pub y: Vec<Sample>,
    pub xy: Vec<Sample>,
}

impl LegSamples {
    /// `min(sum(xy)) − min(sum(x))/2 − min(sum(y))/2`, the spec.md §4.7
    /// estimator. `None` if any leg recorded zero samples.
    pub fn rtt_estimate_s(&self) -> Option<f64> {
        let min_total = |samples: &[Sample]| {
            samples
                .iter()
                .map(Sample::total_s)
                .fold(f64::INFINITY, f64::min)
        };
        let xy = min_total(&self.xy);
        let x = min_total(&self.x);
        let y = min_total(&self.y);
        if xy.is_finite() && x.is_finite() && y.is_finite() {
            Some(xy - x / 2.0 - y / 2.0)
        } else {
            None
        }
    }
}

/// One line of the result sink's JSON-lines output: either a completed
/// pair or a pair that exhausted its circuit-build retries.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Completed {
        r1: Fingerprint,
        r2: Fingerprint,
        samples: LegSamples,
        rtt_estimate_s: Option<f64>,
    },
    Error {
        r1: Fingerprint,
        r2: Fingerprint,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_estimate_matches_the_min_minus_halves_formula() {
        let mut legs = LegSamples::default();
        legs.x.push(Sample::new(0.05, 0.05)); // total 0.10
        legs.y.push(Sample::new(0.06, 0.06)); // total 0.12
        legs.xy.push(Sample::new(0.10, 0.11)); // total 0.21
        let rtt = legs.rtt_estimate_s().unwrap();
        assert!((rtt - (0.21 - 0.05 - 0.06)).abs() < 1e-9);
    }

    #[test]
    fn rtt_estimate_is_none_when_a_leg_has_no_samples() {
        let mut legs = LegSamples::default();
        legs.x.push(Sample::new(0.05, 0.05));
        assert!(legs.rtt_estimate_s().is_none());
    }

    #[test]
    fn rtt_estimate_uses_the_minimum_not_the_first_sample() {
        let mut legs = LegSamples::default();
        legs.x.push(Sample::new(0.10, 0.10));
        legs.x.push(Sample::new(0.02, 0.02));
        legs.y.push(Sample::new(0.02, 0.02));
        legs.xy.push(Sample::new(0.10, 0.10));
        let rtt = legs.rtt_estimate_s().unwrap();
        assert!((rtt - (0.20 - 0.02 - 0.02)).abs() < 1e-9);
    }
}
