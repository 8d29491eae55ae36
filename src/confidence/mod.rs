//! Confidence scoring
//!
//! `confidence = 10 · Σ wᵢ·min(1, |zᵢ|/s)^p / Σ wᵢ`, clamped to [0, 10].
//! A pure function of the z-vector and the weight table.

use crate::config::ConfidenceConfig;

pub const MAX_CONFIDENCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScorer {
    saturation: f64,
    exponent: f64,
}

impl ConfidenceScorer {
    pub fn new(saturation: f64, exponent: f64) -> Self {
        Self {
            saturation,
            exponent,
        }
    }

    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self::new(config.saturation, config.exponent)
    }

    /// Contribution of one z-score in [0, 1]; non-finite counts as 0
    pub fn contribution(&self, z: f64) -> f64 {
        if !z.is_finite() || self.saturation <= 0.0 {
            return 0.0;
        }
        (z.abs() / self.saturation).min(1.0).powf(self.exponent)
    }

    pub fn score(&self, z: &[f64], weights: &[f64]) -> f64 {
        let total: f64 = weights.iter().sum();
        if z.is_empty() || !(total > 0.0) {
            return 0.0;
        }
        let weighted: f64 = z
            .iter()
            .zip(weights)
            .map(|(zi, wi)| wi * self.contribution(*zi))
            .sum();
        let score = MAX_CONFIDENCE * weighted / total;
        if score.is_finite() {
            score.clamp(0.0, MAX_CONFIDENCE)
        } else {
            0.0
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::from_config(&ConfidenceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_vector_scores_zero() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.score(&[0.0; 12], &[8.0, 7.0, 4.0, 9.0, 6.0, 5.0, 3.0, 3.0, 8.0, 6.0, 7.0, 5.0]), 0.0);
        assert_eq!(scorer.score(&[0.0, 0.0], &[1.0, 100.0]), 0.0);
    }

    #[test]
    fn test_saturated_vector_scores_ten() {
        let scorer = ConfidenceScorer::default();
        assert!((scorer.score(&[1.2, -3.0, 5.0], &[1.0, 2.0, 3.0]) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_concave_curve() {
        let scorer = ConfidenceScorer::default();
        // Half the saturation point already yields more than half the weight
        let c = scorer.contribution(0.6);
        assert!((c - 0.5_f64.powf(0.7)).abs() < 1e-12);
        assert!(c > 0.5);
    }

    #[test]
    fn test_weighted_average() {
        let scorer = ConfidenceScorer::default();
        // One saturated feature with weight 3 of total 4
        let score = scorer.score(&[2.0, 0.0], &[3.0, 1.0]);
        assert!((score - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.score(&[], &[]), 0.0);
        assert_eq!(scorer.score(&[1.0], &[0.0]), 0.0);
        assert_eq!(scorer.score(&[f64::NAN, 2.0], &[1.0, 1.0]), 5.0);
        assert_eq!(scorer.score(&[f64::INFINITY], &[1.0]), 0.0);
    }

    #[test]
    fn test_always_within_bounds() {
        let scorer = ConfidenceScorer::new(0.5, 2.0);
        for i in -50..50 {
            let z = [i as f64 * 0.13, -(i as f64) * 0.07, 1e9];
            let s = scorer.score(&z, &[1.0, 2.0, 3.0]);
            assert!((0.0..=10.0).contains(&s));
        }
    }
}
