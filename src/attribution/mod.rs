//! Top-driver attribution
//!
//! Linear regressors rank by `|coefᵢ · xᵢ|` on the weighted, scaled row;
//! tree ensembles rank by global importance. The best four distinct labels
//! are kept, padded with a placeholder.

use crate::ml::Explanation;
use crate::types::{FeatureSet, LABEL_PLACEHOLDER};

pub const TOP_N: usize = 4;

/// Per-feature scores for ranking
pub fn scores(explanation: &Explanation, x: &[f64]) -> Vec<f64> {
    let raw: Vec<f64> = match explanation {
        Explanation::Coefficients(coefs) => {
            coefs.iter().zip(x).map(|(c, v)| (c * v).abs()).collect()
        }
        Explanation::Importances(imp) => imp.iter().map(|v| v.abs()).collect(),
    };
    raw.into_iter()
        .map(|s| if s.is_finite() { s } else { 0.0 })
        .collect()
}

/// Feature indices by descending score; ties keep canonical order
pub fn rank(explanation: &Explanation, x: &[f64]) -> Vec<usize> {
    let s = scores(explanation, x);
    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));
    order
}

pub fn top_labels(explanation: &Explanation, x: &[f64], set: &FeatureSet) -> [String; TOP_N] {
    let mut labels: Vec<&'static str> = Vec::with_capacity(TOP_N);
    for idx in rank(explanation, x) {
        let Some(feature) = set.features().get(idx) else {
            continue;
        };
        let label = feature.label();
        if !labels.contains(&label) {
            labels.push(label);
        }
        if labels.len() == TOP_N {
            break;
        }
    }

    std::array::from_fn(|i| {
        labels
            .get(i)
            .map(|l| l.to_string())
            .unwrap_or_else(|| LABEL_PLACEHOLDER.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;

    #[test]
    fn test_linear_ranks_by_contribution() {
        let set = FeatureSet::new([
            Feature::OvernightDrift,
            Feature::RetIntradayPrev,
            Feature::DeltaVix,
            Feature::Ma5,
            Feature::GarchVol,
        ]);
        let explanation = Explanation::Coefficients(vec![0.002, -0.01, 0.002, 0.005, 0.0]);
        let x = [10.0, 1.0, -20.0, 0.1, 50.0];

        // |contrib| = 0.02, 0.01, 0.04, 0.0005, 0.0
        let labels = top_labels(&explanation, &x, &set);
        assert_eq!(labels, ["ΔVIX", "Overnight drift", "Prev intraday", "MA(5)"].map(String::from));
    }

    #[test]
    fn test_importances_ignore_row_values() {
        let set = FeatureSet::new([Feature::Ret1, Feature::Vol5, Feature::Rsi14]);
        let explanation = Explanation::Importances(vec![0.2, 0.7, 0.1]);

        let labels = top_labels(&explanation, &[100.0, 0.0, -50.0], &set);
        assert_eq!(labels[0], "Vol(5)");
        assert_eq!(labels[1], "Daily return (lag1)");
        assert_eq!(labels[2], "RSI");
        assert_eq!(labels[3], LABEL_PLACEHOLDER);
    }

    #[test]
    fn test_pads_short_feature_sets() {
        let set = FeatureSet::new([Feature::OvernightDrift]);
        let labels = top_labels(&Explanation::Coefficients(vec![1.0]), &[1.0], &set);
        assert_eq!(labels[0], "Overnight drift");
        assert!(labels[1..].iter().all(|l| l == LABEL_PLACEHOLDER));
    }

    #[test]
    fn test_non_finite_scores_rank_last() {
        let explanation = Explanation::Coefficients(vec![1.0, 1.0]);
        assert_eq!(rank(&explanation, &[f64::NAN, 0.5]), vec![1, 0]);
    }
}
