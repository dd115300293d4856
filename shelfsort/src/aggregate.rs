//! Combines per-file oracle scores into one ranked prediction per product.

use indexmap::IndexMap;
use serde::Serialize;

/// Class → confidence mapping for one file, in the order the oracle reported it.
pub type ClassScores = IndexMap<String, f64>;

/// Number of classes kept after ranking.
pub const TOP_CLASSES: usize = 5;

const ROUNDING_SCALE: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictedClass {
    pub class: String,
    pub weight: f64,
}

/// A product's classes ordered by descending confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPrediction {
    pub product_name: String,
    pub predicted_classes: Vec<PredictedClass>,
    pub file_paths: Vec<String>,
}

impl RankedPrediction {
    pub fn top(&self) -> Option<&PredictedClass> {
        self.predicted_classes.first()
    }

    /// Confidence difference between the first and second ranked classes.
    ///
    /// A single class counts as a full gap of 1.0; no classes means no gap.
    pub fn confidence_gap(&self) -> Option<f64> {
        match self.predicted_classes.as_slice() {
            [] => None,
            [_] => Some(1.0),
            [first, second, ..] => Some(first.weight - second.weight),
        }
    }
}

/// Round to 5 decimal places, ties to even.
pub fn round_confidence(value: f64) -> f64 {
    (value * ROUNDING_SCALE).round_ties_even() / ROUNDING_SCALE
}

/// Aggregate the successful per-file scores of one product.
///
/// Confidences are summed per class; with more than one contributing file the
/// sums become rounded means. `scores` holds only files the oracle answered, so
/// a failed file shrinks the divisor as well as the sum. Ties keep the order in
/// which classes were first seen.
pub fn aggregate(
    product_name: impl Into<String>,
    file_paths: Vec<String>,
    scores: &[ClassScores],
) -> RankedPrediction {
    let mut sums: IndexMap<&str, f64> = IndexMap::new();
    for file_scores in scores {
        for (class, confidence) in file_scores {
            *sums.entry(class.as_str()).or_insert(0.0) += confidence;
        }
    }

    let contributions = scores.len();
    let mut predicted_classes: Vec<PredictedClass> = sums
        .into_iter()
        .map(|(class, sum)| PredictedClass {
            class: class.to_string(),
            weight: if contributions > 1 {
                round_confidence(sum / contributions as f64)
            } else {
                sum
            },
        })
        .collect();

    // sort_by is stable, which preserves first-seen order on equal weights
    predicted_classes.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    predicted_classes.truncate(TOP_CLASSES);

    RankedPrediction {
        product_name: product_name.into(),
        predicted_classes,
        file_paths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> ClassScores {
        pairs.iter().map(|(c, w)| (c.to_string(), *w)).collect()
    }

    fn classes(prediction: &RankedPrediction) -> Vec<(&str, f64)> {
        prediction
            .predicted_classes
            .iter()
            .map(|p| (p.class.as_str(), p.weight))
            .collect()
    }

    #[test]
    fn single_file_keeps_raw_confidences() {
        let prediction = aggregate(
            "shoe",
            vec!["p/shoe.jpg".to_string()],
            &[scores(&[("boot", 0.123456789), ("sneaker", 0.8)])],
        );
        assert_eq!(
            classes(&prediction),
            vec![("sneaker", 0.8), ("boot", 0.123456789)]
        );
        assert_eq!(prediction.file_paths, vec!["p/shoe.jpg"]);
    }

    #[test]
    fn multiple_files_average_and_round() {
        let prediction = aggregate(
            "shoe",
            vec!["a".to_string(), "b".to_string()],
            &[scores(&[("sneaker", 0.9)]), scores(&[("sneaker", 0.7)])],
        );
        assert_eq!(classes(&prediction), vec![("sneaker", 0.8)]);
    }

    #[test]
    fn mean_matches_rounded_sum_over_count() {
        let a = [0.123456, 0.4, 0.31];
        let b = [0.654321, 0.2, 0.29];
        let c = [0.111111, 0.1, 0.3];
        let prediction = aggregate(
            "mug",
            vec![],
            &[
                scores(&[("x", a[0]), ("y", a[1]), ("z", a[2])]),
                scores(&[("x", b[0]), ("y", b[1]), ("z", b[2])]),
                scores(&[("x", c[0]), ("y", c[1]), ("z", c[2])]),
            ],
        );
        for (i, class) in ["x", "y", "z"].iter().enumerate() {
            let expected = round_confidence((a[i] + b[i] + c[i]) / 3.0);
            let got = prediction
                .predicted_classes
                .iter()
                .find(|p| p.class == *class)
                .unwrap()
                .weight;
            assert_eq!(got, expected, "class {class}");
        }
    }

    #[test]
    fn class_missing_from_some_files_counts_as_zero() {
        let prediction = aggregate(
            "lamp",
            vec![],
            &[scores(&[("desk", 0.6), ("floor", 0.4)]), scores(&[("desk", 1.0)])],
        );
        assert_eq!(classes(&prediction), vec![("desk", 0.8), ("floor", 0.2)]);
    }

    #[test]
    fn truncates_to_top_five() {
        let prediction = aggregate(
            "tee",
            vec![],
            &[scores(&[
                ("a", 0.01),
                ("b", 0.3),
                ("c", 0.02),
                ("d", 0.25),
                ("e", 0.2),
                ("f", 0.12),
                ("g", 0.1),
            ])],
        );
        let names: Vec<&str> = classes(&prediction).iter().map(|(c, _)| *c).collect();
        assert_eq!(names, vec!["b", "d", "e", "f", "g"]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let prediction = aggregate(
            "cup",
            vec![],
            &[scores(&[("zeta", 0.5), ("alpha", 0.5), ("mid", 0.5)])],
        );
        let names: Vec<&str> = classes(&prediction).iter().map(|(c, _)| *c).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn no_contributions_yields_empty_ranking() {
        let prediction = aggregate("ghost", vec!["g.jpg".to_string()], &[]);
        assert!(prediction.predicted_classes.is_empty());
        assert!(prediction.top().is_none());
        assert_eq!(prediction.confidence_gap(), None);
    }

    #[test]
    fn confidence_gap_cases() {
        let single = aggregate("a", vec![], &[scores(&[("only", 0.4)])]);
        assert_eq!(single.confidence_gap(), Some(1.0));

        let pair = aggregate("b", vec![], &[scores(&[("x", 0.9), ("y", 0.3)])]);
        let gap = pair.confidence_gap().unwrap();
        assert!((gap - 0.6).abs() < 1e-12);
    }

    #[test]
    fn rounding_is_to_five_places() {
        assert_eq!(round_confidence(0.123456789), 0.12346);
        assert_eq!(round_confidence(0.8), 0.8);
        assert_eq!(round_confidence(1.0), 1.0);
    }
}
