use crate::analysis::{AnalysisResult, DimensionKey, Score};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall verdict for an article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallScore {
    Good,
    Fair,
    Poor,
    Error,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl OverallScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallScore::Good => "Good",
            OverallScore::Fair => "Fair",
            OverallScore::Poor => "Poor",
            OverallScore::Error => "Error",
            OverallScore::NotAvailable => "N/A",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "good" => Some(OverallScore::Good),
            "fair" => Some(OverallScore::Fair),
            "poor" => Some(OverallScore::Poor),
            "error" => Some(OverallScore::Error),
            "n/a" | "not available" => Some(OverallScore::NotAvailable),
            _ => None,
        }
    }

    /// Band for a rounded mean. Total over all integers: anything below 2 is
    /// Poor, anything above is Good.
    fn from_band(band: i64) -> Self {
        match band {
            i64::MIN..=1 => OverallScore::Poor,
            2 => OverallScore::Fair,
            _ => OverallScore::Good,
        }
    }
}

impl std::fmt::Display for OverallScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Numeric slot for a dimension score. Error and absent dimensions borrow
/// Fair's value and are flagged separately.
fn numeric(score: Option<Score>) -> (f64, bool) {
    match score {
        Some(Score::Good) => (3.0, false),
        Some(Score::Fair) => (2.0, false),
        Some(Score::Poor) => (1.0, false),
        Some(Score::Error) | None => (2.0, true),
    }
}

/// Aggregate per-dimension scores. `None` marks a dimension whose result was
/// missing; it counts as Error.
///
/// Two channels: the rounded mean gives the band, the error flag applies the
/// dampening (Good becomes Fair) and total-failure (all Error becomes Error)
/// rules on top.
pub fn aggregate_scores(scores: &[Option<Score>]) -> OverallScore {
    if scores.is_empty() {
        return OverallScore::NotAvailable;
    }

    let mut total = 0.0;
    let mut errors = 0usize;
    for score in scores {
        let (value, is_error) = numeric(*score);
        total += value;
        if is_error {
            errors += 1;
        }
    }

    let mean = total / scores.len() as f64;
    let mut overall = OverallScore::from_band(mean.round() as i64);

    if overall == OverallScore::Good && errors > 0 {
        overall = OverallScore::Fair;
    }
    if errors == scores.len() {
        overall = OverallScore::Error;
    }
    overall
}

/// Aggregate a dimensions map, treating any of the four keys that is absent as Error.
pub fn aggregate(dimensions: &BTreeMap<DimensionKey, AnalysisResult>) -> OverallScore {
    let scores: Vec<Option<Score>> = DimensionKey::ALL
        .iter()
        .map(|key| dimensions.get(key).map(|result| result.score))
        .collect();
    aggregate_scores(&scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(scores: [Score; 4]) -> OverallScore {
        aggregate_scores(&scores.map(Some))
    }

    #[test]
    fn test_uniform_scores() {
        assert_eq!(all([Score::Good; 4]), OverallScore::Good);
        assert_eq!(all([Score::Fair; 4]), OverallScore::Fair);
        assert_eq!(all([Score::Poor; 4]), OverallScore::Poor);
    }

    #[test]
    fn test_single_error_dampens_good() {
        assert_eq!(
            all([Score::Good, Score::Good, Score::Good, Score::Error]),
            OverallScore::Fair
        );
    }

    #[test]
    fn test_all_errors_is_error() {
        assert_eq!(all([Score::Error; 4]), OverallScore::Error);
        assert_eq!(aggregate_scores(&[None, None, None, None]), OverallScore::Error);
    }

    #[test]
    fn test_partial_errors_average_as_fair() {
        assert_eq!(
            all([Score::Fair, Score::Fair, Score::Fair, Score::Error]),
            OverallScore::Fair
        );
        assert_eq!(
            all([Score::Poor, Score::Poor, Score::Poor, Score::Error]),
            OverallScore::Poor
        );
    }

    #[test]
    fn test_mean_rounding() {
        // 2.5 rounds up
        assert_eq!(
            all([Score::Good, Score::Good, Score::Fair, Score::Fair]),
            OverallScore::Good
        );
        // 2.25
        assert_eq!(
            all([Score::Good, Score::Fair, Score::Fair, Score::Fair]),
            OverallScore::Fair
        );
        // 1.5 rounds up
        assert_eq!(
            all([Score::Poor, Score::Poor, Score::Poor, Score::Good]),
            OverallScore::Fair
        );
        // 1.25
        assert_eq!(
            all([Score::Poor, Score::Poor, Score::Poor, Score::Fair]),
            OverallScore::Poor
        );
    }

    #[test]
    fn test_empty_is_not_available() {
        assert_eq!(aggregate_scores(&[]), OverallScore::NotAvailable);
    }

    #[test]
    fn test_missing_dimension_counts_as_error() {
        let mut dimensions = BTreeMap::new();
        for key in [
            DimensionKey::Readability,
            DimensionKey::Structure,
            DimensionKey::Completeness,
        ] {
            let mut result = AnalysisResult::error_default(key);
            result.score = Score::Good;
            dimensions.insert(key, result);
        }
        assert_eq!(aggregate(&dimensions), OverallScore::Fair);
        assert_eq!(aggregate(&BTreeMap::new()), OverallScore::Error);
    }

    #[test]
    fn test_serialized_labels() {
        assert_eq!(
            serde_json::to_value(OverallScore::NotAvailable).unwrap(),
            "N/A"
        );
        assert_eq!(OverallScore::parse("n/a"), Some(OverallScore::NotAvailable));
        assert_eq!(OverallScore::Good.to_string(), "Good");
    }
}
