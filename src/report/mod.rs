//! Report rendering.
//!
//! [`AnalysisReport::render`] is a pure projection into either a structured
//! JSON document or a narrative Markdown document. Neither path can fail: a
//! serialization error degrades into a fallback JSON payload.

pub mod store;

pub use store::{ReportStore, SavedPaths};

use crate::analysis::schema::{Schema, SchemaViolation};
use crate::analysis::{AnalysisResult, DimensionDetail, DimensionKey};
use crate::score::{aggregate, OverallScore};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

const EMPTY_LIST_MARKER: &str = "- None";
const SECTION_RULE: &str = "---";

/// Output representation for [`AnalysisReport::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Structured,
    Narrative,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Structured => "json",
            ReportFormat::Narrative => "md",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Some(ReportFormat::Structured),
            "md" | "markdown" | "narrative" => Some(ReportFormat::Narrative),
            _ => None,
        }
    }
}

/// Why a saved structured report could not be loaded.
#[derive(Debug, Error)]
pub enum ReportDecodeError {
    #[error("report is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("report is not a JSON object")]
    NotAnObject,
    #[error("report is missing '{0}'")]
    MissingField(&'static str),
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
    #[error("invalid overall score '{0}'")]
    OverallScore(String),
}

/// Aggregated analysis of one article.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub source_url: String,
    pub generated_at: DateTime<Utc>,
    pub overall_score: OverallScore,
    pub dimensions: BTreeMap<DimensionKey, AnalysisResult>,
}

impl AnalysisReport {
    /// Build a report, filling any missing dimension with its default Error
    /// record and computing the overall score.
    pub fn new(
        source_url: impl Into<String>,
        mut dimensions: BTreeMap<DimensionKey, AnalysisResult>,
    ) -> Self {
        for key in DimensionKey::ALL {
            dimensions.entry(key).or_insert_with(|| missing_dimension(key));
        }
        let overall_score = aggregate(&dimensions);
        Self {
            source_url: source_url.into(),
            generated_at: Utc::now(),
            overall_score,
            dimensions,
        }
    }

    /// All four dimensions in canonical order, defaults standing in for gaps.
    pub fn complete_dimensions(&self) -> Vec<(DimensionKey, AnalysisResult)> {
        DimensionKey::ALL
            .iter()
            .map(|key| {
                let result = self
                    .dimensions
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| missing_dimension(*key));
                (*key, result)
            })
            .collect()
    }

    /// Overall score over the four dimensions as they stand now. Missing
    /// dimensions count as Error, so a gap can never leave a stale Good.
    pub fn current_overall_score(&self) -> OverallScore {
        aggregate(&self.dimensions)
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Structured => self.render_structured(),
            ReportFormat::Narrative => self.render_narrative(),
        }
    }

    fn render_structured(&self) -> String {
        let dimensions = self.complete_dimensions();
        let view = StructuredView {
            source_url: &self.source_url,
            generated_at: self.generated_at.to_rfc3339(),
            overall_score: self.current_overall_score(),
            dimensions: CanonicalDimensions(&dimensions),
        };
        match serde_json::to_string_pretty(&view) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(url = %self.source_url, error = %e, "Failed to serialize report");
                self.fallback_structured(&e.to_string())
            }
        }
    }

    fn fallback_structured(&self, error: &str) -> String {
        let mut dimensions = Map::new();
        for key in DimensionKey::ALL {
            let value = serde_json::to_value(AnalysisResult::error_default(key))
                .unwrap_or_else(|_| json!({ "score": "Error" }));
            dimensions.insert(key.key().to_string(), value);
        }
        let payload = json!({
            "source_url": self.source_url,
            "generated_at": self.generated_at.to_rfc3339(),
            "overall_score": OverallScore::Error.as_str(),
            "dimensions": dimensions,
            "error_details": format!("Failed to generate JSON report: {}", error),
        });
        format!("{:#}", payload)
    }

    fn render_narrative(&self) -> String {
        let mut out = String::new();
        out.push_str("# Documentation Analysis Report\n\n");
        let _ = writeln!(out, "**Analyzed URL:** {}", self.source_url);
        let _ = writeln!(
            out,
            "**Analysis Timestamp:** {}\n",
            self.generated_at.to_rfc3339()
        );
        let _ = writeln!(out, "**Overall Score:** {}\n", self.current_overall_score());
        let _ = writeln!(out, "{}\n", SECTION_RULE);

        for key in DimensionKey::ALL {
            let _ = writeln!(out, "## {} Analysis\n", key.display_name());
            match self.dimensions.get(&key) {
                Some(result) => render_section(&mut out, result),
                None => {
                    tracing::warn!(dimension = key.key(), "Dimension missing from narrative report");
                    out.push_str("*Analysis data for this section is missing or malformed.*\n\n");
                }
            }
            let _ = writeln!(out, "{}\n", SECTION_RULE);
        }
        out
    }

    /// Load a report previously rendered as [`ReportFormat::Structured`].
    ///
    /// Also accepts the older `url` / `timestamp` / `analysis` key names.
    /// Missing or malformed dimensions become default Error records.
    pub fn from_structured_json(text: &str) -> Result<Self, ReportDecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(ReportDecodeError::NotAnObject)?;

        let source_url = lookup(object, &["source_url", "url"])
            .and_then(Value::as_str)
            .ok_or(ReportDecodeError::MissingField("source_url"))?
            .to_string();

        let generated_at = match lookup(object, &["generated_at", "timestamp"]) {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| ReportDecodeError::Timestamp(raw.clone()))?,
            Some(other) => return Err(ReportDecodeError::Timestamp(other.to_string())),
            None => return Err(ReportDecodeError::MissingField("generated_at")),
        };

        let sections = lookup(object, &["dimensions", "analysis"])
            .and_then(Value::as_object)
            .ok_or(ReportDecodeError::MissingField("dimensions"))?;

        let mut dimensions = BTreeMap::new();
        for key in DimensionKey::ALL {
            let section = sections
                .get(key.key())
                .or_else(|| sections.get(key.display_name()));
            let result = match section {
                Some(section) => match Schema::for_dimension(key).decode_value(section) {
                    Ok(result) => result,
                    Err(violation) => {
                        tracing::warn!(dimension = key.key(), reason = %violation, "Saved dimension is malformed");
                        malformed_dimension(key, &violation)
                    }
                },
                None => missing_dimension(key),
            };
            dimensions.insert(key, result);
        }

        let overall_score = match lookup(object, &["overall_score"]).and_then(Value::as_str) {
            Some(raw) => OverallScore::parse(raw)
                .ok_or_else(|| ReportDecodeError::OverallScore(raw.to_string()))?,
            None => aggregate(&dimensions),
        };

        Ok(Self {
            source_url,
            generated_at,
            overall_score,
            dimensions,
        })
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

/// Default Error record for a dimension absent from the input.
fn missing_dimension(key: DimensionKey) -> AnalysisResult {
    AnalysisResult::failed(
        key,
        format!(
            "Analysis data for {} missing or not a dictionary.",
            key.display_name()
        ),
    )
}

fn malformed_dimension(key: DimensionKey, violation: &SchemaViolation) -> AnalysisResult {
    AnalysisResult::failed(
        key,
        format!("Saved {} analysis is malformed: {}", key.display_name(), violation),
    )
}

fn render_section(out: &mut String, result: &AnalysisResult) {
    let _ = writeln!(out, "**Score:** {}", result.score);
    let _ = writeln!(out, "**Assessment:** {}\n", result.assessment);

    match &result.detail {
        DimensionDetail::General => {}
        DimensionDetail::Structure(detail) => {
            let counts = &detail.counts;
            out.push_str("**Counts:**\n");
            let _ = writeln!(out, "  - H1: {}", counts.h1);
            let _ = writeln!(out, "  - H2: {}", counts.h2);
            let _ = writeln!(out, "  - H3: {}", counts.h3);
            let _ = writeln!(out, "  - Paragraphs: {}", counts.paragraphs);
            let _ = writeln!(out, "  - Lists: {}\n", counts.lists);
            out.push_str("**Sub-Analysis:**\n");
            let _ = writeln!(out, "  - Headings: {}", detail.analysis.headings);
            let _ = writeln!(
                out,
                "  - Paragraphs/Lists: {}\n",
                detail.analysis.paragraphs_lists
            );
            let _ = writeln!(
                out,
                "**Flow & Navigation Assessment:** {}\n",
                detail.flow_navigation.assessment
            );
        }
        DimensionDetail::Style(detail) => {
            let analysis = &detail.analysis;
            out.push_str("**Sub-Analysis:**\n");
            let _ = writeln!(out, "  - Voice & Tone: {}", analysis.voice_tone);
            let _ = writeln!(
                out,
                "  - Clarity & Conciseness: {}",
                analysis.clarity_conciseness
            );
            let _ = writeln!(
                out,
                "  - Action-Oriented Language: {}\n",
                analysis.action_oriented_language
            );
        }
    }

    out.push_str("**Issues Found:**\n");
    render_list(out, &result.issues);
    out.push_str("**Suggestions:**\n");
    render_list(out, &result.suggestions);
}

fn render_list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        let _ = writeln!(out, "{}", EMPTY_LIST_MARKER);
    } else {
        for item in items {
            let _ = writeln!(out, "- {}", item);
        }
    }
    out.push('\n');
}

#[derive(Serialize)]
struct StructuredView<'a> {
    source_url: &'a str,
    generated_at: String,
    overall_score: OverallScore,
    dimensions: CanonicalDimensions<'a>,
}

/// Dimensions keyed by their structured names, in canonical order.
struct CanonicalDimensions<'a>(&'a [(DimensionKey, AnalysisResult)]);

impl Serialize for CanonicalDimensions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, result) in self.0 {
            map.serialize_entry(key.key(), result)?;
        }
        map.end()
    }
}
