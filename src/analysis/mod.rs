//! The four analysis dimensions and the stage that evaluates each one.
//!
//! A stage prompts the oracle through the [`CompletionGateway`], then runs the
//! reply through the strict schema decoder in [`schema`]. Whatever goes wrong,
//! a stage always hands back a structurally valid [`AnalysisResult`]: failures
//! become the dimension's default Error record.

pub mod schema;

#[cfg(test)]
mod tests;

use crate::llm::prompts;
use crate::llm::{CompletionGateway, CompletionOutcome};
use crate::util::truncate;
use schema::{Decoded, Schema};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Placeholder for sub-assessments of a failed dimension
pub const NOT_AVAILABLE: &str = "N/A";

/// The fixed, closed set of evaluation axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DimensionKey {
    Readability,
    Structure,
    Completeness,
    Style,
}

impl DimensionKey {
    /// Canonical report order.
    pub const ALL: [DimensionKey; 4] = [
        DimensionKey::Readability,
        DimensionKey::Structure,
        DimensionKey::Completeness,
        DimensionKey::Style,
    ];

    /// Key used in structured reports.
    pub fn key(&self) -> &'static str {
        match self {
            DimensionKey::Readability => "readability",
            DimensionKey::Structure => "structure",
            DimensionKey::Completeness => "completeness",
            DimensionKey::Style => "style_guidelines",
        }
    }

    /// Section title used in narrative reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            DimensionKey::Readability => "Readability",
            DimensionKey::Structure => "Structure",
            DimensionKey::Completeness => "Completeness",
            DimensionKey::Style => "Style",
        }
    }

    /// Label for this dimension's block in the revision digest.
    pub fn suggestion_label(&self) -> &'static str {
        match self {
            DimensionKey::Style => "Style Guidelines",
            other => other.display_name(),
        }
    }

    pub fn stage(&self) -> Stage {
        Stage::for_dimension(*self)
    }
}

impl std::fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Per-dimension verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Score {
    Good,
    Fair,
    Poor,
    Error,
}

impl Score {
    pub fn as_str(&self) -> &'static str {
        match self {
            Score::Good => "Good",
            Score::Fair => "Fair",
            Score::Poor => "Poor",
            Score::Error => "Error",
        }
    }

    /// Parse a score label case-insensitively. Anything outside the four
    /// labels is rejected rather than guessed.
    ///
    /// The label is normalized: `"good"` parses to [`Score::Good`] and
    /// serializes back as `"Good"`, so a payload that spells a score in
    /// another case does not re-serialize byte for byte. Every other field of
    /// a valid payload round-trips unchanged.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "good" => Some(Score::Good),
            "fair" => Some(Score::Fair),
            "poor" => Some(Score::Poor),
            "error" => Some(Score::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Element counts reported by the structure stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StructureCounts {
    pub h1: i64,
    pub h2: i64,
    pub h3: i64,
    pub paragraphs: i64,
    pub lists: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureAnalysis {
    pub headings: String,
    pub paragraphs_lists: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowNavigation {
    pub assessment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureDetail {
    pub counts: StructureCounts,
    pub analysis: StructureAnalysis,
    pub flow_navigation: FlowNavigation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleAnalysis {
    pub voice_tone: String,
    pub clarity_conciseness: String,
    pub action_oriented_language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDetail {
    pub analysis: StyleAnalysis,
}

/// Fields that only some dimensions carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionDetail {
    /// Readability and Completeness carry only the common fields.
    General,
    Structure(StructureDetail),
    Style(StyleDetail),
}

impl DimensionDetail {
    /// The placeholder detail used by a dimension's default Error record.
    pub fn placeholder(dimension: DimensionKey) -> Self {
        match dimension {
            DimensionKey::Readability | DimensionKey::Completeness => DimensionDetail::General,
            DimensionKey::Structure => DimensionDetail::Structure(StructureDetail {
                counts: StructureCounts::default(),
                analysis: StructureAnalysis {
                    headings: NOT_AVAILABLE.to_string(),
                    paragraphs_lists: NOT_AVAILABLE.to_string(),
                },
                flow_navigation: FlowNavigation {
                    assessment: NOT_AVAILABLE.to_string(),
                },
            }),
            DimensionKey::Style => DimensionDetail::Style(StyleDetail {
                analysis: StyleAnalysis {
                    voice_tone: NOT_AVAILABLE.to_string(),
                    clarity_conciseness: NOT_AVAILABLE.to_string(),
                    action_oriented_language: NOT_AVAILABLE.to_string(),
                },
            }),
        }
    }
}

/// Typed outcome of one dimension's analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub score: Score,
    pub assessment: String,
    pub detail: DimensionDetail,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    /// Top-level keys the oracle returned beyond the schema, kept verbatim.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisResult {
    /// The dimension's default Error record, with empty issues and suggestions.
    pub fn error_default(dimension: DimensionKey) -> Self {
        Self {
            score: Score::Error,
            assessment: format!("{} analysis failed.", dimension.display_name()),
            detail: DimensionDetail::placeholder(dimension),
            issues: Vec::new(),
            suggestions: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Default Error record explaining what went wrong.
    pub fn failed(dimension: DimensionKey, issue: impl Into<String>) -> Self {
        let mut result = Self::error_default(dimension);
        result.issues.push(issue.into());
        result
    }

    pub fn is_error(&self) -> bool {
        self.score == Score::Error
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("score", &self.score)?;
        map.serialize_entry("assessment", &self.assessment)?;
        match &self.detail {
            DimensionDetail::General => {}
            DimensionDetail::Structure(detail) => {
                map.serialize_entry("counts", &detail.counts)?;
                map.serialize_entry("analysis", &detail.analysis)?;
                map.serialize_entry("flow_navigation", &detail.flow_navigation)?;
            }
            DimensionDetail::Style(detail) => {
                map.serialize_entry("analysis", &detail.analysis)?;
            }
        }
        map.serialize_entry("issues", &self.issues)?;
        map.serialize_entry("suggestions", &self.suggestions)?;
        for (key, value) in &self.extra {
            if !schema::is_reserved_key(key) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// One analysis stage: a prompt template paired with an output schema.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub dimension: DimensionKey,
    pub prompt_template: &'static str,
    pub schema: &'static Schema,
}

impl Stage {
    pub fn for_dimension(dimension: DimensionKey) -> Self {
        let prompt_template = match dimension {
            DimensionKey::Readability => prompts::READABILITY_PROMPT,
            DimensionKey::Structure => prompts::STRUCTURE_PROMPT,
            DimensionKey::Completeness => prompts::COMPLETENESS_PROMPT,
            DimensionKey::Style => prompts::STYLE_PROMPT,
        };
        Self {
            dimension,
            prompt_template,
            schema: Schema::for_dimension(dimension),
        }
    }

    /// Evaluate `document` along this stage's dimension. Never fails: oracle
    /// and validation failures come back as the default Error record.
    pub async fn analyze(&self, gateway: &CompletionGateway, document: &str) -> AnalysisResult {
        let dimension = self.dimension;
        tracing::info!(dimension = dimension.key(), "Starting analysis");

        let prompt = prompts::analysis_prompt(self.prompt_template);
        let raw = match gateway.complete(&prompt, Some(document)).await {
            CompletionOutcome::Success(text) => text,
            failure => {
                let description = failure.describe();
                tracing::error!(
                    dimension = dimension.key(),
                    error = %description,
                    "Analysis failed at the oracle"
                );
                return AnalysisResult::failed(
                    dimension,
                    format!("LLM analysis failed: {}", description),
                );
            }
        };

        match self.schema.decode_response(&raw) {
            Decoded::Valid(result) => {
                tracing::info!(
                    dimension = dimension.key(),
                    score = result.score.as_str(),
                    issues = result.issues.len(),
                    suggestions = result.suggestions.len(),
                    "Analysis completed"
                );
                result
            }
            Decoded::Invalid { reason, raw } => {
                tracing::warn!(
                    dimension = dimension.key(),
                    reason = %reason,
                    preview = %truncate(&raw, 200),
                    "Oracle response failed validation"
                );
                let mut result = AnalysisResult::failed(
                    dimension,
                    format!("Failed to parse/validate LLM response: {}", reason),
                );
                result.suggestions.push(format!("Raw LLM response: {}", raw));
                result
            }
        }
    }
}

/// Analyze one dimension.
pub async fn analyze_dimension(
    gateway: &CompletionGateway,
    dimension: DimensionKey,
    document: &str,
) -> AnalysisResult {
    dimension.stage().analyze(gateway, document).await
}

/// Run all four stages concurrently. The result always holds exactly the four keys.
pub async fn analyze_all(
    gateway: &CompletionGateway,
    document: &str,
) -> BTreeMap<DimensionKey, AnalysisResult> {
    let results = futures::future::join_all(
        DimensionKey::ALL
            .iter()
            .map(|dimension| analyze_dimension(gateway, *dimension, document)),
    )
    .await;

    DimensionKey::ALL.into_iter().zip(results).collect()
}
