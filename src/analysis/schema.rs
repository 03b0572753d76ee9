//! Strict decoding of untrusted oracle output.
//!
//! Each dimension has a [`Schema`] descriptor listing its required fields and
//! their container types. One generic validator walks the descriptor; any
//! missing key or wrong type rejects the whole payload.

use super::{
    AnalysisResult, DimensionDetail, DimensionKey, FlowNavigation, Score, StructureAnalysis,
    StructureCounts, StructureDetail, StyleAnalysis, StyleDetail,
};
use crate::llm::parse::parse_json_value;
use serde_json::{Map, Value};
use thiserror::Error;

/// Expected JSON shape of one field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    Integer,
    StringList,
    Object(&'static [Field]),
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Integer => "an integer",
            FieldKind::StringList => "an array of strings",
            FieldKind::Object(_) => "an object",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> Field {
    Field { name, kind }
}

const COUNTS_FIELDS: &[Field] = &[
    field("h1", FieldKind::Integer),
    field("h2", FieldKind::Integer),
    field("h3", FieldKind::Integer),
    field("paragraphs", FieldKind::Integer),
    field("lists", FieldKind::Integer),
];

const STRUCTURE_ANALYSIS_FIELDS: &[Field] = &[
    field("headings", FieldKind::String),
    field("paragraphs_lists", FieldKind::String),
];

const FLOW_FIELDS: &[Field] = &[field("assessment", FieldKind::String)];

const STYLE_ANALYSIS_FIELDS: &[Field] = &[
    field("voice_tone", FieldKind::String),
    field("clarity_conciseness", FieldKind::String),
    field("action_oriented_language", FieldKind::String),
];

const GENERAL_FIELDS: &[Field] = &[
    field("score", FieldKind::String),
    field("assessment", FieldKind::String),
    field("issues", FieldKind::StringList),
    field("suggestions", FieldKind::StringList),
];

const STRUCTURE_FIELDS: &[Field] = &[
    field("score", FieldKind::String),
    field("assessment", FieldKind::String),
    field("counts", FieldKind::Object(COUNTS_FIELDS)),
    field("analysis", FieldKind::Object(STRUCTURE_ANALYSIS_FIELDS)),
    field("flow_navigation", FieldKind::Object(FLOW_FIELDS)),
    field("issues", FieldKind::StringList),
    field("suggestions", FieldKind::StringList),
];

const STYLE_FIELDS: &[Field] = &[
    field("score", FieldKind::String),
    field("assessment", FieldKind::String),
    field("analysis", FieldKind::Object(STYLE_ANALYSIS_FIELDS)),
    field("issues", FieldKind::StringList),
    field("suggestions", FieldKind::StringList),
];

static READABILITY_SCHEMA: Schema = Schema {
    dimension: DimensionKey::Readability,
    fields: GENERAL_FIELDS,
};
static STRUCTURE_SCHEMA: Schema = Schema {
    dimension: DimensionKey::Structure,
    fields: STRUCTURE_FIELDS,
};
static COMPLETENESS_SCHEMA: Schema = Schema {
    dimension: DimensionKey::Completeness,
    fields: GENERAL_FIELDS,
};
static STYLE_SCHEMA: Schema = Schema {
    dimension: DimensionKey::Style,
    fields: STYLE_FIELDS,
};

/// Keys written by the typed serializer; never echoed from `extra`.
pub(crate) fn is_reserved_key(key: &str) -> bool {
    matches!(
        key,
        "score"
            | "assessment"
            | "issues"
            | "suggestions"
            | "counts"
            | "analysis"
            | "flow_navigation"
    )
}

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("{0}")]
    Parse(String),
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("missing required key '{0}'")]
    MissingField(String),
    #[error("'{field}' must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("'score' must be Good, Fair, Poor or Error (got '{0}')")]
    InvalidScore(String),
}

/// Result of decoding one oracle reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Valid(AnalysisResult),
    Invalid { reason: SchemaViolation, raw: String },
}

/// Output schema for one dimension.
#[derive(Debug)]
pub struct Schema {
    pub dimension: DimensionKey,
    pub fields: &'static [Field],
}

impl Schema {
    pub fn for_dimension(dimension: DimensionKey) -> &'static Schema {
        match dimension {
            DimensionKey::Readability => &READABILITY_SCHEMA,
            DimensionKey::Structure => &STRUCTURE_SCHEMA,
            DimensionKey::Completeness => &COMPLETENESS_SCHEMA,
            DimensionKey::Style => &STYLE_SCHEMA,
        }
    }

    /// Check presence and container type of every required field.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        let object = value.as_object().ok_or(SchemaViolation::NotAnObject)?;
        validate_fields(object, self.fields, "")
    }

    /// Validate, then build the typed result. The score label is normalized
    /// to its canonical spelling (see [`Score::parse`]).
    pub fn decode_value(&self, value: &Value) -> Result<AnalysisResult, SchemaViolation> {
        self.validate(value)?;
        let object = value.as_object().ok_or(SchemaViolation::NotAnObject)?;

        let raw_score = string_at(object, "score")?;
        let score = Score::parse(&raw_score).ok_or(SchemaViolation::InvalidScore(raw_score))?;

        let detail = match self.dimension {
            DimensionKey::Readability | DimensionKey::Completeness => DimensionDetail::General,
            DimensionKey::Structure => {
                let counts = object_at(object, "counts")?;
                let analysis = object_at(object, "analysis")?;
                let flow = object_at(object, "flow_navigation")?;
                DimensionDetail::Structure(StructureDetail {
                    counts: StructureCounts {
                        h1: integer_at(counts, "h1")?,
                        h2: integer_at(counts, "h2")?,
                        h3: integer_at(counts, "h3")?,
                        paragraphs: integer_at(counts, "paragraphs")?,
                        lists: integer_at(counts, "lists")?,
                    },
                    analysis: StructureAnalysis {
                        headings: string_at(analysis, "headings")?,
                        paragraphs_lists: string_at(analysis, "paragraphs_lists")?,
                    },
                    flow_navigation: FlowNavigation {
                        assessment: string_at(flow, "assessment")?,
                    },
                })
            }
            DimensionKey::Style => {
                let analysis = object_at(object, "analysis")?;
                DimensionDetail::Style(StyleDetail {
                    analysis: StyleAnalysis {
                        voice_tone: string_at(analysis, "voice_tone")?,
                        clarity_conciseness: string_at(analysis, "clarity_conciseness")?,
                        action_oriented_language: string_at(analysis, "action_oriented_language")?,
                    },
                })
            }
        };

        let extra = object
            .iter()
            .filter(|(key, _)| !is_reserved_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(AnalysisResult {
            score,
            assessment: string_at(object, "assessment")?,
            detail,
            issues: string_list_at(object, "issues")?,
            suggestions: string_list_at(object, "suggestions")?,
            extra,
        })
    }

    /// Decode raw oracle text (optionally fenced) into a typed result.
    pub fn decode_response(&self, raw: &str) -> Decoded {
        let outcome = parse_json_value(raw)
            .map_err(SchemaViolation::Parse)
            .and_then(|value| self.decode_value(&value));
        match outcome {
            Ok(result) => Decoded::Valid(result),
            Err(reason) => Decoded::Invalid {
                reason,
                raw: raw.to_string(),
            },
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn validate_fields(
    object: &Map<String, Value>,
    fields: &[Field],
    prefix: &str,
) -> Result<(), SchemaViolation> {
    for field in fields {
        let path = join_path(prefix, field.name);
        let value = object
            .get(field.name)
            .ok_or_else(|| SchemaViolation::MissingField(path.clone()))?;
        let matches = match field.kind {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.as_i64().is_some(),
            FieldKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldKind::Object(nested) => match value.as_object() {
                Some(inner) => {
                    validate_fields(inner, nested, &path)?;
                    true
                }
                None => false,
            },
        };
        if !matches {
            return Err(SchemaViolation::WrongType {
                field: path,
                expected: field.kind.describe(),
            });
        }
    }
    Ok(())
}

fn wrong_type(name: &str, expected: &'static str) -> SchemaViolation {
    SchemaViolation::WrongType {
        field: name.to_string(),
        expected,
    }
}

fn object_at<'a>(
    object: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a Map<String, Value>, SchemaViolation> {
    object
        .get(name)
        .ok_or_else(|| SchemaViolation::MissingField(name.to_string()))?
        .as_object()
        .ok_or_else(|| wrong_type(name, FieldKind::Object(&[]).describe()))
}

fn string_at(object: &Map<String, Value>, name: &str) -> Result<String, SchemaViolation> {
    object
        .get(name)
        .ok_or_else(|| SchemaViolation::MissingField(name.to_string()))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(name, FieldKind::String.describe()))
}

fn integer_at(object: &Map<String, Value>, name: &str) -> Result<i64, SchemaViolation> {
    object
        .get(name)
        .ok_or_else(|| SchemaViolation::MissingField(name.to_string()))?
        .as_i64()
        .ok_or_else(|| wrong_type(name, FieldKind::Integer.describe()))
}

fn string_list_at(object: &Map<String, Value>, name: &str) -> Result<Vec<String>, SchemaViolation> {
    let items = object
        .get(name)
        .ok_or_else(|| SchemaViolation::MissingField(name.to_string()))?
        .as_array()
        .ok_or_else(|| wrong_type(name, FieldKind::StringList.describe()))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type(name, FieldKind::StringList.describe()))
        })
        .collect()
}
