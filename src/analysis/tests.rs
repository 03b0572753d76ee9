use super::schema::{Decoded, Schema, SchemaViolation};
use super::*;
use crate::llm::gateway::testing::{RoutingOracle, Scripted, ScriptedOracle};
use crate::llm::RetryPolicy;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn single_attempt(oracle: Arc<dyn crate::llm::CompletionOracle>) -> CompletionGateway {
    CompletionGateway::new(oracle, RetryPolicy::new(1, Duration::ZERO))
}

fn readability_payload() -> Value {
    json!({
        "score": "Fair",
        "assessment": "Mostly clear, some jargon.",
        "issues": ["'idempotent' is unexplained"],
        "suggestions": ["Define 'idempotent' in plain words"]
    })
}

fn completeness_payload() -> Value {
    json!({
        "score": "Poor",
        "assessment": "Key limits are missing.",
        "issues": ["No rate limits listed"],
        "suggestions": ["Add a table of limits"]
    })
}

fn structure_payload() -> Value {
    json!({
        "score": "Good",
        "assessment": "Well organised.",
        "counts": {"h1": 1, "h2": 4, "h3": 2, "paragraphs": 12, "lists": 3},
        "analysis": {
            "headings": "Descriptive and nested correctly.",
            "paragraphs_lists": "Short paragraphs, steps in lists."
        },
        "flow_navigation": {"assessment": "Moves from setup to usage."},
        "issues": [],
        "suggestions": ["Add a summary at the top"]
    })
}

fn style_payload() -> Value {
    json!({
        "score": "Fair",
        "assessment": "Helpful but passive in places.",
        "analysis": {
            "voice_tone": "Friendly.",
            "clarity_conciseness": "Some wordy sentences.",
            "action_oriented_language": "Steps could start with verbs."
        },
        "issues": ["Passive voice in step 3"],
        "suggestions": ["Rephrase step 3 in the active voice"]
    })
}

fn payload_for(dimension: DimensionKey) -> Value {
    match dimension {
        DimensionKey::Readability => readability_payload(),
        DimensionKey::Structure => structure_payload(),
        DimensionKey::Completeness => completeness_payload(),
        DimensionKey::Style => style_payload(),
    }
}

/// Which stage a prompt belongs to, judged by text unique to each template.
fn dimension_of(prompt: &str) -> DimensionKey {
    if prompt.contains("non-technical business user") {
        DimensionKey::Readability
    } else if prompt.contains("flow_navigation") {
        DimensionKey::Structure
    } else if prompt.contains("quality of its examples") {
        DimensionKey::Completeness
    } else {
        DimensionKey::Style
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_valid_payload_reserializes_unchanged() {
    for dimension in DimensionKey::ALL {
        let input = payload_for(dimension);
        let decoded = Schema::for_dimension(dimension)
            .decode_value(&input)
            .unwrap_or_else(|e| panic!("{} rejected: {}", dimension, e));
        assert_eq!(serde_json::to_value(&decoded).unwrap(), input, "{}", dimension);
    }
}

#[test]
fn test_extra_top_level_keys_are_kept() {
    let mut input = readability_payload();
    input["confidence"] = json!(0.8);
    let decoded = Schema::for_dimension(DimensionKey::Readability)
        .decode_value(&input)
        .unwrap();
    assert_eq!(decoded.extra.get("confidence"), Some(&json!(0.8)));
    assert_eq!(serde_json::to_value(&decoded).unwrap(), input);
}

#[test]
fn test_missing_nested_key_names_dotted_path() {
    let mut input = structure_payload();
    input["counts"].as_object_mut().unwrap().remove("lists");
    let err = Schema::for_dimension(DimensionKey::Structure)
        .decode_value(&input)
        .unwrap_err();
    assert_eq!(err, SchemaViolation::MissingField("counts.lists".to_string()));
}

#[test]
fn test_wrong_container_types_are_rejected() {
    let schema = Schema::for_dimension(DimensionKey::Readability);

    let mut issues_as_string = readability_payload();
    issues_as_string["issues"] = json!("just one issue");
    assert!(matches!(
        schema.decode_value(&issues_as_string),
        Err(SchemaViolation::WrongType { ref field, .. }) if field == "issues"
    ));

    let mut numeric_suggestion = readability_payload();
    numeric_suggestion["suggestions"] = json!(["ok", 3]);
    assert!(schema.decode_value(&numeric_suggestion).is_err());

    let mut fractional_count = structure_payload();
    fractional_count["counts"]["h2"] = json!(2.5);
    assert!(Schema::for_dimension(DimensionKey::Structure)
        .decode_value(&fractional_count)
        .is_err());

    assert_eq!(
        schema.decode_value(&json!(["not", "an", "object"])),
        Err(SchemaViolation::NotAnObject)
    );
}

#[test]
fn test_style_requires_its_analysis_block() {
    let mut input = style_payload();
    input.as_object_mut().unwrap().remove("analysis");
    assert_eq!(
        Schema::for_dimension(DimensionKey::Style).decode_value(&input),
        Err(SchemaViolation::MissingField("analysis".to_string()))
    );
}

#[test]
fn test_score_labels() {
    let schema = Schema::for_dimension(DimensionKey::Completeness);

    let mut lowercase = completeness_payload();
    lowercase["score"] = json!("good");
    let decoded = schema.decode_value(&lowercase).unwrap();
    assert_eq!(decoded.score, Score::Good);
    let reserialized = serde_json::to_value(&decoded).unwrap();
    assert_eq!(reserialized["score"], "Good");
    assert_eq!(reserialized["issues"], lowercase["issues"]);

    let mut unknown = completeness_payload();
    unknown["score"] = json!("Excellent");
    assert_eq!(
        schema.decode_value(&unknown),
        Err(SchemaViolation::InvalidScore("Excellent".to_string()))
    );
}

#[test]
fn test_decode_response_accepts_fenced_json() {
    let raw = format!("```json\n{}\n```", readability_payload());
    match Schema::for_dimension(DimensionKey::Readability).decode_response(&raw) {
        Decoded::Valid(result) => assert_eq!(result.score, Score::Fair),
        Decoded::Invalid { reason, .. } => panic!("rejected: {}", reason),
    }
}

#[test]
fn test_decode_response_keeps_raw_text_on_parse_failure() {
    let raw = "Sure! Here is my analysis: it is good.";
    match Schema::for_dimension(DimensionKey::Readability).decode_response(raw) {
        Decoded::Invalid { reason, raw: kept } => {
            assert!(matches!(reason, SchemaViolation::Parse(_)));
            assert_eq!(kept, raw);
        }
        Decoded::Valid(_) => panic!("prose must not validate"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_error_defaults_carry_placeholders() {
    let structure = serde_json::to_value(AnalysisResult::error_default(DimensionKey::Structure))
        .unwrap();
    assert_eq!(structure["score"], "Error");
    assert_eq!(structure["assessment"], "Structure analysis failed.");
    assert_eq!(
        structure["counts"],
        json!({"h1": 0, "h2": 0, "h3": 0, "paragraphs": 0, "lists": 0})
    );
    assert_eq!(structure["flow_navigation"]["assessment"], NOT_AVAILABLE);
    assert_eq!(structure["issues"], json!([]));

    let style = serde_json::to_value(AnalysisResult::error_default(DimensionKey::Style)).unwrap();
    assert_eq!(style["analysis"]["voice_tone"], NOT_AVAILABLE);
    assert!(style.get("counts").is_none());

    let readability =
        serde_json::to_value(AnalysisResult::error_default(DimensionKey::Readability)).unwrap();
    assert!(readability.get("analysis").is_none());
}

#[test]
fn test_dimension_keys() {
    assert_eq!(DimensionKey::Style.key(), "style_guidelines");
    assert_eq!(DimensionKey::Style.suggestion_label(), "Style Guidelines");
    assert_eq!(DimensionKey::Style.stage().dimension, DimensionKey::Style);
    assert_eq!(
        DimensionKey::ALL.map(|key| key.key()),
        ["readability", "structure", "completeness", "style_guidelines"]
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGES
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_stage_returns_validated_result() {
    let oracle = Arc::new(ScriptedOracle::always(Scripted::Text(
        structure_payload().to_string(),
    )));
    let gateway = single_attempt(oracle.clone());
    let result = analyze_dimension(&gateway, DimensionKey::Structure, "# Title\nBody").await;

    assert_eq!(result.score, Score::Good);
    match &result.detail {
        DimensionDetail::Structure(detail) => assert_eq!(detail.counts.h2, 4),
        other => panic!("unexpected detail {:?}", other),
    }
    let prompt = &oracle.prompts()[0];
    assert!(prompt.contains("Article Content:\n# Title\nBody"));
}

#[tokio::test]
async fn test_malformed_reply_becomes_error_default_with_raw_text() {
    let raw = "{\"score\": \"Good\", \"assessment\": \"fine\"}";
    let oracle = Arc::new(ScriptedOracle::always(Scripted::Text(raw.to_string())));
    let gateway = single_attempt(oracle);
    let result = analyze_dimension(&gateway, DimensionKey::Readability, "doc").await;

    assert!(result.is_error());
    assert_eq!(result.assessment, "Readability analysis failed.");
    assert_eq!(result.issues.len(), 1);
    assert!(result.issues[0].starts_with("Failed to parse/validate LLM response:"));
    assert!(result.issues[0].contains("issues"));
    assert_eq!(result.suggestions, vec![format!("Raw LLM response: {}", raw)]);
}

#[tokio::test]
async fn test_blocked_reply_is_reported_in_issues() {
    let oracle = Arc::new(ScriptedOracle::always(Scripted::Blocked(
        "content_filter".into(),
    )));
    let gateway = single_attempt(oracle);
    let result = analyze_dimension(&gateway, DimensionKey::Style, "doc").await;

    assert!(result.is_error());
    assert_eq!(
        result.issues,
        vec!["LLM analysis failed: Analysis blocked by API. Reason: content_filter".to_string()]
    );
    assert!(result.suggestions.is_empty());
    assert!(matches!(result.detail, DimensionDetail::Style(_)));
}

#[tokio::test]
async fn test_unavailable_gateway_yields_error_results() {
    let gateway = CompletionGateway::unavailable("no API key");
    let results = analyze_all(&gateway, "doc").await;
    assert_eq!(results.len(), 4);
    for (dimension, result) in &results {
        assert!(result.is_error(), "{}", dimension);
        assert!(result.issues[0].starts_with("LLM analysis failed:"));
    }
}

#[tokio::test]
async fn test_analyze_all_routes_each_stage() {
    let oracle = Arc::new(RoutingOracle::new(|prompt: &str| {
        Scripted::Text(payload_for(dimension_of(prompt)).to_string())
    }));
    let gateway = single_attempt(oracle.clone());
    let results = analyze_all(&gateway, "A short article.").await;

    assert_eq!(oracle.calls(), 4);
    assert_eq!(
        results.keys().copied().collect::<Vec<_>>(),
        DimensionKey::ALL.to_vec()
    );
    assert_eq!(results[&DimensionKey::Readability].score, Score::Fair);
    assert_eq!(results[&DimensionKey::Structure].score, Score::Good);
    assert_eq!(results[&DimensionKey::Completeness].score, Score::Poor);
    assert_eq!(results[&DimensionKey::Style].score, Score::Fair);
}

#[tokio::test]
async fn test_one_failing_stage_does_not_affect_others() {
    let oracle = Arc::new(RoutingOracle::new(|prompt: &str| {
        match dimension_of(prompt) {
            DimensionKey::Completeness => Scripted::Error("HTTP 503".into()),
            other => Scripted::Text(payload_for(other).to_string()),
        }
    }));
    let gateway = single_attempt(oracle);
    let results = analyze_all(&gateway, "doc").await;

    assert!(results[&DimensionKey::Completeness].is_error());
    assert!(results[&DimensionKey::Completeness].issues[0].contains("HTTP 503"));
    assert!(!results[&DimensionKey::Readability].is_error());
    assert!(!results[&DimensionKey::Style].is_error());
}
