//! Suggestion-driven article revision.
//!
//! The engine folds every dimension's suggestions into one digest, asks the
//! oracle for a rewrite that keeps every hyperlink, and strips any fence the
//! oracle wraps around its answer. With no suggestions at all it returns the
//! original text untouched and never calls the oracle.

use crate::analysis::{AnalysisResult, DimensionKey};
use crate::llm::{prompts, unwrap_code_fence, CompletionGateway, CompletionOutcome};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Inputs for one revision. Lives only for the duration of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRequest {
    pub original_text: String,
    pub suggestions_by_dimension: BTreeMap<DimensionKey, Vec<String>>,
}

impl RevisionRequest {
    pub fn new(
        original_text: impl Into<String>,
        dimensions: &BTreeMap<DimensionKey, AnalysisResult>,
    ) -> Self {
        Self {
            original_text: original_text.into(),
            suggestions_by_dimension: dimensions
                .iter()
                .map(|(key, result)| (*key, result.suggestions.clone()))
                .collect(),
        }
    }

    /// Labeled suggestion blocks in canonical order. Dimensions without
    /// suggestions are left out; an empty string means nothing to apply.
    pub fn digest(&self) -> String {
        let blocks: Vec<String> = DimensionKey::ALL
            .iter()
            .filter_map(|key| {
                let suggestions = self.suggestions_by_dimension.get(key)?;
                if suggestions.is_empty() {
                    return None;
                }
                let mut block = format!("### {} Suggestions:\n", key.suggestion_label());
                for suggestion in suggestions {
                    block.push_str("- ");
                    block.push_str(suggestion);
                    block.push('\n');
                }
                Some(block)
            })
            .collect();
        blocks.join("\n").trim().to_string()
    }
}

/// A finished revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisedDocument {
    pub text: String,
}

/// Link targets present in one text but not the other, counted as multisets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCheck {
    pub missing: Vec<String>,
    pub added: Vec<String>,
}

impl LinkCheck {
    pub fn compare(original: &str, revised: &str) -> Self {
        let before = extract_links(original);
        let after = extract_links(revised);
        Self {
            missing: multiset_difference(&before, &after),
            added: multiset_difference(&after, &before),
        }
    }

    /// The revised text carries exactly the original link targets: none
    /// dropped, none introduced.
    pub fn is_preserved(&self) -> bool {
        self.missing.is_empty() && self.added.is_empty()
    }
}

fn multiset_difference(left: &[String], right: &[String]) -> Vec<String> {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for link in right {
        *available.entry(link.as_str()).or_default() += 1;
    }
    left.iter()
        .filter(|link| match available.get_mut(link.as_str()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .cloned()
        .collect()
}

fn link_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"(?is)\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)|<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#,
            )
            .ok()
        })
        .as_ref()
}

/// Hyperlink targets in order of appearance, from inline Markdown links and
/// HTML anchor tags.
pub fn extract_links(text: &str) -> Vec<String> {
    let Some(pattern) = link_pattern() else {
        return Vec::new();
    };
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drives the revision call through a [`CompletionGateway`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionEngine {
    /// Reject rewrites whose link targets differ from the original.
    pub verify_links: bool,
}

impl RevisionEngine {
    pub fn new(verify_links: bool) -> Self {
        Self { verify_links }
    }

    /// Revise `original` using every suggestion in `dimensions`.
    ///
    /// Returns `None` when the oracle fails or blocks, or when link
    /// verification is on and the link targets changed.
    pub async fn revise(
        &self,
        gateway: &CompletionGateway,
        original: &str,
        dimensions: &BTreeMap<DimensionKey, AnalysisResult>,
    ) -> Option<RevisedDocument> {
        self.revise_request(gateway, &RevisionRequest::new(original, dimensions))
            .await
    }

    pub async fn revise_request(
        &self,
        gateway: &CompletionGateway,
        request: &RevisionRequest,
    ) -> Option<RevisedDocument> {
        let digest = request.digest();
        if digest.is_empty() {
            tracing::info!("No suggestions to apply; keeping the original article");
            return Some(RevisedDocument {
                text: request.original_text.clone(),
            });
        }

        let prompt = prompts::revision_prompt(&digest, &request.original_text);
        tracing::info!("Requesting full article revision");
        let raw = match gateway.complete(&prompt, None).await {
            CompletionOutcome::Success(text) => text,
            failure => {
                tracing::error!(error = %failure.describe(), "Revision failed");
                return None;
            }
        };

        let text = unwrap_code_fence(&raw).to_string();

        if self.verify_links {
            let check = LinkCheck::compare(&request.original_text, &text);
            if !check.is_preserved() {
                tracing::warn!(
                    missing = check.missing.len(),
                    added = check.added.len(),
                    "Revision changed the original links; discarding it"
                );
                return None;
            }
        }

        tracing::info!(chars = text.chars().count(), "Revision completed");
        Some(RevisedDocument { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::gateway::testing::{Scripted, ScriptedOracle};
    use crate::llm::RetryPolicy;
    use std::sync::Arc;
    use std::time::Duration;

    const ORIGINAL: &str = "  Set up [the SDK](https://docs.example.com/sdk) first.\n\nThen see <a href=\"https://example.com/faq\">FAQ</a>.  ";

    fn dimensions(suggestions: &[(DimensionKey, &[&str])]) -> BTreeMap<DimensionKey, AnalysisResult> {
        DimensionKey::ALL
            .iter()
            .map(|key| {
                let mut result = AnalysisResult::error_default(*key);
                if let Some((_, items)) = suggestions.iter().find(|(k, _)| k == key) {
                    result.suggestions = items.iter().map(|s| s.to_string()).collect();
                }
                (*key, result)
            })
            .collect()
    }

    fn gateway(oracle: Arc<ScriptedOracle>) -> CompletionGateway {
        CompletionGateway::new(oracle, RetryPolicy::new(2, Duration::ZERO))
    }

    #[test]
    fn test_digest_labels_and_skips_empty_dimensions() {
        let request = RevisionRequest::new(
            ORIGINAL,
            &dimensions(&[
                (DimensionKey::Style, &["Use active voice"]),
                (DimensionKey::Readability, &["Define SDK", "Shorter sentences"]),
            ]),
        );
        assert_eq!(
            request.digest(),
            "### Readability Suggestions:\n- Define SDK\n- Shorter sentences\n\n\
             ### Style Guidelines Suggestions:\n- Use active voice"
        );
    }

    #[tokio::test]
    async fn test_no_suggestions_returns_original_without_oracle_call() {
        let oracle = Arc::new(ScriptedOracle::always(Scripted::Text("rewritten".into())));
        let revised = RevisionEngine::default()
            .revise(&gateway(oracle.clone()), ORIGINAL, &dimensions(&[]))
            .await
            .unwrap();
        assert_eq!(revised.text, ORIGINAL);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_blocked_oracle_yields_none() {
        let oracle = Arc::new(ScriptedOracle::always(Scripted::Blocked("SAFETY".into())));
        let revised = RevisionEngine::default()
            .revise(
                &gateway(oracle.clone()),
                ORIGINAL,
                &dimensions(&[(DimensionKey::Completeness, &["Add limits table"])]),
            )
            .await;
        assert!(revised.is_none());
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_none() {
        let oracle = Arc::new(ScriptedOracle::always(Scripted::Error("timeout".into())));
        let revised = RevisionEngine::default()
            .revise(
                &gateway(oracle.clone()),
                ORIGINAL,
                &dimensions(&[(DimensionKey::Structure, &["Add headings"])]),
            )
            .await;
        assert!(revised.is_none());
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_success_strips_fence_and_sends_self_contained_prompt() {
        let oracle = Arc::new(ScriptedOracle::always(Scripted::Text(
            "```text\nBetter [the SDK](https://docs.example.com/sdk).\n```".into(),
        )));
        let revised = RevisionEngine::default()
            .revise(
                &gateway(oracle.clone()),
                ORIGINAL,
                &dimensions(&[(DimensionKey::Readability, &["Define SDK"])]),
            )
            .await
            .unwrap();
        assert_eq!(revised.text, "Better [the SDK](https://docs.example.com/sdk).");

        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("- Define SDK"));
        assert!(prompt.contains(ORIGINAL));
        assert!(!prompt.contains("Article Content:"));
    }

    #[tokio::test]
    async fn test_link_verification_rejects_dropped_links() {
        let oracle = Arc::new(ScriptedOracle::always(Scripted::Text(
            "Set up [the SDK](https://docs.example.com/sdk) first.".into(),
        )));
        let suggestions = dimensions(&[(DimensionKey::Readability, &["Define SDK"])]);

        let lenient = RevisionEngine::new(false)
            .revise(&gateway(oracle.clone()), ORIGINAL, &suggestions)
            .await;
        assert!(lenient.is_some());

        let strict = RevisionEngine::new(true)
            .revise(&gateway(oracle), ORIGINAL, &suggestions)
            .await;
        assert!(strict.is_none());
    }

    #[tokio::test]
    async fn test_link_verification_rejects_added_links() {
        let original = "See [a](https://a.io).";
        let oracle = Arc::new(ScriptedOracle::always(Scripted::Text(
            "See [a](https://a.io) and [more](https://other.io).".into(),
        )));
        let suggestions = dimensions(&[(DimensionKey::Completeness, &["Point to more resources"])]);

        let strict = RevisionEngine::new(true)
            .revise(&gateway(oracle.clone()), original, &suggestions)
            .await;
        assert!(strict.is_none());

        let lenient = RevisionEngine::new(false)
            .revise(&gateway(oracle), original, &suggestions)
            .await;
        assert!(lenient.is_some());
    }

    #[test]
    fn test_extract_links() {
        assert_eq!(
            extract_links(ORIGINAL),
            vec![
                "https://docs.example.com/sdk".to_string(),
                "https://example.com/faq".to_string()
            ]
        );
        assert_eq!(
            extract_links("[a](<https://x.io/a>) [t](https://x.io/t \"Title\")"),
            vec!["https://x.io/a".to_string(), "https://x.io/t".to_string()]
        );
        assert!(extract_links("no links here").is_empty());
    }

    #[test]
    fn test_link_check_counts_duplicates() {
        let original = "[a](https://x.io) and [again](https://x.io)";
        let check = LinkCheck::compare(original, "[a](https://x.io) and [b](https://y.io)");
        assert_eq!(check.missing, vec!["https://x.io".to_string()]);
        assert_eq!(check.added, vec!["https://y.io".to_string()]);
        assert!(!check.is_preserved());
        assert!(LinkCheck::compare(original, original).is_preserved());

        let only_added = LinkCheck::compare("[a](https://x.io)", "[a](https://x.io) [b](https://y.io)");
        assert!(only_added.missing.is_empty());
        assert!(!only_added.is_preserved());
    }
}
