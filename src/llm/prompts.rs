// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Output contract shared by every analysis prompt.
const JSON_ONLY_RULES: &str = r#"OUTPUT RULES:
- Respond with a single JSON object and nothing else.
- No surrounding prose, no Markdown fences.
- "score" must be exactly one of "Good", "Fair" or "Poor".
- "issues" and "suggestions" are arrays of strings (use [] when there are none).
- Suggestions must be concrete and actionable."#;

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

pub const READABILITY_PROMPT: &str = r#"Analyze the following documentation article strictly from the perspective of a non-technical business user (for example a marketer).

ASSESS:
1. Clarity: is the language clear, simple and free of unnecessary technical jargon?
2. Engagement: is the text easy to follow for this audience?
3. Understanding: can this audience grasp the core concepts and benefits?

OUTPUT (JSON object only):
{
  "score": "Good|Fair|Poor",
  "assessment": "1-2 sentences on why the article is or isn't readable for this audience",
  "issues": ["specific sentence, phrase or section that is too technical, unclear or disengaging"],
  "suggestions": ["concrete rephrasing or simplification"]
}
"#;

pub const STRUCTURE_PROMPT: &str = r#"Analyze the structure and logical flow of the following documentation article.

ASSESS:
1. Counts: number of H1, H2 and H3 headings, paragraphs, and lists (bulleted or numbered).
2. Structure: effectiveness of headings, paragraph length and list usage.
3. Flow and navigability: does information progress logically, and is it easy to scan?

OUTPUT (JSON object only):
{
  "score": "Good|Fair|Poor",
  "assessment": "1-2 sentence overall assessment of structure and flow",
  "counts": {"h1": 0, "h2": 0, "h3": 0, "paragraphs": 0, "lists": 0},
  "analysis": {
    "headings": "how well headings are used",
    "paragraphs_lists": "paragraph length and list usage"
  },
  "flow_navigation": {"assessment": "logical flow and navigability"},
  "issues": ["specific structure or flow problem"],
  "suggestions": ["concrete structure or flow improvement"]
}

All counts are integers.
"#;

pub const COMPLETENESS_PROMPT: &str = r#"Analyze the completeness of the following documentation article and the quality of its examples.

ASSESS:
1. Completeness: is there enough detail to understand and use the feature? Are there gaps?
2. Examples: are there sufficient, clear, relevant examples (code, UI walkthroughs, scenarios)?
3. Practicality: are common use cases and likely problems covered?

OUTPUT (JSON object only):
{
  "score": "Good|Fair|Poor",
  "assessment": "1-2 sentence overall assessment of completeness and examples",
  "issues": ["specific information gap or missing/unclear example"],
  "suggestions": ["concrete addition, e.g. a table of limits, screenshots of key steps, a troubleshooting section"]
}
"#;

pub const STYLE_PROMPT: &str = r#"Analyze the following documentation article against these style guidelines.

GUIDELINES:
1. Voice and tone: customer-focused, helpful, clear; neither overly casual nor overly formal.
2. Clarity and conciseness: clear sentences, no needless jargon or wordiness, acronyms defined.
3. Action-oriented language: strong verbs and explicit guidance on what the reader should do.

OUTPUT (JSON object only):
{
  "score": "Good|Fair|Poor",
  "assessment": "1-2 sentence overall assessment of style adherence",
  "analysis": {
    "voice_tone": "assessment of voice and tone",
    "clarity_conciseness": "assessment of clarity and conciseness",
    "action_oriented_language": "assessment of action-oriented language"
  },
  "issues": ["specific deviation, e.g. passive voice, jargon, inappropriate tone"],
  "suggestions": ["concrete fix, e.g. 'Rephrase sentence X in the active voice'"]
}
"#;

/// Full analysis prompt for a stage: template plus the shared output rules.
pub fn analysis_prompt(template: &str) -> String {
    format!("{}\n{}\n\nAnalyze the following text:", template.trim_end(), JSON_ONLY_RULES)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REVISION PROMPT
// ═══════════════════════════════════════════════════════════════════════════════

const REVISION_RULES: &str = r#"INSTRUCTIONS:
1. Read the original article carefully.
2. Review every suggestion below, grouped by analysis type.
3. Apply the *intent* of the suggestions to the original text. You may rephrase, add, remove or restructure content to do so.
4. Preserve ALL original hyperlinks exactly as they appear, whether Markdown links like [link text](URL) or HTML <a> tags. Do not modify, remove or summarize them, and keep each one in its original position relative to the surrounding text.
5. Do NOT introduce new information or topics that are not covered by the suggestions or the original text.
6. Aim for a natural, coherent, improved version of the original article.
7. Output ONLY the complete revised article text: no introduction, no explanation, no Markdown fences around it."#;

/// Build the single self-contained revision prompt.
pub fn revision_prompt(suggestion_digest: &str, original_article: &str) -> String {
    format!(
        "TASK: Revise the original article below based only on the suggestions for improvement. \
Apply them to improve readability for non-technical readers, structure, completeness and style.\n\n\
{rules}\n\n\
SUGGESTIONS FOR IMPROVEMENT:\n\n\
{digest}\n\n\
ORIGINAL ARTICLE:\n\n\
```text\n{article}\n```\n\n\
REVISED ARTICLE (output only the revised text, preserving every original hyperlink):",
        rules = REVISION_RULES,
        digest = suggestion_digest.trim(),
        article = original_article,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_appends_output_rules() {
        let prompt = analysis_prompt(STRUCTURE_PROMPT);
        assert!(prompt.starts_with("Analyze the structure"));
        assert!(prompt.contains("OUTPUT RULES"));
        assert!(prompt.contains("\"flow_navigation\""));
        assert!(prompt.ends_with("Analyze the following text:"));
    }

    #[test]
    fn test_style_prompt_names_every_sub_assessment() {
        for key in ["voice_tone", "clarity_conciseness", "action_oriented_language"] {
            assert!(STYLE_PROMPT.contains(key), "missing {}", key);
        }
    }

    #[test]
    fn test_revision_prompt_embeds_digest_and_article() {
        let prompt = revision_prompt(
            "### Readability Suggestions:\n- Define jargon\n",
            "Original [link](https://example.com) body",
        );
        assert!(prompt.contains("- Define jargon"));
        assert!(prompt.contains("Original [link](https://example.com) body"));
        assert!(prompt.contains("Preserve ALL original hyperlinks"));
        assert!(prompt.contains("Do NOT introduce new information"));
    }
}
