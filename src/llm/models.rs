use serde::{Deserialize, Serialize};

/// Model tiers the gateway can be pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Speed tier - fast, cheap model for quick drafts (gpt-oss-120b)
    Speed,
    /// Balanced tier - good judgment at medium cost (claude-sonnet-4.5)
    #[default]
    Balanced,
    /// Smart tier - best reasoning, slowest and most expensive (claude-opus-4.5)
    Smart,
}

/// Maximum tokens for all model tiers. Revisions return a whole article, so
/// this has to leave room for long documents.
const MODEL_MAX_TOKENS: u32 = 16384;

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Speed => "openai/gpt-oss-120b:nitro",
            Model::Balanced => "anthropic/claude-sonnet-4.5:nitro",
            Model::Smart => "anthropic/claude-opus-4.5:nitro",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        MODEL_MAX_TOKENS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Speed => "speed",
            Model::Balanced => "balanced",
            Model::Smart => "smart",
        }
    }

    /// Parse a tier name as written in config files, env vars and CLI flags.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "speed" | "fast" => Some(Model::Speed),
            "balanced" | "default" => Some(Model::Balanced),
            "smart" | "best" => Some(Model::Smart),
            _ => None,
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// API usage information from OpenRouter
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    /// Actual cost in USD as reported by OpenRouter (`total_cost` in the usage object).
    #[serde(default, alias = "total_cost")]
    pub cost: Option<f64>,
}

impl Usage {
    /// Cost reported by OpenRouter, or 0.0 if not available.
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }
}
