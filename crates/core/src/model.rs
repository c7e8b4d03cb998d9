use serde::{Deserialize, Serialize};

/// An AI chat model offered in the model selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModel {
    pub id: String,
    pub name: String,
    /// Accent color used by the UI, as a CSS hex string.
    #[serde(default)]
    pub color: String,
    /// Only Pro subscribers (or holders of `all_ai_models`) may use it.
    #[serde(default)]
    pub requires_pro: bool,
}

impl AiModel {
    fn new(id: &str, name: &str, color: &str, requires_pro: bool) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            color: color.to_owned(),
            requires_pro,
        }
    }

    /// The catalogue shipped with the application.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new("claude-3.7", "Claude 3.7", "#9c9cff", true),
            Self::new("gpt-4.5", "GPT 4.5", "#4caf50", true),
            Self::new("gemini-2.0", "Gemini 2.0", "#ffab40", false),
            Self::new("qwen-2.5", "Qwen 2.5", "#9c27b0", true),
        ]
    }
}
