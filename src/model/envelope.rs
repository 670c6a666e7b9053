use serde::{Deserialize, Serialize};

/// Protocol tag Bedrock expects for Anthropic models.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Request body for an Anthropic model on Bedrock.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub anthropic_version: &'static str,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

impl ModelRequest {
    /// A request carrying one user message.
    pub fn single_turn(prompt: String, system: Option<&str>, max_tokens: u32) -> ModelRequest {
        ModelRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens,
            system: system.map(str::to_string),
            messages: vec![Message {
                role: Role::User,
                content: prompt,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)] // only the text of the first block is consumed
    pub kind: String,
    #[serde(default)]
    pub text: String,
}
