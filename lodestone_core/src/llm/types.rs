//! Message and streaming types for language models

use serde::{Deserialize, Serialize};

/// Role of a chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Raw JSON argument payload as produced by the model
    pub arguments: String,
}

/// One increment of a chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDelta {
    /// New text since the previous delta
    pub delta: String,

    /// Set on the final delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl TokenDelta {
    pub fn new(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn final_delta(delta: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: Some(reason.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Static capabilities of a language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMetadata {
    pub model_name: String,
    pub context_window: usize,
    pub num_output_tokens: usize,
    pub is_chat: bool,
    pub is_function_calling: bool,
    pub is_multi_modal: bool,
}

impl Default for LlmMetadata {
    fn default() -> Self {
        Self {
            model_name: "unknown".to_string(),
            context_window: 4096,
            num_output_tokens: 512,
            is_chat: true,
            is_function_calling: false,
            is_multi_modal: false,
        }
    }
}
