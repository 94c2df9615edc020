//! Shared data structures modeling unified chat requests, responses, and stream chunks.
//!
//! These types normalize provider-specific payloads so the rest of the crate can stay
//! agnostic of individual API differences.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::selector::TaskClass;

/// Vendor behind a model, used as the adapter registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    OpenAi,
    Anthropic,
    GoogleGemini,
}

impl Vendor {
    /// 供 header 与日志使用的稳定名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::GoogleGemini => "google_gemini",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat role restricted to the three the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Normalized chat message shared across providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

/// 请求目标 直接指定模型 id 或交给任务类路由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelTarget {
    /// 具体模型 id 必须存在于 Catalog
    Model { id: String },
    /// 抽象任务类 由 Selector 解析为模型
    Task { task: TaskClass },
}

/// Default sampling parameters owned by a model descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

/// Per-request sampling overrides merged over a model's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SamplingOverrides {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl SamplingOverrides {
    /// 以默认采样为底 应用显式覆盖
    pub fn merge_over(&self, defaults: SamplingParams) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
        }
    }
}

/// Canonical chat request accepted by [`crate::gateway::ChatGateway`].
///
/// The original callback-style streaming contract maps onto Rust idiom: callers
/// pick `chat` for a complete response or `chat_stream` for a stream of
/// [`ChunkEvent`]s, and errors travel on the `Err` side of stream items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedRequest {
    pub target: ModelTarget,
    /// Ordered conversation. Roles must alternate user/assistant after an
    /// optional leading system message.
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub sampling: SamplingOverrides,
}

impl UnifiedRequest {
    /// 面向具体模型 id 的请求
    pub fn for_model(id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            target: ModelTarget::Model { id: id.into() },
            messages,
            sampling: SamplingOverrides::default(),
        }
    }

    /// 面向任务类的请求 模型由 Selector 决定
    pub fn for_task(task: TaskClass, messages: Vec<ChatMessage>) -> Self {
        Self {
            target: ModelTarget::Task { task },
            messages,
            sampling: SamplingOverrides::default(),
        }
    }

    /// 应用采样覆盖
    pub fn with_sampling(mut self, sampling: SamplingOverrides) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Token usage metrics collected from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Complete chat response produced once per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Full accumulated assistant text.
    pub content: String,
    /// Effective model identifier the call was resolved to.
    pub model: String,
    /// Vendor that served the call.
    pub vendor: Vendor,
    /// Token accounting, when the provider reports it.
    pub usage: Option<TokenUsage>,
}

/// One normalized event of a chunk stream.
///
/// The error arm of the wire-level union is represented by the `Err` side of
/// stream items rather than a variant here, so consumers cannot observe a
/// "successful" chunk that carries a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkEvent {
    /// Incremental text fragment, delivered strictly in arrival order.
    Content { text: String },
    /// Terminal marker. Exactly one per successful stream.
    Done { usage: Option<TokenUsage> },
}

/// 校验会话结构 可选的开头 system 之后 user 与 assistant 交替 且以 user 结尾
pub fn validate_conversation(messages: &[ChatMessage]) -> Result<(), GatewayError> {
    let mut rest = messages;
    if let Some(first) = rest.first() {
        if first.role == Role::System {
            rest = &rest[1..];
        }
    }
    if rest.is_empty() {
        return Err(GatewayError::validation(
            "conversation requires at least one user message",
        ));
    }
    for (idx, message) in rest.iter().enumerate() {
        let expected = if idx % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        };
        if message.role != expected {
            return Err(GatewayError::validation(format!(
                "conversation roles must alternate user/assistant; position {idx} is {}",
                message.role.as_str()
            )));
        }
    }
    if rest.len() % 2 == 0 {
        return Err(GatewayError::validation(
            "conversation must end with a user message",
        ));
    }
    Ok(())
}
