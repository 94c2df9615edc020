use serde::Deserialize;

/// 非流式 Messages 响应
#[derive(Debug, Deserialize)]
pub struct AnthropicMessageResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicContentBlock {
    #[serde(rename = "type", default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

/// 流式事件 data 负载自带 type 字段 无需依赖 event: 行
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart { message: AnthropicStartMessage },
    ContentBlockDelta { delta: AnthropicDelta },
    MessageDelta { usage: Option<AnthropicUsage> },
    MessageStop,
    Error { error: AnthropicStreamError },
    /// ping content_block_start 等对文本流无意义的事件
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicStartMessage {
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicDelta {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicStreamError {
    #[serde(default)]
    pub message: Option<String>,
}

/// 错误响应体 {"error": {"message": ...}}
#[derive(Debug, Deserialize)]
pub struct AnthropicErrorResponse {
    pub error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}
