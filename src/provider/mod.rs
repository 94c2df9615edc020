use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::GatewayError;
use crate::types::{ChatMessage, ChatResponse, ChunkEvent, SamplingParams, Vendor};

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod simulated;

/// 规范化后的增量流 以 Done 事件收尾 错误走 Err 分支
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChunkEvent, GatewayError>> + Send>>;

/// 已解析完成的适配器请求 凭证由网关按 vendor 解析后随调用传入
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    /// 具体模型 id
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// 已合并默认值的采样参数
    pub sampling: SamplingParams,
    pub max_output_tokens: u32,
    /// 该 vendor 的密钥
    pub api_key: String,
    /// 单次调用的墙钟超时
    pub timeout: Option<Duration>,
}

/// 统一的适配器契约 所有供应商实现该接口即可接入
///
/// 实现者负责 消息形状转换与角色折叠 采样参数落盘 HTTP 状态分类
/// 以及把各自的流式帧规范化为 [`ChunkEvent`]
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// 提交完整请求并等待完整响应
    async fn chat(&self, request: AdapterRequest) -> Result<ChatResponse, GatewayError>;

    /// 以流式方式返回增量事件 每个文本增量恰好一个 Content
    async fn stream_chat(&self, request: AdapterRequest) -> Result<ChatStream, GatewayError>;

    /// 适配的供应商
    fn vendor(&self) -> Vendor;

    /// 是否具备真实的增量流 不具备时由 SimulatedStreamAdapter 补齐
    fn supports_streaming(&self) -> bool {
        true
    }
}

/// 线程安全 Adapter
pub type DynAdapter = Arc<dyn ChatAdapter>;
