//! 客户端流式消费者 运行在调用侧的状态机
//!
//! 发起流式 HTTP 调用 增量解析线上帧 聚合内容
//! 对外暴露连接与限流状态 支持取消与自动重试

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Notify;

use crate::error::GatewayError;
use crate::http::{DynHttpTransport, HttpRequest};
use crate::retry::{RetryPolicy, retry_after_from_headers};
use crate::types::{ChatMessage, ModelTarget, SamplingOverrides, UnifiedRequest};
use crate::wire::{FrameDecoder, FrameEvent};

/// 连接状态机的四个状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Idle,
    Connecting,
    Connected,
    Error,
}

/// 一次 send_message 的终局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 流正常走到哨兵 完整回复已并入历史
    Completed,
    /// 调用方主动取消 历史未被改动
    Cancelled,
}

/// 协作式取消句柄 可跨任务克隆
///
/// 取消只阻止后续读取与回调 已经收到并分发的增量无法撤回
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消 幂等
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 挂起直到取消发生
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // 先登记再复查 避免在检查与挂起之间丢通知
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 客户端聊天会话
///
/// history 仅由自身的状态迁移函数修改 pending 只在 connecting/connected 非空
/// 终局成功时 pending 整体落为一条 assistant 消息 取消或失败则丢弃
pub struct ChatConsumer {
    transport: DynHttpTransport,
    endpoint: String,
    target: ModelTarget,
    sampling: SamplingOverrides,
    retry: RetryPolicy,
    history: Vec<ChatMessage>,
    pending: String,
    connection: Connection,
    rate_limited: bool,
    retry_after_secs: Option<u64>,
    request_id: Option<String>,
    cancel: CancelHandle,
}

impl ChatConsumer {
    pub fn new(transport: DynHttpTransport, endpoint: impl Into<String>, target: ModelTarget) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            target,
            sampling: SamplingOverrides::default(),
            retry: RetryPolicy::default(),
            history: Vec::new(),
            pending: String::new(),
            connection: Connection::Idle,
            rate_limited: false,
            retry_after_secs: None,
            request_id: None,
            cancel: CancelHandle::new(),
        }
    }

    /// 会话级采样覆盖
    pub fn with_sampling(mut self, sampling: SamplingOverrides) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 以 system 消息开场
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.history.insert(0, ChatMessage::system(prompt));
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn connection(&self) -> Connection {
        self.connection
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }

    /// 供 UI 倒计时展示
    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.retry_after_secs
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// 取消句柄 可交给另一个任务在任意时刻触发
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 按索引删除一条历史消息
    pub fn delete_message(&mut self, index: usize) -> Result<ChatMessage, GatewayError> {
        if index >= self.history.len() {
            return Err(GatewayError::validation(format!(
                "message index {index} out of range ({} messages)",
                self.history.len()
            )));
        }
        Ok(self.history.remove(index))
    }

    /// 发送一条用户消息并消费完整的流式回复
    ///
    /// 用户消息只在首次尝试时入列 内部重试不重复追加
    /// 429 按 Retry-After 等待后恰好自动重试一次 瞬态错误按指数退避重试
    pub async fn send_message(
        &mut self,
        content: impl Into<String>,
    ) -> Result<SendOutcome, GatewayError> {
        self.cancel.reset();
        self.history.push(ChatMessage::user(content));

        let cancel = self.cancel.clone();
        let mut transient_attempt = 0u32;
        let mut rate_limit_retried = false;

        loop {
            let run = tokio::select! {
                run = self.open_and_consume() => Some(run),
                _ = cancel.cancelled() => None,
            };
            let Some(run) = run else {
                // 丢弃半截回复 历史保持原样
                self.pending.clear();
                self.connection = Connection::Idle;
                return Ok(SendOutcome::Cancelled);
            };

            match run {
                Ok(()) => {
                    let reply = std::mem::take(&mut self.pending);
                    self.history.push(ChatMessage::assistant(reply));
                    self.connection = Connection::Idle;
                    return Ok(SendOutcome::Completed);
                }
                Err(GatewayError::RateLimited {
                    message,
                    retry_after,
                }) => {
                    self.pending.clear();
                    let wait = retry_after.unwrap_or(self.retry.base_delay);
                    self.enter_rate_limited(wait);

                    if rate_limit_retried {
                        return Err(GatewayError::RateLimited {
                            message,
                            retry_after,
                        });
                    }
                    rate_limit_retried = true;
                    tracing::info!(wait_secs = wait.as_secs(), "rate limited, waiting to retry");
                    tokio::time::sleep(wait).await;
                    self.clear_rate_limit();
                }
                Err(err) if err.is_transient() => {
                    self.pending.clear();
                    if transient_attempt + 1 >= self.retry.max_attempts.max(1) {
                        self.connection = Connection::Error;
                        return Err(err);
                    }
                    let delay = self.retry.backoff_delay(transient_attempt);
                    transient_attempt += 1;
                    tracing::debug!(
                        attempt = transient_attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying stream"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.pending.clear();
                    self.connection = Connection::Error;
                    return Err(err);
                }
            }
        }
    }

    /// 进入限流冷却 等待期间对外呈现 error 状态
    fn enter_rate_limited(&mut self, wait: Duration) {
        self.rate_limited = true;
        self.retry_after_secs = Some(wait.as_secs());
        self.connection = Connection::Error;
    }

    fn clear_rate_limit(&mut self) {
        self.rate_limited = false;
        self.retry_after_secs = None;
    }

    fn build_request(&self) -> Result<HttpRequest, GatewayError> {
        let body = UnifiedRequest {
            target: self.target.clone(),
            messages: self.history.clone(),
            sampling: self.sampling,
        };
        let payload = serde_json::to_vec(&body).map_err(|err| GatewayError::Validation {
            message: format!("failed to serialize request: {err}"),
        })?;
        Ok(HttpRequest::post_json(self.endpoint.clone(), payload))
    }

    /// 建连并消费一条完整的流 成功时 pending 里是完整回复
    async fn open_and_consume(&mut self) -> Result<(), GatewayError> {
        self.connection = Connection::Connecting;
        let request = self.build_request()?;

        let response = self.transport.send_stream(request).await?;
        self.request_id = response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("x-request-id"))
            .map(|(_, value)| value.clone());

        if response.status == 429 {
            return Err(GatewayError::RateLimited {
                message: "rate limited by gateway".to_string(),
                retry_after: retry_after_from_headers(&response.headers),
            });
        }
        if !(200..300).contains(&response.status) {
            let mut body = response.body;
            let mut text = String::new();
            while let Some(chunk) = body.next().await {
                text.push_str(&String::from_utf8_lossy(&chunk?));
            }
            return Err(match response.status {
                408 => GatewayError::timeout(text),
                status => GatewayError::upstream("gateway", status, text),
            });
        }

        let mut decoder = FrameDecoder::new();
        let mut body = response.body;

        while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            // 收到首个字节即视为已连接
            self.connection = Connection::Connected;
            for event in decoder.feed(&bytes) {
                match event {
                    FrameEvent::Content(text) => self.pending.push_str(&text),
                    FrameEvent::Error(message) => {
                        return Err(GatewayError::StreamError { message });
                    }
                    FrameEvent::Done => return Ok(()),
                }
            }
        }

        match decoder.finish() {
            Some(FrameEvent::Done) => Ok(()),
            Some(FrameEvent::Error(message)) => Err(GatewayError::StreamError { message }),
            _ => Err(GatewayError::StreamClosed {
                message: "stream ended before [DONE] sentinel".to_string(),
            }),
        }
    }
}
