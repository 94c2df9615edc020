//! 统一聊天编排器 请求入口
//!
//! 解析模型与凭证 合并采样参数 套上重试与并发门闸
//! 流式调用只对建连阶段重试 流一旦建立 错误原样下发

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::future::join_all;
use tokio::sync::OwnedSemaphorePermit;

use crate::catalog::ModelCatalog;
use crate::credentials::CredentialStore;
use crate::error::GatewayError;
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::{DynMetricsSink, MetricEvent, NoopMetrics};
use crate::provider::{AdapterRequest, ChatStream, DynAdapter};
use crate::retry::{RetryPolicy, with_retry_observed};
use crate::selector::{ModelSelector, TaskRoutes};
use crate::types::{
    ChatResponse, ChunkEvent, ModelTarget, UnifiedRequest, Vendor, validate_conversation,
};

/// 已完成解析的一次调用 模型 适配器 凭证齐备
struct ResolvedCall {
    adapter: DynAdapter,
    request: AdapterRequest,
    vendor: Vendor,
    model_id: String,
}

/// 多供应商聊天网关
///
/// 所有依赖显式注入 不持有全局状态 可在测试中整体替换为假实现
pub struct ChatGateway {
    catalog: ModelCatalog,
    selector: ModelSelector,
    credentials: CredentialStore,
    adapters: HashMap<Vendor, DynAdapter>,
    retry: RetryPolicy,
    limiter: ConcurrencyLimiter,
    request_timeout: Option<Duration>,
    metrics: DynMetricsSink,
}

/// [`ChatGateway`] 的装配器
pub struct GatewayBuilder {
    catalog: ModelCatalog,
    routes: TaskRoutes,
    credentials: CredentialStore,
    adapters: HashMap<Vendor, DynAdapter>,
    retry: RetryPolicy,
    concurrency_limit: usize,
    request_timeout: Option<Duration>,
    metrics: DynMetricsSink,
}

const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

impl GatewayBuilder {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self {
            catalog,
            routes: TaskRoutes::new(),
            credentials: CredentialStore::new(),
            adapters: HashMap::new(),
            retry: RetryPolicy::default(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            request_timeout: None,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// 任务类路由表
    pub fn routes(mut self, routes: TaskRoutes) -> Self {
        self.routes = routes;
        self
    }

    /// 凭证表 每 vendor 一个密钥
    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    /// 注册一个适配器 以其 vendor 为键 重复注册以后者为准
    pub fn register_adapter(mut self, adapter: DynAdapter) -> Self {
        self.adapters.insert(adapter.vendor(), adapter);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// 并发上限 0 视为 1
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// 单次适配器调用的墙钟超时 与重试退避时钟相互独立
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn metrics(mut self, metrics: DynMetricsSink) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> ChatGateway {
        ChatGateway {
            catalog: self.catalog,
            selector: ModelSelector::new(self.routes),
            credentials: self.credentials,
            adapters: self.adapters,
            retry: self.retry,
            limiter: ConcurrencyLimiter::new(self.concurrency_limit),
            request_timeout: self.request_timeout,
            metrics: self.metrics,
        }
    }
}

impl ChatGateway {
    pub fn builder(catalog: ModelCatalog) -> GatewayBuilder {
        GatewayBuilder::new(catalog)
    }

    /// 目标解析 快速失败 UnsupportedModel NoModelAvailable MissingCredential
    fn resolve(&self, request: &UnifiedRequest) -> Result<ResolvedCall, GatewayError> {
        validate_conversation(&request.messages)?;

        let descriptor = match &request.target {
            ModelTarget::Model { id } => {
                self.catalog
                    .lookup(id)
                    .ok_or_else(|| GatewayError::UnsupportedModel { model: id.clone() })?
            }
            ModelTarget::Task { task } => {
                self.selector
                    .select(*task, &self.catalog, &self.credentials)?
            }
        };

        let vendor = descriptor.vendor;
        let api_key = self
            .credentials
            .get(vendor)
            .ok_or(GatewayError::MissingCredential { vendor })?
            .to_string();
        let adapter = self
            .adapters
            .get(&vendor)
            .ok_or_else(|| GatewayError::InvalidConfig {
                field: "adapters".to_string(),
                reason: format!("no adapter registered for vendor {vendor}"),
            })?
            .clone();

        let sampling = request.sampling.merge_over(descriptor.default_sampling);
        let max_output_tokens = request
            .sampling
            .max_output_tokens
            .unwrap_or(descriptor.max_output_tokens)
            .min(descriptor.max_output_tokens);

        Ok(ResolvedCall {
            adapter,
            request: AdapterRequest {
                model: descriptor.id.clone(),
                messages: request.messages.clone(),
                sampling,
                max_output_tokens,
                api_key,
                timeout: self.request_timeout,
            },
            vendor,
            model_id: descriptor.id.clone(),
        })
    }

    fn record_failure(&self, vendor: Vendor, error: &GatewayError) {
        if matches!(error, GatewayError::RateLimited { .. }) {
            self.metrics.record(MetricEvent::RateLimitObserved { vendor });
        }
        self.metrics.record(MetricEvent::RequestFailed { vendor });
    }

    /// 完整请求 完整响应
    pub async fn chat(&self, request: UnifiedRequest) -> Result<ChatResponse, GatewayError> {
        let resolved = self.resolve(&request)?;
        let vendor = resolved.vendor;
        self.metrics.record(MetricEvent::RequestStarted {
            vendor,
            streaming: false,
        });

        let _permit = self.limiter.acquire().await;
        let adapter = resolved.adapter;
        let adapter_request = resolved.request;
        let result = with_retry_observed(
            &self.retry,
            GatewayError::is_transient,
            |attempt| {
                self.metrics
                    .record(MetricEvent::RetryScheduled { vendor, attempt });
            },
            || adapter.chat(adapter_request.clone()),
        )
        .await;

        match &result {
            Ok(_) => self.metrics.record(MetricEvent::RequestSucceeded { vendor }),
            Err(err) => self.record_failure(vendor, err),
        }
        result
    }

    /// 流式请求 返回规范化增量流
    ///
    /// 返回的流在整个生命周期内占用一个并发槽位 丢弃流即释放
    pub async fn chat_stream(&self, request: UnifiedRequest) -> Result<ChatStream, GatewayError> {
        let resolved = self.resolve(&request)?;
        let vendor = resolved.vendor;
        self.metrics.record(MetricEvent::RequestStarted {
            vendor,
            streaming: true,
        });

        let permit = self.limiter.acquire().await;
        let adapter = resolved.adapter;
        let adapter_request = resolved.request;
        let inner = match with_retry_observed(
            &self.retry,
            GatewayError::is_transient,
            |attempt| {
                self.metrics
                    .record(MetricEvent::RetryScheduled { vendor, attempt });
            },
            || adapter.stream_chat(adapter_request.clone()),
        )
        .await
        {
            Ok(stream) => stream,
            Err(err) => {
                self.record_failure(vendor, &err);
                return Err(err);
            }
        };

        Ok(Box::pin(GatewayStream {
            inner,
            _permit: permit,
            vendor,
            metrics: self.metrics.clone(),
            finished: false,
        }))
    }

    /// 流式消费到终点 把全部增量聚合成一个完整响应
    ///
    /// 下游只拿全文 不见中间片段 对应完成钩子的语义
    pub async fn chat_collect(&self, request: UnifiedRequest) -> Result<ChatResponse, GatewayError> {
        let resolved_meta = self.resolve(&request)?;
        let (vendor, model_id) = (resolved_meta.vendor, resolved_meta.model_id);

        let mut stream = self.chat_stream(request).await?;
        let mut content = String::new();
        let mut usage = None;
        while let Some(event) = stream.next().await {
            match event? {
                ChunkEvent::Content { text } => content.push_str(&text),
                ChunkEvent::Done { usage: u } => {
                    usage = u;
                    break;
                }
            }
        }

        Ok(ChatResponse {
            content,
            model: model_id,
            vendor,
            usage,
        })
    }

    /// 批量执行 各请求独立成败 结果顺序与输入一致
    pub async fn batch(
        &self,
        requests: Vec<UnifiedRequest>,
    ) -> Vec<Result<ChatResponse, GatewayError>> {
        join_all(requests.into_iter().map(|request| self.chat(request))).await
    }
}

/// 包装适配器流 持有并发槽位 终结时记录指标并熔断后续轮询
struct GatewayStream {
    inner: ChatStream,
    _permit: OwnedSemaphorePermit,
    vendor: Vendor,
    metrics: DynMetricsSink,
    finished: bool,
}

impl Stream for GatewayStream {
    type Item = Result<ChunkEvent, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event @ ChunkEvent::Done { .. }))) => {
                self.finished = true;
                self.metrics.record(MetricEvent::RequestSucceeded {
                    vendor: self.vendor,
                });
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(err))) => {
                self.finished = true;
                self.metrics.record(MetricEvent::RequestFailed {
                    vendor: self.vendor,
                });
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
