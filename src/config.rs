//! 显式配置对象 一次构建 依赖注入进网关
//!
//! 取代隐式全局注册表 凭证 路由 模型目录都从这里进

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::credentials::CredentialStore;
use crate::error::GatewayError;
use crate::gateway::{ChatGateway, GatewayBuilder};
use crate::http::DynHttpTransport;
use crate::provider::anthropic::AnthropicAdapter;
use crate::provider::gemini::GeminiAdapter;
use crate::provider::openai::OpenAiAdapter;
use crate::provider::simulated::SimulatedStreamAdapter;
use crate::retry::RetryPolicy;
use crate::selector::{TaskClass, TaskRoutes};
use crate::types::Vendor;

/// 重试设置的序列化形态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_concurrency_limit() -> usize {
    4
}

/// 网关完整配置 通常从部署侧的 JSON/TOML 反序列化而来
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// 模型目录 进程启动时装载一次
    pub models: Vec<ModelDescriptor>,
    /// 任务类到候选模型 id 的优先序列表
    #[serde(default)]
    pub routes: HashMap<TaskClass, Vec<String>>,
    /// 每 vendor 一个密钥 缺失即 MissingCredential
    #[serde(default)]
    pub credentials: HashMap<Vendor, String>,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    /// 单次适配器调用的墙钟超时 秒
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl GatewayConfig {
    /// 基础校验 提前暴露配置错误
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.models.is_empty() {
            return Err(GatewayError::InvalidConfig {
                field: "models".to_string(),
                reason: "at least one model descriptor is required".to_string(),
            });
        }
        for (task, candidates) in &self.routes {
            if candidates.is_empty() {
                return Err(GatewayError::InvalidConfig {
                    field: "routes".to_string(),
                    reason: format!("task class {task} has an empty candidate list"),
                });
            }
        }
        Ok(())
    }

    /// 装配网关 注册全部内建适配器
    ///
    /// Gemini 不具备真实增量流 以 SimulatedStreamAdapter 包装接入统一流契约
    pub fn build_gateway(
        &self,
        transport: DynHttpTransport,
    ) -> Result<ChatGateway, GatewayError> {
        self.validate()?;
        let catalog = ModelCatalog::new(self.models.clone())?;

        let mut routes = TaskRoutes::new();
        for (task, candidates) in &self.routes {
            routes = routes.with_route(*task, candidates.clone());
        }

        let mut credentials = CredentialStore::new();
        for (vendor, key) in &self.credentials {
            credentials = credentials.with_key(*vendor, key.clone());
        }

        let gemini = SimulatedStreamAdapter::new(Arc::new(GeminiAdapter::new(transport.clone())));

        let mut builder: GatewayBuilder = ChatGateway::builder(catalog)
            .routes(routes)
            .credentials(credentials)
            .register_adapter(Arc::new(OpenAiAdapter::new(transport.clone())))
            .register_adapter(Arc::new(AnthropicAdapter::new(transport.clone())))
            .register_adapter(Arc::new(gemini))
            .retry_policy(self.retry.to_policy())
            .concurrency_limit(self.concurrency_limit);

        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        Ok(builder.build())
    }
}
