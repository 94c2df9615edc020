//! 多供应商流式聊天网关 统一请求路由与增量流规范化

pub mod catalog;
pub mod config;
pub mod consumer;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod http;
pub mod limiter;
pub mod metrics;
pub mod provider;
pub mod retry;
pub mod selector;
pub mod types;
pub mod wire;

pub use catalog::{ModelCatalog, ModelDescriptor};
pub use config::GatewayConfig;
pub use consumer::{CancelHandle, ChatConsumer, Connection, SendOutcome};
pub use credentials::CredentialStore;
pub use error::GatewayError;
pub use gateway::{ChatGateway, GatewayBuilder};
pub use limiter::ConcurrencyLimiter;
pub use provider::{ChatAdapter, ChatStream};
pub use retry::RetryPolicy;
pub use selector::{ModelSelector, TaskClass, TaskRoutes};
pub use types::*;
