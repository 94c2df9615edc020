use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::{SamplingParams, Vendor};

/// 每千 token 计价 单位为供应商结算货币
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_k_tokens: f64,
    pub output_per_k_tokens: f64,
}

/// 模型描述 静态只读 进程启动时装载一次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// 全局唯一模型 id
    pub id: String,
    pub vendor: Vendor,
    /// 上下文窗口 token 数
    pub context_window: u32,
    /// 单次响应输出上限
    pub max_output_tokens: u32,
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
    #[serde(default)]
    pub default_sampling: SamplingParams,
}

/// Read-only registry mapping model id to its descriptor.
///
/// Built once at startup and shared across concurrent requests without locking:
/// there are no mutation operations after construction.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    /// 从描述列表构建 重复 id 视为配置错误
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Result<Self, GatewayError> {
        let mut models = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            if models.insert(id.clone(), descriptor).is_some() {
                return Err(GatewayError::InvalidConfig {
                    field: "models".to_string(),
                    reason: format!("duplicate model id: {id}"),
                });
            }
        }
        Ok(Self { models })
    }

    /// 查找模型 未命中返回 None 由调用方映射为 UnsupportedModel
    pub fn lookup(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 遍历所有描述 顺序未定义
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }
}
