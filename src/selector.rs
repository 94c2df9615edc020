use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::credentials::CredentialStore;
use crate::error::GatewayError;

/// Abstract task category used for adaptive model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    Fast,
    LongContext,
    LongGeneration,
    Multimodal,
    Budget,
    Experimental,
    Default,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Fast => "fast",
            TaskClass::LongContext => "long_context",
            TaskClass::LongGeneration => "long_generation",
            TaskClass::Multimodal => "multimodal",
            TaskClass::Budget => "budget",
            TaskClass::Experimental => "experimental",
            TaskClass::Default => "default",
        }
    }
}

impl std::fmt::Display for TaskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务类到候选模型 id 的优先序列表 与 Catalog 独立配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRoutes {
    routes: HashMap<TaskClass, Vec<String>>,
}

impl TaskRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 配置一个任务类的候选列表 顺序即优先级
    pub fn with_route<I, S>(mut self, task: TaskClass, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes
            .insert(task, candidates.into_iter().map(Into::into).collect());
        self
    }

    pub fn get(&self, task: TaskClass) -> Option<&[String]> {
        self.routes.get(&task).map(Vec::as_slice)
    }
}

impl From<HashMap<TaskClass, Vec<String>>> for TaskRoutes {
    fn from(routes: HashMap<TaskClass, Vec<String>>) -> Self {
        Self { routes }
    }
}

/// Deterministic task-to-model selector.
///
/// Walks the configured candidate list in order and returns the first model that
/// both exists in the catalog and whose vendor has a configured credential.
/// Tie-break is strictly list order: no scoring, no load balancing, so behavior
/// is reproducible in tests. A task class without a configured route falls back
/// to the [`TaskClass::Default`] route.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    routes: TaskRoutes,
}

impl ModelSelector {
    pub fn new(routes: TaskRoutes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &TaskRoutes {
        &self.routes
    }

    /// 按优先序挑选首个可用模型 全部不可用返回 NoModelAvailable
    pub fn select<'a>(
        &self,
        task: TaskClass,
        catalog: &'a ModelCatalog,
        credentials: &CredentialStore,
    ) -> Result<&'a ModelDescriptor, GatewayError> {
        let candidates = self
            .routes
            .get(task)
            .filter(|ids| !ids.is_empty())
            .or_else(|| self.routes.get(TaskClass::Default));

        if let Some(candidates) = candidates {
            for id in candidates {
                if let Some(descriptor) = catalog.lookup(id) {
                    if credentials.has(descriptor.vendor) {
                        return Ok(descriptor);
                    }
                }
            }
        }
        Err(GatewayError::NoModelAvailable { task })
    }
}
