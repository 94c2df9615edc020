use std::sync::Arc;
use std::sync::Mutex;

use crate::types::Vendor;

/// 网关运行事件 由注入的 MetricsSink 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    RequestStarted { vendor: Vendor, streaming: bool },
    RequestSucceeded { vendor: Vendor },
    RequestFailed { vendor: Vendor },
    /// 瞬态失败后排了一次重试 attempt 从 1 起计
    RetryScheduled { vendor: Vendor, attempt: u32 },
    RateLimitObserved { vendor: Vendor },
}

/// Injected metrics seam owned by the process, not by module state.
///
/// The gateway records events through this trait so tests can observe behavior
/// and production embeddings can forward to their own telemetry pipeline.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricEvent);
    fn reset(&self);
}

/// 线程安全 Sink 句柄
pub type DynMetricsSink = Arc<dyn MetricsSink>;

/// Default sink that drops every event.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _event: MetricEvent) {}

    fn reset(&self) {}
}

/// In-memory sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前已记录事件的拷贝
    pub fn snapshot(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .expect("metrics mutex poisoned")
            .clone()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, event: MetricEvent) {
        self.events
            .lock()
            .expect("metrics mutex poisoned")
            .push(event);
    }

    fn reset(&self) {
        self.events.lock().expect("metrics mutex poisoned").clear();
    }
}
