use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded-concurrency gate shared by every gateway request.
///
/// Backed by a fair semaphore, so waiters acquire permits in submission (FIFO)
/// order and never more than `limit` operations run simultaneously. A failed
/// operation releases its permit exactly like a successful one, so one failure
/// never wedges the queue.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// 创建上限为 limit 的门闸 limit 为 0 视为 1
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 当前空闲槽位
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 获取一个槽位 held permit 随 drop 释放
    ///
    /// 流式调用在整个流的生命周期内持有 permit 防止规避并发上限
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed")
    }

    /// 在门闸内执行一个 future
    pub async fn run<T, Fut>(&self, operation: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        operation.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let limiter = ConcurrencyLimiter::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn queued_operations_start_in_submission_order() {
        let limiter = ConcurrencyLimiter::new(1);
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for idx in 0..5u32 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async move {
                        order.lock().await.push(idx);
                        tokio::task::yield_now().await;
                    })
                    .await;
            }));
            // 让每个任务先抵达等待队列 保证提交顺序确定
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failure_does_not_block_queue() {
        let limiter = ConcurrencyLimiter::new(1);

        let failed: Result<(), &str> = limiter.run(async { Err("boom") }).await;
        assert!(failed.is_err());

        // 失败释放槽位 后续操作照常执行
        let ok = limiter.run(async { 41 + 1 }).await;
        assert_eq!(ok, 42);
        assert_eq!(limiter.available(), 1);
    }
}
