use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 延迟重试调度器
///
/// 把延迟重投/重执行建模为显式登记的后台任务：每个重试链
/// 在独立的 tokio 任务中休眠并重试，不阻塞发起方。关闭策略
/// 是确定性的丢弃——`shutdown` 中止所有未完成的重试任务，
/// 之后不再接受新的调度。
pub struct RetryScheduler {
    handles: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl RetryScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    /// 登记一个延迟操作；关闭后调用被拒绝并记录日志
    pub async fn schedule<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shut_down.load(Ordering::SeqCst) {
            warn!("重试调度器已关闭，拒绝新的延迟操作");
            return false;
        }
        let handle = tokio::spawn(fut);
        let mut handles = self.handles.lock().await;
        // 顺带清理已结束的任务句柄
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        true
    }

    /// 当前仍在等待执行的延迟操作数量
    pub async fn pending_count(&self) -> usize {
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    /// 关闭调度器，丢弃所有未完成的重试
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let mut handles = self.handles.lock().await;
        let pending = handles.len();
        for handle in handles.drain(..) {
            handle.abort();
        }
        if pending > 0 {
            debug!("重试调度器关闭，丢弃 {} 个未完成的延迟操作", pending);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
