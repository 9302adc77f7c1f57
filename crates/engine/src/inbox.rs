use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use dispatch_core::models::{MessageKind, TaskMessage};
use dispatch_core::traits::MessageHandler;
use dispatch_core::{DispatchError, DispatchResult};

use crate::registry::WorkerRegistry;

/// 调度侧收件箱
///
/// 以消息参与方身份注册在通道上，承接投递到调度面的消息：
/// status_update 驱动注册表可用性，completion/error 记录日志，
/// 告警类消息落到日志管道。
pub struct DispatcherInbox {
    registry: Arc<WorkerRegistry>,
}

impl DispatcherInbox {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for DispatcherInbox {
    async fn handle(&self, message: TaskMessage) -> DispatchResult<()> {
        match message.kind {
            MessageKind::StatusUpdate => {
                let worker_id = message.payload["worker_id"].as_str().ok_or_else(|| {
                    DispatchError::validation("status_update 消息缺少 worker_id")
                })?;
                let status = message.payload["status"].as_str().ok_or_else(|| {
                    DispatchError::validation("status_update 消息缺少 status")
                })?;

                let available = matches!(status, "available" | "online" | "idle");
                self.registry.set_availability(worker_id, available).await
            }
            MessageKind::Completion => {
                info!(
                    "收到完成消息: 任务 {}",
                    message.payload["task_id"].as_str().unwrap_or("?")
                );
                Ok(())
            }
            MessageKind::Error => {
                warn!(
                    "收到错误消息: 任务 {} ({})",
                    message.payload["task_id"].as_str().unwrap_or("?"),
                    message.payload["reason"].as_str().unwrap_or("未知原因")
                );
                Ok(())
            }
            MessageKind::PerformanceReport => {
                warn!("性能告警: {}", message.payload);
                Ok(())
            }
            MessageKind::SecurityAlert => {
                error!("安全告警: {}", message.payload);
                Ok(())
            }
            other => {
                debug!("收件箱忽略消息类型 {}", other.as_str());
                Ok(())
            }
        }
    }
}
