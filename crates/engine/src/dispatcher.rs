use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use dispatch_core::models::{MessageKind, MessagePriority, Task, TaskMessage, TaskSpec};
use dispatch_core::traits::{EventSink, MessageChannel};
use dispatch_core::{DispatchError, DispatchResult};

use crate::registry::WorkerRegistry;
use crate::scoring::{self, BasePriority};
use crate::session::SessionTracker;
use crate::task_store::TaskLifecycleStore;

/// 调度侧在消息通道中的参与方标识
pub const DISPATCHER_ID: &str = "dispatcher";

/// 提交载荷中不允许出现的敏感数据模式
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "api-key",
    "api_key",
    "apikey",
    "secret",
    "credential",
    "private_key",
];

/// 提交成功的回执
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub task_id: String,
    pub worker_id: String,
    pub priority: u8,
}

/// 任务调度器
///
/// 所有任务准入与生命周期变更的唯一入口：校验、打分、选择
/// Worker、推进状态机，并经消息通道交接。注册表与任务存储的
/// 变更都串行经过这里，容量记账不会在并发提交间竞争。
pub struct TaskDispatcher {
    registry: Arc<WorkerRegistry>,
    store: Arc<TaskLifecycleStore>,
    channel: Arc<dyn MessageChannel>,
    events: Arc<dyn EventSink>,
    session: Arc<SessionTracker>,
    message_max_retries: u32,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        store: Arc<TaskLifecycleStore>,
        channel: Arc<dyn MessageChannel>,
        events: Arc<dyn EventSink>,
        session: Arc<SessionTracker>,
        message_max_retries: u32,
    ) -> Self {
        Self {
            registry,
            store,
            channel,
            events,
            session,
            message_max_retries,
        }
    }

    /// 提交任务：校验 -> 打分 -> 选择并预占Worker -> 建档 -> 投递
    ///
    /// 载荷中出现敏感数据模式会被硬性拒绝，不产生任何任务记录。
    /// 没有可用Worker时错误直接上抛，核心不做排队或自动重试。
    pub async fn submit(
        &self,
        spec: TaskSpec,
        base: BasePriority,
    ) -> DispatchResult<DispatchReceipt> {
        self.validate_spec(&spec)?;

        let priority = scoring::compute_priority(&spec, base);
        let keywords = scoring::extract_keywords(&spec.description, spec.task_type);
        debug!(
            "任务打分完成: 优先级 {}, 关键词 {:?}",
            priority, keywords
        );

        let worker_id = self.registry.select_and_reserve(&keywords, priority).await?;

        let task = Task::new(spec, priority);
        let task = match self.store.admit(task, &worker_id).await {
            Ok(task) => task,
            Err(e) => {
                // 准入失败时退还已预占的容量
                if let Err(release_err) = self.registry.release(&worker_id).await {
                    warn!("回滚容量预占失败: {}", release_err);
                }
                return Err(e);
            }
        };

        let assignment = TaskMessage::new(
            DISPATCHER_ID,
            &worker_id,
            MessageKind::Assignment,
            json!({
                "task_id": task.id,
                "task_type": task.task_type.as_str(),
                "description": task.description,
                "requirements": task.requirements,
                "priority": task.priority,
            }),
        )
        .with_priority(if priority >= 7 {
            MessagePriority::High
        } else {
            MessagePriority::Normal
        })
        .with_max_retries(self.message_max_retries);

        if let Err(e) = self.channel.send(assignment).await {
            // 任务已准入；投递层问题交由消息通道的重试与日志处理
            warn!("任务 {} 的分配消息发送失败: {}", task.id, e);
        }

        self.events
            .emit(
                "task_submitted",
                json!({
                    "task_id": task.id,
                    "worker_id": worker_id,
                    "priority": priority,
                }),
            )
            .await;

        info!(
            "任务 {} 已分配给 {} (优先级 {})",
            task.id, worker_id, priority
        );
        Ok(DispatchReceipt {
            task_id: task.id,
            worker_id,
            priority,
        })
    }

    /// 上报任务完成：转移状态、释放容量、更新性能统计
    pub async fn report_completion(
        &self,
        task_id: &str,
        result: serde_json::Value,
    ) -> DispatchResult<Task> {
        let task = self.store.complete(task_id, result).await?;
        let worker_id = self.settle_worker(&task, true).await;
        self.session.record_success().await;

        if let Some(worker_id) = worker_id {
            let completion = TaskMessage::new(
                &worker_id,
                DISPATCHER_ID,
                MessageKind::Completion,
                json!({
                    "task_id": task.id,
                    "result": task.result,
                }),
            )
            .with_max_retries(self.message_max_retries);
            if let Err(e) = self.channel.send(completion).await {
                warn!("任务 {} 的完成消息发送失败: {}", task.id, e);
            }
        }

        self.events
            .emit("task_completed", json!({"task_id": task.id}))
            .await;
        Ok(task)
    }

    /// 上报任务失败：任务进入终态，容量释放，错误计数累加
    pub async fn report_failure(&self, task_id: &str, reason: &str) -> DispatchResult<Task> {
        let task = self.store.fail(task_id, reason).await?;
        let worker_id = self.settle_worker(&task, false).await;
        self.session.record_error().await;

        if let Some(worker_id) = worker_id {
            let error = TaskMessage::new(
                &worker_id,
                DISPATCHER_ID,
                MessageKind::Error,
                json!({
                    "task_id": task.id,
                    "reason": reason,
                }),
            )
            .with_max_retries(self.message_max_retries);
            if let Err(e) = self.channel.send(error).await {
                warn!("任务 {} 的错误消息发送失败: {}", task.id, e);
            }
        }

        self.events
            .emit(
                "task_failed",
                json!({"task_id": task.id, "reason": reason}),
            )
            .await;
        Ok(task)
    }

    /// 更新任务进度，可附带检查点说明
    pub async fn update_progress(
        &self,
        task_id: &str,
        progress: u8,
        checkpoint: Option<String>,
    ) -> DispatchResult<Task> {
        self.store.update_progress(task_id, progress, checkpoint).await
    }

    /// 终态结算：释放容量并记录完成耗时
    async fn settle_worker(&self, task: &Task, succeeded: bool) -> Option<String> {
        let worker_id = task.assigned_worker.clone()?;

        if let Err(e) = self.registry.release(&worker_id).await {
            warn!("释放Worker {} 容量失败: {}", worker_id, e);
        }
        let duration = task.completion_duration_seconds().unwrap_or(0.0);
        if let Err(e) = self
            .registry
            .record_completion(&worker_id, duration, succeeded)
            .await
        {
            warn!("更新Worker {} 性能统计失败: {}", worker_id, e);
        }
        Some(worker_id)
    }

    fn validate_spec(&self, spec: &TaskSpec) -> DispatchResult<()> {
        if spec.description.trim().is_empty() {
            return Err(DispatchError::validation("任务描述不能为空"));
        }
        if spec.requirements.iter().any(|r| r.trim().is_empty()) {
            return Err(DispatchError::validation("需求条目不能为空"));
        }

        for text in std::iter::once(spec.description.as_str())
            .chain(spec.requirements.iter().map(String::as_str))
            .chain(spec.tags.iter().map(String::as_str))
        {
            let lowered = text.to_lowercase();
            if let Some(pattern) = SENSITIVE_PATTERNS.iter().find(|p| lowered.contains(**p)) {
                return Err(DispatchError::security(format!(
                    "载荷中包含敏感数据模式: {pattern}"
                )));
            }
        }
        Ok(())
    }
}
