use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use dispatch_core::models::{Checkpoint, Task, TaskStatus};
use dispatch_core::traits::TaskPersistence;
use dispatch_core::{DispatchError, DispatchResult};

/// 任务生命周期存储
///
/// 持有活跃任务集合与有界的已完成归档，推进状态机并通过
/// 外部持久化协作方落盘。持久化是至少一次语义：写入失败
/// 记录日志，不回滚内存中的状态转换。
pub struct TaskLifecycleStore {
    active: RwLock<HashMap<String, Task>>,
    completed: RwLock<VecDeque<Task>>,
    persistence: Arc<dyn TaskPersistence>,
    archive_limit: usize,
}

impl TaskLifecycleStore {
    pub fn new(persistence: Arc<dyn TaskPersistence>, archive_limit: usize) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            completed: RwLock::new(VecDeque::new()),
            persistence,
            archive_limit,
        }
    }

    /// 接纳一个 pending 任务并分配给Worker（pending -> assigned）
    pub async fn admit(&self, mut task: Task, worker_id: &str) -> DispatchResult<Task> {
        if !task.status.can_transition_to(TaskStatus::Assigned) {
            return Err(DispatchError::invalid_transition(
                task.status.as_str(),
                TaskStatus::Assigned.as_str(),
            ));
        }
        task.status = TaskStatus::Assigned;
        task.assigned_worker = Some(worker_id.to_string());
        task.assigned_at = Some(Utc::now());

        self.persist(&task).await;
        let snapshot = task.clone();
        self.active.write().await.insert(task.id.clone(), task);
        Ok(snapshot)
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        if let Some(task) = self.active.read().await.get(task_id) {
            return Some(task.clone());
        }
        self.completed
            .read()
            .await
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    /// 更新任务进度，可附带检查点说明
    ///
    /// 只在 assigned/in_progress 阶段有效；首次进度更新把任务
    /// 推进到 in_progress。进度回退或超过100被拒绝。
    pub async fn update_progress(
        &self,
        task_id: &str,
        progress: u8,
        checkpoint: Option<String>,
    ) -> DispatchResult<Task> {
        if progress > 100 {
            return Err(DispatchError::validation(format!(
                "进度值非法: {progress}"
            )));
        }

        let mut active = self.active.write().await;
        let task = match active.get_mut(task_id) {
            Some(task) => task,
            None => {
                // 已归档任务上的乱序进度更新是状态机错误而非未知任务
                if let Some(archived) = self
                    .completed
                    .read()
                    .await
                    .iter()
                    .find(|t| t.id == task_id)
                {
                    return Err(DispatchError::invalid_transition(
                        archived.status.as_str(),
                        TaskStatus::InProgress.as_str(),
                    ));
                }
                return Err(DispatchError::task_not_found(task_id));
            }
        };

        if !task.accepts_progress() {
            return Err(DispatchError::invalid_transition(
                task.status.as_str(),
                TaskStatus::InProgress.as_str(),
            ));
        }
        if progress < task.progress {
            return Err(DispatchError::validation(format!(
                "进度不允许回退: {} -> {}",
                task.progress, progress
            )));
        }

        if task.status == TaskStatus::Assigned {
            debug!("任务 {} 开始执行", task_id);
            task.status = TaskStatus::InProgress;
        }
        task.progress = progress;
        if let Some(description) = checkpoint {
            task.checkpoints.push(Checkpoint {
                progress,
                description,
                timestamp: Utc::now(),
            });
        }

        let snapshot = task.clone();
        drop(active);
        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// 完成任务：进度强制为100，打完成时间戳并归档
    pub async fn complete(
        &self,
        task_id: &str,
        result: serde_json::Value,
    ) -> DispatchResult<Task> {
        let mut active = self.active.write().await;
        let mut task = active
            .remove(task_id)
            .ok_or_else(|| DispatchError::task_not_found(task_id))?;

        // Worker可能不经进度上报直接交付，此时隐式经过 in_progress
        if task.status == TaskStatus::Assigned {
            task.status = TaskStatus::InProgress;
        }
        if !task.status.can_transition_to(TaskStatus::Completed) {
            let status = task.status;
            active.insert(task.id.clone(), task);
            return Err(DispatchError::invalid_transition(
                status.as_str(),
                TaskStatus::Completed.as_str(),
            ));
        }

        task.status = TaskStatus::Completed;
        task.progress = 100;
        task.result = Some(result);
        task.completed_at = Some(Utc::now());
        drop(active);

        info!("任务 {} 已完成", task_id);
        self.persist(&task).await;
        self.archive(task.clone()).await;
        Ok(task)
    }

    /// 任务失败：任意非终态可进入 failed
    pub async fn fail(&self, task_id: &str, reason: &str) -> DispatchResult<Task> {
        let mut active = self.active.write().await;
        let mut task = active
            .remove(task_id)
            .ok_or_else(|| DispatchError::task_not_found(task_id))?;

        if !task.status.can_transition_to(TaskStatus::Failed) {
            let status = task.status;
            active.insert(task.id.clone(), task);
            return Err(DispatchError::invalid_transition(
                status.as_str(),
                TaskStatus::Failed.as_str(),
            ));
        }

        task.status = TaskStatus::Failed;
        task.failure_reason = Some(reason.to_string());
        task.completed_at = Some(Utc::now());
        drop(active);

        warn!("任务 {} 失败: {}", task_id, reason);
        self.persist(&task).await;
        self.archive(task.clone()).await;
        Ok(task)
    }

    /// 活跃任务查询，可按Worker过滤
    pub async fn active_tasks(&self, worker_id: Option<&str>) -> Vec<Task> {
        self.active
            .read()
            .await
            .values()
            .filter(|t| match worker_id {
                Some(w) => t.assigned_worker.as_deref() == Some(w),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// 已归档任务查询，最近的在前，可按Worker过滤并限制条数
    pub async fn completed_tasks(&self, worker_id: Option<&str>, limit: usize) -> Vec<Task> {
        self.completed
            .read()
            .await
            .iter()
            .rev()
            .filter(|t| match worker_id {
                Some(w) => t.assigned_worker.as_deref() == Some(w),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    async fn archive(&self, task: Task) {
        let mut completed = self.completed.write().await;
        if completed.len() == self.archive_limit {
            completed.pop_front();
        }
        completed.push_back(task);
    }

    /// 落盘单条任务记录；失败只记日志，不回滚内存状态
    async fn persist(&self, task: &Task) {
        let record = match serde_json::to_value(task) {
            Ok(record) => record,
            Err(e) => {
                warn!("任务 {} 序列化失败，跳过持久化: {}", task.id, e);
                return;
            }
        };
        if let Err(e) = self.persistence.save(&task.id, &record).await {
            warn!("任务 {} 持久化失败（不回滚内存状态）: {}", task.id, e);
        }
    }
}
