use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use dispatch_core::models::{WorkerInfo, WorkerRegistration};
use dispatch_core::{DispatchError, DispatchResult};

use crate::scoring;

struct RegistryState {
    workers: HashMap<String, WorkerInfo>,
    /// 注册顺序，用于确定性的平局裁决
    order: Vec<String>,
}

/// Worker注册表
///
/// 显式的服务结构体，按句柄传递给各组件，不使用全局单例。
/// 所有容量记账都经由同一把写锁串行化：选择与预占在一次
/// 加锁内完成，并发提交不会在容量上竞争。
pub struct WorkerRegistry {
    state: RwLock<RegistryState>,
    symmetric_decay: bool,
}

impl WorkerRegistry {
    pub fn new(symmetric_decay: bool) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                workers: HashMap::new(),
                order: Vec::new(),
            }),
            symmetric_decay,
        }
    }

    /// 注册一个Worker；名称重复或容量为0会被拒绝
    pub async fn register(&self, registration: WorkerRegistration) -> DispatchResult<()> {
        if registration.name.is_empty() {
            return Err(DispatchError::validation("Worker名称不能为空"));
        }
        if registration.capacity == 0 {
            return Err(DispatchError::validation(format!(
                "Worker {} 的容量必须不小于1",
                registration.name
            )));
        }

        let mut state = self.state.write().await;
        if state.workers.contains_key(&registration.name) {
            return Err(DispatchError::validation(format!(
                "Worker名称已存在: {}",
                registration.name
            )));
        }

        let name = registration.name.clone();
        info!(
            "注册Worker: {} (容量: {}, 专长: {:?})",
            name, registration.capacity, registration.specializations
        );
        state.workers.insert(name.clone(), WorkerInfo::new(registration));
        state.order.push(name);
        Ok(())
    }

    pub async fn is_available(&self, worker_id: &str) -> DispatchResult<bool> {
        let state = self.state.read().await;
        state
            .workers
            .get(worker_id)
            .map(|w| w.is_available())
            .ok_or_else(|| DispatchError::worker_not_found(worker_id))
    }

    /// 在一次加锁内完成选择与容量预占
    ///
    /// 过滤可用Worker，按适配度取最大值，平局按注册顺序
    /// （先注册者胜）。没有可用Worker时返回 NoAvailableWorker，
    /// 不做任何自动重试或排队。
    pub async fn select_and_reserve(
        &self,
        keywords: &[String],
        priority: u8,
    ) -> DispatchResult<String> {
        let mut state = self.state.write().await;

        let mut best: Option<(String, f64)> = None;
        for name in &state.order {
            let worker = &state.workers[name];
            if !worker.is_available() {
                continue;
            }
            let score = scoring::fitness(worker, keywords, priority);
            debug!("Worker {} 适配度: {:.3}", name, score);
            // 严格大于才替换，平局保留先注册者
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((name.clone(), score));
            }
        }

        let (selected, score) = best.ok_or_else(|| {
            DispatchError::no_available_worker("所有Worker不可用或已满载")
        })?;

        let worker = state
            .workers
            .get_mut(&selected)
            .expect("选中的Worker必然存在");
        worker.current_load += 1;

        debug!(
            "选择Worker {} (适配度 {:.3}, 负载 {}/{})",
            selected, score, worker.current_load, worker.capacity
        );
        Ok(selected)
    }

    /// 预占一个容量槽位；超出容量属于记账缺陷而非正常失败
    pub async fn reserve(&self, worker_id: &str) -> DispatchResult<()> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DispatchError::worker_not_found(worker_id))?;

        if worker.current_load >= worker.capacity {
            error!(
                "容量记账被破坏: Worker {} 负载 {} 已达容量 {}，拒绝预占",
                worker_id, worker.current_load, worker.capacity
            );
            return Err(DispatchError::invariant(format!(
                "Worker {worker_id} 负载即将超出容量"
            )));
        }
        worker.current_load += 1;
        Ok(())
    }

    /// 释放一个容量槽位；负载降为负数属于记账缺陷
    pub async fn release(&self, worker_id: &str) -> DispatchResult<()> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DispatchError::worker_not_found(worker_id))?;

        if worker.current_load == 0 {
            error!(
                "容量记账被破坏: Worker {} 负载已为0，拒绝再次释放",
                worker_id
            );
            return Err(DispatchError::invariant(format!(
                "Worker {worker_id} 负载即将为负数"
            )));
        }
        worker.current_load -= 1;
        Ok(())
    }

    /// 记录一次任务完成，更新滚动性能统计
    pub async fn record_completion(
        &self,
        worker_id: &str,
        duration_seconds: f64,
        succeeded: bool,
    ) -> DispatchResult<()> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DispatchError::worker_not_found(worker_id))?;
        worker
            .performance
            .record(duration_seconds, succeeded, self.symmetric_decay);
        Ok(())
    }

    /// 更新Worker可用性标记（由 status_update 消息驱动）
    pub async fn set_availability(&self, worker_id: &str, available: bool) -> DispatchResult<()> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DispatchError::worker_not_found(worker_id))?;
        if worker.available != available {
            info!("Worker {} 可用性变更为 {}", worker_id, available);
        }
        worker.available = available;
        Ok(())
    }

    /// 全部Worker的快照，按注册顺序
    pub async fn overview(&self) -> Vec<WorkerInfo> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .map(|name| state.workers[name].clone())
            .collect()
    }

    pub async fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.state.read().await.workers.get(worker_id).cloned()
    }

    pub async fn worker_count(&self) -> usize {
        self.state.read().await.workers.len()
    }

    /// 会话结束时把所有负载清零
    pub async fn reset_loads(&self) {
        let mut state = self.state.write().await;
        for worker in state.workers.values_mut() {
            if worker.current_load > 0 {
                warn!(
                    "会话结束时Worker {} 仍有 {} 个在途任务，负载清零",
                    worker.id, worker.current_load
                );
            }
            worker.current_load = 0;
        }
    }
}
