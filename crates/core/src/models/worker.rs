use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 性能滚动窗口大小
pub const PERFORMANCE_WINDOW_SIZE: usize = 10;

/// Worker注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub name: String,
    pub capacity: u32,
    pub specializations: Vec<String>,
}

impl WorkerRegistration {
    pub fn new(name: impl Into<String>, capacity: u32, specializations: Vec<String>) -> Self {
        Self {
            name: name.into(),
            capacity,
            specializations,
        }
    }
}

/// Worker性能滚动统计
///
/// 保留最近若干次完成耗时，成功率按指数移动平均更新。
/// 默认与来源实现保持一致：成功时 `rate = rate*0.9 + 0.1`，
/// 失败时不变；`symmetric` 开启后失败按 `rate*0.9` 衰减。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub recent_durations: VecDeque<f64>,
    pub average_duration_seconds: f64,
    pub success_rate: f64,
    pub completed: u64,
    pub failed: u64,
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self {
            recent_durations: VecDeque::with_capacity(PERFORMANCE_WINDOW_SIZE),
            average_duration_seconds: 0.0,
            success_rate: 1.0,
            completed: 0,
            failed: 0,
        }
    }
}

impl PerformanceWindow {
    /// 记录一次任务完成
    pub fn record(&mut self, duration_seconds: f64, succeeded: bool, symmetric: bool) {
        if self.recent_durations.len() == PERFORMANCE_WINDOW_SIZE {
            self.recent_durations.pop_front();
        }
        self.recent_durations.push_back(duration_seconds);
        self.average_duration_seconds =
            self.recent_durations.iter().sum::<f64>() / self.recent_durations.len() as f64;

        if succeeded {
            self.completed += 1;
            self.success_rate = self.success_rate * 0.9 + 0.1;
        } else {
            self.failed += 1;
            if symmetric {
                self.success_rate *= 0.9;
            }
        }
    }

    /// 实际完成比例，无样本时返回 1.0
    pub fn completion_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            1.0
        } else {
            self.completed as f64 / total as f64
        }
    }
}

/// Worker节点信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub capacity: u32,
    pub specializations: Vec<String>,
    pub current_load: u32,
    pub available: bool,
    pub performance: PerformanceWindow,
    pub registered_at: DateTime<Utc>,
}

impl WorkerInfo {
    /// 从注册请求创建Worker信息
    pub fn new(registration: WorkerRegistration) -> Self {
        Self {
            id: registration.name,
            capacity: registration.capacity,
            specializations: registration.specializations,
            current_load: 0,
            available: true,
            performance: PerformanceWindow::default(),
            registered_at: Utc::now(),
        }
    }

    /// 检查Worker是否可以接受新任务
    pub fn is_available(&self) -> bool {
        self.available && self.current_load < self.capacity
    }

    /// 归一化的剩余容量，0.0..=1.0
    pub fn spare_capacity_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.capacity - self.current_load) as f64 / self.capacity as f64
        }
    }
}
