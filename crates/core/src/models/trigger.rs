use serde::{Deserialize, Serialize};

/// 触发规则优先级类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl TriggerPriority {
    /// 各优先级类别的默认重试预算
    pub fn default_max_retries(&self) -> u32 {
        match self {
            TriggerPriority::Critical => 1,
            TriggerPriority::High => 2,
            TriggerPriority::Normal => 3,
            TriggerPriority::Low => 1,
        }
    }
}

/// 触发规则执行结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TriggerOutcome {
    /// 条件满足且动作执行成功
    Completed { value: serde_json::Value },
    /// 条件不满足，中性结果而非错误
    ConditionNotMet,
    /// 动作失败，已安排延迟重试
    RetryScheduled { attempt: u32 },
}
