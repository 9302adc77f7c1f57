use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务类型
///
/// 闭合枚举，提交时必须属于其中之一。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Development,
    BugFix,
    Feature,
    Performance,
    Security,
    Testing,
    Documentation,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Development => "development",
            TaskType::BugFix => "bug_fix",
            TaskType::Feature => "feature",
            TaskType::Performance => "performance",
            TaskType::Security => "security",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
        }
    }

    /// 从字符串解析任务类型，未知类型返回 None
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "development" => Some(TaskType::Development),
            "bug_fix" => Some(TaskType::BugFix),
            "feature" => Some(TaskType::Feature),
            "performance" => Some(TaskType::Performance),
            "security" => Some(TaskType::Security),
            "testing" => Some(TaskType::Testing),
            "documentation" => Some(TaskType::Documentation),
            _ => None,
        }
    }
}

/// 紧急程度声明
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// 复杂度声明
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// 任务状态
///
/// 生命周期: pending -> assigned -> in_progress -> completed，
/// 任意非终态可以转入 failed。pending 是唯一初始状态，
/// completed/failed 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 状态机校验：当前状态是否允许转换到目标状态
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        match (self, target) {
            (TaskStatus::Pending, TaskStatus::Assigned) => true,
            (TaskStatus::Assigned, TaskStatus::InProgress) => true,
            (TaskStatus::InProgress, TaskStatus::Completed) => true,
            (from, TaskStatus::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// 任务提交载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: TaskType,
    pub description: String,
    pub requirements: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskSpec {
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            task_type,
            description: description.into(),
            requirements: Vec::new(),
            urgency: Urgency::default(),
            complexity: Complexity::default(),
            dependencies: Vec::new(),
            tags: Vec::new(),
        }
    }
    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// 进度检查点，只追加不修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub progress: u8,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// 任务记录
///
/// 由 Dispatcher 在提交时创建，经由状态机推进生命周期，
/// 进入终态后归档到已完成集合。
///
/// - `id`: 时间戳加随机后缀生成的唯一标识
/// - `priority`: 打分引擎计算的优先级，1..=10
/// - `progress`: 进度百分比，正常操作下单调不减
/// - `checkpoints`: 进度更新附带说明时追加的检查点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub description: String,
    pub requirements: Vec<String>,
    pub urgency: Urgency,
    pub complexity: Complexity,
    pub priority: u8,
    pub status: TaskStatus,
    pub assigned_worker: Option<String>,
    pub progress: u8,
    pub checkpoints: Vec<Checkpoint>,
    pub dependencies: Vec<String>,
    pub tags: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// 从提交载荷创建 pending 状态的任务记录
    pub fn new(spec: TaskSpec, priority: u8) -> Self {
        Self {
            id: Self::generate_id(),
            task_type: spec.task_type,
            description: spec.description,
            requirements: spec.requirements,
            urgency: spec.urgency,
            complexity: spec.complexity,
            priority,
            status: TaskStatus::Pending,
            assigned_worker: None,
            progress: 0,
            checkpoints: Vec::new(),
            dependencies: spec.dependencies,
            tags: spec.tags,
            result: None,
            failure_reason: None,
            created_at: Utc::now(),
            assigned_at: None,
            completed_at: None,
        }
    }

    /// 生成时间加随机后缀的任务标识
    fn generate_id() -> String {
        let millis = Utc::now().timestamp_millis();
        let suffix: u16 = rand::random();
        format!("task-{millis}-{suffix:04x}")
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 任务是否处于可更新进度的阶段
    pub fn accepts_progress(&self) -> bool {
        matches!(self.status, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    /// 从分配到完成的耗时（秒）；未分配或未完成返回 None
    pub fn completion_duration_seconds(&self) -> Option<f64> {
        let assigned = self.assigned_at?;
        let completed = self.completed_at?;
        Some((completed - assigned).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_parse_roundtrip() {
        for ty in [
            TaskType::Development,
            TaskType::BugFix,
            TaskType::Feature,
            TaskType::Performance,
            TaskType::Security,
            TaskType::Testing,
            TaskType::Documentation,
        ] {
            assert_eq!(TaskType::parse_str(ty.as_str()), Some(ty));
        }
        assert_eq!(TaskType::parse_str("deployment"), None);
        assert_eq!(TaskType::parse_str(""), None);
    }

    #[test]
    fn test_status_transitions_follow_state_machine() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Assigned));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));

        // 任意非终态可以失败
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failed));

        // 乱序转换被拒绝
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Assigned.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Assigned));
    }

    #[test]
    fn test_new_task_starts_pending() {
        let spec = TaskSpec::new(TaskType::BugFix, "修复登录超时")
            .with_requirements(vec!["定位超时原因".to_string()]);
        let task = Task::new(spec, 6);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 6);
        assert_eq!(task.progress, 0);
        assert!(task.assigned_worker.is_none());
        assert!(task.checkpoints.is_empty());
        assert!(task.id.starts_with("task-"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: Vec<String> = (0..64)
            .map(|_| Task::new(TaskSpec::new(TaskType::Testing, "t"), 1).id)
            .collect();
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_completion_duration() {
        let mut task = Task::new(TaskSpec::new(TaskType::Feature, "导出报表"), 5);
        assert_eq!(task.completion_duration_seconds(), None);

        let assigned = Utc::now();
        task.assigned_at = Some(assigned);
        task.completed_at = Some(assigned + chrono::Duration::seconds(90));
        assert_eq!(task.completion_duration_seconds(), Some(90.0));
    }

    #[test]
    fn test_task_serialization_uses_snake_case() {
        let task = Task::new(TaskSpec::new(TaskType::BugFix, "空指针"), 8);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task_type"], "bug_fix");
        assert_eq!(json["status"], "pending");
    }
}
