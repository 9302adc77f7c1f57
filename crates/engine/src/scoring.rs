use dispatch_core::models::{Complexity, TaskSpec, TaskType, Urgency, WorkerInfo};
use dispatch_core::{DispatchError, DispatchResult};

/// 无状态打分引擎：任务优先级与Worker适配度的纯函数计算。

/// 基础优先级标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasePriority {
    Critical,
    High,
    Normal,
    Low,
    Minimal,
}

impl BasePriority {
    /// 标签到基础分值的映射
    pub fn score(&self) -> i32 {
        match self {
            BasePriority::Critical => 8,
            BasePriority::High => 6,
            BasePriority::Normal => 4,
            BasePriority::Low => 2,
            BasePriority::Minimal => 1,
        }
    }

    pub fn parse_str(s: &str) -> DispatchResult<Self> {
        match s {
            "critical" => Ok(BasePriority::Critical),
            "high" => Ok(BasePriority::High),
            "normal" => Ok(BasePriority::Normal),
            "low" => Ok(BasePriority::Low),
            "minimal" => Ok(BasePriority::Minimal),
            other => Err(DispatchError::validation(format!(
                "未知的基础优先级: {other}"
            ))),
        }
    }
}

/// 任务类型的固定优先级修正
fn type_adjustment(task_type: TaskType) -> i32 {
    match task_type {
        TaskType::BugFix => 2,
        TaskType::Security => 3,
        TaskType::Documentation => -2,
        TaskType::Feature => 1,
        TaskType::Performance => 1,
        TaskType::Development | TaskType::Testing => 0,
    }
}

/// 计算任务优先级，结果限制在 [1,10]
///
/// 基础分 + 类型修正 + 紧急度加成（high +2 / medium +1）
/// + 复杂度加成（high +1）。确定性纯函数。
pub fn compute_priority(spec: &TaskSpec, base: BasePriority) -> u8 {
    let mut score = base.score() + type_adjustment(spec.task_type);

    score += match spec.urgency {
        Urgency::High => 2,
        Urgency::Medium => 1,
        Urgency::Low => 0,
    };
    if spec.complexity == Complexity::High {
        score += 1;
    }

    score.clamp(1, 10) as u8
}

/// 从任务描述与类型提取匹配关键词
///
/// 取长度不小于4的小写字母数字词，附加任务类型标识；
/// 提取结果为空时回退到单个通用关键词。
pub fn extract_keywords(description: &str, task_type: TaskType) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in description
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
    {
        let word = word.to_lowercase();
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }

    if keywords.is_empty() {
        keywords.push("general".to_string());
    }

    let type_token = task_type.as_str().to_string();
    if !keywords.contains(&type_token) {
        keywords.push(type_token);
    }
    keywords
}

/// 计算Worker对任务的适配度
///
/// 加权和：专长重合率 *3 + 归一化剩余容量 *2 + 成功率 *2；
/// 优先级不低于7时叠加完成率加成，倾向把紧急任务交给有
/// 经验的Worker。基于当前注册表快照的纯函数。
pub fn fitness(worker: &WorkerInfo, keywords: &[String], priority: u8) -> f64 {
    let overlap = if keywords.is_empty() {
        0.0
    } else {
        let matched = keywords
            .iter()
            .filter(|k| {
                worker
                    .specializations
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(k))
            })
            .count();
        matched as f64 / keywords.len() as f64
    };

    let mut score = overlap * 3.0
        + worker.spare_capacity_ratio() * 2.0
        + worker.performance.success_rate * 2.0;

    if priority >= 7 {
        score += worker.performance.completion_rate();
    }

    score
}
