use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// 安全/性能审计记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub detail: serde_json::Value,
}

impl AuditRecord {
    pub fn new(category: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            category: category.into(),
            detail,
        }
    }
}

/// 一次系统运行的会话记录
///
/// 聚合运行期间的成功/错误/触发计数，并维护有界的审计轨迹。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub successes: u64,
    pub errors: u64,
    pub triggers_fired: u64,
    pub audit_trail: VecDeque<AuditRecord>,
    pub audit_limit: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(audit_limit: usize) -> Self {
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            status: SessionStatus::Active,
            successes: 0,
            errors: 0,
            triggers_fired: 0,
            audit_trail: VecDeque::new(),
            audit_limit,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// 追加审计记录，超出上限时丢弃最旧的
    pub fn push_audit(&mut self, record: AuditRecord) {
        if self.audit_limit > 0 && self.audit_trail.len() == self.audit_limit {
            self.audit_trail.pop_front();
        }
        self.audit_trail.push_back(record);
    }

    /// 成功率，无任何事件时为 0（显式规避除零）
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.errors;
        if total == 0 {
            0.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    /// 结束会话，打上结束时间戳
    pub fn close(&mut self) {
        self.status = SessionStatus::Ended;
        self.ended_at = Some(Utc::now());
    }
}

/// 会话状态汇总，`SessionTracker::status` 的返回值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOverview {
    pub active: bool,
    pub session_id: Option<String>,
    pub successes: u64,
    pub errors: u64,
    pub triggers_fired: u64,
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_session_is_active_with_zero_counters() {
        let session = Session::new(50);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.successes, 0);
        assert_eq!(session.errors, 0);
        assert_eq!(session.triggers_fired, 0);
        assert!(session.ended_at.is_none());
        assert!(session.id.starts_with("session-"));
    }

    #[test]
    fn test_success_rate_is_zero_without_events() {
        let session = Session::new(50);
        // 不能是 NaN，也不能报错
        assert_eq!(session.success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate_calculation() {
        let mut session = Session::new(50);
        session.successes = 3;
        session.errors = 1;
        assert_eq!(session.success_rate(), 0.75);
    }

    #[test]
    fn test_audit_trail_is_bounded() {
        let mut session = Session::new(3);
        for i in 0..5 {
            session.push_audit(AuditRecord::new("security", json!({"seq": i})));
        }
        assert_eq!(session.audit_trail.len(), 3);
        // 保留的是最近3条
        assert_eq!(session.audit_trail.front().unwrap().detail["seq"], 2);
        assert_eq!(session.audit_trail.back().unwrap().detail["seq"], 4);
    }

    #[test]
    fn test_close_stamps_end_time() {
        let mut session = Session::new(50);
        session.close();
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(session.ended_at.is_some());
    }
}
