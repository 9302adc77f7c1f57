use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 消息类型，闭合枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Assignment,
    Completion,
    DataRequest,
    DataResponse,
    StatusUpdate,
    Error,
    PerformanceReport,
    SecurityAlert,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Assignment => "assignment",
            MessageKind::Completion => "completion",
            MessageKind::DataRequest => "data_request",
            MessageKind::DataResponse => "data_response",
            MessageKind::StatusUpdate => "status_update",
            MessageKind::Error => "error",
            MessageKind::PerformanceReport => "performance_report",
            MessageKind::SecurityAlert => "security_alert",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "assignment" => Some(MessageKind::Assignment),
            "completion" => Some(MessageKind::Completion),
            "data_request" => Some(MessageKind::DataRequest),
            "data_response" => Some(MessageKind::DataResponse),
            "status_update" => Some(MessageKind::StatusUpdate),
            "error" => Some(MessageKind::Error),
            "performance_report" => Some(MessageKind::PerformanceReport),
            "security_alert" => Some(MessageKind::SecurityAlert),
            _ => None,
        }
    }
}

/// 消息优先级
///
/// 只参与任务打分语义，不改变投递顺序（投递按到达顺序 FIFO）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// 消息投递状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Delivered,
    Retrying,
    Failed,
}

/// 组件间传递的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub priority: MessagePriority,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            kind,
            payload,
            priority: MessagePriority::default(),
            status: MessageStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// 重试预算是否已用尽
    pub fn is_retry_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_defaults() {
        let message = TaskMessage::new(
            "dispatcher",
            "worker-1",
            MessageKind::Assignment,
            json!({"task_id": "task-1"}),
        );

        assert!(!message.id.is_empty());
        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(message.retry_count, 0);
        assert_eq!(message.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(message.priority, MessagePriority::Normal);
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            MessageKind::Assignment,
            MessageKind::Completion,
            MessageKind::DataRequest,
            MessageKind::DataResponse,
            MessageKind::StatusUpdate,
            MessageKind::Error,
            MessageKind::PerformanceReport,
            MessageKind::SecurityAlert,
        ] {
            assert_eq!(MessageKind::parse_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse_str("heartbeat"), None);
    }

    #[test]
    fn test_retry_exhaustion() {
        let mut message =
            TaskMessage::new("a", "b", MessageKind::Completion, json!({})).with_max_retries(3);

        assert!(!message.is_retry_exhausted());
        message.increment_retry();
        message.increment_retry();
        assert!(!message.is_retry_exhausted());
        message.increment_retry();
        assert_eq!(message.retry_count, 3);
        assert!(message.is_retry_exhausted());
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let original = TaskMessage::new(
            "worker-2",
            "dispatcher",
            MessageKind::SecurityAlert,
            json!({"violation": "sql injection"}),
        )
        .with_priority(MessagePriority::Critical)
        .with_max_retries(1);

        let json_str = original.serialize().expect("serialize failed");
        let restored = TaskMessage::deserialize(&json_str).expect("deserialize failed");

        assert_eq!(restored.id, original.id);
        assert_eq!(restored.kind, MessageKind::SecurityAlert);
        assert_eq!(restored.priority, MessagePriority::Critical);
        assert_eq!(restored.max_retries, 1);
    }
}
