use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("安全校验失败: {0}")]
    SecurityValidation(String),
    #[error("没有可用的Worker节点: {reason}")]
    NoAvailableWorker { reason: String },
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },
    #[error("非法的任务状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("接收方忙: {id}")]
    ReceiverBusy { id: String },
    #[error("消息投递失败: {0}")]
    MessageDelivery(String),
    #[error("触发器未注册: {name}")]
    UnknownTrigger { name: String },
    #[error("会话已处于活跃状态: {id}")]
    SessionAlreadyActive { id: String },
    #[error("没有活跃的会话")]
    NoActiveSession,
    #[error("内部不变量被破坏: {0}")]
    InvariantViolation(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("持久化错误: {0}")]
    Persistence(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn security<S: Into<String>>(msg: S) -> Self {
        Self::SecurityValidation(msg.into())
    }
    pub fn no_available_worker<S: Into<String>>(reason: S) -> Self {
        Self::NoAvailableWorker {
            reason: reason.into(),
        }
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn invalid_transition<S: Into<String>>(from: S, to: S) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }
    pub fn receiver_busy<S: Into<String>>(id: S) -> Self {
        Self::ReceiverBusy { id: id.into() }
    }
    pub fn delivery<S: Into<String>>(msg: S) -> Self {
        Self::MessageDelivery(msg.into())
    }
    pub fn unknown_trigger<S: Into<String>>(name: S) -> Self {
        Self::UnknownTrigger { name: name.into() }
    }
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::InvariantViolation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 是否属于可按退避策略重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::ReceiverBusy { .. } | DispatchError::MessageDelivery(_)
        )
    }

    /// 是否属于程序缺陷级错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::InvariantViolation(_)
                | DispatchError::Internal(_)
                | DispatchError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::receiver_busy("worker-1").is_retryable());
        assert!(DispatchError::delivery("handler panicked").is_retryable());
        assert!(!DispatchError::validation("missing description").is_retryable());
        assert!(!DispatchError::no_available_worker("all busy").is_retryable());
        assert!(!DispatchError::task_not_found("task-1").is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DispatchError::invariant("负载为负数").is_fatal());
        assert!(!DispatchError::validation("bad input").is_fatal());
        assert!(!DispatchError::receiver_busy("worker-1").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = DispatchError::invalid_transition("completed", "in_progress");
        assert_eq!(err.to_string(), "非法的任务状态转换: completed -> in_progress");

        let err = DispatchError::unknown_trigger("security_alert");
        assert_eq!(err.to_string(), "触发器未注册: security_alert");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DispatchError = json_err.into();
        assert!(matches!(err, DispatchError::Serialization(_)));
    }
}
