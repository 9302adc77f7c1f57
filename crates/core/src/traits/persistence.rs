use async_trait::async_trait;

use crate::DispatchResult;

/// 任务记录持久化抽象接口
///
/// 核心只依赖这一收窄的能力：按任务标识写入/读取一条记录。
/// 每次调用只覆盖单条记录的写入，不持有长锁。
#[async_trait]
pub trait TaskPersistence: Send + Sync {
    /// 保存任务记录
    async fn save(&self, task_id: &str, record: &serde_json::Value) -> DispatchResult<()>;

    /// 读取任务记录，不存在时返回 None
    async fn load(&self, task_id: &str) -> DispatchResult<Option<serde_json::Value>>;
}
