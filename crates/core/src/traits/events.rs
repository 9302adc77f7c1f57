use async_trait::async_trait;

/// 结构化事件输出抽象接口
///
/// 对核心而言是 fire-and-forget：发送失败由实现方记录日志，
/// 不会回滚任何内存状态变更。
#[async_trait]
pub trait EventSink: Send + Sync {
    /// 发出一条结构化事件
    async fn emit(&self, event: &str, data: serde_json::Value);
}
