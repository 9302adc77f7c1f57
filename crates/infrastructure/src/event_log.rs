use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use dispatch_core::traits::EventSink;

/// 基于 tracing 的结构化事件输出
///
/// 事件以结构化字段写入日志管道，核心对发送结果不做任何等待。
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &str, data: serde_json::Value) {
        info!(target: "dispatch::events", event = %event, data = %data, "事件");
    }
}

/// 捕获事件的内存实现，用于测试与嵌入式检视
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().await.clone()
    }

    /// 指定名称的事件数量
    pub async fn count(&self, event: &str) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn emit(&self, event: &str, data: serde_json::Value) {
        self.events
            .write()
            .await
            .push((event.to_string(), data));
    }
}
