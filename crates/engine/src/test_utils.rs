pub mod mocks {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use dispatch_core::models::TaskMessage;
    use dispatch_core::traits::{EventSink, MessageChannel, TaskPersistence};
    use dispatch_core::{DispatchError, DispatchResult};

    /// 计数的内存持久化Mock
    #[derive(Default)]
    pub struct MockPersistence {
        records: RwLock<HashMap<String, serde_json::Value>>,
    }

    impl MockPersistence {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn saved_count(&self) -> usize {
            self.records.read().await.len()
        }
    }

    #[async_trait]
    impl TaskPersistence for MockPersistence {
        async fn save(&self, task_id: &str, record: &serde_json::Value) -> DispatchResult<()> {
            self.records
                .write()
                .await
                .insert(task_id.to_string(), record.clone());
            Ok(())
        }

        async fn load(&self, task_id: &str) -> DispatchResult<Option<serde_json::Value>> {
            Ok(self.records.read().await.get(task_id).cloned())
        }
    }

    /// 总是失败的持久化Mock，验证至少一次语义
    pub struct FailingPersistence;

    #[async_trait]
    impl TaskPersistence for FailingPersistence {
        async fn save(&self, _task_id: &str, _record: &serde_json::Value) -> DispatchResult<()> {
            Err(DispatchError::Persistence("磁盘不可写".to_string()))
        }

        async fn load(&self, _task_id: &str) -> DispatchResult<Option<serde_json::Value>> {
            Err(DispatchError::Persistence("磁盘不可读".to_string()))
        }
    }

    /// 捕获事件的Mock
    #[derive(Default)]
    pub struct MockEventSink {
        events: RwLock<Vec<(String, serde_json::Value)>>,
    }

    impl MockEventSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn events(&self) -> Vec<(String, serde_json::Value)> {
            self.events.read().await.clone()
        }

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
    impl EventSink for MockEventSink {
        async fn emit(&self, event: &str, data: serde_json::Value) {
            self.events.write().await.push((event.to_string(), data));
        }
    }

    /// 记录发送消息的通道Mock
    #[derive(Default)]
    pub struct MockChannel {
        sent: RwLock<Vec<TaskMessage>>,
    }

    impl MockChannel {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub async fn sent(&self) -> Vec<TaskMessage> {
            self.sent.read().await.clone()
        }

        pub async fn sent_count(&self) -> usize {
            self.sent.read().await.len()
        }
    }

    #[async_trait]
    impl MessageChannel for MockChannel {
        async fn send(&self, message: TaskMessage) -> DispatchResult<()> {
            self.sent.write().await.push(message);
            Ok(())
        }
    }
}
