use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use dispatch_core::traits::TaskPersistence;
use dispatch_core::DispatchResult;

/// 内存任务持久化实现
///
/// 适用于嵌入式部署与测试场景，每次写入只覆盖单条记录。
#[derive(Debug, Default)]
pub struct InMemoryTaskPersistence {
    records: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryTaskPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TaskPersistence for InMemoryTaskPersistence {
    async fn save(&self, task_id: &str, record: &serde_json::Value) -> DispatchResult<()> {
        debug!("保存任务记录: {}", task_id);
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
