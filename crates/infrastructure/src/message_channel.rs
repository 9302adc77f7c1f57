use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use dispatch_core::config::MessagingConfig;
use dispatch_core::models::{MessageStatus, TaskMessage};
use dispatch_core::traits::{MessageChannel, MessageHandler};
use dispatch_core::{DispatchError, DispatchResult};

use crate::retry::RetryScheduler;

type ParticipantMap = HashMap<String, Arc<dyn MessageHandler>>;

/// 进程内消息通道
///
/// 单一逻辑队列，按到达顺序投递，优先级不改变投递顺序。
/// 首次投递在 send 内尝试；失败后的重试作为独立的延迟操作
/// 在后台运行，按 `backoff_ms * retry_count` 线性退避，
/// 不阻塞发送方。重试预算耗尽的消息进入终态 failed，
/// 之后不再有任何投递尝试。
pub struct InProcessMessageChannel {
    participants: Arc<RwLock<ParticipantMap>>,
    history: Arc<RwLock<VecDeque<TaskMessage>>>,
    retries: Arc<RetryScheduler>,
    config: MessagingConfig,
}

impl InProcessMessageChannel {
    pub fn new(config: MessagingConfig, retries: Arc<RetryScheduler>) -> Self {
        Self {
            participants: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(VecDeque::new())),
            retries,
            config,
        }
    }

    /// 注册一个消息参与方（Worker执行器或调度侧收件箱）
    pub async fn register_participant(
        &self,
        id: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) {
        let id = id.into();
        info!("注册消息参与方: {}", id);
        self.participants.write().await.insert(id, handler);
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.participants.read().await.contains_key(id)
    }

    /// 消息历史快照（有界，最旧的会被淘汰）
    pub async fn history(&self) -> Vec<TaskMessage> {
        self.history.read().await.iter().cloned().collect()
    }

    /// 按标识查询历史中的消息
    pub async fn message(&self, message_id: &str) -> Option<TaskMessage> {
        self.history
            .read()
            .await
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    async fn record_message(&self, message: &TaskMessage) {
        let mut history = self.history.write().await;
        if history.len() == self.config.history_limit {
            history.pop_front();
        }
        history.push_back(message.clone());
    }

    async fn update_history(
        history: &RwLock<VecDeque<TaskMessage>>,
        message_id: &str,
        status: MessageStatus,
        retry_count: u32,
    ) {
        let mut history = history.write().await;
        if let Some(entry) = history.iter_mut().find(|m| m.id == message_id) {
            entry.status = status;
            entry.retry_count = retry_count;
        }
    }

    /// 单次投递尝试
    async fn try_deliver(
        participants: &RwLock<ParticipantMap>,
        message: &TaskMessage,
    ) -> DispatchResult<()> {
        let handler = {
            let participants = participants.read().await;
            participants
                .get(&message.receiver)
                .cloned()
                .ok_or_else(|| {
                    DispatchError::delivery(format!("接收方 {} 已不存在", message.receiver))
                })?
        };

        if handler.is_busy() {
            return Err(DispatchError::receiver_busy(message.receiver.clone()));
        }

        handler.handle(message.clone()).await
    }

    /// 后台重试链：每次失败按线性退避安排下一次尝试，
    /// 预算耗尽后标记终态 failed
    async fn run_retry_chain(
        participants: Arc<RwLock<ParticipantMap>>,
        history: Arc<RwLock<VecDeque<TaskMessage>>>,
        backoff_ms: u64,
        mut message: TaskMessage,
    ) {
        loop {
            if message.is_retry_exhausted() {
                error!(
                    "消息 {} 投递失败，重试预算({})已用尽，进入终态",
                    message.id, message.max_retries
                );
                Self::update_history(
                    &history,
                    &message.id,
                    MessageStatus::Failed,
                    message.retry_count,
                )
                .await;
                return;
            }

            message.increment_retry();
            Self::update_history(
                &history,
                &message.id,
                MessageStatus::Retrying,
                message.retry_count,
            )
            .await;

            let delay = Duration::from_millis(backoff_ms * message.retry_count as u64);
            debug!(
                "消息 {} 第 {} 次重试，延迟 {:?}",
                message.id, message.retry_count, delay
            );
            sleep(delay).await;

            match Self::try_deliver(&participants, &message).await {
                Ok(()) => {
                    debug!("消息 {} 重试投递成功", message.id);
                    Self::update_history(
                        &history,
                        &message.id,
                        MessageStatus::Delivered,
                        message.retry_count,
                    )
                    .await;
                    return;
                }
                Err(e) => {
                    warn!("消息 {} 第 {} 次重试失败: {}", message.id, message.retry_count, e);
                }
            }
        }
    }
}

#[async_trait]
impl MessageChannel for InProcessMessageChannel {
    async fn send(&self, mut message: TaskMessage) -> DispatchResult<()> {
        if message.sender.is_empty() {
            return Err(DispatchError::validation("消息发送方不能为空"));
        }
        {
            let participants = self.participants.read().await;
            if !participants.contains_key(&message.sender) {
                return Err(DispatchError::validation(format!(
                    "消息发送方未注册: {}",
                    message.sender
                )));
            }
            if !participants.contains_key(&message.receiver) {
                return Err(DispatchError::validation(format!(
                    "消息接收方未注册: {}",
                    message.receiver
                )));
            }
        }

        message.status = MessageStatus::Processing;
        self.record_message(&message).await;

        match Self::try_deliver(&self.participants, &message).await {
            Ok(()) => {
                debug!(
                    "消息 {} ({}) 已投递: {} -> {}",
                    message.id,
                    message.kind.as_str(),
                    message.sender,
                    message.receiver
                );
                Self::update_history(
                    &self.history,
                    &message.id,
                    MessageStatus::Delivered,
                    message.retry_count,
                )
                .await;
                Ok(())
            }
            Err(e) => {
                warn!("消息 {} 首次投递失败: {}，转入后台重试", message.id, e);
                let participants = self.participants.clone();
                let history = self.history.clone();
                let backoff_ms = self.config.retry_backoff_ms;
                let scheduled = self
                    .retries
                    .schedule(Self::run_retry_chain(
                        participants,
                        history,
                        backoff_ms,
                        message.clone(),
                    ))
                    .await;
                if !scheduled {
                    // 调度器已关闭时按终态处理
                    Self::update_history(
                        &self.history,
                        &message.id,
                        MessageStatus::Failed,
                        message.retry_count,
                    )
                    .await;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::models::MessageKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// 记录收到消息次数的处理器，可配置前N次失败
    struct FlakyHandler {
        attempts: AtomicU32,
        fail_first: u32,
        busy: AtomicBool,
    }

    impl FlakyHandler {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                attempts: AtomicU32::new(0),
                fail_first,
                busy: AtomicBool::new(false),
            })
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        async fn handle(&self, _message: TaskMessage) -> DispatchResult<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                Err(DispatchError::delivery(format!("第 {attempt} 次处理失败")))
            } else {
                Ok(())
            }
        }

        fn is_busy(&self) -> bool {
            self.busy.load(Ordering::SeqCst)
        }
    }

    fn test_config(backoff_ms: u64) -> MessagingConfig {
        MessagingConfig {
            max_retries: 3,
            retry_backoff_ms: backoff_ms,
            history_limit: 100,
        }
    }

    async fn channel_with(
        backoff_ms: u64,
        handlers: Vec<(&str, Arc<dyn MessageHandler>)>,
    ) -> InProcessMessageChannel {
        let channel = InProcessMessageChannel::new(test_config(backoff_ms), RetryScheduler::new());
        for (id, handler) in handlers {
            channel.register_participant(id, handler).await;
        }
        channel
    }

    #[tokio::test]
    async fn test_successful_delivery() {
        let handler = FlakyHandler::new(0);
        let channel = channel_with(10, vec![("worker-1", handler.clone() as _), ("dispatcher", FlakyHandler::new(0) as _)]).await;

        let message = TaskMessage::new(
            "dispatcher",
            "worker-1",
            MessageKind::Assignment,
            json!({"task_id": "task-1"}),
        );
        let id = message.id.clone();
        channel.send(message).await.unwrap();

        assert_eq!(handler.attempts(), 1);
        let recorded = channel.message(&id).await.unwrap();
        assert_eq!(recorded.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn test_unregistered_receiver_is_rejected() {
        let channel = channel_with(10, vec![("dispatcher", FlakyHandler::new(0) as _)]).await;

        let message = TaskMessage::new("dispatcher", "ghost", MessageKind::Error, json!({}));
        let result = channel.send(message).await;
        assert!(matches!(result, Err(DispatchError::Validation(_))));
        // 验证失败的消息不进入历史
        assert!(channel.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_sender_is_rejected() {
        let channel = channel_with(10, vec![("worker-1", FlakyHandler::new(0) as _)]).await;

        let message = TaskMessage::new("ghost", "worker-1", MessageKind::Completion, json!({}));
        assert!(matches!(
            channel.send(message).await,
            Err(DispatchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let handler = FlakyHandler::new(2);
        let channel = channel_with(10, vec![("worker-1", handler.clone() as _), ("dispatcher", FlakyHandler::new(0) as _)]).await;

        let message = TaskMessage::new("dispatcher", "worker-1", MessageKind::Assignment, json!({}));
        let id = message.id.clone();
        channel.send(message).await.unwrap();

        // 首次失败 + 两次重试（10ms、20ms 退避）后成功
        sleep(Duration::from_millis(200)).await;
        assert_eq!(handler.attempts(), 3);
        let recorded = channel.message(&id).await.unwrap();
        assert_eq!(recorded.status, MessageStatus::Delivered);
        assert_eq!(recorded.retry_count, 2);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_is_terminal() {
        let handler = FlakyHandler::new(u32::MAX);
        let channel = channel_with(10, vec![("worker-1", handler.clone() as _), ("dispatcher", FlakyHandler::new(0) as _)]).await;

        let message = TaskMessage::new("dispatcher", "worker-1", MessageKind::Assignment, json!({}))
            .with_max_retries(3);
        let id = message.id.clone();
        channel.send(message).await.unwrap();

        sleep(Duration::from_millis(300)).await;
        // 首次投递 + 3次重试，之后不再有任何尝试
        assert_eq!(handler.attempts(), 4);
        let recorded = channel.message(&id).await.unwrap();
        assert_eq!(recorded.status, MessageStatus::Failed);
        assert_eq!(recorded.retry_count, 3);

        // 再等一个退避周期，确认没有第5次尝试
        sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.attempts(), 4);
    }

    #[tokio::test]
    async fn test_busy_receiver_triggers_retry() {
        let handler = FlakyHandler::new(0);
        handler.busy.store(true, Ordering::SeqCst);
        let channel = channel_with(10, vec![("worker-1", handler.clone() as _), ("dispatcher", FlakyHandler::new(0) as _)]).await;

        let message = TaskMessage::new("dispatcher", "worker-1", MessageKind::Assignment, json!({}));
        let id = message.id.clone();
        channel.send(message).await.unwrap();

        // 忙碌期间没有任何处理调用
        assert_eq!(handler.attempts(), 0);

        handler.busy.store(false, Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;

        assert_eq!(handler.attempts(), 1);
        let recorded = channel.message(&id).await.unwrap();
        assert_eq!(recorded.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = MessagingConfig {
            max_retries: 3,
            retry_backoff_ms: 10,
            history_limit: 3,
        };
        let channel = InProcessMessageChannel::new(config, RetryScheduler::new());
        channel
            .register_participant("dispatcher", FlakyHandler::new(0) as _)
            .await;
        channel
            .register_participant("worker-1", FlakyHandler::new(0) as _)
            .await;

        for i in 0..5 {
            let message = TaskMessage::new(
                "dispatcher",
                "worker-1",
                MessageKind::StatusUpdate,
                json!({"seq": i}),
            );
            channel.send(message).await.unwrap();
        }

        let history = channel.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].payload["seq"], 2);
        assert_eq!(history[2].payload["seq"], 4);
    }
}
