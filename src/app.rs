use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use dispatch_core::models::{Session, WorkerRegistration};
use dispatch_core::traits::{EventSink, MessageHandler, TaskPersistence};
use dispatch_core::{AppConfig, DispatchResult};
use dispatch_engine::dispatcher::DISPATCHER_ID;
use dispatch_engine::{
    register_builtin_rules, DispatcherInbox, SessionTracker, TaskDispatcher, TaskLifecycleStore,
    TriggerEngine, WorkerRegistry,
};
use dispatch_infrastructure::{
    InMemoryTaskPersistence, InProcessMessageChannel, RetryScheduler, TracingEventSink,
};

/// 初始化日志管道，RUST_LOG 控制过滤
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// 嵌入式任务分发系统
///
/// 一次构造出全部组件并以句柄互联：注册表、任务存储、消息
/// 通道、调度器、触发引擎与会话跟踪。没有全局单例，组件间
/// 全部走显式组合。一次实例对应一次系统运行。
pub struct DispatchSystem {
    registry: Arc<WorkerRegistry>,
    store: Arc<TaskLifecycleStore>,
    channel: Arc<InProcessMessageChannel>,
    dispatcher: Arc<TaskDispatcher>,
    triggers: Arc<TriggerEngine>,
    session: Arc<SessionTracker>,
    retries: Arc<RetryScheduler>,
}

impl DispatchSystem {
    /// 使用内存持久化与日志事件输出构建系统
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryTaskPersistence::new()),
            Arc::new(TracingEventSink::new()),
        )
        .await
    }

    /// 注入外部协作方（持久化与事件输出）构建系统
    pub async fn with_collaborators(
        config: AppConfig,
        persistence: Arc<dyn TaskPersistence>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        info!("初始化任务分发系统");

        let retries = RetryScheduler::new();
        let channel = Arc::new(InProcessMessageChannel::new(
            config.messaging.clone(),
            retries.clone(),
        ));
        let registry = Arc::new(WorkerRegistry::new(
            config.dispatcher.symmetric_success_decay,
        ));
        let store = Arc::new(TaskLifecycleStore::new(
            persistence,
            config.dispatcher.completed_archive_limit,
        ));
        let session = Arc::new(SessionTracker::new(&config.session));

        let dispatcher = Arc::new(TaskDispatcher::new(
            registry.clone(),
            store.clone(),
            channel.clone(),
            events,
            session.clone(),
            config.messaging.max_retries,
        ));

        let triggers = Arc::new(TriggerEngine::new(
            session.clone(),
            retries.clone(),
            config.messaging.retry_backoff_ms,
        ));
        register_builtin_rules(
            &triggers,
            dispatcher.clone(),
            channel.clone(),
            session.clone(),
        )
        .await?;

        // 调度侧收件箱作为消息参与方接入通道
        channel
            .register_participant(DISPATCHER_ID, Arc::new(DispatcherInbox::new(registry.clone())))
            .await;

        Ok(Self {
            registry,
            store,
            channel,
            dispatcher,
            triggers,
            session,
            retries,
        })
    }

    /// 注册一个Worker：进入注册表并接入消息通道
    pub async fn register_worker(
        &self,
        registration: WorkerRegistration,
        handler: Arc<dyn MessageHandler>,
    ) -> DispatchResult<()> {
        let name = registration.name.clone();
        self.registry.register(registration).await?;
        self.channel.register_participant(name, handler).await;
        Ok(())
    }

    /// 开启一次运行会话
    pub async fn start(&self) -> DispatchResult<String> {
        self.session.start().await
    }

    /// 结束当前运行
    ///
    /// 会话归档，未完成的延迟重试被确定性丢弃，Worker负载清零。
    /// 系统实例对应一次运行；再次运行应构造新实例。
    pub async fn stop(&self) -> DispatchResult<Session> {
        let archived = self.session.stop().await?;
        self.retries.shutdown().await;
        self.registry.reset_loads().await;
        info!("任务分发系统已停止");
        Ok(archived)
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub fn triggers(&self) -> &Arc<TriggerEngine> {
        &self.triggers
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TaskLifecycleStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionTracker> {
        &self.session
    }

    pub fn channel(&self) -> &Arc<InProcessMessageChannel> {
        &self.channel
    }
}
