use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use dispatch_core::models::{
    AuditRecord, MessageKind, MessagePriority, TaskMessage, TaskSpec, TaskType, TriggerOutcome,
    TriggerPriority, Urgency,
};
use dispatch_core::traits::MessageChannel;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_infrastructure::RetryScheduler;

use crate::dispatcher::{TaskDispatcher, DISPATCHER_ID};
use crate::scoring::BasePriority;
use crate::session::SessionTracker;

pub type TriggerCondition = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type TriggerAction =
    Arc<dyn Fn(Value) -> BoxFuture<'static, DispatchResult<Value>> + Send + Sync>;

/// 触发规则：命名的条件到动作绑定
///
/// 会话内注册后不可变；重试预算默认取自优先级类别。
pub struct TriggerRule {
    pub name: String,
    pub priority: TriggerPriority,
    pub max_retries: u32,
    condition: TriggerCondition,
    action: TriggerAction,
}

impl TriggerRule {
    pub fn new(
        name: impl Into<String>,
        priority: TriggerPriority,
        condition: TriggerCondition,
        action: TriggerAction,
    ) -> Self {
        Self {
            name: name.into(),
            max_retries: priority.default_max_retries(),
            priority,
            condition,
            action,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// 触发引擎
///
/// 对进入的事件求值已注册规则：条件不满足给出中性结果，
/// 动作失败按线性退避在后台重试，预算耗尽记为永久触发失败
/// （不致命，进程继续运行）。
pub struct TriggerEngine {
    rules: RwLock<HashMap<String, Arc<TriggerRule>>>,
    session: Arc<SessionTracker>,
    retries: Arc<RetryScheduler>,
    backoff_ms: u64,
}

impl TriggerEngine {
    pub fn new(session: Arc<SessionTracker>, retries: Arc<RetryScheduler>, backoff_ms: u64) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            session,
            retries,
            backoff_ms,
        }
    }

    /// 注册规则；名称必须唯一，会话内不可覆盖
    pub async fn register(&self, rule: TriggerRule) -> DispatchResult<()> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.name) {
            return Err(DispatchError::validation(format!(
                "触发规则已存在: {}",
                rule.name
            )));
        }
        info!(
            "注册触发规则: {} (优先级 {:?}, 重试预算 {})",
            rule.name, rule.priority, rule.max_retries
        );
        rules.insert(rule.name.clone(), Arc::new(rule));
        Ok(())
    }

    pub async fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// 对事件触发一条规则
    pub async fn fire(&self, name: &str, event: Value) -> DispatchResult<TriggerOutcome> {
        let rule = {
            let rules = self.rules.read().await;
            rules
                .get(name)
                .cloned()
                .ok_or_else(|| DispatchError::unknown_trigger(name))?
        };

        if !(rule.condition)(&event) {
            debug!("触发器 {} 条件不满足", name);
            return Ok(TriggerOutcome::ConditionNotMet);
        }

        self.session.record_trigger_fired().await;

        match (rule.action)(event.clone()).await {
            Ok(value) => {
                debug!("触发器 {} 执行成功", name);
                self.session.record_success().await;
                Ok(TriggerOutcome::Completed { value })
            }
            Err(e) => {
                warn!("触发器 {} 首次执行失败: {}", name, e);
                if rule.max_retries == 0 {
                    error!("触发器 {} 没有重试预算，记为永久失败", name);
                    self.session.record_error().await;
                    return Err(e);
                }

                let scheduled = self
                    .retries
                    .schedule(Self::run_retry_chain(
                        rule.clone(),
                        event,
                        self.session.clone(),
                        self.backoff_ms,
                    ))
                    .await;
                if !scheduled {
                    // 调度器已关闭，按永久失败处理
                    self.session.record_error().await;
                    return Err(e);
                }
                Ok(TriggerOutcome::RetryScheduled { attempt: 1 })
            }
        }
    }

    /// 后台重试链，与消息通道相同的线性退避策略
    async fn run_retry_chain(
        rule: Arc<TriggerRule>,
        event: Value,
        session: Arc<SessionTracker>,
        backoff_ms: u64,
    ) {
        for attempt in 1..=rule.max_retries {
            let delay = Duration::from_millis(backoff_ms * attempt as u64);
            debug!(
                "触发器 {} 第 {} 次重试，延迟 {:?}",
                rule.name, attempt, delay
            );
            sleep(delay).await;

            match (rule.action)(event.clone()).await {
                Ok(_) => {
                    info!("触发器 {} 重试成功 (第 {} 次)", rule.name, attempt);
                    session.record_success().await;
                    return;
                }
                Err(e) => {
                    warn!("触发器 {} 第 {} 次重试失败: {}", rule.name, attempt, e);
                }
            }
        }

        error!(
            "触发器 {} 重试预算({})用尽，记为永久触发失败",
            rule.name, rule.max_retries
        );
        session.record_error().await;
    }
}

/// 注册内置触发规则
///
/// user_request / task_completion / agent_status_change /
/// performance_alert / security_alert，语义与重试预算固定。
pub async fn register_builtin_rules(
    engine: &TriggerEngine,
    dispatcher: Arc<TaskDispatcher>,
    channel: Arc<dyn MessageChannel>,
    session: Arc<SessionTracker>,
) -> DispatchResult<()> {
    // user_request: 非空请求文本 -> 走调度器的任务提交入口
    {
        let dispatcher = dispatcher.clone();
        engine
            .register(TriggerRule::new(
                "user_request",
                TriggerPriority::Normal,
                Arc::new(|event: &Value| {
                    event["request"]
                        .as_str()
                        .map(|s| !s.trim().is_empty())
                        .unwrap_or(false)
                }),
                Arc::new(move |event: Value| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        let request = event["request"]
                            .as_str()
                            .ok_or_else(|| DispatchError::validation("缺少 request 字段"))?
                            .to_string();
                        let task_type = event["task_type"]
                            .as_str()
                            .and_then(TaskType::parse_str)
                            .unwrap_or(TaskType::Development);
                        let urgency = match event["urgency"].as_str() {
                            Some("high") => Urgency::High,
                            Some("low") => Urgency::Low,
                            _ => Urgency::Medium,
                        };
                        let base = match event["base_priority"].as_str() {
                            Some(label) => BasePriority::parse_str(label)?,
                            None => BasePriority::Normal,
                        };
                        let requirements = event["requirements"]
                            .as_array()
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(|v| v.as_str().map(String::from))
                                    .collect()
                            })
                            .unwrap_or_else(|| vec!["处理用户请求".to_string()]);

                        let spec = TaskSpec::new(task_type, request)
                            .with_requirements(requirements)
                            .with_urgency(urgency);
                        let receipt = dispatcher.submit(spec, base).await?;
                        Ok(json!({
                            "task_id": receipt.task_id,
                            "worker_id": receipt.worker_id,
                            "priority": receipt.priority,
                        }))
                    }
                    .boxed()
                }),
            ))
            .await?;
    }

    // task_completion: 事件带 completed 状态 -> 上报完成
    {
        let dispatcher = dispatcher.clone();
        engine
            .register(TriggerRule::new(
                "task_completion",
                TriggerPriority::Normal,
                Arc::new(|event: &Value| event["status"].as_str() == Some("completed")),
                Arc::new(move |event: Value| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        let task_id = event["task_id"]
                            .as_str()
                            .ok_or_else(|| DispatchError::validation("缺少 task_id 字段"))?
                            .to_string();
                        let result = event.get("result").cloned().unwrap_or(Value::Null);
                        let task = dispatcher.report_completion(&task_id, result).await?;
                        Ok(json!({"task_id": task.id, "status": task.status.as_str()}))
                    }
                    .boxed()
                }),
            ))
            .await?;
    }

    // agent_status_change: 同时带Worker标识与状态 -> 广播状态更新
    {
        let channel = channel.clone();
        engine
            .register(TriggerRule::new(
                "agent_status_change",
                TriggerPriority::Normal,
                Arc::new(|event: &Value| {
                    event["worker_id"].as_str().is_some() && event["status"].as_str().is_some()
                }),
                Arc::new(move |event: Value| {
                    let channel = channel.clone();
                    async move {
                        let message = TaskMessage::new(
                            DISPATCHER_ID,
                            DISPATCHER_ID,
                            MessageKind::StatusUpdate,
                            event,
                        );
                        channel.send(message).await?;
                        Ok(json!({"broadcast": true}))
                    }
                    .boxed()
                }),
            ))
            .await?;
    }

    // performance_alert: 性能分低于0.7 -> 纯观测性告警广播
    {
        let channel = channel.clone();
        engine
            .register(TriggerRule::new(
                "performance_alert",
                TriggerPriority::High,
                Arc::new(|event: &Value| {
                    event["score"].as_f64().map(|s| s < 0.7).unwrap_or(false)
                }),
                Arc::new(move |event: Value| {
                    let channel = channel.clone();
                    async move {
                        let message = TaskMessage::new(
                            DISPATCHER_ID,
                            DISPATCHER_ID,
                            MessageKind::PerformanceReport,
                            event,
                        )
                        .with_priority(MessagePriority::High);
                        channel.send(message).await?;
                        Ok(json!({"alerted": true}))
                    }
                    .boxed()
                }),
            ))
            .await?;
    }

    // security_alert: 带安全违规标记 -> 临界级广播并写入审计轨迹
    {
        let channel = channel.clone();
        let session = session.clone();
        engine
            .register(
                TriggerRule::new(
                    "security_alert",
                    TriggerPriority::Critical,
                    Arc::new(|event: &Value| !event["security_violation"].is_null()),
                    Arc::new(move |event: Value| {
                        let channel = channel.clone();
                        let session = session.clone();
                        async move {
                            session
                                .push_audit(AuditRecord::new("security", event.clone()))
                                .await;
                            let message = TaskMessage::new(
                                DISPATCHER_ID,
                                DISPATCHER_ID,
                                MessageKind::SecurityAlert,
                                event,
                            )
                            .with_priority(MessagePriority::Critical);
                            channel.send(message).await?;
                            Ok(json!({"audited": true}))
                        }
                        .boxed()
                    }),
                )
                .with_max_retries(1),
            )
            .await?;
    }

    Ok(())
}
