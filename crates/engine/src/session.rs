use tokio::sync::RwLock;
use tracing::{debug, info};

use dispatch_core::config::SessionConfig;
use dispatch_core::models::{AuditRecord, Session, SessionOverview};
use dispatch_core::{DispatchError, DispatchResult};

/// 会话跟踪器
///
/// 同一时刻只允许一个活跃会话；活跃会话聚合成功/错误/触发
/// 计数与审计轨迹，结束时归档到有界历史。
pub struct SessionTracker {
    current: RwLock<Option<Session>>,
    history: RwLock<Vec<Session>>,
    audit_limit: usize,
    history_limit: usize,
}

impl SessionTracker {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            current: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            audit_limit: config.audit_trail_limit,
            history_limit: config.history_limit,
        }
    }

    /// 开启新会话；已有活跃会话时报错而非静默重启
    pub async fn start(&self) -> DispatchResult<String> {
        let mut current = self.current.write().await;
        if let Some(session) = current.as_ref() {
            return Err(DispatchError::SessionAlreadyActive {
                id: session.id.clone(),
            });
        }

        let session = Session::new(self.audit_limit);
        let id = session.id.clone();
        info!("会话开始: {}", id);
        *current = Some(session);
        Ok(id)
    }

    /// 结束当前会话并归档
    pub async fn stop(&self) -> DispatchResult<Session> {
        let mut current = self.current.write().await;
        let mut session = current.take().ok_or(DispatchError::NoActiveSession)?;
        session.close();
        info!(
            "会话结束: {} (成功 {}, 错误 {}, 触发 {})",
            session.id, session.successes, session.errors, session.triggers_fired
        );

        let mut history = self.history.write().await;
        if self.history_limit > 0 && history.len() == self.history_limit {
            history.remove(0);
        }
        history.push(session.clone());
        Ok(session)
    }

    /// 当前会话的聚合状态
    pub async fn status(&self) -> SessionOverview {
        let current = self.current.read().await;
        match current.as_ref() {
            Some(session) => SessionOverview {
                active: true,
                session_id: Some(session.id.clone()),
                successes: session.successes,
                errors: session.errors,
                triggers_fired: session.triggers_fired,
                success_rate: session.success_rate(),
            },
            None => SessionOverview {
                active: false,
                session_id: None,
                successes: 0,
                errors: 0,
                triggers_fired: 0,
                success_rate: 0.0,
            },
        }
    }

    pub async fn is_active(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn record_success(&self) {
        let mut current = self.current.write().await;
        match current.as_mut() {
            Some(session) => session.successes += 1,
            None => debug!("没有活跃会话，成功计数被丢弃"),
        }
    }

    pub async fn record_error(&self) {
        let mut current = self.current.write().await;
        match current.as_mut() {
            Some(session) => session.errors += 1,
            None => debug!("没有活跃会话，错误计数被丢弃"),
        }
    }

    pub async fn record_trigger_fired(&self) {
        let mut current = self.current.write().await;
        match current.as_mut() {
            Some(session) => session.triggers_fired += 1,
            None => debug!("没有活跃会话，触发计数被丢弃"),
        }
    }

    /// 向当前会话追加审计记录
    pub async fn push_audit(&self, record: AuditRecord) {
        let mut current = self.current.write().await;
        match current.as_mut() {
            Some(session) => session.push_audit(record),
            None => debug!("没有活跃会话，审计记录被丢弃"),
        }
    }

    pub async fn audit_trail(&self) -> Vec<AuditRecord> {
        let current = self.current.read().await;
        current
            .as_ref()
            .map(|s| s.audit_trail.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn history(&self) -> Vec<Session> {
        self.history.read().await.clone()
    }
}
