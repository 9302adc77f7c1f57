use async_trait::async_trait;

use crate::models::TaskMessage;
use crate::DispatchResult;

/// 消息通道抽象接口
///
/// 至少一次投递语义：send 返回后消息已入队，失败投递按
/// 线性退避策略在后台重试，不阻塞调用方。
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// 发送一条消息
    async fn send(&self, message: TaskMessage) -> DispatchResult<()>;
}

/// 消息接收方处理接口
///
/// Worker执行器与调度侧收件箱都实现此契约：assignment 进，
/// completion/error 出；具体执行逻辑由实现方提供。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 处理一条投递到本接收方的消息
    async fn handle(&self, message: TaskMessage) -> DispatchResult<()>;

    /// 接收方当前是否处于忙碌状态（建议性标记，不是锁）
    fn is_busy(&self) -> bool {
        false
    }
}
