pub mod message;
pub mod session;
pub mod task;
pub mod trigger;
pub mod worker;

pub use message::{MessageKind, MessagePriority, MessageStatus, TaskMessage};
pub use session::{AuditRecord, Session, SessionOverview, SessionStatus};
pub use task::{
    Checkpoint, Complexity, Task, TaskSpec, TaskStatus, TaskType, Urgency,
};
pub use trigger::{TriggerOutcome, TriggerPriority};
pub use worker::{PerformanceWindow, WorkerInfo, WorkerRegistration};
