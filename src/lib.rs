pub mod app;

pub use app::DispatchSystem;
pub use dispatch_core::{AppConfig, DispatchError, DispatchResult};
pub use dispatch_engine::{
    register_builtin_rules, BasePriority, DispatchReceipt, DispatcherInbox, SessionTracker,
    TaskDispatcher, TaskLifecycleStore, TriggerEngine, TriggerRule, WorkerRegistry,
};
pub use dispatch_infrastructure::{
    InMemoryEventSink, InMemoryTaskPersistence, InProcessMessageChannel, RetryScheduler,
    TracingEventSink,
};
