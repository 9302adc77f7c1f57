pub mod event_log;
pub mod memory_persistence;
pub mod message_channel;
pub mod retry;

pub use event_log::{InMemoryEventSink, TracingEventSink};
pub use memory_persistence::InMemoryTaskPersistence;
pub use message_channel::InProcessMessageChannel;
pub use retry::RetryScheduler;
