pub mod events;
pub mod messaging;
pub mod persistence;

pub use events::*;
pub use messaging::*;
pub use persistence::*;
