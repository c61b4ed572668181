pub mod messaging;

pub use messaging::{EventBus, EventReceiver};
