//! 编排核心的领域层：领域事件、事件总线端口与工具输出标准化

pub mod events;
pub mod normalizer;
pub mod ports;

pub use events::{parse_topic, topics, DomainEvent, EventPayload, EventSource};
pub use normalizer::{Normalizer, ParseError, ParserKind};
pub use ports::{EventBus, EventReceiver};
