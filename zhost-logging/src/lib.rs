pub mod loggers;
pub mod sink;

pub use sink::{LocalImmutableLogger, NullLogger};
pub use zhost_core::log::{Direction, LogInfo, LogPayload, Loglevel};
