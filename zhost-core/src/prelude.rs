pub use crate::definitions::*;
pub use crate::error::{Error, Result};
pub use crate::log::{Direction, LogInfo, LogPayload, LogPayloadDict, Loglevel, ToLogPayload};
