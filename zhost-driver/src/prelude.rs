pub use crate::controller::{Controller, ControllerCapabilities};
pub use crate::driver::{Driver, DriverOptions, HandlerFactory};
pub use crate::error::{Error, Result};
pub use crate::link::{LinkHandle, LinkOptions};
pub use crate::node::{InterviewStatus, Node, ProtocolInfo};
pub use crate::session::{CallbackSend, Session};
