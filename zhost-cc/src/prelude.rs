pub use crate::awaiter::{AwaitError, AwaitedRef, AwaitedRegistry, Predicate};
pub use crate::cc_id::CommandClassId;
pub use crate::frame::CommandClassFrame;
pub use crate::handler::{CancelToken, CcHandler, InterviewError, InterviewResult};
pub use crate::handlers::default_handler;
pub use crate::info::CommandClassInfo;
pub use crate::interview::interview_order;
pub use crate::registry::{CapabilityMap, DispatchOutcome};
