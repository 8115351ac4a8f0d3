use crate::awaiter::AwaitedRegistry;
use crate::cc_id::CommandClassId;
use crate::frame::CommandClassFrame;
use crate::info::CommandClassInfo;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type InterviewResult = Result<(), InterviewError>;

#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("interview was cancelled")]
    Cancelled,
    #[error("no response from node: {0}")]
    NoResponse(String),
}

/// A signal the interview orchestrator can use to abandon a single
/// in-progress CC interview without tearing down the rest of the node's
/// workflow (§4.6, §4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelToken;

/// Per-CC behavior the node's capability map dispatches into (§4.5).
/// Handlers are stored behind `Arc<dyn CcHandler>` so a node's registry can
/// hold a heterogeneous set of them; `interview` returns a boxed future
/// rather than being an `async fn` so the trait stays object-safe.
pub trait CcHandler: Send + Sync {
    /// Current merged capability for this handler.
    fn info(&self) -> CommandClassInfo;

    /// Replaces this handler's info with the result of merging in `other`
    /// (§4.5.1). Implementations hold `CommandClassInfo` behind interior
    /// mutability since the map that owns them is read without locking.
    fn merge_info(&self, other: CommandClassInfo);

    /// Other CC ids that MUST be interviewed first. The default
    /// implementation declares a dependency on Version, matching the rule
    /// that every handler reporting a per-CC version depends on it except
    /// Version itself.
    fn dependencies(&self) -> &'static [CommandClassId] {
        &[CommandClassId::VERSION]
    }

    /// Solicits the device's current state. A no-op default suits handlers
    /// that are purely reactive.
    fn interview<'a>(&'a self, cancel: CancelToken) -> Pin<Box<dyn Future<Output = InterviewResult> + Send + 'a>> {
        let _ = cancel;
        Box::pin(async { Ok(()) })
    }

    /// Handles one inbound frame for this CC once no awaiter has claimed it
    /// (§4.5). Exceptions (in Rust: an `Err`) are logged and swallowed by
    /// the caller — this must never panic.
    fn handle_unsolicited(&self, frame: &CommandClassFrame);

    /// The handler's own awaiter registry, consulted before
    /// `handle_unsolicited` on every inbound frame for this CC. Returned as
    /// the owning `Arc` (not a bare reference) since registering a new
    /// awaiter needs one to hand back to the caller's `AwaitedRef`.
    fn awaiters(&self) -> &Arc<AwaitedRegistry>;
}
