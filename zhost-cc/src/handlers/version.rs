use crate::awaiter::AwaitedRegistry;
use crate::cc_id::CommandClassId;
use crate::frame::CommandClassFrame;
use crate::handler::{CancelToken, CcHandler, InterviewResult};
use crate::info::CommandClassInfo;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// The one command class nothing else is allowed to depend on; every other
/// handler in this crate that implements multi-version behavior depends on
/// it by default (§4.5).
pub struct VersionHandler {
    info: Mutex<CommandClassInfo>,
    awaiters: Arc<AwaitedRegistry>,
}

impl VersionHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(CommandClassInfo::new(CommandClassId::VERSION)),
            awaiters: Arc::new(AwaitedRegistry::default()),
        })
    }
}

impl CcHandler for VersionHandler {
    fn info(&self) -> CommandClassInfo {
        *self.info.lock().expect("VersionHandler info lock poisoned")
    }

    fn merge_info(&self, other: CommandClassInfo) {
        let mut guard = self.info.lock().expect("VersionHandler info lock poisoned");
        *guard = guard.merge(&other);
    }

    fn dependencies(&self) -> &'static [CommandClassId] {
        // Version has no dependencies; it is everyone else's.
        &[]
    }

    fn interview<'a>(&'a self, _cancel: CancelToken) -> Pin<Box<dyn Future<Output = InterviewResult> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn handle_unsolicited(&self, _frame: &CommandClassFrame) {
        // Version reports only matter to whoever explicitly awaited them
        // during an interview; there is nothing useful to do unsolicited.
    }

    fn awaiters(&self) -> &Arc<AwaitedRegistry> {
        &self.awaiters
    }
}
