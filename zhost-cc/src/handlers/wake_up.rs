use crate::awaiter::AwaitedRegistry;
use crate::cc_id::CommandClassId;
use crate::frame::CommandClassFrame;
use crate::handler::{CancelToken, CcHandler, InterviewResult};
use crate::info::CommandClassInfo;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Tracks whether the node has most recently reported itself awake.
/// Depends on Version (the default).
pub struct WakeUpHandler {
    info: Mutex<CommandClassInfo>,
    awaiters: Arc<AwaitedRegistry>,
    awake: Mutex<bool>,
}

impl WakeUpHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(CommandClassInfo::new(CommandClassId::WAKE_UP)),
            awaiters: Arc::new(AwaitedRegistry::default()),
            awake: Mutex::new(false),
        })
    }

    pub fn is_awake(&self) -> bool {
        *self.awake.lock().expect("WakeUpHandler awake lock poisoned")
    }
}

impl CcHandler for WakeUpHandler {
    fn info(&self) -> CommandClassInfo {
        *self.info.lock().expect("WakeUpHandler info lock poisoned")
    }

    fn merge_info(&self, other: CommandClassInfo) {
        let mut guard = self.info.lock().expect("WakeUpHandler info lock poisoned");
        *guard = guard.merge(&other);
    }

    fn interview<'a>(&'a self, _cancel: CancelToken) -> Pin<Box<dyn Future<Output = InterviewResult> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn handle_unsolicited(&self, frame: &CommandClassFrame) {
        // Wake Up Notification (command id 0x07) carries no payload; any
        // other command id on this CC is treated as a no-op here.
        if frame.command_id == 0x07 {
            *self.awake.lock().expect("WakeUpHandler awake lock poisoned") = true;
        }
    }

    fn awaiters(&self) -> &Arc<AwaitedRegistry> {
        &self.awaiters
    }
}
