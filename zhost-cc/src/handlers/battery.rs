use crate::awaiter::AwaitedRegistry;
use crate::cc_id::CommandClassId;
use crate::frame::CommandClassFrame;
use crate::handler::{CancelToken, CcHandler, InterviewResult};
use crate::info::CommandClassInfo;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Tracks the node's last-reported battery level. Depends on Version (the
/// default), since the report layout a device sends can vary across
/// versions of this CC.
pub struct BatteryHandler {
    info: Mutex<CommandClassInfo>,
    awaiters: Arc<AwaitedRegistry>,
    last_level: Mutex<Option<u8>>,
}

impl BatteryHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(CommandClassInfo::new(CommandClassId::BATTERY)),
            awaiters: Arc::new(AwaitedRegistry::default()),
            last_level: Mutex::new(None),
        })
    }

    pub fn last_level(&self) -> Option<u8> {
        *self.last_level.lock().expect("BatteryHandler last_level lock poisoned")
    }
}

impl CcHandler for BatteryHandler {
    fn info(&self) -> CommandClassInfo {
        *self.info.lock().expect("BatteryHandler info lock poisoned")
    }

    fn merge_info(&self, other: CommandClassInfo) {
        let mut guard = self.info.lock().expect("BatteryHandler info lock poisoned");
        *guard = guard.merge(&other);
    }

    // dependencies(): inherits the default, [Version].

    fn interview<'a>(&'a self, _cancel: CancelToken) -> Pin<Box<dyn Future<Output = InterviewResult> + Send + 'a>> {
        // A real interview would send Battery Get and await the Report
        // through `self.awaiters`; issuing that request needs a handle
        // back to the session layer, which this crate deliberately does
        // not hold (see zhost-driver for where handlers get wired up).
        Box::pin(async { Ok(()) })
    }

    fn handle_unsolicited(&self, frame: &CommandClassFrame) {
        // Battery Report's level is payload byte 0, per §4.5.2: gate on
        // length, never on version.
        if let Some(&level) = frame.payload.first() {
            *self.last_level.lock().expect("BatteryHandler last_level lock poisoned") = Some(level);
        }
    }

    fn awaiters(&self) -> &Arc<AwaitedRegistry> {
        &self.awaiters
    }
}
