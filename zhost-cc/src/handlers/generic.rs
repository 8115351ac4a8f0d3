use crate::awaiter::AwaitedRegistry;
use crate::cc_id::CommandClassId;
use crate::frame::CommandClassFrame;
use crate::handler::{CancelToken, CcHandler, InterviewResult};
use crate::info::CommandClassInfo;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Stands in for the payload catalog this crate leaves external (§1): any
/// advertised command class with no dedicated handler still gets tracked
/// (capability merge, interview ordering, awaiter bookkeeping) through this
/// one. It records the last few unsolicited reports verbatim rather than
/// decoding them.
pub struct GenericHandler {
    id: CommandClassId,
    info: Mutex<CommandClassInfo>,
    awaiters: Arc<AwaitedRegistry>,
    last_report: Mutex<Option<CommandClassFrame>>,
}

impl GenericHandler {
    pub fn new(id: CommandClassId) -> Arc<Self> {
        Arc::new(Self {
            id,
            info: Mutex::new(CommandClassInfo::new(id)),
            awaiters: Arc::new(AwaitedRegistry::default()),
            last_report: Mutex::new(None),
        })
    }

    pub fn last_report(&self) -> Option<CommandClassFrame> {
        self.last_report.lock().expect("GenericHandler last_report lock poisoned").clone()
    }
}

impl CcHandler for GenericHandler {
    fn info(&self) -> CommandClassInfo {
        *self.info.lock().expect("GenericHandler info lock poisoned")
    }

    fn merge_info(&self, other: CommandClassInfo) {
        let mut guard = self.info.lock().expect("GenericHandler info lock poisoned");
        *guard = guard.merge(&other);
    }

    fn interview<'a>(&'a self, _cancel: CancelToken) -> Pin<Box<dyn Future<Output = InterviewResult> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn handle_unsolicited(&self, frame: &CommandClassFrame) {
        debug_assert_eq!(frame.cc_id, self.id);
        *self.last_report.lock().expect("GenericHandler last_report lock poisoned") = Some(frame.clone());
    }

    fn awaiters(&self) -> &Arc<AwaitedRegistry> {
        &self.awaiters
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_records_last_report() {
        let handler = GenericHandler::new(CommandClassId(0x70));
        assert!(handler.last_report().is_none());
        handler.handle_unsolicited(&CommandClassFrame::new(CommandClassId(0x70), 0x03, Bytes::from_static(b"\x01")));
        assert_eq!(handler.last_report().unwrap().command_id, 0x03);
    }
}
