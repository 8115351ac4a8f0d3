//! The per-node capability map: `CCId -> Handler` (§4.5). Reads clone an
//! `Arc` snapshot and never block on writers; writers serialize on a
//! mutex and install a freshly-cloned map, so a reader that already holds
//! a snapshot never observes a write in progress. The pack carries no
//! wait-free swap primitive (e.g. `arc-swap`), so a short-held mutex around
//! the swap itself is the chosen approximation — see DESIGN.md.

use crate::cc_id::CommandClassId;
use crate::frame::CommandClassFrame;
use crate::handler::CcHandler;
use crate::info::CommandClassInfo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Handlers = Arc<HashMap<CommandClassId, Arc<dyn CcHandler>>>;

/// What happened to one inbound frame (§8: exactly one of these fires).
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An awaiter was waiting for exactly this report; it was completed.
    Awaited,
    /// No awaiter matched; the handler's unsolicited sink ran.
    Unsolicited,
    /// No handler is registered for this CC id.
    Dropped,
}

pub struct CapabilityMap {
    handlers: Mutex<Handlers>,
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Arc::new(HashMap::new())),
        }
    }
}

impl CapabilityMap {
    /// A cheap `Arc` clone of the current map. Safe to hold across `await`
    /// points; it reflects whatever was installed at the time of the call,
    /// never a partially-written state.
    pub fn snapshot(&self) -> Handlers {
        self.handlers.lock().expect("CapabilityMap poisoned").clone()
    }

    pub fn get(&self, id: CommandClassId) -> Option<Arc<dyn CcHandler>> {
        self.snapshot().get(&id).cloned()
    }

    /// Merges freshly-advertised `info` into the handler for `info.id`,
    /// constructing one via `make_handler` on first advertisement (§4.5.1,
    /// "Lifecycles"). Serializes with other writers; readers are
    /// unaffected.
    pub fn merge(&self, info: CommandClassInfo, make_handler: impl FnOnce() -> Arc<dyn CcHandler>) {
        let mut guard = self.handlers.lock().expect("CapabilityMap poisoned");
        if let Some(handler) = guard.get(&info.id) {
            handler.merge_info(info);
            return;
        }
        let mut new_map = (**guard).clone();
        let handler = make_handler();
        handler.merge_info(info);
        new_map.insert(info.id, handler);
        *guard = Arc::new(new_map);
    }

    /// All currently-registered CC ids, for the interview orchestrator.
    pub fn ids(&self) -> Vec<CommandClassId> {
        self.snapshot().keys().copied().collect()
    }

    /// Dispatches one inbound command-class frame (§4.5): awaiter match,
    /// else unsolicited sink, else drop. Never parses the payload itself.
    pub fn process(&self, frame: CommandClassFrame) -> DispatchOutcome {
        let Some(handler) = self.get(frame.cc_id) else {
            return DispatchOutcome::Dropped;
        };
        match handler.awaiters().take_matching(&frame) {
            Some(sender) => {
                // A dropped receiver (awaiter gave up, e.g. on timeout)
                // just means the value is discarded; that's fine here.
                let _ = sender.send(frame);
                DispatchOutcome::Awaited
            }
            None => {
                handler.handle_unsolicited(&frame);
                DispatchOutcome::Unsolicited
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::awaiter::AwaitedRegistry;
    use crate::handler::CancelToken;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        id: CommandClassId,
        info: Mutex<CommandClassInfo>,
        awaiters: Arc<AwaitedRegistry>,
        unsolicited_count: AtomicUsize,
    }

    impl CountingHandler {
        fn new(id: CommandClassId) -> Arc<Self> {
            Arc::new(Self {
                id,
                info: Mutex::new(CommandClassInfo::new(id)),
                awaiters: Arc::new(AwaitedRegistry::default()),
                unsolicited_count: AtomicUsize::new(0),
            })
        }
    }

    impl CcHandler for CountingHandler {
        fn info(&self) -> CommandClassInfo {
            *self.info.lock().unwrap()
        }

        fn merge_info(&self, other: CommandClassInfo) {
            let mut guard = self.info.lock().unwrap();
            *guard = guard.merge(&other);
        }

        fn dependencies(&self) -> &'static [CommandClassId] {
            &[]
        }

        fn interview<'a>(
            &'a self,
            _cancel: CancelToken,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::handler::InterviewResult> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }

        fn handle_unsolicited(&self, _frame: &CommandClassFrame) {
            self.unsolicited_count.fetch_add(1, Ordering::SeqCst);
        }

        fn awaiters(&self) -> &Arc<AwaitedRegistry> {
            &self.awaiters
        }
    }

    fn frame(cc_id: CommandClassId) -> CommandClassFrame {
        CommandClassFrame::new(cc_id, 0x03, Bytes::new())
    }

    #[test]
    fn test_drop_with_no_handler() {
        let map = CapabilityMap::default();
        assert_eq!(map.process(frame(CommandClassId::BATTERY)), DispatchOutcome::Dropped);
    }

    #[test]
    fn test_merge_creates_then_updates_handler() {
        let map = CapabilityMap::default();
        let mut info = CommandClassInfo::new(CommandClassId::BATTERY);
        info.supported = true;
        map.merge(info, || CountingHandler::new(CommandClassId::BATTERY));
        assert!(map.get(CommandClassId::BATTERY).unwrap().info().supported);

        let mut update = CommandClassInfo::new(CommandClassId::BATTERY);
        update.controlled = true;
        map.merge(update, || CountingHandler::new(CommandClassId::BATTERY));
        let merged = map.get(CommandClassId::BATTERY).unwrap().info();
        assert!(merged.supported);
        assert!(merged.controlled);
    }

    #[test]
    fn test_process_falls_through_to_unsolicited() {
        let map = CapabilityMap::default();
        map.merge(CommandClassInfo::new(CommandClassId::BATTERY), || {
            CountingHandler::new(CommandClassId::BATTERY)
        });
        let outcome = map.process(frame(CommandClassId::BATTERY));
        assert_eq!(outcome, DispatchOutcome::Unsolicited);
    }

    #[test]
    fn test_process_prefers_matching_awaiter() {
        let map = CapabilityMap::default();
        map.merge(CommandClassInfo::new(CommandClassId::BATTERY), || {
            CountingHandler::new(CommandClassId::BATTERY)
        });
        let handler = map.get(CommandClassId::BATTERY).unwrap();
        let awaited = handler.awaiters().add(0x03, None, None);
        let outcome = map.process(frame(CommandClassId::BATTERY));
        assert_eq!(outcome, DispatchOutcome::Awaited);
        drop(awaited);
    }
}
