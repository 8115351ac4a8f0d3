//! A registry of pending `await_next_report` calls, one per command-class
//! handler (§4.5). Grounded on the driver's awaited-value registry, adapted
//! to the `futures` channel family the rest of this crate uses and to a
//! monotonic counter instead of a dedicated id-generator crate.

use futures::channel::oneshot;
use futures::FutureExt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zhost_pal::MaybeSleep;

use crate::frame::CommandClassFrame;

pub type Predicate = Box<dyn Fn(&CommandClassFrame) -> bool + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum AwaitError {
    #[error("the awaited report never arrived before the timeout")]
    Timeout,
    #[error("the awaiter was dropped before a report arrived")]
    Cancelled,
}

struct Entry {
    id: i64,
    command_id: u8,
    predicate: Option<Predicate>,
    channel: oneshot::Sender<CommandClassFrame>,
}

/// Per-handler registry of outstanding awaiters. `process` (§4.5) checks
/// this before falling back to the unsolicited sink.
pub struct AwaitedRegistry {
    next_id: AtomicI64,
    store: Mutex<Vec<Entry>>,
}

impl Default for AwaitedRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(0),
            store: Mutex::new(Vec::new()),
        }
    }
}

impl AwaitedRegistry {
    /// Registers interest in the next report whose `command_id` matches,
    /// and, if given, whose predicate returns true. Returns a handle the
    /// caller awaits; dropping it before it resolves removes the entry.
    pub fn add(
        self: &Arc<Self>,
        command_id: u8,
        predicate: Option<Predicate>,
        timeout: Option<Duration>,
    ) -> AwaitedRef {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.store.lock().expect("AwaitedRegistry poisoned").push(Entry {
            id,
            command_id,
            predicate,
            channel: tx,
        });
        AwaitedRef {
            id,
            registry: self.clone(),
            timeout,
            channel: Some(rx),
        }
    }

    /// Called from `process`: if some awaiter matches `frame`, removes it
    /// and returns its sender so the caller can complete it. Otherwise
    /// returns `None` and the frame falls through to the unsolicited sink.
    pub fn take_matching(&self, frame: &CommandClassFrame) -> Option<oneshot::Sender<CommandClassFrame>> {
        let mut store = self.store.lock().expect("AwaitedRegistry poisoned");
        let index = store
            .iter()
            .position(|e| e.command_id == frame.command_id && e.predicate.as_ref().is_none_or(|p| p(frame)));
        index.map(|i| store.remove(i).channel)
    }

    fn remove(&self, id: i64) {
        self.store.lock().expect("AwaitedRegistry poisoned").retain(|e| e.id != id);
    }
}

pub struct AwaitedRef {
    id: i64,
    registry: Arc<AwaitedRegistry>,
    timeout: Option<Duration>,
    channel: Option<oneshot::Receiver<CommandClassFrame>>,
}

impl AwaitedRef {
    pub async fn try_await(mut self) -> Result<CommandClassFrame, AwaitError> {
        let sleep = MaybeSleep::new(self.timeout);
        let receiver = self.channel.take().expect("try_await may only be called once");
        futures::pin_mut!(sleep);
        futures::select_biased! {
            result = receiver.fuse() => result.map_err(|_| AwaitError::Cancelled),
            _ = sleep.fuse() => Err(AwaitError::Timeout),
        }
    }
}

impl Drop for AwaitedRef {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    fn frame(command_id: u8) -> CommandClassFrame {
        CommandClassFrame::new(crate::cc_id::CommandClassId::BATTERY, command_id, Bytes::new())
    }

    #[tokio::test]
    async fn test_matching_awaiter_completes() {
        let registry = Arc::new(AwaitedRegistry::default());
        let awaited = registry.add(0x03, None, None);
        let sender = registry.take_matching(&frame(0x03)).expect("should match");
        sender.send(frame(0x03)).unwrap();
        let result = awaited.try_await().await.unwrap();
        assert_eq!(result.command_id, 0x03);
    }

    #[tokio::test]
    async fn test_non_matching_command_id_falls_through() {
        let registry = Arc::new(AwaitedRegistry::default());
        let _awaited = registry.add(0x03, None, None);
        assert!(registry.take_matching(&frame(0x05)).is_none());
    }

    #[tokio::test]
    async fn test_predicate_reads_raw_payload_only() {
        let registry = Arc::new(AwaitedRegistry::default());
        let predicate: Predicate = Box::new(|f: &CommandClassFrame| f.payload.first() == Some(&0x64));
        let _awaited = registry.add(0x03, Some(predicate), None);
        let mut mismatched = frame(0x03);
        mismatched.payload = Bytes::from_static(&[0x00]);
        assert!(registry.take_matching(&mismatched).is_none());

        let mut matching = frame(0x03);
        matching.payload = Bytes::from_static(&[0x64]);
        assert!(registry.take_matching(&matching).is_some());
    }

    #[tokio::test]
    async fn test_dropped_awaiter_is_removed() {
        let registry = Arc::new(AwaitedRegistry::default());
        let awaited = registry.add(0x03, None, None);
        drop(awaited);
        assert!(registry.take_matching(&frame(0x03)).is_none());
    }

    #[tokio::test]
    async fn test_timeout_without_match() {
        let registry = Arc::new(AwaitedRegistry::default());
        let awaited = registry.add(0x03, None, Some(Duration::from_millis(5)));
        let result = awaited.try_await().await;
        assert!(matches!(result, Err(AwaitError::Timeout)));
    }
}
