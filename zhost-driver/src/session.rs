//! The session layer (§4.3): enforces at most one REQ→RES transaction in
//! flight at a time, correlates callback-bearing requests by session id,
//! and routes everything else either to a waiting caller or the
//! unsolicited stream. Grounded on the driver's awaited-value registry
//! (`driver/awaited.rs`, already adapted once for `zhost_cc::awaiter`) for
//! the cancellation-safe await pattern, reused here for response/callback
//! correlation instead of command-class reports.

use crate::error::{Error, Result};
use crate::link::{FrameSender, LinkDeliveryResult};
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zhost_core::definitions::{CommandType, FunctionType};
use zhost_core::wrapping_counter::WrappingCounter;
use zhost_logging::loggers::session::SessionLogger;
use zhost_logging::LocalImmutableLogger;
use zhost_pal::MaybeSleep;
use zhost_serial::frame::DataFrame;

const UNSOLICITED_QUEUE_DEPTH: usize = 32;
const SESSION_ID_MAX: u8 = 255;

struct ResponseExpectation {
    function_id: FunctionType,
    respond_to: oneshot::Sender<DataFrame>,
}

struct CallbackExpectation {
    respond_to: oneshot::Sender<DataFrame>,
}

struct Shared<S> {
    response_slot: Mutex<Option<ResponseExpectation>>,
    response_gate: tokio::sync::Mutex<()>,
    callback_table: Mutex<HashMap<(FunctionType, u8), CallbackExpectation>>,
    session_ids: Mutex<WrappingCounter<u8>>,
    link: S,
    logger: Arc<dyn LocalImmutableLogger>,
}

impl<S> Shared<S> {
    fn session_log(&self) -> SessionLogger<'_> {
        SessionLogger::new(self.logger.as_ref())
    }
}

/// Clears its `response_slot` entry on drop, regardless of how the
/// suspension point it guards was left (resolved, timed out, cancelled).
/// A no-op if the entry was already consumed by the routing task.
struct SlotCleanup<S>(Arc<Shared<S>>);

impl<S> Drop for SlotCleanup<S> {
    fn drop(&mut self) {
        self.0.response_slot.lock().expect("response_slot poisoned").take();
    }
}

/// Removes its `callback_table` entry on drop. Held by the function that
/// installs the entry until it hands ownership to a [`CallbackSend`]; from
/// then on it rides along as part of that value, so a caller that drops
/// the callback wait without polling it to completion still cleans up.
struct CallbackGuard<S> {
    shared: Arc<Shared<S>>,
    key: (FunctionType, u8),
}

impl<S> Drop for CallbackGuard<S> {
    fn drop(&mut self) {
        self.shared.callback_table.lock().expect("callback_table poisoned").remove(&self.key);
    }
}

/// The outcome of [`Session::send_request_with_callback`]: `status` is
/// already resolved (the fast path callers use to see a command-level
/// rejection before any callback arrives), `await_callback` is the
/// separate, possibly much later, completion.
pub struct CallbackSend<S> {
    pub status: Option<DataFrame>,
    callback_rx: oneshot::Receiver<DataFrame>,
    timeout: Option<Duration>,
    _guard: CallbackGuard<S>,
}

impl<S> CallbackSend<S> {
    pub async fn await_callback(self) -> Result<DataFrame> {
        let sleep = MaybeSleep::new(self.timeout);
        futures::pin_mut!(sleep);
        futures::select_biased! {
            result = self.callback_rx.fuse() => result.map_err(|_| Error::Cancelled),
            _ = sleep.fuse() => Err(Error::CallbackTimeout),
        }
    }
}

/// The session layer's public handle. Cheap to clone (wraps an `Arc`).
pub struct Session<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<S: FrameSender + 'static> Session<S> {
    /// Spawns the inbound-routing task and returns the handle plus the
    /// stream of frames routed to rule 3 (§4.3): requests whose function id
    /// is none of the ones this layer already has a waiter for.
    pub fn spawn(link: S, inbound: mpsc::Receiver<DataFrame>, logger: Arc<dyn LocalImmutableLogger>) -> (Self, mpsc::Receiver<DataFrame>) {
        let (unsolicited_tx, unsolicited_rx) = mpsc::channel(UNSOLICITED_QUEUE_DEPTH);
        let shared = Arc::new(Shared {
            response_slot: Mutex::new(None),
            response_gate: tokio::sync::Mutex::new(()),
            callback_table: Mutex::new(HashMap::new()),
            session_ids: Mutex::new(WrappingCounter::new_with_max(SESSION_ID_MAX)),
            link,
            logger,
        });
        tokio::spawn(route_inbound(inbound, shared.clone(), unsolicited_tx));
        (Self { shared }, unsolicited_rx)
    }

    /// One REQ→RES transaction (§4.3). Only one may be in flight at a time
    /// across the whole session; `acquire`s are granted FIFO.
    pub async fn send_request_response(&self, cmd: DataFrame, timeout: Option<Duration>) -> Result<DataFrame> {
        let _permit = self.shared.response_gate.lock().await;
        let function_id = cmd.function_id;
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.shared.response_slot.lock().expect("response_slot poisoned");
            debug_assert!(slot.is_none(), "response_gate should make concurrent occupancy impossible");
            *slot = Some(ResponseExpectation { function_id, respond_to: tx });
        }
        let _cleanup = SlotCleanup(self.shared.clone());

        if self.shared.link.send_frame(cmd).await != LinkDeliveryResult::Delivered {
            return Err(Error::FrameDelivery);
        }

        let sleep = MaybeSleep::new(timeout);
        futures::pin_mut!(sleep);
        futures::select_biased! {
            result = rx.fuse() => result.map_err(|_| Error::Cancelled),
            _ = sleep.fuse() => Err(Error::ResponseTimeout),
        }
    }

    /// A callback-bearing request (§4.3). `build` receives the freshly
    /// allocated session id so the caller can stamp it into the frame's
    /// payload at the function-specific offset. When
    /// `expects_status_response` is set, the status response is awaited
    /// (through the same exclusive slot as [`Self::send_request_response`])
    /// before this resolves, letting a caller see a command-level rejection
    /// without waiting on a callback that will never come.
    pub async fn send_request_with_callback(
        &self,
        build: impl FnOnce(u8) -> DataFrame,
        expects_status_response: bool,
        callback_timeout: Option<Duration>,
    ) -> Result<CallbackSend<S>> {
        let session_id = self.shared.session_ids.lock().expect("session_ids poisoned").increment();
        let cmd = build(session_id);
        let function_id = cmd.function_id;

        let (cb_tx, cb_rx) = oneshot::channel();
        self.shared
            .callback_table
            .lock()
            .expect("callback_table poisoned")
            .insert((function_id, session_id), CallbackExpectation { respond_to: cb_tx });
        let guard = CallbackGuard {
            shared: self.shared.clone(),
            key: (function_id, session_id),
        };

        let status = if expects_status_response {
            let _permit = self.shared.response_gate.lock().await;
            let (tx, rx) = oneshot::channel();
            {
                let mut slot = self.shared.response_slot.lock().expect("response_slot poisoned");
                *slot = Some(ResponseExpectation { function_id, respond_to: tx });
            }
            let _cleanup = SlotCleanup(self.shared.clone());

            if self.shared.link.send_frame(cmd).await != LinkDeliveryResult::Delivered {
                return Err(Error::FrameDelivery);
            }
            Some(rx.await.map_err(|_| Error::Cancelled)?)
        } else {
            if self.shared.link.send_frame(cmd).await != LinkDeliveryResult::Delivered {
                return Err(Error::FrameDelivery);
            }
            None
        };

        Ok(CallbackSend {
            status,
            callback_rx: cb_rx,
            timeout: callback_timeout,
            _guard: guard,
        })
    }

    /// Fire-and-forget (§4.3): the caller only learns whether the bytes
    /// made it onto the wire, nothing about how the controller handled them.
    pub async fn send_fire_and_forget(&self, cmd: DataFrame) -> Result<()> {
        match self.shared.link.send_frame(cmd).await {
            LinkDeliveryResult::Delivered => Ok(()),
            LinkDeliveryResult::Failed => Err(Error::FrameDelivery),
        }
    }
}

async fn route_inbound<S>(mut inbound: mpsc::Receiver<DataFrame>, shared: Arc<Shared<S>>, mut unsolicited_tx: mpsc::Sender<DataFrame>) {
    while let Some(frame) = inbound.next().await {
        match frame.command_type {
            CommandType::Response => route_response(&shared, frame),
            CommandType::Request => route_request(&shared, frame, &mut unsolicited_tx).await,
        }
    }
}

fn route_response<S>(shared: &Arc<Shared<S>>, frame: DataFrame) {
    let expectation = {
        let mut slot = shared.response_slot.lock().expect("response_slot poisoned");
        match slot.take() {
            Some(exp) if exp.function_id == frame.function_id => Some(exp),
            Some(other) => {
                *slot = Some(other);
                None
            }
            None => None,
        }
    };
    match expectation {
        Some(exp) => {
            shared.session_log().response_matched(frame.function_id.value());
            let _ = exp.respond_to.send(frame);
        }
        None => shared.session_log().unexpected_response(frame.function_id.value()),
    }
}

async fn route_request<S>(shared: &Arc<Shared<S>>, frame: DataFrame, unsolicited_tx: &mut mpsc::Sender<DataFrame>) {
    if frame.function_id.is_unsolicited() {
        let _ = unsolicited_tx.send(frame).await;
        return;
    }

    let session_id = frame.payload.first().copied();
    let matched = session_id.and_then(|sid| shared.callback_table.lock().expect("callback_table poisoned").remove(&(frame.function_id, sid)));

    match matched {
        Some(cb) => {
            shared.session_log().callback_matched(frame.function_id.value(), session_id.expect("matched implies Some"));
            let _ = cb.respond_to.send(frame);
        }
        None => shared.session_log().discarded(format!("no waiter for request {}", frame.function_id)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use zhost_logging::NullLogger;

    #[derive(Clone)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<DataFrame>>>,
        result: LinkDeliveryResult,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                result: LinkDeliveryResult::Delivered,
            }
        }
    }

    impl FrameSender for RecordingSender {
        async fn send_frame(&self, frame: DataFrame) -> LinkDeliveryResult {
            self.sent.lock().unwrap().push(frame);
            self.result
        }
    }

    fn frame(command_type: CommandType, function_id: FunctionType, payload: &[u8]) -> DataFrame {
        DataFrame::new(command_type, function_id, Bytes::copy_from_slice(payload))
    }

    #[tokio::test]
    async fn response_resolves_matching_waiter() {
        let sender = RecordingSender::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let (session, _unsolicited) = Session::spawn(sender, inbound_rx, Arc::new(NullLogger::default()));

        let cmd = frame(CommandType::Request, FunctionType::GET_CONTROLLER_ID, &[]);
        let wait = tokio::spawn({
            let session = session.clone();
            async move { session.send_request_response(cmd, Some(Duration::from_millis(200))).await }
        });

        tokio::task::yield_now().await;
        let mut inbound_tx = inbound_tx;
        inbound_tx
            .send(frame(CommandType::Response, FunctionType::GET_CONTROLLER_ID, &[0x01]))
            .await
            .unwrap();

        let result = wait.await.unwrap().unwrap();
        assert_eq!(result.payload.as_ref(), &[0x01]);
    }

    #[tokio::test]
    async fn unmatched_response_is_discarded_and_does_not_resolve_waiter() {
        let sender = RecordingSender::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let (session, _unsolicited) = Session::spawn(sender, inbound_rx, Arc::new(NullLogger::default()));

        let cmd = frame(CommandType::Request, FunctionType::GET_CONTROLLER_ID, &[]);
        let wait = tokio::spawn({
            let session = session.clone();
            async move { session.send_request_response(cmd, Some(Duration::from_millis(30))).await }
        });

        tokio::task::yield_now().await;
        let mut inbound_tx = inbound_tx;
        inbound_tx
            .send(frame(CommandType::Response, FunctionType::GET_SUC_NODE_ID, &[]))
            .await
            .unwrap();

        let result = wait.await.unwrap();
        assert!(matches!(result, Err(Error::ResponseTimeout)));
    }

    #[tokio::test]
    async fn unsolicited_function_is_routed_to_unsolicited_stream() {
        let sender = RecordingSender::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let (_session, mut unsolicited) = Session::spawn(sender, inbound_rx, Arc::new(NullLogger::default()));

        let mut inbound_tx = inbound_tx;
        inbound_tx
            .send(frame(CommandType::Request, FunctionType::APPLICATION_UPDATE, &[0xaa]))
            .await
            .unwrap();

        let received = unsolicited.next().await.expect("routed to unsolicited stream");
        assert_eq!(received.function_id, FunctionType::APPLICATION_UPDATE);
    }

    #[tokio::test]
    async fn callback_is_correlated_by_session_id() {
        let sender = RecordingSender::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let (session, _unsolicited) = Session::spawn(sender.clone(), inbound_rx, Arc::new(NullLogger::default()));

        let send = session
            .send_request_with_callback(
                |session_id| frame(CommandType::Request, FunctionType::SEND_DATA, &[session_id]),
                false,
                Some(Duration::from_millis(200)),
            )
            .await
            .unwrap();
        assert!(send.status.is_none());

        let sent_session_id = sender.sent.lock().unwrap()[0].payload[0];
        let mut inbound_tx = inbound_tx;
        inbound_tx
            .send(frame(CommandType::Request, FunctionType::SEND_DATA, &[sent_session_id, 0x00]))
            .await
            .unwrap();

        let callback = send.await_callback().await.unwrap();
        assert_eq!(callback.payload[0], sent_session_id);
    }

    #[tokio::test]
    async fn dropping_callback_send_cleans_up_table_entry() {
        let sender = RecordingSender::new();
        let (_inbound_tx, inbound_rx) = mpsc::channel(4);
        let (session, _unsolicited) = Session::spawn(sender.clone(), inbound_rx, Arc::new(NullLogger::default()));

        let send = session
            .send_request_with_callback(|session_id| frame(CommandType::Request, FunctionType::SEND_DATA, &[session_id]), false, None)
            .await
            .unwrap();
        let sent_session_id = sender.sent.lock().unwrap()[0].payload[0];
        drop(send);

        assert!(session
            .shared
            .callback_table
            .lock()
            .unwrap()
            .get(&(FunctionType::SEND_DATA, sent_session_id))
            .is_none());
    }

    #[tokio::test]
    async fn frame_delivery_failure_surfaces_as_error() {
        let sender = RecordingSender {
            sent: Arc::new(Mutex::new(Vec::new())),
            result: LinkDeliveryResult::Failed,
        };
        let (_inbound_tx, inbound_rx) = mpsc::channel(4);
        let (session, _unsolicited) = Session::spawn(sender, inbound_rx, Arc::new(NullLogger::default()));

        let cmd = frame(CommandType::Request, FunctionType::GET_CONTROLLER_ID, &[]);
        let result = session.send_request_response(cmd, Some(Duration::from_millis(30))).await;
        assert!(matches!(result, Err(Error::FrameDelivery)));
    }
}
