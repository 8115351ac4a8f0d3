//! The link coordinator (§4.2): owns the serial port, runs the ACK/NAK/CAN
//! handshake and retransmission policy. Grounded on the driver's serial-API
//! actor (`select_biased!` over inbound frames, outbound commands and a
//! `MaybeSleep` timeout) but narrowed to exactly this layer's job — frame
//! delivery confirmation, not request/response/callback correlation, which
//! is the session layer's job (`crate::session`).

pub mod machine;

use self::machine::{LinkDeliveryResult, LinkMachine, LinkMachineCondition, LinkMachineInput, LinkMachineState};
use futures::channel::{mpsc, oneshot};
use futures::{pin_mut, select_biased, FutureExt, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use typed_builder::TypedBuilder;
use zhost_core::state_machine::StateMachine;
use zhost_logging::loggers::link::LinkLogger;
use zhost_logging::{Direction, LocalImmutableLogger};
use zhost_pal::MaybeSleep;
use zhost_serial::binding::SerialBinding;
use zhost_serial::frame::{ControlByte, DataFrame, Frame};

const INBOUND_QUEUE_DEPTH: usize = 16;
const OUTBOUND_QUEUE_DEPTH: usize = 16;

#[derive(Clone, Debug, TypedBuilder)]
pub struct LinkOptions {
    #[builder(default = Duration::from_millis(1600))]
    pub ack_timeout: Duration,
    #[builder(default = 3)]
    pub max_retries: u8,
    #[builder(default = Duration::from_millis(200))]
    pub reopen_delay: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

struct OutboundRequest {
    frame: DataFrame,
    respond_to: oneshot::Sender<LinkDeliveryResult>,
}

enum LinkCommand {
    Send(OutboundRequest),
    EmitControl(ControlByte),
}

/// The seam the session layer sends frames through (§4.3), kept separate
/// from the concrete `LinkHandle` so session-layer tests can run against an
/// in-memory stand-in instead of a real link coordinator.
pub trait FrameSender: Send + Sync {
    fn send_frame(&self, frame: DataFrame) -> impl std::future::Future<Output = LinkDeliveryResult> + Send;
}

/// A cheap, cloneable handle to a running link coordinator.
#[derive(Clone)]
pub struct LinkHandle {
    outbound_tx: mpsc::Sender<LinkCommand>,
}

impl LinkHandle {
    /// Enqueues `frame` for transmission and waits for the link to resolve
    /// its delivery (ACKed, or retries exhausted). Never surfaces a
    /// transport error directly — a closed link resolves as `Failed`.
    pub async fn send_frame(&self, frame: DataFrame) -> LinkDeliveryResult {
        let (respond_to, rx) = oneshot::channel();
        let mut sender = self.outbound_tx.clone();
        if sender.send(LinkCommand::Send(OutboundRequest { frame, respond_to })).await.is_err() {
            return LinkDeliveryResult::Failed;
        }
        rx.await.unwrap_or(LinkDeliveryResult::Failed)
    }

    /// Writes a bare control byte onto the wire with no delivery tracking
    /// (§4.4 bootstrap: the leading NAK that clears a stuck transmission).
    pub async fn send_control(&self, byte: ControlByte) {
        let mut sender = self.outbound_tx.clone();
        let _ = sender.send(LinkCommand::EmitControl(byte)).await;
    }
}

impl FrameSender for LinkHandle {
    async fn send_frame(&self, frame: DataFrame) -> LinkDeliveryResult {
        LinkHandle::send_frame(self, frame).await
    }
}

enum Event {
    Inbound(Option<Frame>),
    Outbound(Option<LinkCommand>),
    TimedOut,
}

struct Pending {
    machine: LinkMachine,
    frame: DataFrame,
    attempts: u8,
    respond_to: Option<oneshot::Sender<LinkDeliveryResult>>,
    deadline: Option<Instant>,
}

/// Owns the port and runs the single cooperative loop that plays the role
/// of both the read loop and the write loop (§4.2, §5): every suspension
/// point is an `await`, so reading inbound bytes never blocks dequeuing
/// the next outbound frame or vice versa.
pub struct LinkActor<P> {
    port: P,
    outbound_rx: mpsc::Receiver<LinkCommand>,
    inbound_tx: mpsc::Sender<DataFrame>,
    options: LinkOptions,
    logger: Arc<dyn LocalImmutableLogger>,
    pending: Option<Pending>,
}

impl<P: SerialBinding + Send + 'static> LinkActor<P> {
    /// Spawns the actor on the current executor and returns a handle plus
    /// the inbound stream of well-formed `DataFrame`s.
    pub fn spawn(port: P, options: LinkOptions, logger: Arc<dyn LocalImmutableLogger>) -> (LinkHandle, mpsc::Receiver<DataFrame>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let actor = Self {
            port,
            outbound_rx,
            inbound_tx,
            options,
            logger,
            pending: None,
        };
        tokio::spawn(actor.run());
        (LinkHandle { outbound_tx }, inbound_rx)
    }

    fn link_log(&self) -> LinkLogger<'_> {
        LinkLogger::new(self.logger.as_ref())
    }

    async fn run(mut self) {
        loop {
            let timeout = self
                .pending
                .as_ref()
                .and_then(|p| p.deadline)
                .and_then(|d| d.checked_duration_since(Instant::now()));

            // Resolve which event fired in its own scope so every borrow it
            // takes on `self.port` / `self.outbound_rx` ends before the
            // handling below needs `&mut self` as a whole.
            let event = {
                let read_fut = self.port.read().fuse();
                let outbound_fut = self.outbound_rx.next().fuse();
                let sleep_fut = MaybeSleep::new(timeout).fuse();
                pin_mut!(read_fut, outbound_fut, sleep_fut);

                select_biased! {
                    frame = read_fut => Event::Inbound(frame),
                    request = outbound_fut => Event::Outbound(request),
                    _ = sleep_fut => Event::TimedOut,
                }
            };

            match event {
                Event::Inbound(Some(frame)) => self.handle_inbound(frame).await,
                Event::Inbound(None) => self.reopen().await,
                Event::Outbound(Some(LinkCommand::Send(request))) => self.handle_outbound_request(request).await,
                Event::Outbound(Some(LinkCommand::EmitControl(byte))) => self.write_control(byte).await,
                Event::Outbound(None) => return,
                Event::TimedOut => self.advance(LinkMachineInput::Timeout).await,
            }
        }
    }

    /// Read-loop side (§4.2): ACK well-formed frames immediately, NAK
    /// malformed ones, and forward control bytes to whatever send is in
    /// flight — even while this actor is itself awaiting its own ACK.
    async fn handle_inbound(&mut self, frame: Frame) {
        match frame {
            Frame::Control(byte) => {
                self.link_log().control_flow(control_name(byte), Direction::Inbound);
                let input = match byte {
                    ControlByte::Ack => LinkMachineInput::Ack,
                    ControlByte::Nak => LinkMachineInput::Nak,
                    ControlByte::Can => LinkMachineInput::Can,
                };
                self.advance(input).await;
            }
            Frame::Data(data) => {
                self.link_log().data(&data.payload, Direction::Inbound);
                if data.checksum_valid() {
                    self.write_control(ControlByte::Ack).await;
                    let _ = self.inbound_tx.send(data).await;
                } else {
                    self.link_log().discarded(&data.payload);
                    self.write_control(ControlByte::Nak).await;
                }
            }
        }
    }

    async fn handle_outbound_request(&mut self, request: OutboundRequest) {
        if self.pending.is_some() {
            // The session layer already enforces one request/response pair
            // at a time, but frame delivery itself has no such limit; queue
            // depth alone back-pressures extra sends.
            self.outbound_rx_overflow(request).await;
            return;
        }
        let mut machine = LinkMachine::new();
        let transition = machine
            .next(LinkMachineInput::Dequeued, |_| false)
            .expect("Idle always accepts Dequeued");
        machine.transition(transition.new_state());

        self.write_data(&request.frame).await;
        self.pending = Some(Pending {
            machine,
            frame: request.frame,
            attempts: 0,
            respond_to: Some(request.respond_to),
            deadline: Instant::now().checked_add(self.options.ack_timeout),
        });
    }

    // A second send arriving while one is in flight cannot happen under the
    // session layer's contract; if it ever does, fail it immediately rather
    // than silently stalling the caller.
    async fn outbound_rx_overflow(&mut self, request: OutboundRequest) {
        let _ = request.respond_to.send(LinkDeliveryResult::Failed);
    }

    /// Drives the pending send's `LinkMachine` with `input`, looping locally
    /// whenever a `Retry` backoff immediately produces its own
    /// `BackoffElapsed` input, so this never needs to recurse.
    async fn advance(&mut self, mut input: LinkMachineInput) {
        loop {
            let new_state = {
                let Some(pending) = &self.pending else { return };
                let condition = pending.attempts < self.options.max_retries;
                let Some(transition) = pending.machine.next(input, move |c| match c {
                    LinkMachineCondition::RetriesRemaining => condition,
                }) else {
                    return;
                };
                transition.new_state()
            };

            if let Some(pending) = self.pending.as_mut() {
                pending.machine.transition(new_state.clone());
            }

            match new_state {
                LinkMachineState::Retry => {
                    let attempts = {
                        let pending = self.pending.as_mut().expect("checked above");
                        pending.attempts += 1;
                        pending.attempts
                    };
                    self.link_log().retry(attempts);
                    let backoff = self.options.ack_timeout.min(Duration::from_millis(100 * attempts as u64));
                    tokio::time::sleep(backoff).await;
                    input = LinkMachineInput::BackoffElapsed;
                }
                LinkMachineState::AwaitingAck => {
                    if let Some(mut pending) = self.pending.take() {
                        let frame = pending.frame.clone();
                        pending.deadline = Instant::now().checked_add(self.options.ack_timeout);
                        self.pending = Some(pending);
                        self.write_data(&frame).await;
                    }
                    return;
                }
                LinkMachineState::Done(result) => {
                    if let Some(mut pending) = self.pending.take() {
                        if let Some(respond_to) = pending.respond_to.take() {
                            let _ = respond_to.send(result);
                        }
                    }
                    return;
                }
                LinkMachineState::Idle => return,
            }
        }
    }

    async fn write_data(&mut self, frame: &DataFrame) {
        self.link_log().data(&frame.payload, Direction::Outbound);
        let _ = self.port.write(Frame::Data(frame.clone())).await;
    }

    async fn write_control(&mut self, byte: ControlByte) {
        self.link_log().control_flow(control_name(byte), Direction::Outbound);
        let _ = self.port.write(Frame::Control(byte)).await;
    }

    /// Port reopen policy (§4.2): resolve whatever was in flight as failed,
    /// wait a bounded delay, then keep running — the caller is expected to
    /// have handed us a port type whose own `read`/`write` reopen
    /// internally, or to replace `self.port` out of band in a future
    /// iteration of this actor.
    async fn reopen(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            if let Some(respond_to) = pending.respond_to.take() {
                let _ = respond_to.send(LinkDeliveryResult::Failed);
            }
        }
        tokio::time::sleep(self.options.reopen_delay).await;
    }
}

fn control_name(byte: ControlByte) -> &'static str {
    match byte {
        ControlByte::Ack => "ACK",
        ControlByte::Nak => "NAK",
        ControlByte::Can => "CAN",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use zhost_core::definitions::{CommandType, FunctionType};
    use zhost_logging::sink::NullLogger;

    /// An in-memory stand-in for a real port: `inbox` is what the "remote
    /// controller" sends us, `outbox` records every frame we sent it.
    struct FakePort {
        inbox: Mutex<VecDeque<Frame>>,
        outbox: Arc<Mutex<Vec<Frame>>>,
    }

    impl SerialBinding for FakePort {
        async fn write(&mut self, frame: Frame) -> zhost_serial::error::Result<()> {
            self.outbox.lock().unwrap().push(frame);
            Ok(())
        }

        async fn read(&mut self) -> Option<Frame> {
            loop {
                if let Some(frame) = self.inbox.lock().unwrap().pop_front() {
                    return Some(frame);
                }
                tokio::task::yield_now().await;
            }
        }
    }

    fn test_frame() -> DataFrame {
        DataFrame::new(CommandType::Request, FunctionType::SOFT_RESET, bytes::Bytes::new())
    }

    #[tokio::test]
    async fn ack_resolves_delivered_and_is_sent_once() {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mut inbox = VecDeque::new();
        inbox.push_back(Frame::Control(ControlByte::Ack));
        let port = FakePort {
            inbox: Mutex::new(inbox),
            outbox: outbox.clone(),
        };
        let (handle, _inbound) = LinkActor::spawn(port, LinkOptions::default(), Arc::new(NullLogger::default()));

        let result = handle.send_frame(test_frame()).await;
        assert_eq!(result, LinkDeliveryResult::Delivered);
        assert_eq!(outbox.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nak_then_ack_retries_and_delivers() {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mut inbox = VecDeque::new();
        inbox.push_back(Frame::Control(ControlByte::Nak));
        inbox.push_back(Frame::Control(ControlByte::Ack));
        let port = FakePort {
            inbox: Mutex::new(inbox),
            outbox: outbox.clone(),
        };
        let (handle, _inbound) = LinkActor::spawn(port, LinkOptions::default(), Arc::new(NullLogger::default()));

        let result = handle.send_frame(test_frame()).await;
        assert_eq!(result, LinkDeliveryResult::Delivered);
        assert_eq!(outbox.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn inbound_data_frame_is_acked_and_published() {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let inbound_frame = DataFrame::new(CommandType::Request, FunctionType::APPLICATION_COMMAND, bytes::Bytes::from_static(b"\x01"));
        let mut inbox = VecDeque::new();
        inbox.push_back(Frame::Data(inbound_frame.clone()));
        let port = FakePort {
            inbox: Mutex::new(inbox),
            outbox: outbox.clone(),
        };
        let (_handle, mut inbound) = LinkActor::spawn(port, LinkOptions::default(), Arc::new(NullLogger::default()));

        let received = inbound.next().await.expect("one frame published");
        assert_eq!(received, inbound_frame);
        // Give the actor's write of the ACK a chance to land.
        tokio::task::yield_now().await;
        assert!(matches!(outbox.lock().unwrap().first(), Some(Frame::Control(ControlByte::Ack))));
    }
}
