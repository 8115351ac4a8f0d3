//! Top-level driver bootstrap (§4.4) and the handle the rest of an
//! application holds. Grounded on the teacher's `Driver`/`DriverActor`
//! handle-split (a cheap-clone front door plus an owner of the lower
//! layers), narrowed here to this crate's single-controller scope: there is
//! no separate actor task because the link coordinator and the session
//! layer are already actors of their own (`crate::link`, `crate::session`);
//! this module only sequences bring-up and owns the node table.

use crate::controller::{decode_node_id_bitmask, Controller, ControllerCapabilities};
use crate::error::{Error, Result};
use crate::interview;
use crate::link::{FrameSender, LinkActor, LinkHandle, LinkOptions};
use crate::node::Node;
use crate::session::{CallbackSend, Session};
use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use typed_builder::TypedBuilder;
use zhost_cc::prelude::{CcHandler, CommandClassFrame, CommandClassId, DispatchOutcome};
use zhost_core::definitions::{CommandType, FunctionType, NodeId};
use zhost_logging::loggers::controller::ControllerLogger;
use zhost_logging::loggers::driver::DriverLogger;
use zhost_logging::loggers::node::NodeLogger;
use zhost_logging::{LocalImmutableLogger, NullLogger};
use zhost_pal::MaybeSleep;
use zhost_serial::binding::SerialPort;
use zhost_serial::frame::{ControlByte, DataFrame};

/// How long bring-up waits for the controller's unsolicited "serial API
/// started" notification before proceeding anyway (§4.4 step 3).
const SERIAL_API_STARTED_WAIT: Duration = Duration::from_secs(2);
const BRINGUP_TIMEOUT: Duration = Duration::from_millis(1600);
const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Constructs the `CcHandler` for a freshly-advertised command class. The
/// catalog of concrete handlers (BinarySwitch, Battery, …) is exactly the
/// per-command-class build described as external in §1; the driver only
/// needs a way to ask for one.
pub type HandlerFactory = Arc<dyn Fn(CommandClassId) -> Arc<dyn CcHandler> + Send + Sync>;

#[derive(TypedBuilder)]
pub struct DriverOptions {
    #[builder(setter(into))]
    pub port: String,
    #[builder(default)]
    pub link: LinkOptions,
    #[builder(default, setter(strip_option))]
    pub callback_default_timeout: Option<Duration>,
    #[builder(default = Arc::new(NullLogger::default()))]
    pub log_sink: Arc<dyn LocalImmutableLogger>,
    #[builder(default = Arc::new(zhost_cc::handlers::default_handler))]
    pub handler_factory: HandlerFactory,
}

/// Removes its `node_info_waiters` entry on drop, mirroring
/// `crate::session::CallbackGuard`.
struct NodeInfoGuard {
    shared: Arc<DriverShared>,
    node_id: NodeId,
}

impl Drop for NodeInfoGuard {
    fn drop(&mut self) {
        self.shared.node_info_waiters.lock().expect("node_info_waiters poisoned").remove(&self.node_id);
    }
}

/// State shared between the driver's public handle and the background
/// unsolicited-dispatch task. Not exposed outside the crate; `interview`
/// reaches into it directly since it is, conceptually, part of the same
/// bring-up/ownership unit as `Driver` itself.
pub(crate) struct DriverShared {
    pub(crate) session: Session<LinkHandle>,
    nodes: Mutex<HashMap<NodeId, Arc<Node>>>,
    node_info_waiters: Mutex<HashMap<NodeId, oneshot::Sender<DataFrame>>>,
    pub(crate) handler_factory: HandlerFactory,
    pub(crate) logger: Arc<dyn LocalImmutableLogger>,
}

impl DriverShared {
    /// §4.6 step 3: waits for the unsolicited "application update: node
    /// info received" message matching `node_id`, cancellation-safe like
    /// every other suspending operation in this crate (§5).
    pub(crate) async fn await_node_info(self: &Arc<Self>, node_id: NodeId, timeout: Duration) -> Result<DataFrame> {
        let (tx, rx) = oneshot::channel();
        self.node_info_waiters.lock().expect("node_info_waiters poisoned").insert(node_id, tx);
        let _guard = NodeInfoGuard {
            shared: self.clone(),
            node_id,
        };

        let sleep = MaybeSleep::new(Some(timeout));
        futures::pin_mut!(sleep);
        futures::select_biased! {
            result = rx.fuse() => result.map_err(|_| Error::Cancelled),
            _ = sleep.fuse() => Err(Error::ResponseTimeout),
        }
    }

    fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.lock().expect("nodes poisoned").get(&id).cloned()
    }
}

/// A cheap-to-clone handle to a running driver: the session layer, the
/// node table and the controller's identity, all reachable through an
/// `Arc`.
#[derive(Clone)]
pub struct Driver {
    shared: Arc<DriverShared>,
    pub controller: Arc<Controller>,
}

impl Driver {
    /// Opens the port and runs the full bootstrap sequence (§4.4), only
    /// returning once every node's interview has been *started* (not
    /// necessarily finished — those run concurrently in the background).
    pub async fn connect(options: DriverOptions) -> Result<Self> {
        let port = SerialPort::open(&options.port)?;
        let (link_handle, inbound_rx) = LinkActor::spawn(port, options.link.clone(), options.log_sink.clone());
        let (session, mut unsolicited_rx) = Session::spawn(link_handle.clone(), inbound_rx, options.log_sink.clone());
        let log = DriverLogger::new(options.log_sink.as_ref());

        log.message("clearing any in-progress controller transmission");
        link_handle.send_control(ControlByte::Nak).await;

        log.message("soft-resetting controller");
        let _ = session
            .send_fire_and_forget(DataFrame::new(CommandType::Request, FunctionType::SOFT_RESET, Bytes::new()))
            .await;

        log.message("waiting for serial API started notification");
        await_serial_api_started(&mut unsolicited_rx, SERIAL_API_STARTED_WAIT).await;

        let controller = Arc::new(enumerate_controller(&session, &log).await?);
        ControllerLogger::new(options.log_sink.as_ref()).info(format!(
            "controller ready: home id {:#010x}, own node {}, suc node {:?}",
            controller.home_id, controller.own_node_id, controller.suc_node_id
        ));

        if controller.should_self_promote_suc() {
            self_promote_suc(&session, &controller, options.callback_default_timeout).await;
        }

        let node_ids = enumerate_nodes(&session).await?;
        let mut nodes = HashMap::with_capacity(node_ids.len());
        for id in &node_ids {
            nodes.insert(*id, Arc::new(Node::new(*id)));
        }

        let shared = Arc::new(DriverShared {
            session,
            nodes: Mutex::new(nodes.clone()),
            node_info_waiters: Mutex::new(HashMap::new()),
            handler_factory: options.handler_factory,
            logger: options.log_sink.clone(),
        });
        tokio::spawn(dispatch_unsolicited(unsolicited_rx, shared.clone()));

        for node in nodes.into_values() {
            let shared = shared.clone();
            let controller = controller.clone();
            tokio::spawn(async move { interview::interview_node(node, shared, controller).await });
        }

        Ok(Self { shared, controller })
    }

    pub fn controller(&self) -> Arc<Controller> {
        self.controller.clone()
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.shared.node(id)
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.shared.nodes.lock().expect("nodes poisoned").values().cloned().collect()
    }

    /// One REQ→RES transaction (§4.3), exposed upward per §6.
    pub async fn send_request_response(&self, cmd: DataFrame, timeout: Option<Duration>) -> Result<DataFrame> {
        self.shared.session.send_request_response(cmd, timeout).await
    }

    /// A callback-bearing request (§4.3), exposed upward per §6.
    pub async fn send_request_with_callback(
        &self,
        build: impl FnOnce(u8) -> DataFrame,
        expects_status_response: bool,
        callback_timeout: Option<Duration>,
    ) -> Result<CallbackSend<LinkHandle>> {
        self.shared.session.send_request_with_callback(build, expects_status_response, callback_timeout).await
    }

    pub async fn send_fire_and_forget(&self, cmd: DataFrame) -> Result<()> {
        self.shared.session.send_fire_and_forget(cmd).await
    }
}

/// Drains (and discards) unsolicited frames until the "serial API started"
/// notification arrives or `timeout` elapses — no nodes exist yet, so
/// there is nothing useful this crate can do with anything else that
/// shows up during this narrow window.
async fn await_serial_api_started(unsolicited: &mut mpsc::Receiver<DataFrame>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let Some(remaining) = deadline.checked_duration_since(tokio::time::Instant::now()) else {
            return;
        };
        let sleep = tokio::time::sleep(remaining);
        futures::pin_mut!(sleep);
        futures::select_biased! {
            frame = unsolicited.next().fuse() => match frame {
                Some(frame) if frame.function_id == FunctionType::SERIAL_API_STARTED => return,
                Some(_) => continue,
                None => return,
            },
            _ = sleep.fuse() => return,
        }
    }
}

/// §4.4 step 4: identify the controller. Each of these function payloads is
/// the mechanical per-function encoding this crate leaves external (§1);
/// only the handful of bytes bring-up branches on are decoded here.
async fn enumerate_controller<S: FrameSender + 'static>(session: &Session<S>, log: &DriverLogger<'_>) -> Result<Controller> {
    log.message("querying controller id");
    let id_response = session
        .send_request_response(
            DataFrame::new(CommandType::Request, FunctionType::GET_CONTROLLER_ID, Bytes::new()),
            Some(BRINGUP_TIMEOUT),
        )
        .await?;
    let payload = &id_response.payload;
    if payload.len() < 5 {
        return Err(Error::InitializationFailed("GET_CONTROLLER_ID response too short".into()));
    }
    let home_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let own_node_id = NodeId::from(payload[4]);

    log.message("querying controller capabilities");
    let capabilities_response = session
        .send_request_response(
            DataFrame::new(CommandType::Request, FunctionType::GET_CONTROLLER_CAPABILITIES, Bytes::new()),
            Some(BRINGUP_TIMEOUT),
        )
        .await?;
    let capabilities = ControllerCapabilities::from_byte(capabilities_response.payload.first().copied().unwrap_or(0));

    log.message("querying SUC node id");
    let suc_response = session
        .send_request_response(
            DataFrame::new(CommandType::Request, FunctionType::GET_SUC_NODE_ID, Bytes::new()),
            Some(BRINGUP_TIMEOUT),
        )
        .await?;
    let suc_node_id = match suc_response.payload.first().copied() {
        Some(0) | None => None,
        Some(id) => Some(NodeId::from(id)),
    };

    Ok(Controller {
        home_id,
        own_node_id,
        capabilities,
        suc_node_id,
    })
}

/// §4.4 step 5: if no SUC/SIS exists yet and this controller is primary,
/// assign self as SUC/SIS. Best-effort: a failure here does not abort
/// bring-up, since the network continues to function without a SUC.
async fn self_promote_suc<S: FrameSender + 'static>(session: &Session<S>, controller: &Controller, callback_timeout: Option<Duration>) {
    let own_node_id = controller.own_node_id.value() as u8;
    let send = session
        .send_request_with_callback(
            move |session_id| {
                DataFrame::new(
                    CommandType::Request,
                    FunctionType::SET_SUC_NODE_ID,
                    Bytes::copy_from_slice(&[session_id, own_node_id, 0x01, 0x01]),
                )
            },
            true,
            Some(callback_timeout.unwrap_or(DEFAULT_CALLBACK_TIMEOUT)),
        )
        .await;
    if let Ok(send) = send {
        let _ = send.await_callback().await;
    }
}

/// §4.4 step 6: the init-data node list that seeds the node table.
async fn enumerate_nodes<S: FrameSender + 'static>(session: &Session<S>) -> Result<Vec<NodeId>> {
    let response = session
        .send_request_response(
            DataFrame::new(CommandType::Request, FunctionType::GET_SERIAL_API_INIT_DATA, Bytes::new()),
            Some(BRINGUP_TIMEOUT),
        )
        .await?;
    let payload = &response.payload;
    if payload.len() < 3 {
        return Ok(Vec::new());
    }
    let bitmask_len = payload[2] as usize;
    let end = (3 + bitmask_len).min(payload.len());
    Ok(decode_node_id_bitmask(&payload[3..end]))
}

/// The background task that owns `unsolicited_rx` for the rest of the
/// driver's lifetime: resolves node-info waiters and fans command-class
/// frames out to their node (§4.5, §4.6).
async fn dispatch_unsolicited(mut unsolicited: mpsc::Receiver<DataFrame>, shared: Arc<DriverShared>) {
    while let Some(frame) = unsolicited.next().await {
        if frame.function_id == FunctionType::APPLICATION_UPDATE {
            handle_application_update(&frame, &shared);
        } else if frame.function_id.carries_command_class_frame() {
            dispatch_command_class_frame(&frame, &shared);
        } else {
            ControllerLogger::new(shared.logger.as_ref()).info(format!("unhandled unsolicited function {}", frame.function_id));
        }
    }
}

/// Node id lives at payload byte 0 of an "application update" frame, per
/// the same convention documented in `crate::session`'s routing.
fn handle_application_update(frame: &DataFrame, shared: &Arc<DriverShared>) {
    let Some(node_id_byte) = frame.payload.first().copied() else {
        return;
    };
    let node_id = NodeId::from(node_id_byte);
    let waiter = shared.node_info_waiters.lock().expect("node_info_waiters poisoned").remove(&node_id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(frame.clone());
        }
        None => ControllerLogger::new(shared.logger.as_ref()).info(format!("unmatched application update for node {node_id}")),
    }
}

/// Command-class frame layout per §6: `[node_id, cc_id, command_id, params...]`.
fn dispatch_command_class_frame(frame: &DataFrame, shared: &Arc<DriverShared>) {
    let payload = &frame.payload;
    if payload.len() < 3 {
        return;
    }
    let node_id = NodeId::from(payload[0]);
    let cc_id = CommandClassId::from(payload[1]);
    let command_id = payload[2];
    let params = frame.payload.slice(3..);
    let cc_frame = CommandClassFrame::new(cc_id, command_id, params);

    match shared.node(node_id) {
        Some(node) => {
            if node.command_classes.process(cc_frame) == DispatchOutcome::Dropped {
                NodeLogger::new(shared.logger.as_ref(), node_id.value()).unsolicited_dropped(cc_id.value());
            }
        }
        None => ControllerLogger::new(shared.logger.as_ref()).info(format!("command class frame for unknown node {node_id}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zhost_cc::prelude::CommandClassInfo;
    use zhost_logging::sink::NullLogger as TestNullLogger;
    use zhost_serial::binding::SerialBinding;
    use zhost_serial::frame::Frame;

    /// A port that never produces an inbound frame; enough to stand up a
    /// `DriverShared` for tests that only exercise `dispatch_unsolicited`
    /// and friends directly, bypassing the link coordinator entirely.
    struct NullPort;

    impl SerialBinding for NullPort {
        async fn write(&mut self, _frame: Frame) -> zhost_serial::error::Result<()> {
            Ok(())
        }

        async fn read(&mut self) -> Option<Frame> {
            std::future::pending().await
        }
    }

    async fn test_shared() -> Arc<DriverShared> {
        let (link_handle, inbound_rx) = LinkActor::spawn(NullPort, LinkOptions::default(), Arc::new(TestNullLogger::default()));
        let (session, _unsolicited) = Session::spawn(link_handle, inbound_rx, Arc::new(TestNullLogger::default()));
        Arc::new(DriverShared {
            session,
            nodes: Mutex::new(HashMap::new()),
            node_info_waiters: Mutex::new(HashMap::new()),
            handler_factory: Arc::new(zhost_cc::handlers::default_handler),
            logger: Arc::new(TestNullLogger::default()),
        })
    }

    #[tokio::test]
    async fn await_serial_api_started_returns_once_notification_arrives() {
        let (mut tx, mut rx) = mpsc::channel(4);
        tx.try_send(DataFrame::new(CommandType::Request, FunctionType::APPLICATION_UPDATE, Bytes::new()))
            .unwrap();
        tx.try_send(DataFrame::new(CommandType::Request, FunctionType::SERIAL_API_STARTED, Bytes::new()))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), await_serial_api_started(&mut rx, Duration::from_secs(5)))
            .await
            .expect("should return promptly once the notification is seen");
    }

    #[tokio::test]
    async fn await_serial_api_started_times_out_when_nothing_arrives() {
        let (_tx, mut rx) = mpsc::channel(4);
        await_serial_api_started(&mut rx, Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn dispatch_unsolicited_resolves_matching_node_info_waiter() {
        let shared = test_shared().await;
        let node_id = NodeId::from(7u8);
        let (waiter_tx, waiter_rx) = oneshot::channel();
        shared.node_info_waiters.lock().unwrap().insert(node_id, waiter_tx);

        let (mut tx, rx) = mpsc::channel(4);
        tx.try_send(DataFrame::new(CommandType::Request, FunctionType::APPLICATION_UPDATE, Bytes::copy_from_slice(&[7])))
            .unwrap();
        drop(tx);
        dispatch_unsolicited(rx, shared.clone()).await;

        let resolved = waiter_rx.await.expect("waiter should have been resolved");
        assert_eq!(resolved.function_id, FunctionType::APPLICATION_UPDATE);
    }

    #[tokio::test]
    async fn dispatch_unsolicited_routes_command_class_frame_to_known_node() {
        let shared = test_shared().await;
        let node = Arc::new(Node::new(NodeId::from(3u8)));
        node.command_classes
            .merge(CommandClassInfo::new(CommandClassId::BATTERY), || zhost_cc::handlers::battery::BatteryHandler::new());
        shared.nodes.lock().unwrap().insert(NodeId::from(3u8), node.clone());

        let handler = node.command_classes.get(CommandClassId::BATTERY).expect("battery handler should be registered");
        let awaited = handler.awaiters().add(0x03, None, Some(Duration::from_secs(1)));

        let (mut tx, rx) = mpsc::channel(4);
        tx.try_send(DataFrame::new(
            CommandType::Request,
            FunctionType::APPLICATION_COMMAND,
            Bytes::copy_from_slice(&[3, CommandClassId::BATTERY.value(), 0x03, 55]),
        ))
        .unwrap();
        drop(tx);
        dispatch_unsolicited(rx, shared.clone()).await;

        let report = awaited.try_await().await.expect("the registered awaiter should have seen the report");
        assert_eq!(report.payload.first(), Some(&55));
    }

    #[tokio::test]
    async fn dispatch_unsolicited_ignores_frame_for_unknown_node() {
        let shared = test_shared().await;

        let (mut tx, rx) = mpsc::channel(4);
        tx.try_send(DataFrame::new(
            CommandType::Request,
            FunctionType::APPLICATION_COMMAND,
            Bytes::copy_from_slice(&[9, CommandClassId::BATTERY.value(), 0x03, 1]),
        ))
        .unwrap();
        drop(tx);

        // Should not panic despite node 9 not existing in the table.
        dispatch_unsolicited(rx, shared).await;
    }
}
