//! Per-node interview orchestrator (§4.6): protocol info, node info (with
//! bounded linear-backoff retry), capability merge, then command-class
//! interviews in topological order. Grounded on `zhost_cc::interview`'s
//! two-queue rotation for the ordering step and on the session layer's
//! cancellation-safe await pattern for the node-info wait.

use crate::controller::Controller;
use crate::driver::DriverShared;
use crate::node::{InterviewStatus, Node, ProtocolInfo};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use zhost_cc::prelude::*;
use zhost_core::definitions::{CommandType, FunctionType};
use zhost_logging::loggers::node::NodeLogger;
use zhost_serial::frame::DataFrame;

const PROTOCOL_INFO_TIMEOUT: Duration = Duration::from_millis(1600);
const NODE_INFO_ACCEPT_TIMEOUT: Duration = Duration::from_millis(1600);
const NODE_INFO_WAIT: Duration = Duration::from_secs(5);
/// §9 open question: the spec does not mandate a ceiling on the node-info
/// retry count, only the 100ms × attempt backoff curve; this crate picks a
/// bound rather than retrying forever (see DESIGN.md).
const NODE_INFO_MAX_ATTEMPTS: u32 = 5;
/// A raw node info payload's device-class header (basic/generic/specific)
/// precedes the command-class list; the exact byte layout is the mechanical
/// per-function encoding this crate leaves external (§1), but the
/// orchestrator needs to know where the CC list starts to merge it.
const CC_LIST_OFFSET: usize = 3;

/// Drives one node's interview to completion (or to the point where it
/// gives up, per §4.7: individual-CC failures never abort the interview,
/// but a missing node-info response does — there is nothing left to
/// interview without it).
pub(crate) async fn interview_node(node: Arc<Node>, shared: Arc<DriverShared>, controller: Arc<Controller>) {
    let log = NodeLogger::new(shared.logger.as_ref(), node.id.value());

    log.interview_stage("querying protocol info");
    let protocol_info_request = DataFrame::new(
        CommandType::Request,
        FunctionType::GET_NODE_PROTOCOL_INFO,
        Bytes::copy_from_slice(&[node.id.value() as u8]),
    );
    match shared.session.send_request_response(protocol_info_request, Some(PROTOCOL_INFO_TIMEOUT)).await {
        Ok(response) => node.set_protocol_info(ProtocolInfo(response.payload)),
        Err(err) => {
            log.cc_interview_failed(0, format!("protocol info query failed: {err}"));
            return;
        }
    }
    node.set_status(InterviewStatus::ProtocolInfo);

    if node.id == controller.own_node_id {
        node.set_status(InterviewStatus::Complete);
        log.interview_stage("controller's own node id, interview complete");
        return;
    }

    let Some(node_info) = request_node_info(&node, &shared, &log).await else {
        log.interview_stage("node info never arrived, abandoning interview");
        return;
    };

    merge_capabilities(&node, &node_info, &shared);
    node.set_status(InterviewStatus::NodeInfo);

    run_cc_interviews(&node, &log).await;
    node.set_status(InterviewStatus::Complete);
    log.interview_stage("interview complete");
}

/// §4.6 step 3: request node info; if the trigger itself is not accepted,
/// retry with a linear backoff up to [`NODE_INFO_MAX_ATTEMPTS`].
async fn request_node_info(node: &Arc<Node>, shared: &Arc<DriverShared>, log: &NodeLogger<'_>) -> Option<DataFrame> {
    for attempt in 1..=NODE_INFO_MAX_ATTEMPTS {
        let request = DataFrame::new(
            CommandType::Request,
            FunctionType::REQUEST_NODE_INFO,
            Bytes::copy_from_slice(&[node.id.value() as u8]),
        );
        let accepted = shared.session.send_request_response(request, Some(NODE_INFO_ACCEPT_TIMEOUT)).await;
        match accepted {
            Ok(response) if response.payload.first() == Some(&0x01) => {}
            _ => {
                log.interview_stage(format!("request node info not accepted, attempt {attempt}"));
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                continue;
            }
        }

        match shared.await_node_info(node.id, NODE_INFO_WAIT).await {
            Ok(frame) => return Some(frame),
            Err(_) => {
                log.interview_stage(format!("node info wait timed out, attempt {attempt}"));
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
            }
        }
    }
    None
}

/// §4.5.1: merges the advertised support/control lists into the node's
/// capability map, constructing a handler on first advertisement.
fn merge_capabilities(node: &Arc<Node>, node_info: &DataFrame, shared: &Arc<DriverShared>) {
    let payload = &node_info.payload;
    if payload.len() <= CC_LIST_OFFSET {
        return;
    }
    let cc_bytes = &payload[CC_LIST_OFFSET..];
    let mark = cc_bytes.iter().position(|&b| b == CommandClassInfo::SUPPORT_CONTROL_MARK);
    let (supported, controlled): (&[u8], &[u8]) = match mark {
        Some(idx) => (&cc_bytes[..idx], &cc_bytes[idx + 1..]),
        None => (cc_bytes, &[]),
    };

    let merge_one = |id_byte: u8, supported: bool, controlled: bool| {
        let id = CommandClassId::from(id_byte);
        let info = CommandClassInfo { id, supported, controlled };
        let factory = shared.handler_factory.clone();
        node.command_classes.merge(info, move || factory(id));
    };
    for &id_byte in supported {
        merge_one(id_byte, true, false);
    }
    for &id_byte in controlled {
        merge_one(id_byte, false, true);
    }
}

/// §4.6 step 5: the two-queue topological rotation, delegated to
/// `zhost_cc::interview::interview_order`. Individual CC interview
/// failures are logged and do not abort the rest (§4.7).
async fn run_cc_interviews(node: &Arc<Node>, log: &NodeLogger<'_>) {
    let ids = node.command_classes.ids();
    let order = interview_order(&ids, |id| node.command_classes.get(id).map(|h| h.dependencies().to_vec()).unwrap_or_default());

    for id in order {
        let Some(handler) = node.command_classes.get(id) else { continue };
        log.interview_stage(format!("interviewing CC {id}"));
        if let Err(err) = handler.interview(CancelToken::default()).await {
            log.cc_interview_failed(id.value(), err);
        }
    }
}
