//! Per-node state (§3): interview progress, protocol metadata, and the
//! command-class capability map. Grounded on `zhost_cc::registry`'s
//! `CapabilityMap` for dispatch/merge and on the awaiter module's style of
//! wrapping small bits of mutable state behind a `Mutex` rather than
//! reaching for atomics when the fields aren't hot-path.

use std::sync::Mutex;
use zhost_cc::registry::CapabilityMap;
use zhost_core::definitions::NodeId;

/// Where a node's bring-up currently stands (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewStatus {
    /// Nothing has been queried yet.
    Pending,
    /// Protocol info has been queried.
    ProtocolInfo,
    /// Node info has arrived and capabilities have been merged.
    NodeInfo,
    /// Every advertised command class has been interviewed (failures on
    /// individual CCs do not block this — §4.7).
    Complete,
}

/// The raw bytes of a `GET_NODE_PROTOCOL_INFO` response. Decoding individual
/// fields (listening, speed class, device class…) is exactly the per-function
/// payload catalog this crate leaves external (§1); bring-up only needs to
/// know the response arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo(pub bytes::Bytes);

/// A node in the network (§3). Endpoint 0 is the node itself; endpoints
/// 1..=127 are sub-devices the command-class handlers address directly and
/// are not modeled separately here.
pub struct Node {
    pub id: NodeId,
    status: Mutex<InterviewStatus>,
    protocol_info: Mutex<Option<ProtocolInfo>>,
    pub command_classes: CapabilityMap,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            status: Mutex::new(InterviewStatus::Pending),
            protocol_info: Mutex::new(None),
            command_classes: CapabilityMap::default(),
        }
    }

    pub fn status(&self) -> InterviewStatus {
        *self.status.lock().expect("node status poisoned")
    }

    pub fn set_status(&self, status: InterviewStatus) {
        *self.status.lock().expect("node status poisoned") = status;
    }

    pub fn protocol_info(&self) -> Option<ProtocolInfo> {
        self.protocol_info.lock().expect("protocol_info poisoned").clone()
    }

    pub fn set_protocol_info(&self, info: ProtocolInfo) {
        *self.protocol_info.lock().expect("protocol_info poisoned") = Some(info);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_node_starts_pending_with_no_protocol_info() {
        let node = Node::new(NodeId::new(5));
        assert_eq!(node.status(), InterviewStatus::Pending);
        assert!(node.protocol_info().is_none());
    }

    #[test]
    fn test_status_and_protocol_info_are_settable() {
        let node = Node::new(NodeId::new(5));
        node.set_status(InterviewStatus::ProtocolInfo);
        node.set_protocol_info(ProtocolInfo(bytes::Bytes::from_static(b"\x01\x02")));
        assert_eq!(node.status(), InterviewStatus::ProtocolInfo);
        assert_eq!(node.protocol_info().unwrap().0.as_ref(), b"\x01\x02");
    }
}
