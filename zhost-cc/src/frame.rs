use crate::cc_id::CommandClassId;
use bytes::Bytes;

/// An application-level command-class message, as carried inside the
/// Serial API "application command handler" function's payload (§3).
///
/// Predicates that match against this type MUST stay side-effect-free and
/// MUST NOT invoke a report's parse routine — they read `command_id` and
/// raw `payload` bytes only (§4.5, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandClassFrame {
    pub cc_id: CommandClassId,
    pub command_id: u8,
    pub payload: Bytes,
}

impl CommandClassFrame {
    pub fn new(cc_id: CommandClassId, command_id: u8, payload: Bytes) -> Self {
        Self {
            cc_id,
            command_id,
            payload,
        }
    }
}
