use crate::sink::LocalImmutableLogger;
use zhost_core::log::{Direction, LogInfo, LogPayload, Loglevel};

/// Logs per-node interview progress and command-class dispatch outcomes
/// (§4.5, §4.6).
pub struct NodeLogger<'a> {
    inner: &'a dyn LocalImmutableLogger,
    node_id: u16,
}

impl<'a> NodeLogger<'a> {
    pub fn new(inner: &'a dyn LocalImmutableLogger, node_id: u16) -> Self {
        Self { inner, node_id }
    }

    pub fn interview_stage(&self, stage: impl Into<String>) {
        self.emit(Loglevel::Info, stage.into());
    }

    pub fn cc_interview_failed(&self, cc_id: u8, reason: impl std::fmt::Display) {
        self.emit(Loglevel::Warn, format!("CC {cc_id:#04x} interview failed: {reason}"));
    }

    pub fn unsolicited_dropped(&self, cc_id: u8) {
        self.emit(Loglevel::Warn, format!("no handler for CC {cc_id:#04x}, dropping report"));
    }

    fn emit(&self, level: Loglevel, message: String) {
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("NODE")
            .direction(Direction::None)
            .secondary_tag(format!("node {:03}", self.node_id))
            .payload(LogPayload::from(message))
            .build();
        self.inner.log(log, level);
    }
}
