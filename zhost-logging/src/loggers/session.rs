use crate::sink::LocalImmutableLogger;
use zhost_core::log::{Direction, LogInfo, LogPayload, Loglevel};

/// Logs session-layer correlation outcomes (§4.3): matched responses and
/// callbacks, and the warnings that fire when nothing matches.
pub struct SessionLogger<'a> {
    inner: &'a dyn LocalImmutableLogger,
}

impl<'a> SessionLogger<'a> {
    pub fn new(inner: &'a dyn LocalImmutableLogger) -> Self {
        Self { inner }
    }

    pub fn response_matched(&self, function_id: u8) {
        self.emit(Loglevel::Debug, Direction::Inbound, "RESPONSE", format!("function {function_id:#04x}"));
    }

    pub fn callback_matched(&self, function_id: u8, session_id: u8) {
        self.emit(
            Loglevel::Debug,
            Direction::Inbound,
            "CALLBACK",
            format!("function {function_id:#04x} session {session_id}"),
        );
    }

    pub fn unexpected_response(&self, function_id: u8) {
        self.emit(
            Loglevel::Warn,
            Direction::Inbound,
            "UNEXPECTED",
            format!("response for function {function_id:#04x} with no matching request"),
        );
    }

    pub fn discarded(&self, reason: impl Into<String>) {
        self.emit(Loglevel::Warn, Direction::Inbound, "DISCARDED", reason.into());
    }

    fn emit(&self, level: Loglevel, direction: Direction, tag: &'static str, message: String) {
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("SESSION")
            .direction(direction)
            .primary_tags(vec![tag.into()])
            .payload(LogPayload::from(message))
            .build();
        self.inner.log(log, level);
    }
}
