use crate::sink::LocalImmutableLogger;
use zhost_core::log::{Direction, LogInfo, LogPayload, Loglevel};

/// Logs controller bring-up milestones (§4.4): identity, capabilities,
/// SUC/SIS self-promotion, node enumeration.
pub struct ControllerLogger<'a> {
    inner: &'a dyn LocalImmutableLogger,
}

impl<'a> ControllerLogger<'a> {
    pub fn new(inner: &'a dyn LocalImmutableLogger) -> Self {
        Self { inner }
    }

    pub fn info(&self, message: impl Into<String>) {
        if self.inner.log_level() < Loglevel::Info {
            return;
        }
        let log = LogInfo::builder()
            .label("CNTRLR")
            .direction(Direction::None)
            .payload(LogPayload::from(message.into()))
            .build();
        self.inner.log(log, Loglevel::Info);
    }
}
