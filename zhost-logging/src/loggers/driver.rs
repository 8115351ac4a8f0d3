use crate::sink::LocalImmutableLogger;
use zhost_core::log::{Direction, LogInfo, LogPayload, Loglevel};

pub struct DriverLogger<'a> {
    inner: &'a dyn LocalImmutableLogger,
}

impl<'a> DriverLogger<'a> {
    pub fn new(inner: &'a dyn LocalImmutableLogger) -> Self {
        Self { inner }
    }

    pub fn message(&self, message: impl Into<String>) {
        let log = LogInfo::builder()
            .label("DRIVER")
            .direction(Direction::None)
            .payload(LogPayload::from(message.into()))
            .build();
        self.inner.log(log, Loglevel::Info);
    }
}
