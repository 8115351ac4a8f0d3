use crate::sink::LocalImmutableLogger;
use zhost_core::log::{Direction, LogInfo, LogPayload, Loglevel};

const LINK_LOGLEVEL: Loglevel = Loglevel::Debug;

/// Logs raw bytes and control-flow bytes crossing the serial transport
/// (§4.1, §4.2).
pub struct LinkLogger<'a> {
    inner: &'a dyn LocalImmutableLogger,
}

impl<'a> LinkLogger<'a> {
    pub fn new(inner: &'a dyn LocalImmutableLogger) -> Self {
        Self { inner }
    }

    pub fn data(&self, data: &[u8], direction: Direction) {
        if self.inner.log_level() < LINK_LOGLEVEL {
            return;
        }
        let log = LogInfo::builder()
            .label("LINK")
            .direction(direction)
            .secondary_tag(format!("{} bytes", data.len()))
            .payload(format!("0x{}", hex::encode(data)))
            .build();
        self.inner.log(log, LINK_LOGLEVEL);
    }

    pub fn control_flow(&self, name: &'static str, direction: Direction) {
        if self.inner.log_level() < LINK_LOGLEVEL {
            return;
        }
        let log = LogInfo::builder()
            .label("LINK")
            .direction(direction)
            .primary_tags(vec![name.into()])
            .payload(LogPayload::empty())
            .build();
        self.inner.log(log, LINK_LOGLEVEL);
    }

    pub fn discarded(&self, data: &[u8]) {
        if self.inner.log_level() < LINK_LOGLEVEL {
            return;
        }
        let log = LogInfo::builder()
            .label("LINK")
            .direction(Direction::Inbound)
            .primary_tags(vec!["DISCARDED".into()])
            .secondary_tag(format!("{} bytes", data.len()))
            .payload(format!("0x{}", hex::encode(data)))
            .build();
        self.inner.log(log, LINK_LOGLEVEL);
    }

    pub fn retry(&self, attempt: u8) {
        if self.inner.log_level() < Loglevel::Warn {
            return;
        }
        let log = LogInfo::builder()
            .label("LINK")
            .direction(Direction::Outbound)
            .primary_tags(vec!["RETRY".into()])
            .secondary_tag(format!("attempt {attempt}"))
            .payload(LogPayload::empty())
            .build();
        self.inner.log(log, Loglevel::Warn);
    }
}
