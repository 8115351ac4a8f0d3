//! The structured payload model that every logger in `zhost-logging` formats
//! into. Kept free of any I/O: the driver only ever produces `LogInfo`
//! values, the consumer-supplied sink decides how (or whether) to render
//! them.

use std::borrow::Cow;
use typed_builder::TypedBuilder;

/// How verbose a log message is. Lower is more severe; `log_level() <
/// message_level` means "suppress".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Loglevel {
    Error,
    Warn,
    Info,
    Debug,
    Silly,
}

pub trait ToLogPayload {
    fn to_log_payload(&self) -> LogPayload;
}

impl ToLogPayload for str {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::Text(self.to_owned().into())
    }
}

/// The body of a log message, independent of the frame (label/tags/level)
/// it's wrapped in.
#[derive(Clone)]
pub enum LogPayload {
    /// A handful of already-formatted lines.
    Text(Cow<'static, str>),
    /// Key/value pairs, aligned by the longest key when rendered.
    Dict(LogPayloadDict),
    Empty,
}

impl LogPayload {
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl From<String> for LogPayload {
    fn from(value: String) -> Self {
        Self::Text(value.into())
    }
}

impl From<&'static str> for LogPayload {
    fn from(value: &'static str) -> Self {
        Self::Text(value.into())
    }
}

#[derive(Default, Clone)]
pub struct LogPayloadDict {
    pub entries: Vec<(Cow<'static, str>, String)>,
}

impl LogPayloadDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<Cow<'static, str>>, value: impl ToString) -> Self {
        self.entries.push((key.into(), value.to_string()));
        self
    }
}

impl From<LogPayloadDict> for LogPayload {
    fn from(dict: LogPayloadDict) -> Self {
        Self::Dict(dict)
    }
}

/// Which direction a logged frame/command travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
    None,
}

/// One fully-assembled log event: a label identifying the subsystem
/// (`"LINK"`, `"SESSION"`, `"CONTROLLER"`, node id for per-node logs), an
/// optional direction arrow, short tags shown next to the label, and the
/// payload body.
#[derive(Clone, TypedBuilder)]
pub struct LogInfo {
    pub label: &'static str,
    #[builder(default = Direction::None)]
    pub direction: Direction,
    #[builder(default, setter(into))]
    pub primary_tags: Vec<Cow<'static, str>>,
    #[builder(default, setter(strip_option, into))]
    pub secondary_tag: Option<Cow<'static, str>>,
    #[builder(setter(into))]
    pub payload: LogPayload,
}
