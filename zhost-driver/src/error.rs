use thiserror::Error;

/// The driver's error taxonomy (§7). Kinds, not a grab-bag: each variant
/// names a recovery already decided elsewhere (link retransmit, session
/// slot release, handler-level containment) rather than leaving the
/// caller to guess what happened.
#[derive(Error, Debug)]
pub enum Error {
    #[error("serial transport error")]
    TransportIo(#[from] zhost_serial::error::SerialError),

    #[error("frame delivery failed after exhausting retries")]
    FrameDelivery,

    #[error("no response from the controller before the deadline")]
    ResponseTimeout,

    #[error("no callback from the controller before the deadline")]
    CallbackTimeout,

    #[error("failed to parse inbound command-class payload: {0}")]
    InvalidPayload(String),

    #[error("command not supported by this command class/version")]
    CommandNotSupported,

    #[error("node does not advertise command class {0:#04x}")]
    CommandClassNotImplemented(u8),

    #[error("command class {0:#04x} exists but has not been interviewed yet")]
    CommandNotReady(u8),

    #[error("driver bring-up could not complete: {0}")]
    InitializationFailed(String),

    #[error("the operation was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
