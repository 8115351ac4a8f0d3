use thiserror::Error;

/// Errors shared by every layer below the driver crate. Layer-specific error
/// enums (`zhost_serial::Error`, `zhost_driver::Error`) wrap this one via
/// `#[from]` rather than duplicating its variants.
#[derive(Error, Debug)]
pub enum Error {
    #[error("parsing failed: {0}")]
    Parser(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
