use thiserror::Error;

/// Failures from the serial transport layer (§7). The link coordinator maps
/// `Io` into its port-reopen policy; the rest are reported to the caller of
/// `SerialBinding::open`.
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("I/O error on serial port: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to configure serial port {path}: {source}")]
    Configure {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
}

pub type Result<T> = std::result::Result<T, SerialError>;
