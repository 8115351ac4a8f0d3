pub use crate::binding::{SerialBinding, SerialPort};
pub use crate::error::{Result, SerialError};
pub use crate::frame::{ControlByte, DataFrame, Frame, ParsedFrame};
