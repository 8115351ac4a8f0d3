use std::fmt::{Debug, Display};

/// A Serial API function id. The full catalog is an open enumeration of
/// ~120 codes (§6); the driver's correctness never depends on knowing all of
/// them; it only needs to recognize the handful it sends during bootstrap
/// and the unsolicited ones it must route specially. Everything else is an
/// opaque code the caller supplies and the controller echoes back.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionType(pub u8);

impl FunctionType {
    pub const GET_SERIAL_API_INIT_DATA: Self = Self(0x02);
    pub const APPLICATION_COMMAND: Self = Self(0x04);
    pub const GET_CONTROLLER_CAPABILITIES: Self = Self(0x05);
    pub const GET_SERIAL_API_CAPABILITIES: Self = Self(0x07);
    pub const SOFT_RESET: Self = Self(0x08);
    pub const GET_PROTOCOL_VERSION: Self = Self(0x09);
    pub const SERIAL_API_STARTED: Self = Self(0x0a);
    pub const SERIAL_API_SETUP: Self = Self(0x0b);
    pub const SEND_DATA: Self = Self(0x13);
    pub const GET_CONTROLLER_VERSION: Self = Self(0x15);
    pub const GET_CONTROLLER_ID: Self = Self(0x20);
    pub const SET_SUC_NODE_ID: Self = Self(0x54);
    pub const GET_SUC_NODE_ID: Self = Self(0x56);
    pub const REQUEST_NODE_INFO: Self = Self(0x60);
    pub const APPLICATION_UPDATE: Self = Self(0x49);
    pub const GET_NODE_PROTOCOL_INFO: Self = Self(0x41);
    pub const APPLICATION_COMMAND_HANDLER_BRIDGE: Self = Self(0xa8);

    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Whether this is one of the two "application command handler"
    /// functions that carry a command-class frame (§6).
    pub fn carries_command_class_frame(&self) -> bool {
        matches!(
            *self,
            Self::APPLICATION_COMMAND | Self::APPLICATION_COMMAND_HANDLER_BRIDGE
        )
    }

    /// Whether a Request frame with this function id is routed straight to
    /// the unsolicited stream rather than matched against the session
    /// layer's response slot or callback table (§4.3 routing rule 3).
    pub fn is_unsolicited(&self) -> bool {
        matches!(
            *self,
            Self::APPLICATION_COMMAND | Self::APPLICATION_COMMAND_HANDLER_BRIDGE | Self::APPLICATION_UPDATE | Self::SERIAL_API_STARTED
        )
    }
}

impl From<u8> for FunctionType {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<FunctionType> for u8 {
    fn from(value: FunctionType) -> Self {
        value.0
    }
}

impl Debug for FunctionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FunctionType({:#04x})", self.0)
    }
}

impl Display for FunctionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
