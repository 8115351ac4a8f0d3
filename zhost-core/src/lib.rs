pub mod checksum;
pub mod definitions;
pub mod error;
pub mod log;
pub mod prelude;
pub mod state_machine;
pub mod util;
pub mod wrapping_counter;
