mod macros;
mod traits;

pub use traits::*;
