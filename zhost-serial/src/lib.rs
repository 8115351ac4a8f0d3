pub mod binding;
pub mod error;
pub mod frame;
pub mod prelude;
