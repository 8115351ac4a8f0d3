pub mod awaiter;
pub mod cc_id;
pub mod frame;
pub mod handler;
pub mod handlers;
pub mod info;
pub mod interview;
pub mod prelude;
pub mod registry;
