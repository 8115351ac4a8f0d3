pub mod controller;
pub mod driver;
pub mod link;
pub mod node;
pub mod session;
