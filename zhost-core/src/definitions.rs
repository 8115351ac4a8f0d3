mod command_type;
mod function_type;
mod node_id;

pub use command_type::*;
pub use function_type::*;
pub use node_id::*;
