//! A handful of representative handlers grounding the dispatch machinery
//! (§4.5) in concrete behavior. The full command-class payload catalog is
//! out of scope — see §1.

pub mod battery;
pub mod generic;
pub mod version;
pub mod wake_up;

use crate::cc_id::CommandClassId;
use crate::handler::CcHandler;
use std::sync::Arc;

/// A plain table mapping CC id to constructor (§9 design note: replaces the
/// teacher's source-generated factory, which needed build-time reflection
/// this crate doesn't have). Anything not named here falls through to
/// [`generic::GenericHandler`].
pub fn default_handler(id: CommandClassId) -> Arc<dyn CcHandler> {
    match id {
        CommandClassId::VERSION => version::VersionHandler::new(),
        CommandClassId::BATTERY => battery::BatteryHandler::new(),
        CommandClassId::WAKE_UP => wake_up::WakeUpHandler::new(),
        other => generic::GenericHandler::new(other),
    }
}
