//! Wayfarer Engine - Journey State Machine
//!
//! Interprets manifest-declared steps, transitions, guard expressions,
//! timeouts and API bindings. All event processing is serialized on a
//! single queue; bindings run as independent tasks and report back
//! through the signal channel.

mod guard;
mod machine;
mod path;

pub use guard::{eval as eval_guard, GuardContext};
pub use machine::{spawn, EngineHandle, EngineParams, EngineSignal, PageEmit};
pub use path::lookup_path;
