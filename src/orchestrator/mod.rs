//! Application-level orchestration.
//!
//! `controller` owns the worker slot and runs engine calls off the UI thread;
//! `session` owns the UI-thread side of a submission (validation, preference
//! persistence, control state, progress). UI/CLI layers call into this module
//! to keep responsibilities separated.

mod controller;
mod session;

pub(crate) use controller::{run_controller, UiCommand};
pub use session::{Action, Applied, FieldValues, InputState, Progress, UiContext};
