//! Request dispatch: per-request coordination, the dispatch loop, and
//! response composition.

pub mod coordinator;
pub mod dispatcher;
pub mod progress;
pub mod render;

pub use coordinator::{Coordinator, CoordinatorError, GateFailure, ProgressView, events};
pub use dispatcher::{
    DispatchError, DispatchOutcome, DispatchReport, Dispatcher, ModuleOutcome, ModuleReport,
};
pub use progress::{AbandonReason, ModuleProgress, ProgressError};
pub use render::{DIAGNOSTICS_BLOCK, RenderedPage, body_is_empty, compose};
