//! Page Editor Scheduler Library
//!
//! Progressive page scheduling for the page editor: the requested page first,
//! then a background sweep (neighbours, then ascending), with viewport
//! triggers served alongside. Everything runs as cooperative futures on one
//! task and stops when the file's [`CancellationToken`] is cancelled.

mod cancel;
pub mod frame_budget;
mod order;
mod scheduler;
mod viewport;

pub use cancel::{Cancelled, CancellationToken};
pub use frame_budget::FrameBudget;
pub use order::sweep_order;
pub use scheduler::{LoadOrigin, LoadOutcome, PageLoader, ProgressiveScheduler, SchedulerStats};
pub use viewport::{visibility_channel, EagerWindow, Visibility, VisibilityEvents, VisibilityPort};
