//! Per-session debounce windows.
//!
//! [`window`] holds the timing rules, [`scheduler`] runs delayed work and
//! [`engine`] ties both to the registry of open windows.

pub mod engine;
pub mod scheduler;
pub mod window;

pub use {
    engine::{Completion, DebounceEngine},
    scheduler::{Scheduler, TimerHandle, TokioScheduler},
    window::{PresenceCaps, TimerIntent, Window},
};
