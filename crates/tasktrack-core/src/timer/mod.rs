mod active;
mod engine;
mod entry;
mod locks;

pub use active::ActiveTimer;
pub use engine::{StopOutcome, TickReport, TimerEngine};
pub use entry::{TimeEntry, TimeEntryFilter};
pub use locks::KeyedLocks;
