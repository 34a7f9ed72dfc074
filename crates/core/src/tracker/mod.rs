pub mod cache;
pub mod poll;
pub mod window;

pub use cache::{LoopState, ScheduleCache, SnapshotStatus};
pub use poll::{CycleReport, PollLoop};
pub use window::WindowClassifier;
