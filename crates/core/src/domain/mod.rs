pub mod analysis;
pub mod event;
pub mod schedule;
