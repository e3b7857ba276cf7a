pub mod ai;
pub mod availability;
pub mod calendar;
pub mod conversation;
pub mod orchestrator;
