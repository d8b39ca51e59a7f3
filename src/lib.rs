pub mod bulletin;
pub mod calendar;
pub mod config;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod pipeline;
pub mod process;
