//! Queries over a file source group: coverage and reads

pub mod decompose;
pub mod range;
pub mod request;

pub use decompose::{decompose, plan, DecomposeStats, PlannedRead};
pub use range::{availability, time_range};
pub use request::*;
