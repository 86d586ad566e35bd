//! Structured planner (component E).

mod extract;
mod feedback;
mod planner;
mod prompt;
mod schema;

pub use extract::{extract_and_validate, find_balanced_objects};
pub use planner::structured;
pub use schema::validate;
