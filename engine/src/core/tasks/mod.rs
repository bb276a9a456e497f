//! Worker pool used by concurrent iteration.

mod executor;

pub use executor::{Executor, Scope};
