//! Apparatus: a chunked subject runtime and a uniform-grid sphere decoupler built on it.

extern crate self as apparatus;

pub mod cage;
pub mod core;
pub mod ecs;
