//! Seeded benchmark scenarios.
//!
//! # Scenarios
//!
//! - **Bubbles**: a cloud of spheres drifting inside a cage and pushed apart every step

pub mod bubbles;

pub use bubbles::{BubbleConfig, BubbleScenario};

/// Common trait for benchmark scenarios.
pub trait Scenario {
    /// Human-readable name of the scenario.
    fn name(&self) -> &'static str;

    /// Brief description of what this scenario tests.
    fn description(&self) -> &'static str;

    /// Number of subjects in this scenario.
    fn subject_count(&self) -> usize;

    /// Set up the scenario (spawn subjects, initialize state).
    fn setup(&mut self);

    /// Run one step of the scenario.
    fn update(&mut self);

    /// Clean up the scenario.
    fn teardown(&mut self);
}
