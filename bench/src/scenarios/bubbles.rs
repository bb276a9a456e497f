//! Bubble cloud benchmark scenario.
//!
//! Spheres of random radius are scattered inside a cage and pulled toward its center every step,
//! so the decouple pass always has contacts to resolve.
//!
//! This scenario tests:
//! - Concurrent placement into grid cells
//! - Neighbour enumeration across cell boundaries
//! - Deferred despawn of bubbles leaving the cage

use apparatus::{
    cage::{BubbleCage, BubbleSphere, CageConfig, Located},
    ecs::{Filter, Mechanism, SubjectHandle},
};
use glam::{IVec3, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Configuration for the bubble benchmark.
pub struct BubbleConfig {
    /// Number of bubbles.
    pub bubble_count: usize,
    /// Cells along each axis of the cage.
    pub cage_size: i32,
    pub cell_size: f32,
    /// Radii are drawn from this range.
    pub radius: (f32, f32),
    /// Fraction of the distance to the center covered per step.
    pub pull: f32,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Workers used by every concurrent pass.
    pub thread_count: usize,
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            bubble_count: 10_000,
            cage_size: 32,
            cell_size: 1.0,
            radius: (0.2, 0.5),
            pull: 0.01,
            seed: 424242,
            thread_count: 8,
        }
    }
}

/// Bubble cloud benchmark scenario.
pub struct BubbleScenario {
    config: BubbleConfig,
    mechanism: Mechanism,
    cage: BubbleCage,
    rng: ChaCha8Rng,
    bubbles: Vec<SubjectHandle>,
}

impl BubbleScenario {
    /// Create a new bubble scenario with default config.
    pub fn new() -> Self {
        Self::with_config(BubbleConfig::default())
    }

    /// Create a new bubble scenario with custom config.
    pub fn with_config(config: BubbleConfig) -> Self {
        let cage = BubbleCage::new(
            CageConfig {
                cell_size: config.cell_size,
                size: IVec3::splat(config.cage_size),
                thread_count: config.thread_count,
                debug_draw_cells: false,
            },
            Vec3::ZERO,
        )
        .expect("valid cage configuration");
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            mechanism: Mechanism::new().expect("a free mechanism id"),
            cage,
            bubbles: Vec::new(),
            config,
        }
    }

    fn spawn_bubble(&mut self) -> SubjectHandle {
        let reach = self.cage.bounds().extents() * 0.9;
        let location = Vec3::new(
            self.rng.gen_range(-reach.x..reach.x),
            self.rng.gen_range(-reach.y..reach.y),
            self.rng.gen_range(-reach.z..reach.z),
        );
        let (low, high) = self.config.radius;
        let sphere = BubbleSphere::new(self.rng.gen_range(low..high));
        self.mechanism
            .spawn_with((Located(location), sphere))
            .expect("spawn within the subject limit")
    }

    /// Pull every bubble toward the cage center.
    pub fn pull(&mut self) {
        let pull = self.config.pull;
        let center = self.cage.bounds().center();
        let chain = self
            .mechanism
            .enchain_solid(Filter::make::<Located>(self.mechanism.registry()));
        let _ = self.mechanism.operate_concurrently::<&mut Located>(
            &chain,
            |_, located| located.0 += (center - located.0) * pull,
            self.config.thread_count,
        );
    }

    /// Run one cage evaluation.
    pub fn evaluate(&mut self) {
        let _ = self.cage.evaluate(&mut self.mechanism);
    }

    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    pub fn cage(&self) -> &BubbleCage {
        &self.cage
    }

    /// Current bubble count.
    pub fn bubble_count(&self) -> usize {
        self.mechanism.subject_count()
    }
}

impl Default for BubbleScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Scenario for BubbleScenario {
    fn name(&self) -> &'static str {
        "bubbles"
    }

    fn description(&self) -> &'static str {
        "Sphere cloud placed into a uniform grid and decoupled every step"
    }

    fn subject_count(&self) -> usize {
        self.config.bubble_count
    }

    fn setup(&mut self) {
        self.bubbles = Vec::with_capacity(self.config.bubble_count);
        for _ in 0..self.config.bubble_count {
            let bubble = self.spawn_bubble();
            self.bubbles.push(bubble);
        }
        let _ = self.cage.update(&mut self.mechanism);
    }

    fn update(&mut self) {
        self.pull();
        let _ = self.mechanism.apply_deferred();
        self.evaluate();
    }

    fn teardown(&mut self) {
        self.bubbles.clear();
        let _ = self.mechanism.despawn_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::Scenario;

    fn small() -> BubbleScenario {
        BubbleScenario::with_config(BubbleConfig {
            bubble_count: 200,
            cage_size: 8,
            thread_count: 2,
            ..Default::default()
        })
    }

    #[test]
    fn bubble_scenario_setup() {
        let mut scenario = small();

        scenario.setup();
        assert_eq!(scenario.bubble_count(), 200);
        assert!(scenario.cage().occupied_cell_count() > 0);

        scenario.teardown();
        assert_eq!(scenario.bubble_count(), 0);
    }

    #[test]
    fn bubble_scenario_update() {
        let mut scenario = small();

        scenario.setup();
        for _ in 0..10 {
            scenario.update();
        }

        assert_eq!(scenario.bubble_count(), 200);
        assert!(scenario.cage().largest_radius() <= 0.5);
        scenario.teardown();
    }
}
