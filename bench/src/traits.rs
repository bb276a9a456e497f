//! Plain traits used by the mechanism benchmarks.

use apparatus::ecs::Trait;

/// 3D position (12 bytes).
#[derive(Trait, Clone, Copy, Debug, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 3D velocity (12 bytes).
#[derive(Trait, Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A wide trait that makes moving subjects between chunks expensive (64 bytes).
#[derive(Trait, Clone, Copy, Debug)]
pub struct Transform {
    pub matrix: [[f32; 4]; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

/// Zero-sized marker.
#[derive(Trait, Clone, Copy, Debug, Default)]
pub struct Marked;
