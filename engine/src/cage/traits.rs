use glam::{Quat, Vec3};

use crate::ecs::Trait;

/// World-space location of a subject.
#[derive(Trait, Default, Debug, Clone, Copy, PartialEq)]
pub struct Located(pub Vec3);

impl Located {
    #[inline]
    pub fn location(&self) -> Vec3 {
        self.0
    }
}

/// Forward-looking direction of a subject. Defaults to `+X`.
#[derive(Trait, Debug, Clone, Copy, PartialEq)]
pub struct Directed(pub Vec3);

impl Default for Directed {
    fn default() -> Self {
        Self(Vec3::X)
    }
}

impl Directed {
    /// The rotation turning `+X` toward the direction without rolling about it. Identity for a
    /// zero direction.
    pub fn rotation(&self) -> Quat {
        let Vec3 { x, y, z } = self.0;
        let yaw = y.atan2(x);
        let pitch = z.atan2(x.hypot(y));
        Quat::from_rotation_z(yaw) * Quat::from_rotation_y(-pitch)
    }
}

/// Explicit orientation of a subject.
#[derive(Trait, Debug, Clone, Copy, PartialEq)]
pub struct Rotated(pub Quat);

impl Default for Rotated {
    fn default() -> Self {
        Self(Quat::IDENTITY)
    }
}

/// Per-axis scale factors of a subject.
#[derive(Trait, Debug, Clone, Copy, PartialEq)]
pub struct Scaled(pub Vec3);

impl Default for Scaled {
    fn default() -> Self {
        Self(Vec3::ONE)
    }
}

impl Scaled {
    pub fn uniform(factor: f32) -> Self {
        Self(Vec3::splat(factor))
    }
}

/// A sphere collider taking part in decoupling.
#[derive(Trait, Debug, Clone, Copy, PartialEq)]
pub struct BubbleSphere {
    pub radius: f32,
    /// Share of a pair's correction this sphere takes, a bit like an inverse mass. Zero keeps the
    /// sphere in place.
    pub decouple_proportion: f32,
    pub accumulated_decouple: Vec3,
    pub accumulated_decouple_count: u32,
}

impl Default for BubbleSphere {
    fn default() -> Self {
        Self {
            radius: 1.0,
            decouple_proportion: 1.0,
            accumulated_decouple: Vec3::ZERO,
            accumulated_decouple_count: 0,
        }
    }
}

impl BubbleSphere {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    pub fn with_decouple_proportion(mut self, decouple_proportion: f32) -> Self {
        self.decouple_proportion = decouple_proportion;
        self
    }

    pub(crate) fn accumulate(&mut self, push: Vec3) {
        self.accumulated_decouple += push;
        self.accumulated_decouple_count += 1;
    }

    /// Move `location` by the average accumulated push and reset the accumulators. Returns whether
    /// anything was accumulated.
    pub(crate) fn apply_decouple(&mut self, location: &mut Vec3) -> bool {
        if self.accumulated_decouple_count == 0 {
            return false;
        }
        *location += self.accumulated_decouple / self.accumulated_decouple_count as f32;
        self.accumulated_decouple = Vec3::ZERO;
        self.accumulated_decouple_count = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_the_average_push() {
        // Given
        let mut sphere = BubbleSphere::new(0.5);
        let mut location = Vec3::ZERO;
        sphere.accumulate(Vec3::new(1.0, 0.0, 0.0));
        sphere.accumulate(Vec3::new(0.0, 2.0, 0.0));

        // When
        let applied = sphere.apply_decouple(&mut location);

        // Then
        assert!(applied);
        assert_eq!(location, Vec3::new(0.5, 1.0, 0.0));
        assert_eq!(sphere.accumulated_decouple, Vec3::ZERO);
        assert_eq!(sphere.accumulated_decouple_count, 0);
        assert!(!sphere.apply_decouple(&mut location));
    }

    #[test]
    fn direction_turns_forward_without_roll() {
        let cases = [Vec3::X, Vec3::Y, Vec3::NEG_X, Vec3::new(1.0, 1.0, 1.0), Vec3::Z];
        for direction in cases {
            let rotation = Directed(direction).rotation();
            assert!((rotation * Vec3::X).abs_diff_eq(direction.normalize(), 1e-5));
            assert!((rotation * Vec3::Y).z.abs() < 1e-5);
        }
        assert_eq!(Directed(Vec3::ZERO).rotation(), Quat::IDENTITY);
    }
}
