use glam::{IVec3, Vec3};
use log::warn;

use crate::ecs::{Error, Outcome};

/// Tunables of a [`BubbleCage`](super::BubbleCage).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CageConfig {
    /// Edge length of one cell in world units.
    pub cell_size: f32,
    /// Number of cells along each axis. Has no usable default.
    pub size: IVec3,
    /// Workers used by every concurrent pass.
    pub thread_count: usize,
    /// Whether [`BubbleCage::draw_cells`](super::BubbleCage::draw_cells) emits anything.
    pub debug_draw_cells: bool,
}

impl Default for CageConfig {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            size: IVec3::ZERO,
            thread_count: 4,
            debug_draw_cells: false,
        }
    }
}

impl CageConfig {
    /// The largest total number of cells.
    pub const CELLS_MAX: i64 = i32::MAX as i64;

    pub fn validate(&self) -> Outcome<()> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            warn!("cage cell size must be positive, got {}", self.cell_size);
            return Err(Error::InvalidArgument);
        }
        if self.size.cmple(IVec3::ZERO).any() {
            warn!("cage size must be positive along every axis, got {}", self.size);
            return Err(Error::InvalidArgument);
        }
        if self.cell_count() > Self::CELLS_MAX {
            warn!("cage of {} cells exceeds the limit", self.cell_count());
            return Err(Error::OutOfLimit);
        }
        if self.thread_count == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// Total cells, computed without overflow.
    pub fn cell_count(&self) -> i64 {
        self.size.x as i64 * self.size.y as i64 * self.size.z as i64
    }

    /// Half of the world-space size of the cage.
    pub fn extents(&self) -> Vec3 {
        self.size.as_vec3() * self.cell_size * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(size: IVec3) -> CageConfig {
        CageConfig {
            size,
            ..Default::default()
        }
    }

    #[test]
    fn default_needs_a_size() {
        assert_eq!(CageConfig::default().validate(), Err(Error::InvalidArgument));
        assert_eq!(sized(IVec3::new(4, 4, 4)).validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_values() {
        // Given
        let negative = sized(IVec3::new(4, -1, 4));
        let flat = CageConfig {
            cell_size: 0.0,
            ..sized(IVec3::ONE)
        };
        let idle = CageConfig {
            thread_count: 0,
            ..sized(IVec3::ONE)
        };

        // Then
        assert_eq!(negative.validate(), Err(Error::InvalidArgument));
        assert_eq!(flat.validate(), Err(Error::InvalidArgument));
        assert_eq!(idle.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn too_many_cells() {
        let huge = sized(IVec3::splat(2000));

        assert_eq!(huge.cell_count(), 8_000_000_000);
        assert_eq!(huge.validate(), Err(Error::OutOfLimit));
    }

    #[test]
    fn extents_are_half_the_size() {
        let config = CageConfig {
            cell_size: 0.5,
            ..sized(IVec3::new(4, 8, 2))
        };

        assert_eq!(config.extents(), Vec3::new(1.0, 2.0, 0.5));
    }
}
