use glam::Vec3;

/// An axis-aligned box, inclusive at `min` and exclusive at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// A box around `center` reaching `extents` along each axis.
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half of the size.
    #[inline]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether every side has positive length.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmplt(self.max).all()
    }

    #[inline]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmplt(self.max).all()
    }

    /// The twelve edges of the box.
    pub fn edges(&self) -> [(Vec3, Vec3); 12] {
        let (a, b) = (self.min, self.max);
        let corner = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        [
            (corner(a.x, a.y, a.z), corner(b.x, a.y, a.z)),
            (corner(a.x, b.y, a.z), corner(b.x, b.y, a.z)),
            (corner(a.x, a.y, b.z), corner(b.x, a.y, b.z)),
            (corner(a.x, b.y, b.z), corner(b.x, b.y, b.z)),
            (corner(a.x, a.y, a.z), corner(a.x, b.y, a.z)),
            (corner(b.x, a.y, a.z), corner(b.x, b.y, a.z)),
            (corner(a.x, a.y, b.z), corner(a.x, b.y, b.z)),
            (corner(b.x, a.y, b.z), corner(b.x, b.y, b.z)),
            (corner(a.x, a.y, a.z), corner(a.x, a.y, b.z)),
            (corner(b.x, a.y, a.z), corner(b.x, a.y, b.z)),
            (corner(a.x, b.y, a.z), corner(a.x, b.y, b.z)),
            (corner(b.x, b.y, a.z), corner(b.x, b.y, b.z)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_containment() {
        // Given
        let bounds = Bounds::from_center_extents(Vec3::ZERO, Vec3::splat(2.0));

        // Then
        assert!(bounds.contains(Vec3::splat(-2.0)));
        assert!(bounds.contains(Vec3::new(1.999, 0.0, -2.0)));
        assert!(!bounds.contains(Vec3::new(2.0, 0.0, 0.0)));
        assert!(!bounds.contains(Vec3::new(0.0, -2.001, 0.0)));
    }

    #[test]
    fn derived_measures() {
        let bounds = Bounds::new(Vec3::new(8.0, -2.0, -1.0), Vec3::new(12.0, 2.0, 1.0));

        assert_eq!(bounds.center(), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(bounds.extents(), Vec3::new(2.0, 2.0, 1.0));
        assert_eq!(bounds.size(), Vec3::new(4.0, 4.0, 2.0));
        assert!(bounds.is_valid());
        assert!(!Bounds::new(Vec3::ONE, Vec3::ONE).is_valid());
    }

    #[test]
    fn edges_have_box_lengths() {
        let bounds = Bounds::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));

        let mut lengths: Vec<f32> = bounds
            .edges()
            .iter()
            .map(|(from, to)| from.distance(*to))
            .collect();
        lengths.sort_by(f32::total_cmp);

        assert_eq!(
            lengths,
            vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0]
        );
    }
}
