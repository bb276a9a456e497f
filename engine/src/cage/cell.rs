use glam::Vec3;
use smallvec::SmallVec;

use crate::ecs::{SubjectHandle, util::SpinLock};

/// Snapshot of a bubble taken when it was placed into a cell.
///
/// Neighbour reads during decoupling go through the snapshot, never through the neighbour's
/// trait rows, which another worker may be writing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub handle: SubjectHandle,
    pub location: Vec3,
    pub radius: f32,
    pub decouple_proportion: f32,
}

pub type Occupants = SmallVec<[Occupant; 8]>;

/// A grid cell. Concurrent placement appends under the lock into `pending`; [`Cell::publish`]
/// then moves the result into `occupants`, which the read-only passes use without locking.
#[derive(Default)]
pub(crate) struct Cell {
    pending: SpinLock<Occupants>,
    occupants: Occupants,
}

impl Cell {
    /// Add an occupant. Returns `true` for the first occupant since the last publish.
    pub fn occupy(&self, occupant: Occupant) -> bool {
        let mut pending = self.pending.lock();
        pending.push(occupant);
        pending.len() == 1
    }

    pub fn publish(&mut self) {
        self.occupants = std::mem::take(self.pending.get_mut());
    }

    #[inline]
    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    pub fn clear(&mut self) {
        self.pending.get_mut().clear();
        self.occupants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupant(radius: f32) -> Occupant {
        Occupant {
            handle: SubjectHandle::default(),
            location: Vec3::ZERO,
            radius,
            decouple_proportion: 1.0,
        }
    }

    #[test]
    fn occupants_become_readable_on_publish() {
        // Given
        let mut cell = Cell::default();

        // When
        let first = cell.occupy(occupant(1.0));
        let second = cell.occupy(occupant(2.0));

        // Then
        assert!(first && !second);
        assert!(cell.occupants().is_empty());

        // When
        cell.publish();

        // Then
        assert_eq!(cell.occupants().len(), 2);
        assert!(cell.occupy(occupant(3.0)));

        // When
        cell.clear();

        // Then
        assert!(cell.occupants().is_empty());
        assert!(cell.occupy(occupant(4.0)));
    }
}
