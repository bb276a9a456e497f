//! Uniform-grid broad phase and sphere decoupling.
//!
//! A [`BubbleCage`] divides a box of the world into equal cubic cells. Every evaluation it places
//! each subject carrying [`Located`] and [`BubbleSphere`] into the cell under its location, then
//! pushes overlapping spheres apart. All passes run through the mechanism's concurrent iteration:
//!
//! 1. **update** clears the cells touched last time, places every bubble and despawns the ones
//!    that left the cage.
//! 2. **decouple** accumulates, for every bubble, the push away from each overlapping neighbour,
//!    then moves every bubble by the average of its pushes.
//!
//! [`BubbleCage::evaluate`] runs update, decouple and update again so that queries see the
//! resolved locations.

mod bounds;
mod cell;
mod config;
mod render;
mod traits;

pub use bounds::Bounds;
pub use cell::{Occupant, Occupants};
pub use config::CageConfig;
pub use render::{DebugDrawSink, DebugLine, InstanceSink, render_bubbles};
pub use traits::{BubbleSphere, Directed, Located, Rotated, Scaled};

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use glam::{IVec3, Vec3};
use log::{debug, trace};

use crate::ecs::{
    Error, Filter, Mechanism, Outcome, Status, SubjectHandle, SubjectId, subject::Mutable,
};
use cell::Cell;

/// Below this distance two centers give no usable direction.
const DEGENERATE_DISTANCE: f32 = 1e-2;

pub struct BubbleCage {
    config: CageConfig,
    bounds: Bounds,
    cells: Box<[Cell]>,
    /// Indices of the cells first occupied by the running placement pass.
    placed: SegQueue<usize>,
    /// Indices of the cells holding published occupants, each at most once.
    occupied: Vec<usize>,
    /// Bit pattern of the largest radius placed since the last clear.
    largest_radius: AtomicU32,
}

impl BubbleCage {
    /// A cage centered on `center`, reaching half its configured size along each axis.
    pub fn new(config: CageConfig, center: Vec3) -> Outcome<Self> {
        config.validate()?;
        let bounds = Bounds::from_center_extents(center, config.extents());
        Ok(Self {
            cells: Self::allocate(&config),
            config,
            bounds,
            placed: SegQueue::new(),
            occupied: Vec::new(),
            largest_radius: AtomicU32::new(0),
        })
    }

    /// Replace the geometry of the cage. Every cell starts out empty.
    pub fn configure(&mut self, bounds: Bounds, cell_size: f32, size: IVec3) -> Outcome {
        let config = CageConfig {
            cell_size,
            size,
            ..self.config
        };
        config.validate()?;
        if !bounds.is_valid() {
            return Err(Error::InvalidArgument);
        }
        self.cells = Self::allocate(&config);
        self.config = config;
        self.bounds = bounds;
        while self.placed.pop().is_some() {}
        self.occupied.clear();
        self.largest_radius.store(0, Ordering::Relaxed);
        debug!("cage configured with {} cells over {:?}", self.cells.len(), bounds);
        Ok(Status::Success)
    }

    fn allocate(config: &CageConfig) -> Box<[Cell]> {
        (0..config.cell_count()).map(|_| Cell::default()).collect()
    }

    #[inline]
    pub fn config(&self) -> &CageConfig {
        &self.config
    }

    pub fn set_thread_count(&mut self, thread_count: usize) {
        self.config.thread_count = thread_count.max(1);
    }

    pub fn set_debug_draw_cells(&mut self, enabled: bool) {
        self.config.debug_draw_cells = enabled;
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    pub fn size(&self) -> IVec3 {
        self.config.size
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of cells holding at least one bubble.
    pub fn occupied_cell_count(&self) -> usize {
        self.occupied.len()
    }

    /// The largest radius placed by the last update.
    pub fn largest_radius(&self) -> f32 {
        f32::from_bits(self.largest_radius.load(Ordering::Acquire))
    }

    // Coordinates

    /// The cell under a world point. Not clamped.
    #[inline]
    pub fn world_to_cell(&self, point: Vec3) -> IVec3 {
        ((point - self.bounds.min) / self.config.cell_size)
            .floor()
            .as_ivec3()
    }

    /// Linear index of a cell, clamping the cell into the cage first.
    #[inline]
    pub fn index_of(&self, cell: IVec3) -> usize {
        let size = self.config.size;
        let cell = cell.clamp(IVec3::ZERO, size - IVec3::ONE);
        (cell.x + size.x * (cell.y + size.y * cell.z)) as usize
    }

    #[inline]
    pub fn index_at(&self, point: Vec3) -> usize {
        self.index_of(self.world_to_cell(point))
    }

    /// The cell of a linear index.
    pub fn cell_point_of_index(&self, index: usize) -> IVec3 {
        let size = self.config.size;
        let index = index as i32;
        let layer = size.x * size.y;
        let z = index / layer;
        let rest = index - z * layer;
        IVec3::new(rest % size.x, rest / size.x, z)
    }

    #[inline]
    pub fn is_inside_cell(&self, cell: IVec3) -> bool {
        cell.cmpge(IVec3::ZERO).all() && cell.cmplt(self.config.size).all()
    }

    /// Whether a world point lies in the cage. The minimum corner is inside, the maximum is not.
    #[inline]
    pub fn is_inside(&self, point: Vec3) -> bool {
        point.is_finite() && self.is_inside_cell(self.world_to_cell(point))
    }

    /// The world box of a cell.
    pub fn box_at(&self, cell: IVec3) -> Bounds {
        let min = self.bounds.min + cell.as_vec3() * self.config.cell_size;
        Bounds::new(min, min + Vec3::splat(self.config.cell_size))
    }

    /// The occupants of a cell, as placed by the last update.
    pub fn occupants(&self, cell: IVec3) -> Occupants {
        Occupants::from_slice(self.cells[self.index_of(cell)].occupants())
    }

    /// The bubbles placed in the cell under a world point.
    pub fn cell_at(&self, point: Vec3) -> Vec<SubjectHandle> {
        self.occupants(self.world_to_cell(point))
            .iter()
            .map(|occupant| occupant.handle)
            .collect()
    }

    /// Visit the occupants of every cell of the box `[from, to]` that lies in the cage.
    fn for_each_occupant(&self, from: IVec3, to: IVec3, mut f: impl FnMut(&Occupant)) {
        let from = from.max(IVec3::ZERO);
        let to = to.min(self.config.size - IVec3::ONE);
        for z in from.z..=to.z {
            for y in from.y..=to.y {
                for x in from.x..=to.x {
                    self.cells[self.index_of(IVec3::new(x, y, z))]
                        .occupants()
                        .iter()
                        .for_each(&mut f);
                }
            }
        }
    }

    // Passes

    fn filter(mechanism: &Mechanism) -> Filter {
        Filter::make::<(Located, BubbleSphere)>(mechanism.registry())
    }

    fn clear(&mut self) {
        let mut cleared = 0;
        let stray = std::iter::from_fn(|| self.placed.pop());
        for index in self.occupied.drain(..).chain(stray) {
            if let Some(cell) = self.cells.get_mut(index) {
                cell.clear();
                cleared += 1;
            }
        }
        self.largest_radius.store(0, Ordering::Release);
        trace!("cleared {} cage cells", cleared);
    }

    /// Make the occupants of the placement pass readable.
    fn publish(&mut self) {
        while let Some(index) = self.placed.pop() {
            if let Some(cell) = self.cells.get_mut(index) {
                cell.publish();
                self.occupied.push(index);
            }
        }
    }

    /// Place every bubble into its cell. Bubbles outside the cage are despawned.
    ///
    /// Returns [`Status::Noop`] when there were no bubbles.
    pub fn update(&mut self, mechanism: &mut Mechanism) -> Outcome {
        self.clear();
        let chain = mechanism.enchain_solid(Self::filter(mechanism));
        let outside = AtomicUsize::new(0);
        let cage = &*self;
        let status = mechanism.operate_concurrently::<(&Located, &BubbleSphere)>(
            &chain,
            |subject, (located, sphere)| {
                let location = located.0;
                if !cage.is_inside(location) {
                    if subject.despawn_deferred(true).is_ok() {
                        outside.fetch_add(1, Ordering::Relaxed);
                    }
                    return;
                }
                let index = cage.index_at(location);
                let first = cage.cells[index].occupy(Occupant {
                    handle: subject.handle().cast::<Mutable>(),
                    location,
                    radius: sphere.radius,
                    decouple_proportion: sphere.decouple_proportion,
                });
                if first {
                    cage.placed.push(index);
                }
                // Non-negative floats order like their bit patterns.
                cage.largest_radius
                    .fetch_max(sphere.radius.max(0.0).to_bits(), Ordering::AcqRel);
            },
            self.config.thread_count,
        )?;
        self.publish();
        mechanism.apply_deferred()?;
        debug!(
            "cage update occupied {} cells, despawned {} bubbles outside",
            self.occupied_cell_count(),
            outside.load(Ordering::Relaxed)
        );
        Ok(status)
    }

    /// Push overlapping bubbles apart, using the placement of the last update.
    ///
    /// Returns [`Status::Noop`] when no bubble moved.
    pub fn decouple(&self, mechanism: &mut Mechanism) -> Outcome {
        let chain = mechanism.enchain_solid(Self::filter(mechanism));
        let largest = self.largest_radius();
        let threads = self.config.thread_count;
        mechanism.operate_concurrently::<(&Located, &mut BubbleSphere)>(
            &chain,
            |subject, (located, sphere)| {
                self.accumulate(subject.id(), located.0, sphere, largest);
            },
            threads,
        )?;
        let moved = AtomicUsize::new(0);
        mechanism.operate_concurrently::<(&mut Located, &mut BubbleSphere)>(
            &chain,
            |_, (located, sphere)| {
                if sphere.apply_decouple(&mut located.0) {
                    moved.fetch_add(1, Ordering::Relaxed);
                }
            },
            threads,
        )?;
        let moved = moved.into_inner();
        trace!("cage decoupled {} bubbles", moved);
        Ok(Status::from_changed(moved > 0))
    }

    /// Accumulate the pushes a bubble receives from its overlapping neighbours.
    fn accumulate(&self, id: SubjectId, location: Vec3, sphere: &mut BubbleSphere, largest: f32) {
        if sphere.decouple_proportion <= 0.0 {
            return;
        }
        let range = Vec3::splat(sphere.radius + largest);
        let from = self.world_to_cell(location - range);
        let to = self.world_to_cell(location + range);
        self.for_each_occupant(from, to, |other| {
            let other_id = other.handle.id();
            if other_id == id {
                return;
            }
            let delta = location - other.location;
            let distance = delta.length();
            let overlap = (sphere.radius + other.radius) - distance;
            if overlap <= 0.0 {
                return;
            }
            let strength =
                sphere.decouple_proportion / (sphere.decouple_proportion + other.decouple_proportion);
            let direction = if distance <= DEGENERATE_DISTANCE {
                debug_assert_ne!(id, other_id, "distinct subjects share an id");
                if id > other_id { Vec3::X } else { Vec3::NEG_X }
            } else {
                delta / distance
            };
            sphere.accumulate(direction * overlap * strength);
        });
    }

    /// Update, decouple, then update again so the cells reflect the decoupled locations.
    pub fn evaluate(&mut self, mechanism: &mut Mechanism) -> Outcome {
        let placed = self.update(mechanism)?;
        let decoupled = self.decouple(mechanism)?;
        self.update(mechanism)?;
        Ok(decoupled.combine(placed))
    }

    // Queries

    /// Bubbles whose sphere overlaps the sphere at `point` with `radius`, as placed by the last
    /// update.
    pub fn overlapping(&self, point: Vec3, radius: f32) -> Vec<SubjectHandle> {
        let range = Vec3::splat(radius + self.largest_radius());
        let mut found = Vec::new();
        self.for_each_occupant(
            self.world_to_cell(point - range),
            self.world_to_cell(point + range),
            |other| {
                if (radius + other.radius) - point.distance(other.location) > 0.0 {
                    found.push(other.handle);
                }
            },
        );
        found
    }

    /// Bubbles containing `point`.
    pub fn overlapping_point(&self, point: Vec3) -> Vec<SubjectHandle> {
        let range = Vec3::splat(self.largest_radius());
        let mut found = Vec::new();
        self.for_each_occupant(
            self.world_to_cell(point - range),
            self.world_to_cell(point + range),
            |other| {
                if other.radius > point.distance(other.location) {
                    found.push(other.handle);
                }
            },
        );
        found
    }
}

impl std::fmt::Debug for BubbleCage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BubbleCage")
            .field("config", &self.config)
            .field("bounds", &self.bounds)
            .field("occupied", &self.occupied.len())
            .field("largest_radius", &self.largest_radius())
            .finish()
    }
}
