//! Host-facing output: debug lines and instanced bubble transforms.

use glam::{Mat4, Quat, Vec3};

use super::{BubbleCage, BubbleSphere, Directed, Located, Rotated, Scaled};
use crate::ecs::{Filter, Mechanism, Outcome};

/// What a debug line outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugLine {
    Bounds,
    Cell,
}

/// Receives debug geometry.
pub trait DebugDrawSink {
    fn draw_line(&mut self, from: Vec3, to: Vec3, kind: DebugLine);
}

/// Receives one batch of instance transforms per call.
pub trait InstanceSink {
    fn submit(&mut self, transforms: &[Mat4]);
}

impl BubbleCage {
    /// Outline the cage bounds. Returns the number of lines drawn.
    pub fn draw_bounds(&self, sink: &mut dyn DebugDrawSink) -> usize {
        let edges = self.bounds.edges();
        for (from, to) in edges {
            sink.draw_line(from, to, DebugLine::Bounds);
        }
        edges.len()
    }

    /// Draw the cell lattice when enabled by the configuration. Returns the number of lines drawn.
    pub fn draw_cells(&self, sink: &mut dyn DebugDrawSink) -> usize {
        if !self.config.debug_draw_cells {
            return 0;
        }
        let size = self.config.size;
        let step = self.config.cell_size;
        let min = self.bounds.min;
        let max = min + size.as_vec3() * step;
        let mut lines = 0;
        let mut line = |from: Vec3, to: Vec3| {
            sink.draw_line(from, to, DebugLine::Cell);
            lines += 1;
        };
        for z in 0..=size.z {
            let z = min.z + step * z as f32;
            for x in 0..=size.x {
                let x = min.x + step * x as f32;
                line(Vec3::new(x, min.y, z), Vec3::new(x, max.y, z));
            }
            for y in 0..=size.y {
                let y = min.y + step * y as f32;
                line(Vec3::new(min.x, y, z), Vec3::new(max.x, y, z));
            }
        }
        for x in 0..=size.x {
            let x = min.x + step * x as f32;
            for y in 0..=size.y {
                let y = min.y + step * y as f32;
                line(Vec3::new(x, y, min.z), Vec3::new(x, y, max.z));
            }
        }
        lines
    }
}

/// Submit one transform per bubble, translated to its location. Rotation comes from [`Directed`]
/// followed by [`Rotated`], and the radius scale is multiplied by [`Scaled`] when present. Returns
/// the number of instances.
pub fn render_bubbles(mechanism: &mut Mechanism, sink: &mut dyn InstanceSink) -> Outcome<usize> {
    let chain = mechanism.enchain(Filter::make::<(Located, BubbleSphere)>(mechanism.registry()));
    let mut transforms = Vec::with_capacity(mechanism.subject_count());
    mechanism.operate::<(
        &Located,
        &BubbleSphere,
        Option<&Directed>,
        Option<&Rotated>,
        Option<&Scaled>,
    )>(&chain, |_, (located, sphere, directed, rotated, scaled)| {
        let mut rotation = directed.map_or(Quat::IDENTITY, Directed::rotation);
        if let Some(rotated) = rotated {
            rotation *= rotated.0;
        }
        let mut scale = Vec3::splat(sphere.radius);
        if let Some(scaled) = scaled {
            scale *= scaled.0;
        }
        transforms.push(Mat4::from_scale_rotation_translation(scale, rotation, located.0));
    })?;
    sink.submit(&transforms);
    Ok(transforms.len())
}
