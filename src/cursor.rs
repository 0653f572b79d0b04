use glam::{DMat4, DVec2, DVec3};

use crate::enums::Orientation;
use crate::geometry::{GeometryError, PlaneMatrixBuilder, axis_pair_indices, orthonormalize};
use crate::volume::Volume;

/// Axis pair of the oblique frame shown by the fourth view.
pub const OBLIQUE_AXIS_PAIR: usize = 2;

/// Center and orthonormal axes of the oblique cutting plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObliqueFrame {
    pub center: DVec3,
    pub axes: [DVec3; 3],
}

/// Shared 3D cutting state: one center and three orthonormal, right-handed
/// axes, plus the oblique frame driven by the reference line.
///
/// Reads are free; writes go through [`crate::sync::ViewSynchronizer::apply`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResliceCursor {
    center: DVec3,
    axes: [DVec3; 3],
    oblique: ObliqueFrame,
}

/// A single write to the cursor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CursorMutation {
    SetCenter(DVec3),
    SetAxes([DVec3; 3]),
    SetOblique(ObliqueFrame),
}

impl ResliceCursor {
    /// World-aligned cursor at `center`; the oblique frame starts as the axial plane.
    pub fn new(center: DVec3) -> Self {
        let axes = [DVec3::X, DVec3::Y, DVec3::Z];
        Self {
            center,
            axes,
            oblique: ObliqueFrame { center, axes },
        }
    }

    pub fn centered_on(volume: &Volume) -> Self {
        Self::new(volume.center())
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn axes(&self) -> [DVec3; 3] {
        self.axes
    }

    pub fn oblique(&self) -> ObliqueFrame {
        self.oblique
    }

    /// In-plane axes `(u, v)` of orthogonal plane `pair`.
    pub fn plane_axes(&self, pair: usize) -> (DVec3, DVec3) {
        let (a, b) = axis_pair_indices(pair);
        (self.axes[a], self.axes[b])
    }

    /// Unit normal `u × v` of an orthogonal view's plane.
    pub fn plane_normal(&self, orientation: Orientation) -> DVec3 {
        let (u, v) = self.plane_axes(orientation.axis_pair());
        u.cross(v)
    }

    /// Plane transform of orthogonal plane `pair` through the cursor center.
    pub fn plane_transform(&self, pair: usize) -> Result<DMat4, GeometryError> {
        let (u, v) = self.plane_axes(pair);
        PlaneMatrixBuilder::build(self.center, u, v)
    }

    /// Plane transform of the fourth view.
    pub fn oblique_transform(&self) -> Result<DMat4, GeometryError> {
        let (a, b) = axis_pair_indices(OBLIQUE_AXIS_PAIR);
        PlaneMatrixBuilder::build(
            self.oblique.center,
            self.oblique.axes[a],
            self.oblique.axes[b],
        )
    }

    /// Project a world point into an orthogonal view's 2D coordinates.
    pub fn project(&self, world: DVec3, orientation: Orientation) -> DVec2 {
        let (u, v) = self.plane_axes(orientation.axis_pair());
        DVec2::new(world.dot(u), world.dot(v))
    }

    /// Lift a 2D point of an orthogonal view into 3D, keeping the cursor
    /// center's coordinate along the plane normal.
    pub fn lift(&self, point: DVec2, orientation: Orientation) -> DVec3 {
        let (u, v) = self.plane_axes(orientation.axis_pair());
        let normal = u.cross(v);
        u * point.x + v * point.y + normal * self.center.dot(normal)
    }

    /// Slice index of the cursor center per orientation, `[sagittal, coronal, axial]`.
    pub fn slice_indices(&self, volume: &Volume) -> [usize; 3] {
        Orientation::ALL.map(|orientation| volume.slice_index_at(self.center, orientation))
    }

    /// Apply a mutation, keeping every axis set orthonormal.
    ///
    /// Rejected mutations leave the cursor untouched.
    pub(crate) fn apply(&mut self, mutation: CursorMutation) -> Result<(), GeometryError> {
        match mutation {
            CursorMutation::SetCenter(center) => {
                if !center.is_finite() {
                    return Err(GeometryError::NonFinite);
                }
                self.center = center;
            }
            CursorMutation::SetAxes(axes) => {
                self.axes = orthonormalize(axes)?;
            }
            CursorMutation::SetOblique(frame) => {
                if !frame.center.is_finite() {
                    return Err(GeometryError::NonFinite);
                }
                self.oblique = ObliqueFrame {
                    center: frame.center,
                    axes: orthonormalize(frame.axes)?,
                };
            }
        }
        Ok(())
    }
}
