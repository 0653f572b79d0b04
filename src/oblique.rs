use glam::DVec2;
use tracing::debug;

use crate::cursor::{CursorMutation, ObliqueFrame, ResliceCursor};
use crate::enums::{Orientation, ViewId};
use crate::sync::ViewSynchronizer;

/// Turns a reference line on an orthogonal view into the fourth view's
/// oblique cutting plane.
///
/// The frame is rebuilt from the fixed orthogonal axes on every update, so
/// the result depends only on the absolute angle: a full turn lands exactly
/// where it started.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObliquePlaneComputer;

impl ObliquePlaneComputer {
    /// Oblique frame for a line at `angle_degrees` through `center` on `source`.
    ///
    /// The plane contains the line and the source normal: its first axis is
    /// the line direction, its second the source normal. `None` for
    /// non-finite input or a degenerate source plane.
    pub fn compute(
        cursor: &ResliceCursor,
        angle_degrees: f64,
        center: DVec2,
        source: Orientation,
    ) -> Option<ObliqueFrame> {
        if !angle_degrees.is_finite() || !center.is_finite() {
            return None;
        }
        let (u, v) = cursor.plane_axes(source.axis_pair());
        let normal = u.cross(v).try_normalize()?;
        let (sin, cos) = angle_degrees.to_radians().sin_cos();
        let direction = (u * cos + v * sin).try_normalize()?;

        Some(ObliqueFrame {
            center: cursor.lift(center, source),
            axes: [direction, normal, direction.cross(normal)],
        })
    }

    /// Write the oblique frame into the cursor, render the fourth view and
    /// fan the change out to the other views.
    pub fn update(
        &self,
        sync: &ViewSynchronizer,
        cursor: &mut ResliceCursor,
        angle_degrees: f64,
        center: DVec2,
        source: Orientation,
    ) {
        let Some(frame) = Self::compute(cursor, angle_degrees, center, source) else {
            debug!(source = ?source, angle_degrees, "degenerate oblique input, skipping frame");
            return;
        };
        if sync.apply(cursor, ViewId::Fourth, CursorMutation::SetOblique(frame)) {
            sync.refresh_view(cursor, ViewId::Fourth);
        }
    }
}
