use glam::DVec2;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::cursor::ResliceCursor;
use crate::enums::{ControlPoint, DragKind, Orientation};
use crate::volume::Volume;

/// Pointer input in a view's data coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    /// `None` when the pointer is outside the image area.
    pub position: Option<DVec2>,
    /// Current zoom of the view: screen pixels per data unit.
    pub pixels_per_unit: f64,
}

impl PointerEvent {
    pub fn at(position: DVec2) -> Self {
        Self {
            position: Some(position),
            pixels_per_unit: 1.0,
        }
    }

    pub fn with_zoom(mut self, pixels_per_unit: f64) -> Self {
        self.pixels_per_unit = pixels_per_unit;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPoints {
    pub left: DVec2,
    pub right: DVec2,
    pub center: DVec2,
}

impl ControlPoints {
    pub fn position(&self, point: ControlPoint) -> DVec2 {
        match point {
            ControlPoint::Left => self.left,
            ControlPoint::Right => self.right,
            ControlPoint::Center => self.center,
        }
    }
}

/// The reference line drawn on one orthogonal view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceLineState {
    pub angle_degrees: f64,
    pub center: DVec2,
    pub control_points: ControlPoints,
    half_length: f64,
    control_offset: f64,
}

impl ReferenceLineState {
    fn new(center: DVec2, half_length: f64, control_offset: f64) -> Self {
        let mut state = Self {
            angle_degrees: 0.0,
            center,
            control_points: ControlPoints {
                left: center,
                right: center,
                center,
            },
            half_length,
            control_offset,
        };
        state.recompute();
        state
    }

    pub fn direction(&self) -> DVec2 {
        DVec2::from_angle(self.angle_degrees.to_radians())
    }

    /// Line end points in the view's data coordinates.
    pub fn endpoints(&self) -> (DVec2, DVec2) {
        let offset = self.direction() * self.half_length;
        (self.center - offset, self.center + offset)
    }

    fn recompute(&mut self) {
        let offset = self.direction() * self.control_offset;
        self.control_points = ControlPoints {
            left: self.center - offset,
            right: self.center + offset,
            center: self.center,
        };
    }

    /// Nearest control point within `radius` of `position`.
    fn hit_test(&self, position: DVec2, radius: f64) -> Option<ControlPoint> {
        [ControlPoint::Left, ControlPoint::Right, ControlPoint::Center]
            .into_iter()
            .map(|point| (point, self.control_points.position(point).distance(position)))
            .filter(|(_, distance)| *distance < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(point, _)| point)
    }
}

/// Line geometry to forward to the oblique plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineUpdate {
    pub source: Orientation,
    pub angle_degrees: f64,
    pub center: DVec2,
}

/// Active drag gesture; exists only between press and release.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InteractionSession {
    pub active_view: Orientation,
    pub drag_kind: DragKind,
    pub anchor: DVec2,
}

/// Per-view reference line interaction: `Idle` until a press lands on a
/// control point, then `Dragging` until release.
#[derive(Clone, Debug)]
pub struct ReferenceLineController {
    lines: [Option<ReferenceLineState>; 3],
    drag: Option<InteractionSession>,
    hit_tolerance_px: f64,
    line_length_fraction: f64,
    control_offset_fraction: f64,
}

impl ReferenceLineController {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            lines: [None; 3],
            drag: None,
            hit_tolerance_px: config.hit_tolerance_px,
            line_length_fraction: config.line_length_fraction,
            control_offset_fraction: config.control_offset_fraction,
        }
    }

    /// Fresh lines at angle 0 through the cursor center; any drag is dropped.
    pub fn reset(&mut self, volume: &Volume, cursor: &ResliceCursor) {
        let extent = volume.max_extent();
        let half_length = extent * self.line_length_fraction / 2.0;
        let control_offset = extent * self.control_offset_fraction;
        self.lines = Orientation::ALL.map(|orientation| {
            Some(ReferenceLineState::new(
                cursor.project(cursor.center(), orientation),
                half_length,
                control_offset,
            ))
        });
        self.drag = None;
    }

    /// Re-express every line center in the axes of `after`, keeping its
    /// world position under `before`. An active drag is dropped since its
    /// anchor is in the old view coordinates.
    pub fn reproject(&mut self, before: &ResliceCursor, after: &ResliceCursor) {
        for orientation in Orientation::ALL {
            if let Some(line) = self.lines[orientation as usize].as_mut() {
                let world = before.lift(line.center, orientation);
                line.center = after.project(world, orientation);
                line.recompute();
            }
        }
        if let Some(drag) = self.drag.take() {
            debug!(view = ?drag.active_view, "drag cancelled by axis change");
        }
    }

    /// Forget all lines, e.g. after a failed load.
    pub fn clear(&mut self) {
        self.lines = [None; 3];
        self.drag = None;
    }

    pub fn line(&self, view: Orientation) -> Option<&ReferenceLineState> {
        self.lines[view as usize].as_ref()
    }

    pub fn interaction(&self) -> Option<&InteractionSession> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Returns whether the press was consumed.
    pub fn handle_press(&mut self, event: &PointerEvent, view: Orientation) -> bool {
        let Some(position) = event.position else {
            return false;
        };
        let Some(line) = self.lines[view as usize].as_ref() else {
            trace!(view = ?view, "press ignored, no volume");
            return false;
        };
        let Some(point) = line.hit_test(position, self.hit_radius(event)) else {
            return false;
        };

        let drag_kind = point.drag_kind();
        debug!(view = ?view, control_point = ?point, drag = ?drag_kind, "drag started");
        self.drag = Some(InteractionSession {
            active_view: view,
            drag_kind,
            anchor: position,
        });
        true
    }

    /// Advance an active drag. Returns the new line geometry when it changed.
    pub fn handle_motion(&mut self, event: &PointerEvent, view: Orientation) -> Option<LineUpdate> {
        let position = event.position?;
        let drag = self.drag.as_mut().filter(|drag| drag.active_view == view)?;
        let line = self.lines[view as usize].as_mut()?;

        match drag.drag_kind {
            DragKind::Rotate => {
                // Absolute angle from the cursor position, never accumulated
                let offset = position - line.center;
                if offset.length_squared() <= f64::EPSILON {
                    return None;
                }
                line.angle_degrees = offset.y.atan2(offset.x).to_degrees();
            }
            DragKind::Translate => {
                line.center += position - drag.anchor;
                drag.anchor = position;
            }
        }
        line.recompute();

        Some(LineUpdate {
            source: view,
            angle_degrees: line.angle_degrees,
            center: line.center,
        })
    }

    /// End any drag. Returns whether a drag was active.
    pub fn handle_release(&mut self, view: Orientation) -> bool {
        match self.drag.take() {
            Some(drag) => {
                debug!(view = ?view, active_view = ?drag.active_view, "drag ended");
                true
            }
            None => false,
        }
    }

    /// Set a view's line angle directly, normalized to `(-180, 180]`.
    pub fn set_angle(&mut self, view: Orientation, angle_degrees: f64) -> Option<LineUpdate> {
        if !angle_degrees.is_finite() {
            return None;
        }
        let line = self.lines[view as usize].as_mut()?;
        line.angle_degrees = normalize_degrees(angle_degrees);
        line.recompute();
        Some(LineUpdate {
            source: view,
            angle_degrees: line.angle_degrees,
            center: line.center,
        })
    }

    /// Move a view's line center directly.
    pub fn set_center(&mut self, view: Orientation, center: DVec2) -> Option<LineUpdate> {
        if !center.is_finite() {
            return None;
        }
        let line = self.lines[view as usize].as_mut()?;
        line.center = center;
        line.recompute();
        Some(LineUpdate {
            source: view,
            angle_degrees: line.angle_degrees,
            center: line.center,
        })
    }

    /// Hit radius in data units, so hit-testing tracks the zoom level.
    fn hit_radius(&self, event: &PointerEvent) -> f64 {
        let zoom = if event.pixels_per_unit.is_finite() && event.pixels_per_unit > 0.0 {
            event.pixels_per_unit
        } else {
            1.0
        };
        self.hit_tolerance_px / zoom
    }
}

fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use ndarray::Array3;

    fn setup() -> (ReferenceLineController, Volume, ResliceCursor) {
        let volume = Volume::new(Array3::zeros((10, 200, 200)), DVec3::ONE, DVec3::ZERO).unwrap();
        let cursor = ResliceCursor::centered_on(&volume);
        let mut controller = ReferenceLineController::new(&EngineConfig::default());
        controller.reset(&volume, &cursor);
        (controller, volume, cursor)
    }

    #[test]
    fn reset_places_line_through_cursor() {
        let (controller, _, _) = setup();
        let line = controller.line(Orientation::Axial).unwrap();
        assert_eq!(line.center, DVec2::new(99.5, 99.5));
        assert_eq!(line.angle_degrees, 0.0);
        // 0.05 of the 199 unit extent
        assert!((line.control_points.right.x - 99.5 - 9.95).abs() < 1e-9);
        let (a, b) = line.endpoints();
        assert!((b.x - a.x - 0.8 * 199.0).abs() < 1e-9);
    }

    #[test]
    fn press_away_from_handles_is_passed_through() {
        let (mut controller, _, _) = setup();
        assert!(!controller.handle_press(&PointerEvent::at(DVec2::new(10.0, 10.0)), Orientation::Axial));
        assert!(!controller.is_dragging());
        let outside = PointerEvent {
            position: None,
            pixels_per_unit: 1.0,
        };
        assert!(!controller.handle_press(&outside, Orientation::Axial));
    }

    #[test]
    fn press_on_center_starts_translate() {
        let (mut controller, _, _) = setup();
        let center = controller.line(Orientation::Coronal).unwrap().center;
        assert_eq!(center, DVec2::new(99.5, 4.5));

        let press = center + DVec2::new(0.5, 0.0);
        assert!(controller.handle_press(&PointerEvent::at(press), Orientation::Coronal));
        assert_eq!(controller.interaction().unwrap().drag_kind, DragKind::Translate);

        let update = controller
            .handle_motion(&PointerEvent::at(press + DVec2::new(10.0, -5.0)), Orientation::Coronal)
            .unwrap();
        assert_eq!(update.center, DVec2::new(109.5, -0.5));
        let update = controller
            .handle_motion(&PointerEvent::at(press + DVec2::new(12.0, -5.0)), Orientation::Coronal)
            .unwrap();
        assert_eq!(update.center, DVec2::new(111.5, -0.5));
        assert_eq!(update.angle_degrees, 0.0);

        assert!(controller.handle_release(Orientation::Coronal));
        assert!(!controller.is_dragging());
        assert!(!controller.handle_release(Orientation::Coronal));
    }

    #[test]
    fn motion_in_other_view_is_ignored() {
        let (mut controller, _, _) = setup();
        let right = controller.line(Orientation::Axial).unwrap().control_points.right;
        assert!(controller.handle_press(&PointerEvent::at(right), Orientation::Axial));
        assert!(controller
            .handle_motion(&PointerEvent::at(DVec2::new(0.0, 0.0)), Orientation::Sagittal)
            .is_none());
    }

    #[test]
    fn rotate_measures_absolute_angle() {
        let (mut controller, _, _) = setup();
        let line = *controller.line(Orientation::Axial).unwrap();
        assert!(controller.handle_press(&PointerEvent::at(line.control_points.right), Orientation::Axial));
        assert_eq!(controller.interaction().unwrap().drag_kind, DragKind::Rotate);

        let update = controller
            .handle_motion(&PointerEvent::at(line.center + DVec2::new(50.0, 50.0)), Orientation::Axial)
            .unwrap();
        assert!((update.angle_degrees - 45.0).abs() < 1e-9);

        let update = controller
            .handle_motion(&PointerEvent::at(line.center + DVec2::new(-10.0, -0.0001)), Orientation::Axial)
            .unwrap();
        assert!((update.angle_degrees.abs() - 180.0).abs() < 1e-3);
    }

    #[test]
    fn full_turn_returns_to_start() {
        let (mut controller, _, _) = setup();
        let start = *controller.line(Orientation::Sagittal).unwrap();
        assert!(controller.handle_press(&PointerEvent::at(start.control_points.right), Orientation::Sagittal));
        for step in 1..=360 {
            let angle = (step as f64).to_radians();
            let position = start.center + DVec2::from_angle(angle) * 30.0;
            controller.handle_motion(&PointerEvent::at(position), Orientation::Sagittal);
        }
        let end = controller.line(Orientation::Sagittal).unwrap();
        assert!(end.control_points.right.distance(start.control_points.right) < 1e-9);
        assert!(end.control_points.left.distance(start.control_points.left) < 1e-9);
    }

    #[test]
    fn hit_radius_scales_with_zoom() {
        let (mut controller, _, _) = setup();
        let center = controller.line(Orientation::Axial).unwrap().center;
        let near = center + DVec2::new(3.0, 0.0);

        // At 10 px per unit, 3 units is 30 px: outside the 15 px tolerance
        assert!(!controller.handle_press(&PointerEvent::at(near).with_zoom(10.0), Orientation::Axial));
        // Zoomed out, the same data distance is well inside
        assert!(controller.handle_press(&PointerEvent::at(near).with_zoom(0.5), Orientation::Axial));
    }

    #[test]
    fn presses_without_volume_are_ignored() {
        let mut controller = ReferenceLineController::new(&EngineConfig::default());
        assert!(!controller.handle_press(&PointerEvent::at(DVec2::ZERO), Orientation::Axial));
        assert!(controller.set_angle(Orientation::Axial, 30.0).is_none());
    }

    #[test]
    fn reproject_follows_new_axes() {
        let (mut controller, _, before) = setup();
        let right = controller.line(Orientation::Axial).unwrap().control_points.right;
        assert!(controller.handle_press(&PointerEvent::at(right), Orientation::Axial));

        let mut after = before;
        after
            .apply(crate::cursor::CursorMutation::SetAxes([DVec3::Y, -DVec3::X, DVec3::Z]))
            .unwrap();
        controller.reproject(&before, &after);

        let line = controller.line(Orientation::Axial).unwrap();
        assert_eq!(line.center, DVec2::new(99.5, -99.5));
        assert_eq!(line.control_points.center, line.center);
        assert_eq!(after.lift(line.center, Orientation::Axial), before.center());
        assert!(!controller.is_dragging());
    }

    #[test]
    fn set_angle_wraps() {
        let (mut controller, _, _) = setup();
        let update = controller.set_angle(Orientation::Axial, 540.0).unwrap();
        assert_eq!(update.angle_degrees, 180.0);
        let update = controller.set_angle(Orientation::Axial, -90.0).unwrap();
        assert_eq!(update.angle_degrees, -90.0);
        let update = controller.set_angle(Orientation::Axial, 360.0).unwrap();
        assert_eq!(update.angle_degrees, 0.0);
    }
}
