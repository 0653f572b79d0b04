mod common;

use common::{test_config, uniform_volume};
use glam::{DVec2, DVec3};
use mpr_reslice::{MprSession, PointerEvent, ViewId, geometry::orthonormality_error};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Edit {
    Angle(ViewId, f64),
    Rotate(ViewId, f64, f64),
    Translate(ViewId, f64, f64),
    Center(DVec3),
    Axes([DVec3; 3]),
}

fn view() -> impl Strategy<Value = ViewId> {
    prop_oneof![
        Just(ViewId::Axial),
        Just(ViewId::Coronal),
        Just(ViewId::Sagittal),
        Just(ViewId::Fourth),
    ]
}

fn vector() -> impl Strategy<Value = DVec3> {
    (-10.0..10.0f64, -10.0..10.0f64, -10.0..10.0f64).prop_map(|(x, y, z)| DVec3::new(x, y, z))
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (view(), -720.0..720.0f64).prop_map(|(v, a)| Edit::Angle(v, a)),
        (view(), -60.0..60.0f64, -60.0..60.0f64).prop_map(|(v, x, y)| Edit::Rotate(v, x, y)),
        (view(), -30.0..30.0f64, -30.0..30.0f64).prop_map(|(v, x, y)| Edit::Translate(v, x, y)),
        vector().prop_map(|c| Edit::Center(c * 5.0)),
        (vector(), vector(), vector()).prop_map(|(a, b, c)| Edit::Axes([a, b, c])),
    ]
}

fn drag(session: &mut MprSession, view: ViewId, grab_rotation: bool, offset: DVec2) {
    let Some(line) = session.current_line_state(view) else {
        return;
    };
    let grab = if grab_rotation {
        line.control_points.right
    } else {
        line.center
    };
    session.handle_press(&PointerEvent::at(grab), view);
    session.handle_motion(&PointerEvent::at(grab + offset), view);
    session.handle_release(&PointerEvent::at(grab + offset), view);
}

fn apply(session: &mut MprSession, edit: &Edit) {
    match *edit {
        Edit::Angle(view, angle) => {
            session.set_line_angle(view, angle);
        }
        Edit::Rotate(view, x, y) => drag(session, view, true, DVec2::new(x, y)),
        Edit::Translate(view, x, y) => drag(session, view, false, DVec2::new(x, y)),
        Edit::Center(center) => {
            session.set_cursor_center(center, ViewId::Axial);
        }
        Edit::Axes(axes) => {
            session.set_cursor_axes(axes, ViewId::Coronal);
        }
    }
}

proptest! {
    #[test]
    fn cursor_frames_stay_orthonormal(edits in prop::collection::vec(edit(), 1..40)) {
        let mut session = MprSession::new(test_config());
        session.set_volume(uniform_volume((6, 8, 10), DVec3::new(1.0, 1.0, 2.0)));

        for edit in &edits {
            apply(&mut session, edit);
            let cursor = session.current_cursor().expect("volume is loaded");
            let axes = cursor.axes();
            let oblique = cursor.oblique();

            prop_assert!(orthonormality_error(&axes) < 1e-9);
            prop_assert!(axes[0].cross(axes[1]).dot(axes[2]) > 0.0);
            prop_assert!(orthonormality_error(&oblique.axes) < 1e-9);
            prop_assert!(cursor.center().is_finite());
            prop_assert!(oblique.center.is_finite());
            prop_assert!(session.interaction().is_none());

            let extent = session.volume().expect("volume is loaded").extent();
            prop_assert!(extent.contains(cursor.center()));
        }
    }

    #[test]
    fn line_angle_is_normalized(angle in -1.0e4..1.0e4f64) {
        let mut session = MprSession::new(test_config());
        session.set_volume(uniform_volume((4, 4, 4), DVec3::ONE));
        prop_assert!(session.set_line_angle(ViewId::Sagittal, angle));

        let line = session.current_line_state(ViewId::Sagittal).expect("line exists");
        prop_assert!(line.angle_degrees > -180.0 && line.angle_degrees <= 180.0);
        let turns = (angle - line.angle_degrees) / 360.0;
        prop_assert!((turns - turns.round()).abs() < 1e-9);
    }
}
