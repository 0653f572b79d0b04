mod common;

use std::rc::Rc;

use common::{
    Drawn, MockSurface, RenderLog, rendered_views, session_with_views, test_config, uniform_volume,
};
use glam::DVec3;
use mpr_reslice::{
    Actor, FourthView, MprSession, Orientation, OrthogonalView, ResliceCursor, ViewId, ViewSynchronizer,
};

#[test]
fn cursor_change_renders_every_view_but_the_origin() {
    let (mut session, log) = session_with_views(false);
    session.set_volume(uniform_volume((8, 8, 8), DVec3::ONE));
    log.borrow_mut().clear();

    session.on_cursor_changed(ViewId::Axial);

    let views = rendered_views(&log);
    assert_eq!(views.len(), 2);
    assert!(views.contains(&ViewId::Coronal));
    assert!(views.contains(&ViewId::Sagittal));
}

#[test]
fn repeated_cursor_change_is_idempotent() {
    let (mut session, log) = session_with_views(false);
    session.set_volume(uniform_volume((8, 8, 8), DVec3::ONE));
    log.borrow_mut().clear();

    session.on_cursor_changed(ViewId::Coronal);
    let first: Vec<_> = log.borrow_mut().drain(..).collect();
    session.on_cursor_changed(ViewId::Coronal);
    let second: Vec<_> = log.borrow_mut().drain(..).collect();
    assert_eq!(first, second);
}

#[test]
fn re_entrant_render_handler_is_dropped() {
    let config = test_config();
    let log = RenderLog::default();
    let mut session = MprSession::new(config.clone());
    let sync = Rc::downgrade(&session.synchronizer());
    let echo_cursor = ResliceCursor::new(DVec3::splat(3.5));

    let hook_log = Rc::clone(&log);
    let hook = Box::new(move || {
        let Some(sync) = sync.upgrade() else {
            return;
        };
        assert!(sync.is_propagating());
        assert!(sync.bindings().is_empty());
        let before = hook_log.borrow().len();
        // Reports the change back as if the surface had moved the cursor
        sync.on_cursor_changed(&echo_cursor, ViewId::Coronal);
        assert_eq!(hook_log.borrow().len(), before);
    });

    let sagittal = MockSurface::new(ViewId::Sagittal, &log);
    let coronal = MockSurface::new(ViewId::Coronal, &log).with_hook(hook);
    let axial = MockSurface::new(ViewId::Axial, &log);
    session.bind_view(Box::new(OrthogonalView::new(Orientation::Sagittal, sagittal, &config)));
    session.bind_view(Box::new(OrthogonalView::new(Orientation::Coronal, coronal, &config)));
    session.bind_view(Box::new(OrthogonalView::new(Orientation::Axial, axial, &config)));

    session.set_volume(uniform_volume((8, 8, 8), DVec3::ONE));
    log.borrow_mut().clear();
    let generation = session.synchronizer().generation();

    session.on_cursor_changed(ViewId::Axial);
    assert_eq!(rendered_views(&log).len(), 2);
    assert!(!session.synchronizer().is_propagating());
    // The dropped echo did not start a fan-out of its own
    assert_eq!(session.synchronizer().generation(), generation + 1);
    let bound: Vec<_> = session
        .synchronizer()
        .bindings()
        .into_iter()
        .map(|binding| binding.view)
        .collect();
    assert_eq!(bound, vec![ViewId::Sagittal, ViewId::Coronal, ViewId::Axial]);
}

#[test]
fn torn_down_surface_is_skipped() {
    let config = test_config();
    let log = RenderLog::default();
    let mut session = MprSession::new(config.clone());

    let sagittal = MockSurface::new(ViewId::Sagittal, &log);
    let torn_down = Rc::clone(&sagittal.torn_down);
    session.bind_view(Box::new(OrthogonalView::new(Orientation::Sagittal, sagittal, &config)));
    for orientation in [Orientation::Coronal, Orientation::Axial] {
        let surface = MockSurface::new(orientation.into(), &log);
        session.bind_view(Box::new(OrthogonalView::new(orientation, surface, &config)));
    }
    session.set_volume(uniform_volume((8, 8, 8), DVec3::ONE));
    log.borrow_mut().clear();

    torn_down.set(true);
    session.on_cursor_changed(ViewId::Axial);
    assert_eq!(rendered_views(&log), vec![ViewId::Coronal]);

    // The synchronizer keeps working after the failure
    session.on_cursor_changed(ViewId::Coronal);
    assert_eq!(rendered_views(&log), vec![ViewId::Coronal, ViewId::Axial]);
}

#[test]
fn view_without_volume_renders_blank() {
    let config = test_config();
    let log = RenderLog::default();
    let sync = ViewSynchronizer::new();
    let surface = MockSurface::new(ViewId::Axial, &log);
    sync.bind(Box::new(OrthogonalView::new(Orientation::Axial, surface, &config)));

    let cursor = ResliceCursor::new(DVec3::ZERO);
    sync.refresh_all(&cursor);
    assert_eq!(log.borrow().as_slice(), &[(ViewId::Axial, Drawn::Blank)]);
}

#[test]
fn load_renders_all_views_with_volume_data() {
    let (mut session, log) = session_with_views(true);
    session.set_volume(uniform_volume((8, 8, 8), DVec3::ONE));

    let log = log.borrow();
    assert_eq!(log.len(), 4);
    for (view, drawn) in log.iter() {
        assert!(
            matches!(drawn, Drawn::Slice { covered } if *covered > 0),
            "{view:?} drew {drawn:?}"
        );
    }
}

#[test]
fn reference_line_visibility_reaches_orthogonal_views_only() {
    let config = test_config();
    let log = RenderLog::default();
    let session = MprSession::new(config.clone());
    let axial = MockSurface::new(ViewId::Axial, &log);
    let actors = Rc::clone(&axial.actors);
    let fourth = MockSurface::new(ViewId::Fourth, &log);
    let fourth_actors = Rc::clone(&fourth.actors);
    session.bind_view(Box::new(OrthogonalView::new(Orientation::Axial, axial, &config)));
    session.bind_view(Box::new(FourthView::new(fourth, &config)));

    session.set_reference_lines_visible(false);
    assert_eq!(
        actors.borrow().as_slice(),
        &[(ViewId::Axial, Actor::ReferenceLine, false)]
    );
    assert!(fourth_actors.borrow().is_empty());
}

#[test]
fn slice_index_change_renders_origin_and_peers() {
    let (mut session, log) = session_with_views(false);
    session.set_volume(uniform_volume((10, 8, 8), DVec3::ONE));
    log.borrow_mut().clear();

    assert!(session.set_slice_index(Orientation::Axial, 2));
    let views = rendered_views(&log);
    assert_eq!(views.len(), 3);
    assert_eq!(views.last(), Some(&ViewId::Axial));
    assert_eq!(session.current_cursor().unwrap().center().z, 2.0);
}
