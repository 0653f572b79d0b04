#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::DVec3;
use mpr_reslice::{
    Actor, BoxWidget, Bounds, EngineConfig, FourthView, Frame, MprSession, Orientation,
    OrthogonalView, RenderSurface, SurfaceError, ViewId, Volume,
};
use ndarray::Array3;

#[derive(Clone, Debug, PartialEq)]
pub enum Drawn {
    Slice { covered: usize },
    Outline { organs: usize },
    Blank,
}

/// Every frame drawn by the surfaces sharing the log, in order.
pub type RenderLog = Rc<RefCell<Vec<(ViewId, Drawn)>>>;

pub type RenderHook = Box<dyn FnMut()>;

pub struct MockSurface {
    pub view: ViewId,
    pub log: RenderLog,
    pub torn_down: Rc<Cell<bool>>,
    pub on_render: Option<RenderHook>,
    pub actors: Rc<RefCell<Vec<(ViewId, Actor, bool)>>>,
}

impl MockSurface {
    pub fn new(view: ViewId, log: &RenderLog) -> Self {
        Self {
            view,
            log: Rc::clone(log),
            torn_down: Rc::new(Cell::new(false)),
            on_render: None,
            actors: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_hook(mut self, hook: RenderHook) -> Self {
        self.on_render = Some(hook);
        self
    }
}

impl RenderSurface for MockSurface {
    fn render_now(&mut self, frame: Frame<'_>) -> Result<(), SurfaceError> {
        if self.torn_down.get() {
            return Err(SurfaceError::TornDown);
        }
        let drawn = match frame {
            Frame::Slice(slice) => Drawn::Slice {
                covered: slice.covered_samples(),
            },
            Frame::Outline(outlines) => Drawn::Outline {
                organs: outlines.len(),
            },
            Frame::Blank => Drawn::Blank,
        };
        self.log.borrow_mut().push((self.view, drawn));
        if let Some(hook) = self.on_render.as_mut() {
            hook();
        }
        Ok(())
    }

    fn set_actor_visible(&mut self, actor: Actor, visible: bool) -> Result<(), SurfaceError> {
        if self.torn_down.get() {
            return Err(SurfaceError::TornDown);
        }
        self.actors.borrow_mut().push((self.view, actor, visible));
        Ok(())
    }
}

pub type BoxHook = Box<dyn FnMut(Bounds)>;

pub struct MockBox {
    pub orientation: Orientation,
    pub bounds: Rc<Cell<Option<Bounds>>>,
    pub writes: Rc<Cell<usize>>,
    pub on_set: Option<BoxHook>,
}

impl MockBox {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            bounds: Rc::new(Cell::new(None)),
            writes: Rc::new(Cell::new(0)),
            on_set: None,
        }
    }
}

impl BoxWidget for MockBox {
    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), SurfaceError> {
        self.bounds.set(Some(bounds));
        self.writes.set(self.writes.get() + 1);
        if let Some(hook) = self.on_set.as_mut() {
            hook(bounds);
        }
        Ok(())
    }

    fn bounds(&self) -> Option<Bounds> {
        self.bounds.get()
    }

    fn set_visible(&mut self, _visible: bool) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// Small output grid keeps the resampling in tests cheap.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        output_size: 16,
        ..EngineConfig::default()
    }
}

pub fn uniform_volume(shape: (usize, usize, usize), spacing: DVec3) -> Volume {
    Volume::new(Array3::from_elem(shape, 100u16), spacing, DVec3::ZERO)
        .expect("should build volume")
}

/// Session with mock surfaces bound to the three orthogonal views and,
/// optionally, the fourth view.
pub fn session_with_views(with_fourth: bool) -> (MprSession, RenderLog) {
    let config = test_config();
    let log = RenderLog::default();
    let session = MprSession::new(config.clone());
    for orientation in Orientation::ALL {
        let surface = MockSurface::new(orientation.into(), &log);
        session.bind_view(Box::new(OrthogonalView::new(orientation, surface, &config)));
    }
    if with_fourth {
        let surface = MockSurface::new(ViewId::Fourth, &log);
        session.bind_view(Box::new(FourthView::new(surface, &config)));
    }
    (session, log)
}

pub fn rendered_views(log: &RenderLog) -> Vec<ViewId> {
    log.borrow().iter().map(|(view, _)| *view).collect()
}
