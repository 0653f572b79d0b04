use std::sync::Weak;

use glam::DMat4;
use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;
use crate::cursor::OBLIQUE_AXIS_PAIR;
use crate::enums::{Actor, FourthViewMode, Orientation, ViewId};
use crate::segmentation::OrganOutline;
use crate::slice_extractor::{SliceExtractor, SliceImage};
use crate::volume::Volume;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Render surface has been torn down")]
    TornDown,

    #[error("Render backend error: {0}")]
    Backend(String),
}

/// What a surface is asked to draw.
#[derive(Clone, Copy, Debug)]
pub enum Frame<'a> {
    Slice(&'a SliceImage),
    Outline(&'a [OrganOutline]),
    /// No volume is loaded.
    Blank,
}

/// Host-owned drawing target of one view.
pub trait RenderSurface {
    fn render_now(&mut self, frame: Frame<'_>) -> Result<(), SurfaceError>;

    fn set_actor_visible(&mut self, actor: Actor, visible: bool) -> Result<(), SurfaceError>;
}

/// Which cursor axis pair a view cuts along.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewBinding {
    pub view: ViewId,
    pub axis_pair: usize,
}

impl ViewBinding {
    pub fn orthogonal(orientation: Orientation) -> Self {
        Self {
            view: orientation.into(),
            axis_pair: orientation.axis_pair(),
        }
    }

    pub fn fourth() -> Self {
        Self {
            view: ViewId::Fourth,
            axis_pair: OBLIQUE_AXIS_PAIR,
        }
    }
}

/// Capabilities the synchronizer needs from a bound view.
pub trait MprView {
    fn binding(&self) -> ViewBinding;

    /// Point the view at a newly loaded volume (or a dangling handle once it is gone).
    fn attach_volume(&mut self, volume: Weak<Volume>);

    fn render(&mut self, plane: &DMat4) -> Result<(), SurfaceError>;

    fn set_actor_visible(&mut self, actor: Actor, visible: bool) -> Result<(), SurfaceError>;

    /// Views without an outline path ignore this.
    fn set_outline(&mut self, _outline: Option<Vec<OrganOutline>>) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn set_mode(&mut self, _mode: FourthViewMode) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// One of the axial, coronal and sagittal views.
pub struct OrthogonalView<S> {
    orientation: Orientation,
    surface: S,
    extractor: SliceExtractor,
    output_size: usize,
    volume: Weak<Volume>,
}

impl<S: RenderSurface> OrthogonalView<S> {
    pub fn new(orientation: Orientation, surface: S, config: &EngineConfig) -> Self {
        Self {
            orientation,
            surface,
            extractor: SliceExtractor::new(config),
            output_size: config.output_size,
            volume: Weak::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

impl<S: RenderSurface> MprView for OrthogonalView<S> {
    fn binding(&self) -> ViewBinding {
        ViewBinding::orthogonal(self.orientation)
    }

    fn attach_volume(&mut self, volume: Weak<Volume>) {
        self.volume = volume;
    }

    fn render(&mut self, plane: &DMat4) -> Result<(), SurfaceError> {
        render_slice(
            &mut self.surface,
            &self.extractor,
            &self.volume,
            plane,
            self.output_size,
        )
    }

    fn set_actor_visible(&mut self, actor: Actor, visible: bool) -> Result<(), SurfaceError> {
        self.surface.set_actor_visible(actor, visible)
    }
}

/// The user-configurable view: either the oblique slice or organ outlines.
pub struct FourthView<S> {
    surface: S,
    extractor: SliceExtractor,
    output_size: usize,
    volume: Weak<Volume>,
    mode: FourthViewMode,
    outline: Vec<OrganOutline>,
    last_plane: Option<DMat4>,
}

impl<S: RenderSurface> FourthView<S> {
    pub fn new(surface: S, config: &EngineConfig) -> Self {
        Self {
            surface,
            extractor: SliceExtractor::new(config),
            output_size: config.output_size,
            volume: Weak::new(),
            mode: config.fourth_view_mode,
            outline: Vec::new(),
            last_plane: None,
        }
    }

    pub fn mode(&self) -> FourthViewMode {
        self.mode
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn redraw(&mut self) -> Result<(), SurfaceError> {
        match self.mode {
            FourthViewMode::Outline => self.surface.render_now(Frame::Outline(&self.outline)),
            FourthViewMode::Oblique => match self.last_plane {
                Some(plane) => render_slice(
                    &mut self.surface,
                    &self.extractor,
                    &self.volume,
                    &plane,
                    self.output_size,
                ),
                None => self.surface.render_now(Frame::Blank),
            },
        }
    }
}

impl<S: RenderSurface> MprView for FourthView<S> {
    fn binding(&self) -> ViewBinding {
        ViewBinding::fourth()
    }

    fn attach_volume(&mut self, volume: Weak<Volume>) {
        self.volume = volume;
        self.outline.clear();
        self.last_plane = None;
    }

    fn render(&mut self, plane: &DMat4) -> Result<(), SurfaceError> {
        self.last_plane = Some(*plane);
        self.redraw()
    }

    fn set_actor_visible(&mut self, actor: Actor, visible: bool) -> Result<(), SurfaceError> {
        self.surface.set_actor_visible(actor, visible)
    }

    fn set_outline(&mut self, outline: Option<Vec<OrganOutline>>) -> Result<(), SurfaceError> {
        self.outline = outline.unwrap_or_default();
        if self.mode == FourthViewMode::Outline {
            self.redraw()?;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: FourthViewMode) -> Result<(), SurfaceError> {
        self.mode = mode;
        let oblique = mode == FourthViewMode::Oblique;
        self.surface.set_actor_visible(Actor::Image, oblique)?;
        self.surface.set_actor_visible(Actor::Outline, !oblique)?;
        self.redraw()
    }
}

fn render_slice<S: RenderSurface>(
    surface: &mut S,
    extractor: &SliceExtractor,
    volume: &Weak<Volume>,
    plane: &DMat4,
    output_size: usize,
) -> Result<(), SurfaceError> {
    let Some(volume) = volume.upgrade() else {
        debug!("volume released, rendering blank frame");
        return surface.render_now(Frame::Blank);
    };
    let slice = extractor.resample(&volume, plane, output_size);
    surface.render_now(Frame::Slice(&slice))
}
