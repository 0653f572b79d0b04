use std::cell::{Cell, RefCell};

use tracing::{debug, trace, warn};

use crate::enums::Orientation;
use crate::sync::PropagationGuard;
use crate::view::SurfaceError;
use crate::volume::{Bounds, Volume};

/// Host-owned box manipulation widget on one orthogonal view.
pub trait BoxWidget {
    fn orientation(&self) -> Orientation;

    /// Replace the widget's box. Implementations may report the change back
    /// through [`RoiSynchronizer::on_box_edited`]; such calls are dropped.
    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), SurfaceError>;

    fn bounds(&self) -> Option<Bounds>;

    fn set_visible(&mut self, visible: bool) -> Result<(), SurfaceError>;
}

/// Keeps one logical 3D box consistent across the per-view box widgets.
#[derive(Default)]
pub struct RoiSynchronizer {
    widgets: RefCell<Vec<Box<dyn BoxWidget>>>,
    bounds: Cell<Option<Bounds>>,
    extent: Cell<Option<Bounds>>,
    propagating: Cell<bool>,
}

impl RoiSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a widget, replacing any widget already bound to the same
    /// orientation. A widget bound after the box was placed receives it.
    pub fn bind(&self, mut widget: Box<dyn BoxWidget>) {
        let Ok(mut widgets) = self.widgets.try_borrow_mut() else {
            warn!("bind requested during propagation, ignoring");
            return;
        };
        let orientation = widget.orientation();
        if let Some(bounds) = self.bounds.get() {
            if let Err(err) = widget.set_bounds(bounds) {
                warn!(widget = ?orientation, %err, "could not place box on new widget");
            }
        }
        widgets.retain(|bound| bound.orientation() != orientation);
        widgets.push(widget);
    }

    /// Start a fresh box covering the whole volume.
    pub fn reset(&self, volume: &Volume) {
        let extent = volume.extent();
        self.extent.set(Some(extent));
        self.bounds.set(None);
        self.distribute(None, extent);
    }

    /// Forget the box, e.g. after a failed load.
    pub fn clear(&self) {
        self.extent.set(None);
        self.bounds.set(None);
    }

    /// Clamp `new_bounds` to the volume and copy it to every widget.
    ///
    /// The origin widget is skipped only when it already shows the stored
    /// box, as after a drag. A clamped edit, or one entered by the host
    /// rather than a widget, is written back to it too.
    pub fn on_box_edited(&self, origin: Orientation, new_bounds: Bounds) {
        if self.propagating.get() {
            trace!(origin = ?origin, "re-entrant box edit dropped");
            return;
        }
        let Some(extent) = self.extent.get() else {
            trace!(origin = ?origin, "box edit ignored, no volume");
            return;
        };
        if !new_bounds.is_finite() {
            debug!(origin = ?origin, "non-finite box edit dropped");
            return;
        }

        let clamped = new_bounds.clamped_to(&extent);
        if clamped != new_bounds {
            debug!(origin = ?origin, requested = ?new_bounds.to_array(), stored = ?clamped.to_array(), "box clamped to volume");
        }
        self.distribute(Some(origin), clamped);
    }

    pub fn current_bounds(&self) -> Option<Bounds> {
        self.bounds.get()
    }

    /// Copy of the voxels inside the current box.
    pub fn extract_region(&self, volume: &Volume) -> Option<Volume> {
        volume.subregion(&self.current_bounds()?)
    }

    pub fn set_visible(&self, visible: bool) {
        self.for_each_widget(|widget| widget.set_visible(visible));
    }

    /// Bounds each bound widget currently reports, in binding order.
    pub fn widget_bounds(&self) -> Vec<(Orientation, Option<Bounds>)> {
        self.widgets
            .try_borrow()
            .map(|widgets| {
                widgets
                    .iter()
                    .map(|widget| (widget.orientation(), widget.bounds()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn distribute(&self, origin: Option<Orientation>, bounds: Bounds) {
        self.bounds.set(Some(bounds));
        self.for_each_widget(|widget| {
            if Some(widget.orientation()) == origin && widget.bounds() == Some(bounds) {
                return Ok(());
            }
            widget.set_bounds(bounds)
        });
    }

    fn for_each_widget<F>(&self, mut action: F)
    where
        F: FnMut(&mut dyn BoxWidget) -> Result<(), SurfaceError>,
    {
        let Some(_guard) = PropagationGuard::enter(&self.propagating) else {
            return;
        };
        let Ok(mut widgets) = self.widgets.try_borrow_mut() else {
            return;
        };
        for widget in widgets.iter_mut() {
            let orientation = widget.orientation();
            if let Err(err) = action(widget.as_mut()) {
                warn!(widget = ?orientation, %err, "box widget update failed, skipping");
            }
        }
    }
}
