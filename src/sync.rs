use std::cell::{Cell, RefCell};
use std::sync::Weak;

use glam::DMat4;
use tracing::{debug, trace, warn};

use crate::cursor::{CursorMutation, ResliceCursor};
use crate::enums::{Actor, ViewId};
use crate::geometry::GeometryError;
use crate::view::{MprView, SurfaceError, ViewBinding};
use crate::volume::Volume;

/// Clears the propagation flag when a fan-out ends, including by unwinding.
pub(crate) struct PropagationGuard<'a>(&'a Cell<bool>);

impl<'a> PropagationGuard<'a> {
    /// `None` when a propagation is already running.
    pub(crate) fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for PropagationGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Binds the views to the shared [`ResliceCursor`] and fans geometry
/// changes out to them.
///
/// All methods take `&self` so a render handler holding a handle to the
/// synchronizer may call back into it; such calls arrive while a
/// propagation is running and are dropped.
#[derive(Default)]
pub struct ViewSynchronizer {
    views: RefCell<Vec<Box<dyn MprView>>>,
    propagating: Cell<bool>,
    generation: Cell<u64>,
}

impl ViewSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a view, replacing any view already bound under the same id.
    pub fn bind(&self, view: Box<dyn MprView>) {
        let Ok(mut views) = self.views.try_borrow_mut() else {
            warn!("bind requested during propagation, ignoring");
            return;
        };
        let id = view.binding().view;
        views.retain(|bound| bound.binding().view != id);
        views.push(view);
    }

    /// Bindings of every bound view, in binding order.
    ///
    /// Empty while a propagation holds the views, e.g. when called from a
    /// render handler.
    pub fn bindings(&self) -> Vec<ViewBinding> {
        match self.views.try_borrow() {
            Ok(views) => views.iter().map(|view| view.binding()).collect(),
            Err(_) => {
                trace!("bindings requested during propagation, none returned");
                Vec::new()
            }
        }
    }

    pub fn is_propagating(&self) -> bool {
        self.propagating.get()
    }

    /// Number of completed fan-outs.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Apply a write to the cursor and fan it out from `origin`.
    ///
    /// Returns whether the write was applied. Writes arriving during a
    /// propagation and writes that would break the cursor's invariants are dropped.
    pub fn apply(
        &self,
        cursor: &mut ResliceCursor,
        origin: ViewId,
        mutation: CursorMutation,
    ) -> bool {
        if self.is_propagating() {
            trace!(origin = ?origin, "cursor write during propagation dropped");
            return false;
        }
        if let Err(err) = cursor.apply(mutation) {
            debug!(origin = ?origin, %err, "cursor write rejected");
            return false;
        }
        self.on_cursor_changed(cursor, origin);
        true
    }

    /// Recompute and render every bound view except `origin`.
    ///
    /// Idempotent for a given cursor; re-entrant calls are no-ops.
    pub fn on_cursor_changed(&self, cursor: &ResliceCursor, origin: ViewId) {
        let Some(_guard) = PropagationGuard::enter(&self.propagating) else {
            trace!(origin = ?origin, "re-entrant cursor change dropped");
            return;
        };
        let Ok(mut views) = self.views.try_borrow_mut() else {
            return;
        };
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        for view in views
            .iter_mut()
            .filter(|view| view.binding().view != origin)
        {
            render_view(view.as_mut(), cursor, generation);
        }
    }

    /// Render a single view from the cursor, e.g. the origin of a change
    /// whose own geometry moved.
    pub fn refresh_view(&self, cursor: &ResliceCursor, target: ViewId) {
        self.with_view(target, |view| {
            render_view(view, cursor, self.generation.get());
            Ok(())
        });
    }

    /// Render every bound view.
    pub fn refresh_all(&self, cursor: &ResliceCursor) {
        let Some(_guard) = PropagationGuard::enter(&self.propagating) else {
            return;
        };
        let Ok(mut views) = self.views.try_borrow_mut() else {
            return;
        };
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        for view in views.iter_mut() {
            render_view(view.as_mut(), cursor, generation);
        }
    }

    /// Run `action` on one view under the propagation guard. Surface
    /// errors are logged and absorbed.
    pub fn with_view<F>(&self, target: ViewId, action: F)
    where
        F: FnOnce(&mut dyn MprView) -> Result<(), SurfaceError>,
    {
        let Some(_guard) = PropagationGuard::enter(&self.propagating) else {
            trace!(view = ?target, "re-entrant view access dropped");
            return;
        };
        let Ok(mut views) = self.views.try_borrow_mut() else {
            return;
        };
        let Some(view) = views.iter_mut().find(|view| view.binding().view == target) else {
            trace!(view = ?target, "view not bound");
            return;
        };
        if let Err(err) = action(view.as_mut()) {
            warn!(view = ?target, %err, "view update failed, skipping");
        }
    }

    /// Run `action` on every view, absorbing per-view failures.
    pub fn for_each_view<F>(&self, mut action: F)
    where
        F: FnMut(&mut dyn MprView) -> Result<(), SurfaceError>,
    {
        let Some(_guard) = PropagationGuard::enter(&self.propagating) else {
            return;
        };
        let Ok(mut views) = self.views.try_borrow_mut() else {
            return;
        };
        for view in views.iter_mut() {
            let id = view.binding().view;
            if let Err(err) = action(view.as_mut()) {
                warn!(view = ?id, %err, "view update failed, skipping");
            }
        }
    }

    pub fn attach_volume(&self, volume: Weak<Volume>) {
        self.for_each_view(|view| {
            view.attach_volume(volume.clone());
            Ok(())
        });
    }

    /// Toggle an actor on the three orthogonal views.
    pub fn set_orthogonal_actor_visible(&self, actor: Actor, visible: bool) {
        self.for_each_view(|view| {
            if view.binding().view == ViewId::Fourth {
                return Ok(());
            }
            view.set_actor_visible(actor, visible)
        });
    }
}

fn plane_for(cursor: &ResliceCursor, binding: ViewBinding) -> Result<DMat4, GeometryError> {
    match binding.view {
        ViewId::Fourth => cursor.oblique_transform(),
        _ => cursor.plane_transform(binding.axis_pair),
    }
}

fn render_view(view: &mut dyn MprView, cursor: &ResliceCursor, generation: u64) {
    let binding = view.binding();
    let plane = match plane_for(cursor, binding) {
        Ok(plane) => plane,
        Err(err) => {
            debug!(view = ?binding.view, %err, "degenerate plane, skipping frame");
            return;
        }
    };
    match view.render(&plane) {
        Ok(()) => trace!(view = ?binding.view, generation, "view rendered"),
        Err(err) => warn!(view = ?binding.view, generation, %err, "render failed, skipping view"),
    }
}
