use std::rc::Rc;
use std::sync::{Arc, Weak};

use glam::DVec3;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::cursor::{CursorMutation, ResliceCursor};
use crate::enums::{Actor, FourthViewMode, Orientation, SortBy, ViewId};
use crate::oblique::ObliquePlaneComputer;
use crate::reference_line::{
    InteractionSession, LineUpdate, PointerEvent, ReferenceLineController, ReferenceLineState,
};
use crate::roi::{BoxWidget, RoiSynchronizer};
use crate::segmentation::{OrganMask, OrganOutline, SegmentationBatch, SegmentationReceiver};
use crate::slice_extractor::SliceExtractor;
use crate::sync::ViewSynchronizer;
use crate::view::MprView;
use crate::volume::{Bounds, Volume};
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

/// Owns the loaded volume and every piece of MPR state derived from it.
///
/// Views hold weak handles to the volume, so dropping or replacing it here
/// is all it takes to release the voxels. Every entry point is a no-op
/// while no volume is loaded.
pub struct MprSession {
    config: EngineConfig,
    volume: Option<Arc<Volume>>,
    cursor: Option<ResliceCursor>,
    sync: Rc<ViewSynchronizer>,
    roi: Rc<RoiSynchronizer>,
    lines: ReferenceLineController,
    oblique: ObliquePlaneComputer,
    extractor: SliceExtractor,
    segmentation: Option<SegmentationBatch>,
    pending: Option<SegmentationReceiver>,
    outline_slice: Option<usize>,
    oblique_source: Orientation,
}

impl MprSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            lines: ReferenceLineController::new(&config),
            extractor: SliceExtractor::new(&config),
            config,
            volume: None,
            cursor: None,
            sync: Rc::new(ViewSynchronizer::new()),
            roi: Rc::new(RoiSynchronizer::new()),
            oblique: ObliquePlaneComputer,
            segmentation: None,
            pending: None,
            outline_slice: None,
            oblique_source: Orientation::Axial,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle to the view synchronizer, e.g. for render handlers
    /// that report changes back.
    pub fn synchronizer(&self) -> Rc<ViewSynchronizer> {
        Rc::clone(&self.sync)
    }

    pub fn roi(&self) -> Rc<RoiSynchronizer> {
        Rc::clone(&self.roi)
    }

    /// Bind a view; it is pointed at the current volume and rendered if one is loaded.
    pub fn bind_view(&self, mut view: Box<dyn MprView>) {
        let id = view.binding().view;
        view.attach_volume(self.weak_volume());
        self.sync.bind(view);
        if let Some(cursor) = &self.cursor {
            self.sync.refresh_view(cursor, id);
        }
    }

    pub fn bind_box_widget(&self, widget: Box<dyn BoxWidget>) {
        self.roi.bind(widget);
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_deref()
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    /// Take the result of a load. A failure leaves the session with no
    /// volume and is handed back so the host can report it.
    pub fn load(
        &mut self,
        result: Result<Volume, VolumeLoaderError>,
    ) -> Result<(), VolumeLoaderError> {
        match result {
            Ok(volume) => {
                self.set_volume(volume);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "volume load failed, clearing session");
                self.unload();
                Err(err)
            }
        }
    }

    /// Load a DICOM directory or file into the session.
    pub fn load_from_path(
        &mut self,
        path: impl AsRef<std::path::Path>,
        sort_by: SortBy,
    ) -> Result<(), VolumeLoaderError> {
        self.load(VolumeLoader::load_from_path(path, sort_by))
    }

    /// Replace the volume and reset all derived state around it.
    pub fn set_volume(&mut self, volume: Volume) {
        let volume = Arc::new(volume);
        let mut cursor = ResliceCursor::centered_on(&volume);
        self.lines.reset(&volume, &cursor);
        self.roi.reset(&volume);
        self.segmentation = None;
        self.pending = None;
        self.outline_slice = None;
        self.oblique_source = Orientation::Axial;

        // The fourth view starts on the axial line's plane at angle 0
        if let Some(line) = self.lines.line(Orientation::Axial) {
            if let Some(frame) = ObliquePlaneComputer::compute(
                &cursor,
                line.angle_degrees,
                line.center,
                Orientation::Axial,
            ) {
                if let Err(err) = cursor.apply(CursorMutation::SetOblique(frame)) {
                    debug!(%err, "initial oblique frame rejected");
                }
            }
        }

        info!(
            dim = ?volume.dim(),
            spacing = ?volume.spacing(),
            center = ?cursor.center(),
            "volume loaded"
        );
        self.sync.attach_volume(Arc::downgrade(&volume));
        self.volume = Some(volume);
        self.cursor = Some(cursor);
        self.sync.refresh_all(&cursor);
    }

    /// Drop the volume and everything derived from it.
    pub fn unload(&mut self) {
        self.volume = None;
        self.cursor = None;
        self.lines.clear();
        self.roi.clear();
        self.segmentation = None;
        self.pending = None;
        self.outline_slice = None;
        self.sync.attach_volume(Weak::new());
    }

    pub fn current_cursor(&self) -> Option<ResliceCursor> {
        self.cursor
    }

    pub fn current_roi_bounds(&self) -> Option<Bounds> {
        self.roi.current_bounds()
    }

    pub fn current_line_state(&self, view: ViewId) -> Option<ReferenceLineState> {
        self.lines.line(view.orientation()?).copied()
    }

    pub fn interaction(&self) -> Option<InteractionSession> {
        self.lines.interaction().copied()
    }

    /// Slice index of the cursor center along each orientation, indexed by
    /// [`Orientation`].
    pub fn current_slice_indices(&self) -> Option<[usize; 3]> {
        Some(self.cursor?.slice_indices(self.volume.as_deref()?))
    }

    /// Re-render every view except `origin` from the current cursor.
    pub fn on_cursor_changed(&self, origin: ViewId) {
        if let Some(cursor) = &self.cursor {
            self.sync.on_cursor_changed(cursor, origin);
        }
    }

    pub fn on_box_edited(&self, origin: Orientation, bounds: Bounds) {
        if self.volume.is_none() {
            trace!(origin = ?origin, "box edit ignored, no volume");
            return;
        }
        self.roi.on_box_edited(origin, bounds);
    }

    pub fn handle_press(&mut self, event: &PointerEvent, view: ViewId) -> bool {
        let Some(orientation) = view.orientation() else {
            return false;
        };
        if self.volume.is_none() {
            return false;
        }
        self.lines.handle_press(event, orientation)
    }

    /// Advance a drag and push the new line geometry into the oblique plane.
    /// Returns whether anything changed.
    pub fn handle_motion(&mut self, event: &PointerEvent, view: ViewId) -> bool {
        let Some(orientation) = view.orientation() else {
            return false;
        };
        if self.volume.is_none() {
            return false;
        }
        match self.lines.handle_motion(event, orientation) {
            Some(update) => {
                self.apply_line_update(update);
                true
            }
            None => false,
        }
    }

    pub fn handle_release(&mut self, _event: &PointerEvent, view: ViewId) -> bool {
        let Some(orientation) = view.orientation() else {
            return false;
        };
        self.lines.handle_release(orientation)
    }

    /// Set a reference line's angle directly and update the oblique plane.
    pub fn set_line_angle(&mut self, view: ViewId, angle_degrees: f64) -> bool {
        let Some(orientation) = view.orientation() else {
            return false;
        };
        match self.lines.set_angle(orientation, angle_degrees) {
            Some(update) => {
                self.apply_line_update(update);
                true
            }
            None => false,
        }
    }

    /// Move the cursor center, clamped to the volume extent. The origin view
    /// is re-rendered as well since its own plane may have moved.
    pub fn set_cursor_center(&mut self, center: DVec3, origin: ViewId) -> bool {
        let (Some(volume), Some(cursor)) = (self.volume.as_deref(), self.cursor.as_mut()) else {
            return false;
        };
        if !center.is_finite() {
            debug!(origin = ?origin, "non-finite cursor center dropped");
            return false;
        }
        let extent = volume.extent();
        let center = center.clamp(extent.min, extent.max);
        if !self
            .sync
            .apply(cursor, origin, CursorMutation::SetCenter(center))
        {
            return false;
        }
        self.sync.refresh_view(cursor, origin);
        self.follow_axial_slice();
        true
    }

    /// Replace the cursor axes; rejected when they cannot be orthonormalized.
    ///
    /// The reference lines are re-expressed in the new axes and the oblique
    /// plane is rebuilt from the line that last drove it.
    pub fn set_cursor_axes(&mut self, axes: [DVec3; 3], origin: ViewId) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };
        let before = *cursor;
        if !self.sync.apply(cursor, origin, CursorMutation::SetAxes(axes)) {
            return false;
        }
        self.sync.refresh_view(cursor, origin);
        self.lines.reproject(&before, cursor);

        let source = self.oblique_source;
        if let Some(line) = self.lines.line(source).copied() {
            self.apply_line_update(LineUpdate {
                source,
                angle_degrees: line.angle_degrees,
                center: line.center,
            });
        }
        true
    }

    /// Move the cursor to slice `index` of `orientation`, clamped to the volume.
    pub fn set_slice_index(&mut self, orientation: Orientation, index: usize) -> bool {
        let (Some(volume), Some(cursor)) = (self.volume.as_deref(), self.cursor) else {
            return false;
        };
        let mut center = cursor.center();
        center[orientation.normal_axis()] = volume.slice_position(index, orientation);
        self.set_cursor_center(center, orientation.into())
    }

    pub fn set_reference_lines_visible(&self, visible: bool) {
        self.sync
            .set_orthogonal_actor_visible(Actor::ReferenceLine, visible);
    }

    pub fn set_roi_visible(&self, visible: bool) {
        self.roi.set_visible(visible);
    }

    pub fn set_fourth_view_mode(&self, mode: FourthViewMode) {
        self.sync
            .with_view(ViewId::Fourth, |view| view.set_mode(mode));
    }

    /// Trace `masks` and show them on the fourth view's outline path.
    /// `None` clears the outline.
    pub fn set_outline(&mut self, slice_index: usize, masks: Option<&[OrganMask]>) {
        if self.volume.is_none() {
            return;
        }
        let outline = masks.map(|masks| {
            masks
                .iter()
                .map(|mask| OrganOutline {
                    organ: mask.organ.clone(),
                    contours: self.extractor.trace_outline(&mask.mask.view()),
                })
                .collect::<Vec<_>>()
        });
        debug!(
            slice_index,
            organs = outline.as_ref().map_or(0, Vec::len),
            "outline updated"
        );
        self.outline_slice = Some(slice_index);
        self.sync
            .with_view(ViewId::Fourth, |view| view.set_outline(outline));
    }

    /// Copy of the voxels inside the region of interest.
    pub fn extract_region(&self) -> Option<Volume> {
        self.roi.extract_region(self.volume.as_deref()?)
    }

    /// Register a pending segmentation run; replaces any earlier one.
    pub fn attach_segmentation(&mut self, receiver: SegmentationReceiver) {
        if self.volume.is_none() {
            debug!("segmentation attached without volume, ignoring");
            return;
        }
        self.pending = Some(receiver);
    }

    pub fn segmentation(&self) -> Option<&SegmentationBatch> {
        self.segmentation.as_ref()
    }

    /// Pick up finished segmentation results. Returns whether a result
    /// (success or failure) arrived.
    pub fn poll_segmentation(&mut self) -> bool {
        let Some(outcome) = self.pending.as_mut().and_then(SegmentationReceiver::try_recv) else {
            return false;
        };
        self.pending = None;
        match outcome {
            Ok(batch) => {
                info!(slices = batch.len(), "segmentation results received");
                self.segmentation = Some(batch);
            }
            Err(err) => {
                warn!(%err, "segmentation failed, outline stays empty");
                self.segmentation = Some(SegmentationBatch::default());
            }
        }
        self.outline_slice = None;
        self.follow_axial_slice();
        true
    }

    fn apply_line_update(&mut self, update: LineUpdate) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };
        self.oblique_source = update.source;
        self.oblique.update(
            &self.sync,
            cursor,
            update.angle_degrees,
            update.center,
            update.source,
        );
    }

    /// Show the outline for the axial slice under the cursor when it changed.
    fn follow_axial_slice(&mut self) {
        let Some(indices) = self.current_slice_indices() else {
            return;
        };
        let slice_index = indices[Orientation::Axial as usize];
        if self.outline_slice == Some(slice_index) {
            return;
        }
        let Some(batch) = self.segmentation.clone() else {
            return;
        };
        let masks = batch.for_slice(slice_index).map(|result| result.masks());
        self.set_outline(slice_index, masks);
    }

    fn weak_volume(&self) -> Weak<Volume> {
        self.volume.as_ref().map_or_else(Weak::new, Arc::downgrade)
    }
}

impl Default for MprSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
