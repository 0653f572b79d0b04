//! # MPR reslice library
//!
//! This crate keeps the views of a multi-planar reconstruction (MPR) viewer
//! of a 3D medical volume in step with each other.
//!
//! A volume is loaded from a folder of ".dcm" files (or a single file of the
//! series) and placed in world space from its DICOM spacing and position.
//! A shared [`ResliceCursor`] defines the three orthogonal cutting planes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//!  Each orthogonal view carries a reference line that can be rotated and
//!  translated by dragging its control points. The line drives a fourth,
//!  oblique view. The fourth view can instead show organ outlines traced from
//!  segmentation masks produced by an external worker. A region-of-interest
//!  box is kept consistent across the per-view box widgets and can be
//!  extracted as a sub-volume.
//!
//!  Rendering is left to the host: views draw through a [`RenderSurface`]
//!  and boxes through a [`BoxWidget`]. All geometry changes are fanned out by
//!  the [`ViewSynchronizer`], which drops re-entrant calls, so a render
//!  handler may report changes back without recursing.
//!
//! # Examples
//!
//! ## Loading a series and dragging the axial reference line
//!
//! ```no_run
//! # use mpr_reslice::{EngineConfig, MprSession, PointerEvent, SortBy, ViewId};
//! let mut session = MprSession::new(EngineConfig::default());
//! session
//!     .load_from_path("dicom", SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//!
//! let line = session
//!     .current_line_state(ViewId::Axial)
//!     .expect("should have an axial line once a volume is loaded");
//! let handle = line.control_points.right;
//!
//! session.handle_press(&PointerEvent::at(handle), ViewId::Axial);
//! session.handle_motion(&PointerEvent::at(line.center + glam::DVec2::new(50.0, 50.0)), ViewId::Axial);
//! session.handle_release(&PointerEvent::at(handle), ViewId::Axial);
//! ```

pub mod config;
pub mod cursor;
pub mod enums;
pub mod geometry;
mod interpolator;
pub mod oblique;
pub mod reference_line;
pub mod roi;
pub mod segmentation;
pub mod session;
pub mod slice_extractor;
pub mod sync;
pub mod view;
pub mod volume;
pub mod volume_loader;

pub use config::{ConfigError, EngineConfig};
pub use cursor::{ObliqueFrame, ResliceCursor};
pub use enums::{
    Actor, ControlPoint, DragKind, FourthViewMode, Interpolation, Orientation, SortBy, ViewId,
};
pub use geometry::{GeometryError, PlaneMatrixBuilder};
pub use oblique::ObliquePlaneComputer;
pub use reference_line::{PointerEvent, ReferenceLineController, ReferenceLineState};
pub use roi::{BoxWidget, RoiSynchronizer};
pub use segmentation::{
    OrganId, OrganMask, OrganOutline, SegmentationBatch, SegmentationError, SegmentationResult,
    handoff,
};
pub use session::MprSession;
pub use slice_extractor::{Contour, SliceExtractor, SliceImage};
pub use sync::ViewSynchronizer;
pub use view::{FourthView, Frame, MprView, OrthogonalView, RenderSurface, SurfaceError};
pub use volume::{Bounds, Volume, VolumeError};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
