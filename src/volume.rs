use crate::enums::{Interpolation, Orientation};
use crate::interpolator::Interpolator;

use glam::DVec3;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;
use thiserror::Error;

/// Tolerance used when deciding whether a world position lies on the volume grid.
const GRID_EPSILON: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum VolumeError {
    #[error("Volume has an empty dimension: {0:?}")]
    EmptyDimension((usize, usize, usize)),

    #[error("Spacing must be finite and positive, got {0}")]
    InvalidSpacing(DVec3),

    #[error("Origin must be finite, got {0}")]
    InvalidOrigin(DVec3),
}

/// Axis-aligned box in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Build from `(xmin, xmax, ymin, ymax, zmin, zmax)`.
    pub fn from_array(b: [f64; 6]) -> Self {
        Self {
            min: DVec3::new(b[0], b[2], b[4]),
            max: DVec3::new(b[1], b[3], b[5]),
        }
    }

    /// `(xmin, xmax, ymin, ymax, zmin, zmax)`
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min.x, self.max.x, self.min.y, self.max.y, self.min.z, self.max.z,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn is_well_formed(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Swap min and max on every axis where they are inverted.
    pub fn normalized(&self) -> Self {
        Self {
            min: self.min.min(self.max),
            max: self.min.max(self.max),
        }
    }

    /// Normalize, then clamp both corners into `extent`.
    pub fn clamped_to(&self, extent: &Bounds) -> Self {
        let normalized = self.normalized();
        Self {
            min: normalized.min.clamp(extent.min, extent.max),
            max: normalized.max.clamp(extent.min, extent.max),
        }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// A scalar voxel grid with its placement in world space.
///
/// Immutable once constructed. Voxel `(i, j, k)` sits at
/// `origin + (i * sx, j * sy, k * sz)`; the buffer is stored `(z, y, x)`.
#[derive(Clone, Debug)]
pub struct Volume {
    data: Array3<u16>,
    spacing: DVec3,
    origin: DVec3,
    value_range: (u16, u16),
}

impl Volume {
    pub fn new(data: Array3<u16>, spacing: DVec3, origin: DVec3) -> Result<Self, VolumeError> {
        let dim = data.dim();
        if dim.0 == 0 || dim.1 == 0 || dim.2 == 0 {
            return Err(VolumeError::EmptyDimension(dim));
        }
        if !spacing.is_finite() || spacing.min_element() <= 0.0 {
            return Err(VolumeError::InvalidSpacing(spacing));
        }
        if !origin.is_finite() {
            return Err(VolumeError::InvalidOrigin(origin));
        }

        let value_range = data
            .as_slice()
            .map(|values| {
                values
                    .par_iter()
                    .fold(|| (u16::MAX, u16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
                    .reduce(|| (u16::MAX, u16::MIN), |a, b| (a.0.min(b.0), a.1.max(b.1)))
            })
            .unwrap_or_else(|| {
                data.iter()
                    .fold((u16::MAX, u16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
            });

        Ok(Self {
            data,
            spacing,
            origin,
            value_range,
        })
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Voxel counts in world axis order `[nx, ny, nz]`.
    pub fn voxel_counts(&self) -> [usize; 3] {
        let (depth, height, width) = self.data.dim();
        [width, height, depth]
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// Smallest and largest sample value.
    pub fn value_range(&self) -> (u16, u16) {
        self.value_range
    }

    /// World-space box spanned by the voxel centers.
    pub fn extent(&self) -> Bounds {
        let [nx, ny, nz] = self.voxel_counts();
        let last = DVec3::new((nx - 1) as f64, (ny - 1) as f64, (nz - 1) as f64);
        Bounds::new(self.origin, self.origin + last * self.spacing)
    }

    pub fn center(&self) -> DVec3 {
        self.extent().center()
    }

    /// Length of the longest side of the extent.
    pub fn max_extent(&self) -> f64 {
        self.extent().size().max_element()
    }

    pub fn diagonal(&self) -> f64 {
        self.extent().size().length()
    }

    /// Continuous voxel coordinate `(i, j, k)` of a world position.
    pub fn world_to_voxel(&self, world: DVec3) -> DVec3 {
        (world - self.origin) / self.spacing
    }

    pub fn voxel_to_world(&self, voxel: DVec3) -> DVec3 {
        self.origin + voxel * self.spacing
    }

    /// Sample the volume at a world position, `None` outside the extent.
    pub fn sample(&self, world: DVec3, interpolation: Interpolation) -> Option<f32> {
        if !world.is_finite() {
            return None;
        }
        let voxel = self.world_to_voxel(world);
        let [nx, ny, nz] = self.voxel_counts();
        let upper = DVec3::new((nx - 1) as f64, (ny - 1) as f64, (nz - 1) as f64);
        if voxel.cmplt(DVec3::splat(-GRID_EPSILON)).any()
            || voxel.cmpgt(upper + GRID_EPSILON).any()
        {
            return None;
        }
        let voxel = voxel.clamp(DVec3::ZERO, upper);

        let view = self.data.view();
        let value = match interpolation {
            Interpolation::Linear => {
                Interpolator::trilinear_interpolate(&view, voxel.z, voxel.y, voxel.x)
            }
            Interpolation::Nearest => Interpolator::nearest(&view, voxel.z, voxel.y, voxel.x),
        };
        Some(value)
    }

    /// Number of slices along the normal of `orientation`.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        self.voxel_counts()[orientation.normal_axis()]
    }

    /// Clamp a slice index into `[0, slice_count - 1]`.
    pub fn clamp_slice_index(&self, index: usize, orientation: Orientation) -> usize {
        index.min(self.slice_count(orientation) - 1)
    }

    /// Slice index nearest to a world position along `orientation`'s normal, clamped.
    pub fn slice_index_at(&self, world: DVec3, orientation: Orientation) -> usize {
        let axis = orientation.normal_axis();
        let voxel = self.world_to_voxel(world)[axis];
        if !voxel.is_finite() || voxel <= 0.0 {
            return 0;
        }
        self.clamp_slice_index(voxel.round() as usize, orientation)
    }

    /// World coordinate of a slice along `orientation`'s normal, index clamped.
    pub fn slice_position(&self, index: usize, orientation: Orientation) -> f64 {
        let axis = orientation.normal_axis();
        let index = self.clamp_slice_index(index, orientation);
        self.origin[axis] + index as f64 * self.spacing[axis]
    }

    /// Axis-aligned slice, index clamped to the volume.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> ArrayView2<'_, u16> {
        let index = self.clamp_slice_index(index, orientation);
        match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        }
    }

    /// Copy the voxels inside `bounds` into a new volume placed at the same world position.
    ///
    /// Returns `None` when no voxel center falls inside the box.
    pub fn subregion(&self, bounds: &Bounds) -> Option<Volume> {
        if !bounds.is_finite() {
            return None;
        }
        let bounds = bounds.normalized();
        let lo = self.world_to_voxel(bounds.min);
        let hi = self.world_to_voxel(bounds.max);
        let counts = self.voxel_counts();

        let mut ranges = [(0usize, 0usize); 3];
        for axis in 0..3 {
            let first = (lo[axis] - GRID_EPSILON).ceil().max(0.0);
            let last = (hi[axis] + GRID_EPSILON)
                .floor()
                .min((counts[axis] - 1) as f64);
            if last < first {
                return None;
            }
            ranges[axis] = (first as usize, last as usize);
        }

        let [(x0, x1), (y0, y1), (z0, z1)] = ranges;
        let data = self.data.slice(s![z0..=z1, y0..=y1, x0..=x1]).to_owned();
        let origin = self.voxel_to_world(DVec3::new(x0 as f64, y0 as f64, z0 as f64));
        Volume::new(data, self.spacing, origin).ok()
    }
}
