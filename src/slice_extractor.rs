use std::collections::{HashMap, HashSet};

use glam::{DMat4, DVec2, DVec3};
use image::{GrayImage, ImageBuffer};
use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;
use tracing::trace;
use web_time::Instant;

use crate::config::EngineConfig;
use crate::enums::{Interpolation, Orientation};
use crate::interpolator::Interpolator;
use crate::volume::Volume;

/// A closed polyline in mask pixel coordinates (x = column, y = row).
///
/// The last point connects back to the first.
pub type Contour = Vec<DVec2>;

/// Marching squares edge table mapping case index to edge pairs.
/// Edges are ordered: 0 - bottom, 1 - right, 2 - top, 3 - left.
const MARCHING_SQUARES_EDGES: [&[(usize, usize)]; 16] = [
    &[],
    &[(3, 0)],
    &[(0, 1)],
    &[(3, 1)],
    &[(1, 2)],
    &[(3, 0), (1, 2)],
    &[(0, 2)],
    &[(2, 3)],
    &[(2, 3)],
    &[(0, 2)],
    &[(0, 1), (2, 3)],
    &[(1, 2)],
    &[(3, 1)],
    &[(0, 1)],
    &[(3, 0)],
    &[],
];

/// A grid edge carrying a contour crossing, in padded grid coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum GridEdge {
    /// From `(x, y)` to `(x + 1, y)`.
    Horizontal(usize, usize),
    /// From `(x, y)` to `(x, y + 1)`.
    Vertical(usize, usize),
}

/// Resampled plane through a volume.
#[derive(Clone, Debug)]
pub struct SliceImage {
    /// Samples indexed `[row, column]`; rows run along the plane's v axis.
    pub data: Array2<f32>,
    /// World distance between neighbouring samples.
    pub pixel_spacing: f64,
    pub plane: DMat4,
    pub background: f32,
}

impl SliceImage {
    /// World position of the sample at `[row, column]`.
    pub fn world_position(&self, row: usize, column: usize) -> DVec3 {
        let (rows, columns) = self.data.dim();
        let x = (column as f64 - (columns as f64 - 1.0) / 2.0) * self.pixel_spacing;
        let y = (row as f64 - (rows as f64 - 1.0) / 2.0) * self.pixel_spacing;
        self.plane.transform_point3(DVec3::new(x, y, 0.0))
    }

    /// Number of samples that fell inside the volume.
    pub fn covered_samples(&self) -> usize {
        self.data.iter().filter(|&&v| v != self.background).count()
    }

    /// Map `window` linearly onto 0..=255; background becomes black.
    pub fn to_image(&self, window: (f32, f32)) -> Option<GrayImage> {
        let (rows, columns) = self.data.dim();
        let pixel_data: Vec<u8> = self
            .data
            .iter()
            .map(|&v| {
                if v == self.background {
                    0
                } else {
                    normalize_to_u8(v, window)
                }
            })
            .collect();
        ImageBuffer::from_raw(columns as u32, rows as u32, pixel_data)
    }
}

#[inline]
fn normalize_to_u8(value: f32, (low, high): (f32, f32)) -> u8 {
    let width = (high - low).max(f32::EPSILON);
    (((value - low) / width) * 255.0).clamp(0.0, 255.0) as u8
}

/// Resamples a [`Volume`] along arbitrary planes and traces mask outlines.
#[derive(Clone, Debug)]
pub struct SliceExtractor {
    background: f32,
    interpolation: Interpolation,
    isovalue: f32,
    min_contour_points: usize,
}

impl Default for SliceExtractor {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SliceExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            background: config.background,
            interpolation: config.interpolation,
            isovalue: config.outline_isovalue,
            min_contour_points: config.min_contour_points,
        }
    }

    pub fn background(&self) -> f32 {
        self.background
    }

    /// Resample `volume` on an `output_size × output_size` grid centered on
    /// the plane origin, spanning the volume diagonal so that any plane
    /// through the volume is fully covered.
    pub fn resample(&self, volume: &Volume, plane: &DMat4, output_size: usize) -> SliceImage {
        let start = Instant::now();
        let size = output_size.max(1);
        let diagonal = volume.diagonal();
        let pixel_spacing = if diagonal > 0.0 {
            diagonal / size as f64
        } else {
            volume.spacing().min_element()
        };

        let mut data = Array2::<f32>::from_elem((size, size), self.background);
        let half = (size as f64 - 1.0) / 2.0;
        let interpolation = self.interpolation;
        let background = self.background;

        Zip::indexed(&mut data).par_for_each(|(row, column), sample| {
            let local = DVec3::new(
                (column as f64 - half) * pixel_spacing,
                (row as f64 - half) * pixel_spacing,
                0.0,
            );
            *sample = volume
                .sample(plane.transform_point3(local), interpolation)
                .unwrap_or(background);
        });

        trace!(size, elapsed_us = start.elapsed().as_micros() as u64, "resampled plane");

        SliceImage {
            data,
            pixel_spacing,
            plane: *plane,
            background,
        }
    }

    /// Trace the boundary of a binary mask with marching squares.
    ///
    /// The mask is treated as surrounded by zeros so every loop closes.
    /// Loops shorter than the configured minimum or enclosing no area are dropped.
    pub fn trace_outline(&self, mask: &ArrayView2<'_, u8>) -> Vec<Contour> {
        let (rows, columns) = mask.dim();
        if rows == 0 || columns == 0 {
            return Vec::new();
        }

        // Padded by one zero sample on every side
        let value = |x: usize, y: usize| -> f32 {
            if x == 0 || y == 0 || x > columns || y > rows {
                0.0
            } else {
                mask[[y - 1, x - 1]] as f32
            }
        };

        let iso = self.isovalue;
        let mut adjacency: HashMap<GridEdge, Vec<GridEdge>> = HashMap::new();
        for y in 0..=rows {
            for x in 0..=columns {
                let corners = [
                    value(x, y),
                    value(x + 1, y),
                    value(x + 1, y + 1),
                    value(x, y + 1),
                ];
                let case_index = corners
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v > iso)
                    .fold(0, |case, (bit, _)| case | (1 << bit));

                let edges = [
                    GridEdge::Horizontal(x, y),
                    GridEdge::Vertical(x + 1, y),
                    GridEdge::Horizontal(x, y + 1),
                    GridEdge::Vertical(x, y),
                ];
                for &(e0, e1) in MARCHING_SQUARES_EDGES[case_index] {
                    adjacency.entry(edges[e0]).or_default().push(edges[e1]);
                    adjacency.entry(edges[e1]).or_default().push(edges[e0]);
                }
            }
        }

        let crossing = |edge: GridEdge| -> DVec2 {
            let (x0, y0, x1, y1) = match edge {
                GridEdge::Horizontal(x, y) => (x, y, x + 1, y),
                GridEdge::Vertical(x, y) => (x, y, x, y + 1),
            };
            let v0 = value(x0, y0);
            let v1 = value(x1, y1);
            let t = ((iso - v0) / (v1 - v0)) as f64;
            let p0 = DVec2::new(x0 as f64, y0 as f64);
            let p1 = DVec2::new(x1 as f64, y1 as f64);
            p0 + (p1 - p0) * t - DVec2::ONE
        };

        let mut starts: Vec<GridEdge> = adjacency.keys().copied().collect();
        starts.sort_by_key(|edge| match *edge {
            GridEdge::Horizontal(x, y) => (y, x, 0),
            GridEdge::Vertical(x, y) => (y, x, 1),
        });

        let mut visited: HashSet<GridEdge> = HashSet::new();
        let mut contours = Vec::new();
        for start in starts {
            if visited.contains(&start) {
                continue;
            }
            let mut contour = Vec::new();
            let mut current = start;
            loop {
                visited.insert(current);
                contour.push(crossing(current));
                let next = adjacency
                    .get(&current)
                    .and_then(|neighbours| neighbours.iter().find(|n| !visited.contains(n)));
                match next {
                    Some(&edge) => current = edge,
                    None => break,
                }
            }

            if contour.len() < self.min_contour_points {
                trace!(points = contour.len(), "dropping short contour");
                continue;
            }
            if signed_area(&contour).abs() < 1e-9 {
                trace!("dropping zero-area contour");
                continue;
            }
            contours.push(contour);
        }
        contours
    }

    /// Orthogonal slice as an 8-bit image, index clamped to the volume.
    ///
    /// Coronal and sagittal slices are rescaled to isotropic aspect with
    /// bilinear interpolation unless `interpolation` is `Nearest`.
    pub fn axis_image(
        volume: &Volume,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
    ) -> Option<GrayImage> {
        let slice = volume.get_slice_from_axis(index, orientation);
        let (low, high) = volume.value_range();
        let window = (low as f32, high as f32);

        if matches!(interpolation, Interpolation::Nearest)
            || matches!(orientation, Orientation::Axial)
        {
            return Self::slice_to_image(&slice, window);
        }

        let spacing = volume.spacing();
        let (depth, height, width) = Interpolator::get_isotropic_dimensions(
            (spacing.x, spacing.y, spacing.z),
            volume.dim(),
        );
        let (out_width, out_height) = match orientation {
            Orientation::Coronal => (width, depth),
            Orientation::Sagittal => (height, depth),
            Orientation::Axial => (width, height),
        };
        Self::interpolate_slice(&slice, out_width, out_height, window)
    }

    fn slice_to_image(slice: &ArrayView2<'_, u16>, window: (f32, f32)) -> Option<GrayImage> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .iter()
            .map(|&v| normalize_to_u8(v as f32, window))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn interpolate_slice(
        slice: &ArrayView2<'_, u16>,
        width: u32,
        height: u32,
        window: (f32, f32),
    ) -> Option<GrayImage> {
        let (slice_height, slice_width) = slice.dim();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map(|y| {
                (0..width)
                    .map(|x| {
                        // Normalized coordinates with half-pixel offset
                        let norm_x = (x as f32 + 0.5) / width as f32;
                        let norm_y = (y as f32 + 0.5) / height as f32;

                        let src_x = norm_x * slice_width as f32 - 0.5;
                        let src_y = norm_y * slice_height as f32 - 0.5;

                        let src_x = src_x.max(0.0).min((slice_width - 1) as f32);
                        let src_y = src_y.max(0.0).min((slice_height - 1) as f32);

                        let value = Interpolator::bilinear_interpolate(slice, src_y, src_x);
                        normalize_to_u8(value, window)
                    })
                    .collect::<Vec<u8>>()
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixel_data)
    }
}

fn signed_area(contour: &[DVec2]) -> f64 {
    let n = contour.len();
    (0..n)
        .map(|i| contour[i].perp_dot(contour[(i + 1) % n]))
        .sum::<f64>()
        * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ResliceCursor;
    use ndarray::Array3;

    fn ramp_volume() -> Volume {
        let data = Array3::from_shape_fn((9, 9, 9), |(z, y, x)| (x + 10 * y + 100 * z) as u16);
        Volume::new(data, DVec3::ONE, DVec3::ZERO).unwrap()
    }

    fn block_mask(size: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Array2<u8> {
        Array2::from_shape_fn((size, size), |(r, c)| {
            u8::from(rows.contains(&r) && cols.contains(&c))
        })
    }

    #[test]
    fn resample_axial_plane_hits_center_voxel() {
        let volume = ramp_volume();
        let plane = ResliceCursor::centered_on(&volume).plane_transform(2).unwrap();
        let image = SliceExtractor::default().resample(&volume, &plane, 33);

        assert_eq!(image.data.dim(), (33, 33));
        assert_eq!(image.data[[16, 16]], (4 + 40 + 400) as f32);
        assert_eq!(image.world_position(16, 16), DVec3::new(4.0, 4.0, 4.0));
    }

    #[test]
    fn resample_marks_outside_samples_with_background() {
        let volume = ramp_volume();
        let extractor = SliceExtractor::default();
        let plane = ResliceCursor::centered_on(&volume).plane_transform(2).unwrap();
        let image = extractor.resample(&volume, &plane, 33);

        // The grid spans the diagonal, wider than the axial face
        assert_eq!(image.data[[0, 0]], extractor.background());
        assert!(image.covered_samples() > 0);
        assert!(image.covered_samples() < 33 * 33);
    }

    #[test]
    fn resample_plane_outside_volume_is_all_background() {
        let volume = ramp_volume();
        let plane = ResliceCursor::new(DVec3::new(4.0, 4.0, 50.0))
            .plane_transform(2)
            .unwrap();
        let image = SliceExtractor::default().resample(&volume, &plane, 16);
        assert_eq!(image.covered_samples(), 0);
        assert!(image.to_image((0.0, 1.0)).is_some());
    }

    #[test]
    fn square_block_traces_one_loop() {
        let mask = block_mask(7, 2..5, 2..5);
        let contours = SliceExtractor::default().trace_outline(&mask.view());

        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 12);
        for point in &contours[0] {
            assert!(point.x >= 1.5 && point.x <= 4.5);
            assert!(point.y >= 1.5 && point.y <= 4.5);
        }
    }

    #[test]
    fn contours_are_connected() {
        let mask = block_mask(8, 1..6, 2..7);
        let contours = SliceExtractor::default().trace_outline(&mask.view());
        let contour = &contours[0];
        for i in 0..contour.len() {
            let step = contour[(i + 1) % contour.len()] - contour[i];
            assert!(step.length() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn mask_touching_border_still_closes() {
        let mask = Array2::from_elem((3, 3), 1u8);
        let contours = SliceExtractor::default().trace_outline(&mask.view());
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 12);
    }

    #[test]
    fn small_specks_are_discarded() {
        let mut mask = block_mask(12, 2..6, 2..6);
        mask[[9, 9]] = 1;
        let contours = SliceExtractor::default().trace_outline(&mask.view());
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 16);
    }

    #[test]
    fn empty_mask_has_no_outline() {
        let mask = Array2::<u8>::zeros((5, 5));
        assert!(SliceExtractor::default().trace_outline(&mask.view()).is_empty());
        let mask = Array2::<u8>::zeros((0, 5));
        assert!(SliceExtractor::default().trace_outline(&mask.view()).is_empty());
    }

    #[test]
    fn axis_image_rescales_to_isotropic_aspect() {
        let data = Array3::<u16>::zeros((10, 20, 30));
        let volume = Volume::new(data, DVec3::new(1.0, 1.0, 2.0), DVec3::ZERO).unwrap();

        let coronal =
            SliceExtractor::axis_image(&volume, 5, Orientation::Coronal, Interpolation::Linear)
                .unwrap();
        assert_eq!(coronal.dimensions(), (30, 20));

        let axial =
            SliceExtractor::axis_image(&volume, 500, Orientation::Axial, Interpolation::Linear)
                .unwrap();
        assert_eq!(axial.dimensions(), (30, 20));

        let sagittal =
            SliceExtractor::axis_image(&volume, 0, Orientation::Sagittal, Interpolation::Nearest)
                .unwrap();
        assert_eq!(sagittal.dimensions(), (20, 10));
    }
}
