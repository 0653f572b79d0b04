use glam::{DMat4, DVec3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Plane input is not finite")]
    NonFinite,

    #[error("Axes are degenerate (zero length or parallel)")]
    DegenerateAxes,
}

/// Maps a center and an in-plane axis pair to the transform a resampler uses
/// to place its 2D grid in world space.
pub struct PlaneMatrixBuilder;

impl PlaneMatrixBuilder {
    /// Column 0 is `axis_u`, column 1 `axis_v`, column 2 their cross product
    /// and column 3 the center, with a homogeneous `[0, 0, 0, 1]` bottom row.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NonFinite`] if any input component is NaN or infinite
    pub fn build(center: DVec3, axis_u: DVec3, axis_v: DVec3) -> Result<DMat4, GeometryError> {
        if !(center.is_finite() && axis_u.is_finite() && axis_v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        let normal = axis_u.cross(axis_v);
        Ok(DMat4::from_cols(
            axis_u.extend(0.0),
            axis_v.extend(0.0),
            normal.extend(0.0),
            center.extend(1.0),
        ))
    }
}

/// Relative residual below which two axes count as parallel.
const PARALLEL_TOLERANCE: f64 = 1e-9;

/// Gram-Schmidt on the first two axes, third rebuilt as their cross product.
///
/// The result is orthonormal and right-handed. Fails when the first two axes
/// are zero length or parallel.
pub fn orthonormalize(axes: [DVec3; 3]) -> Result<[DVec3; 3], GeometryError> {
    if !axes.iter().all(|axis| axis.is_finite()) {
        return Err(GeometryError::NonFinite);
    }
    let a0 = axes[0].try_normalize().ok_or(GeometryError::DegenerateAxes)?;
    // Second projection pass keeps nearly parallel inputs orthogonal
    let mut residual = axes[1] - a0 * axes[1].dot(a0);
    residual -= a0 * residual.dot(a0);
    if residual.length() <= PARALLEL_TOLERANCE * axes[1].length() {
        return Err(GeometryError::DegenerateAxes);
    }
    let a1 = residual
        .try_normalize()
        .ok_or(GeometryError::DegenerateAxes)?;
    Ok([a0, a1, a0.cross(a1)])
}

/// Largest deviation from orthonormality over all axis pairs and lengths.
pub fn orthonormality_error(axes: &[DVec3; 3]) -> f64 {
    let mut error: f64 = 0.0;
    for i in 0..3 {
        error = error.max((axes[i].length() - 1.0).abs());
        for j in (i + 1)..3 {
            error = error.max(axes[i].dot(axes[j]).abs());
        }
    }
    error
}

/// Indices of the two cursor axes spanning plane `pair`: the pair excludes axis `pair`.
pub fn axis_pair_indices(pair: usize) -> (usize, usize) {
    match pair {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}
