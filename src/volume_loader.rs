use crate::{
    enums::SortBy,
    volume::{Volume, VolumeError},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use glam::DVec3;
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Extensions of volume formats the host may offer but the loader cannot read.
const UNSUPPORTED_EXTENSIONS: [&str; 4] = ["nii", "gz", "mhd", "mha"];

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Unsupported volume format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Invalid volume: {0}")]
    Volume(#[from] VolumeError),
}

/// One decoded slice with the attributes used to order and place it.
struct SliceRecord {
    order: Option<f64>,
    position: Option<DVec3>,
    image: Array2<u16>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from a directory of `.dcm` files or from a single
    /// `.dcm` file, in which case the whole series in its directory is read.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::UnsupportedFormat`] for non-DICOM volume
    /// files and the loader's usual errors for unreadable series.
    pub fn load_from_path(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        if path.is_dir() {
            return Self::load_from_directory(path, sort_by);
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if extension == "dcm" {
            let parent = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            return Self::load_from_directory(parent, sort_by);
        }
        if UNSUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(VolumeLoaderError::UnsupportedFormat(extension));
        }
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
            .into());
        }
        Err(VolumeLoaderError::UnsupportedFormat(extension))
    }

    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or the spacing cannot be read
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let mut records: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_record(dicom_object, &sort_by))
            .collect();

        if records.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        if records.len() < dicom_objects.len() {
            warn!(
                skipped = dicom_objects.len() - records.len(),
                "some DICOM objects had no usable image"
            );
        }

        Self::sort_records(&mut records, sort_by);
        Self::validate_dimensions(&records)?;

        let pixel_spacing = Self::get_pixel_spacing(dicom_objects)?;
        let spacing = DVec3::new(
            pixel_spacing.x,
            pixel_spacing.y,
            Self::slice_step(&records).unwrap_or(pixel_spacing.z),
        );
        let origin = records[0].position.unwrap_or(DVec3::ZERO);
        let volume_array = Self::build_volume_array(&records);

        let volume = Volume::new(volume_array, spacing, origin)?;
        info!(dim = ?volume.dim(), spacing = ?spacing, origin = ?origin, "assembled DICOM volume");
        Ok(volume)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        debug!(directory = %path.as_ref().display(), files = paths.len(), "reading DICOM series");

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_record(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<SliceRecord> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, position, sort_by)?;
        let image = Self::decode_image(dicom_object)?;
        Some(SliceRecord {
            order,
            position,
            image,
        })
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<DVec3> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        match pos.as_slice() {
            [x, y, z, ..] => Some(DVec3::new(*x, *y, *z)),
            _ => None,
        }
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        position: Option<DVec3>,
        sort_by: &SortBy,
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => Some(Some(position?.z)),
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float64()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(f64::from);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<u16>> {
        let pixel_data = match dicom_object.decode_pixel_data() {
            Ok(pixel_data) => pixel_data,
            Err(err) => {
                debug!(%err, "could not decode pixel data");
                return None;
            }
        };
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    /// Ascending order, so slice index and world z grow together.
    fn sort_records(records: &mut [SliceRecord], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            records.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));
        }
    }

    fn validate_dimensions(records: &[SliceRecord]) -> Result<(), VolumeLoaderError> {
        let first_dim = records[0].image.dim();
        if records.iter().any(|record| record.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(records: &[SliceRecord]) -> Array3<u16> {
        let (height, width) = records[0].image.dim();
        let depth = records.len();
        let mut volume = Array3::<u16>::zeros((depth, height, width));

        for (i, record) in records.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&record.image);
        }

        volume
    }

    /// Distance between the first two slice positions, when both are known.
    fn slice_step(records: &[SliceRecord]) -> Option<f64> {
        let first = records.first()?.position?;
        let second = records.get(1)?.position?;
        let step = (second.z - first.z).abs();
        (step.is_finite() && step > 0.0).then_some(step)
    }

    /// Column spacing, row spacing and slice thickness.
    fn get_pixel_spacing(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<DVec3, VolumeLoaderError> {
        let spacing = dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()?;

            Some((pixel_spacing, slice_thickness))
        });

        match spacing {
            // PixelSpacing is (row spacing, column spacing)
            Some((pixel_spacing, thickness)) => match pixel_spacing.as_slice() {
                [row, column, ..] => Ok(DVec3::new(*column, *row, thickness)),
                other => Err(VolumeLoaderError::CorruptHeader(format!(
                    "PixelSpacing has {} values",
                    other.len()
                ))),
            },
            None => Err(VolumeLoaderError::MissingSpacing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn unsupported_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.nii");
        File::create(&path).unwrap();
        assert!(matches!(
            VolumeLoader::load_from_path(&path, SortBy::InstanceNumber),
            Err(VolumeLoaderError::UnsupportedFormat(ext)) if ext == "nii"
        ));
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing-here");
        assert!(matches!(
            VolumeLoader::load_from_path(&path, SortBy::InstanceNumber),
            Err(VolumeLoaderError::Io(_))
        ));
    }

    #[test]
    fn directory_without_dicom_files_has_no_images() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        assert!(matches!(
            VolumeLoader::load_from_path(dir.path(), SortBy::InstanceNumber),
            Err(VolumeLoaderError::NoValidImages)
        ));
    }

    #[test]
    fn empty_object_list_has_no_images() {
        assert!(matches!(
            VolumeLoader::load_from_dicom_objects(&[], SortBy::None),
            Err(VolumeLoaderError::NoValidImages)
        ));
    }

    #[test]
    fn slice_step_uses_position_distance() {
        let record = |z: f64| SliceRecord {
            order: Some(z),
            position: Some(DVec3::new(0.0, 0.0, z)),
            image: Array2::zeros((2, 2)),
        };
        let mut records = vec![record(7.5), record(2.5), record(5.0)];
        VolumeLoader::sort_records(&mut records, SortBy::ImagePositionPatient);
        assert_eq!(records[0].position, Some(DVec3::new(0.0, 0.0, 2.5)));
        assert_eq!(VolumeLoader::slice_step(&records), Some(2.5));
        assert_eq!(VolumeLoader::slice_step(&records[..1]), None);
    }
}
