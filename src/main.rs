use std::path::{Path, PathBuf};

use glam::DVec2;
use image::{GrayImage, Luma};
use mpr_reslice::{
    Actor, EngineConfig, FourthView, FourthViewMode, Frame, MprSession, Orientation, OrganMask,
    OrthogonalView, PointerEvent, RenderSurface, SegmentationResult, SortBy, SurfaceError, ViewId,
    handoff,
};
use ndarray::Array2;
use tracing::{info, warn};

/// Writes every frame it is asked to draw to `<dir>/<name>.png`.
struct PngSurface {
    path: PathBuf,
    size: u32,
}

impl PngSurface {
    fn new(dir: &Path, name: &str, size: usize) -> Self {
        Self {
            path: dir.join(format!("{name}.png")),
            size: size as u32,
        }
    }

    fn save(&self, image: &GrayImage) -> Result<(), SurfaceError> {
        image
            .save(&self.path)
            .map_err(|err| SurfaceError::Backend(err.to_string()))
    }
}

impl RenderSurface for PngSurface {
    fn render_now(&mut self, frame: Frame<'_>) -> Result<(), SurfaceError> {
        let image = match frame {
            Frame::Slice(slice) => {
                let window = slice
                    .data
                    .iter()
                    .filter(|&&v| v != slice.background)
                    .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                slice
                    .to_image(window)
                    .ok_or_else(|| SurfaceError::Backend("slice buffer size mismatch".into()))?
            }
            Frame::Outline(outlines) => {
                let mut canvas = GrayImage::new(self.size, self.size);
                for point in outlines.iter().flat_map(|o| o.contours.iter().flatten()) {
                    let (x, y) = (point.x.round(), point.y.round());
                    if x >= 0.0 && y >= 0.0 && (x as u32) < self.size && (y as u32) < self.size {
                        canvas.put_pixel(x as u32, y as u32, Luma([255]));
                    }
                }
                canvas
            }
            Frame::Blank => GrayImage::new(self.size, self.size),
        };
        self.save(&image)
    }

    fn set_actor_visible(&mut self, actor: Actor, visible: bool) -> Result<(), SurfaceError> {
        info!(surface = %self.path.display(), ?actor, visible, "actor visibility");
        Ok(())
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Threshold the axial slice at the middle of the value range.
fn threshold_mask(slice: &Array2<u16>, range: (u16, u16)) -> Array2<u8> {
    let threshold = range.0 / 2 + range.1 / 2;
    slice.mapv(|v| u8::from(v > threshold))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "dicom".to_owned());
    let config = match args.next() {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let out_dir = PathBuf::from("mpr-output");
    std::fs::create_dir_all(&out_dir)?;

    let mut session = MprSession::new(config.clone());
    for orientation in Orientation::ALL {
        let name = format!("{orientation:?}").to_lowercase();
        let surface = PngSurface::new(&out_dir, &name, config.output_size);
        session.bind_view(Box::new(OrthogonalView::new(orientation, surface, &config)));
    }
    let fourth = PngSurface::new(&out_dir, "fourth", config.output_size);
    session.bind_view(Box::new(FourthView::new(fourth, &config)));

    session.load_from_path(&input, SortBy::InstanceNumber)?;

    // Drag the axial line's rotation handle to 45 degrees
    if let Some(line) = session.current_line_state(ViewId::Axial) {
        let handle = PointerEvent::at(line.control_points.right);
        let target = PointerEvent::at(line.center + DVec2::new(50.0, 50.0));
        session.handle_press(&handle, ViewId::Axial);
        session.handle_motion(&target, ViewId::Axial);
        session.handle_release(&target, ViewId::Axial);
        if let Some(line) = session.current_line_state(ViewId::Axial) {
            info!(angle = line.angle_degrees, "axial line rotated");
        }
    }

    let Some((slice, range, slice_index)) = session.volume().zip(session.current_slice_indices()).map(
        |(volume, indices)| {
            let index = indices[Orientation::Axial as usize];
            (
                volume.get_slice_from_axis(index, Orientation::Axial).to_owned(),
                volume.value_range(),
                index,
            )
        },
    ) else {
        warn!("no volume loaded");
        return Ok(());
    };

    let (sender, receiver) = handoff();
    session.attach_segmentation(receiver);
    let worker = tokio::task::spawn_blocking(move || {
        let mask = threshold_mask(&slice, range);
        let result = SegmentationResult::new(
            slice_index,
            vec![OrganMask {
                organ: "body".into(),
                mask,
            }],
        );
        sender.complete(Ok(vec![result]))
    });
    if !worker.await? {
        warn!("segmentation receiver dropped before completion");
    }

    session.set_fourth_view_mode(FourthViewMode::Outline);
    session.poll_segmentation();

    if let Some(region) = session.extract_region() {
        info!(dim = ?region.dim(), "extracted region of interest");
    }
    info!(dir = %out_dir.display(), "frames written");
    Ok(())
}
