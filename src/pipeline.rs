//! Per-frame processing: decode, overlay, transform, write.
//!
//! Every source image becomes `frame_{position:06}.png` in the run's working
//! directory, so the encoder's input pattern does not depend on the original
//! file names. The geometry plan is resolved once, from the first image's
//! header, and reused for every frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};

use crate::configuration::RenderOptions;
use crate::encoder::frame_file_name;
use crate::error::RenderError;
use crate::geometry::{FramePlan, Geometry};
use crate::overlay::{OverlayKind, OverlayPlacement, TextOverlay, capture_date, frame_label};
use crate::progress::{ProgressCallback, ProgressTracker, RenderStage};
use crate::sequence::{ImageSequence, SequenceEntry};

/// A decoded source image in flight through the pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data.
    pub image: DynamicImage,
    /// 0-based position in the sequence.
    pub position: usize,
    /// Index parsed from the source file name.
    pub index: u64,
}

pub(crate) struct FramePipeline<'a> {
    sequence: &'a ImageSequence,
    plan: FramePlan,
    overlay: OverlayKind,
    placement: OverlayPlacement,
    text: TextOverlay,
    work_dir: &'a Path,
}

impl<'a> FramePipeline<'a> {
    /// Resolve the frame plan from the first image's dimensions.
    pub(crate) fn new(
        sequence: &'a ImageSequence,
        geometry: &Geometry,
        options: &RenderOptions,
        work_dir: &'a Path,
    ) -> Result<Self, RenderError> {
        let first = sequence
            .entries()
            .first()
            .ok_or_else(|| RenderError::NoImages {
                path: sequence.directory().to_path_buf(),
            })?;
        let (width, height) =
            image::image_dimensions(&first.path).map_err(|error| RenderError::ImageDecode {
                path: first.path.clone(),
                reason: error.to_string(),
            })?;
        let plan = geometry.resolve(width, height)?;
        log::debug!(
            "Frame plan: {}x{} -> scale {}x{} -> crop {}x{} at ({}, {})",
            plan.source_width,
            plan.source_height,
            plan.scaled_width,
            plan.scaled_height,
            plan.width,
            plan.height,
            plan.x,
            plan.y,
        );

        let text_height = match options.overlay_placement {
            OverlayPlacement::BeforeTransform => plan.source_height,
            OverlayPlacement::AfterTransform => plan.height,
        };

        Ok(Self {
            sequence,
            plan,
            overlay: options.overlay,
            placement: options.overlay_placement,
            text: TextOverlay::for_frame_height(text_height, options.overlay_anchor),
            work_dir,
        })
    }

    pub(crate) fn plan(&self) -> &FramePlan {
        &self.plan
    }

    pub(crate) fn sequence(&self) -> &ImageSequence {
        self.sequence
    }

    /// Render every frame into the working directory.
    ///
    /// Returns the number of frames written.
    pub(crate) fn run(&self, options: &RenderOptions) -> Result<usize, RenderError> {
        #[cfg(feature = "rayon")]
        {
            crate::rayon::parallel_render_frames(self, options)
        }

        #[cfg(not(feature = "rayon"))]
        {
            self.run_sequential(options)
        }
    }

    #[cfg_attr(feature = "rayon", allow(dead_code))]
    fn run_sequential(&self, options: &RenderOptions) -> Result<usize, RenderError> {
        let mut tracker = self.tracker(Arc::clone(&options.progress));

        for (position, entry) in self.sequence.entries().iter().enumerate() {
            if options.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            self.render_frame(position, entry)?;
            tracker.advance(Some(entry.index));
        }

        Ok(self.sequence.len())
    }

    pub(crate) fn tracker(&self, progress: Arc<dyn ProgressCallback>) -> ProgressTracker {
        ProgressTracker::new(
            progress,
            RenderStage::FrameRendering,
            Some(self.sequence.len() as u64),
        )
    }

    /// Decode, overlay, transform and write one frame.
    pub(crate) fn render_frame(
        &self,
        position: usize,
        entry: &SequenceEntry,
    ) -> Result<PathBuf, RenderError> {
        let mut frame = load_frame(position, entry)?;

        if self.placement == OverlayPlacement::BeforeTransform {
            self.draw_overlay(&mut frame, entry);
        }
        frame.image = self.plan.apply(&frame.image);
        if self.placement == OverlayPlacement::AfterTransform {
            self.draw_overlay(&mut frame, entry);
        }

        let output = self.work_dir.join(frame_file_name(position));
        frame.image.save_with_format(&output, ImageFormat::Png)?;
        log::debug!("Wrote {:?} from {:?}", output, entry.path);
        Ok(output)
    }

    fn draw_overlay(&self, frame: &mut Frame, entry: &SequenceEntry) {
        let text = match self.overlay {
            OverlayKind::None => return,
            OverlayKind::Date => capture_date(&entry.path).to_string(),
            OverlayKind::Frame => frame_label(frame.position + 1, self.sequence.len()),
        };
        frame.image = self.text.render(&frame.image, &text);
    }
}

fn load_frame(position: usize, entry: &SequenceEntry) -> Result<Frame, RenderError> {
    let image = image::open(&entry.path).map_err(|error| RenderError::ImageDecode {
        path: entry.path.clone(),
        reason: error.to_string(),
    })?;
    Ok(Frame {
        image,
        position,
        index: entry.index,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::geometry::CropPreset;

    fn write_sequence(dir: &Path, count: usize, width: u32, height: u32) {
        for i in 1..=count {
            RgbImage::from_pixel(width, height, Rgb([10, 120, 200]))
                .save(dir.join(format!("img_{i:04}.png")))
                .unwrap();
        }
    }

    #[test]
    fn writes_canonical_frame_names_at_planned_size() {
        let input = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_sequence(input.path(), 3, 320, 240);

        let sequence = ImageSequence::scan(input.path(), &["png"]).unwrap();
        let options = RenderOptions::new()
            .with_crop(CropPreset::Hd)
            .with_overlay(OverlayKind::Frame);
        let geometry = options.geometry().unwrap();
        let pipeline = FramePipeline::new(&sequence, &geometry, &options, work.path()).unwrap();

        assert_eq!(pipeline.run(&options).unwrap(), 3);
        for position in 0..3 {
            let path = work.path().join(frame_file_name(position));
            assert_eq!(image::image_dimensions(&path).unwrap(), (1920, 1080));
        }
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 3);
    }

    #[test]
    fn corrupt_image_error_names_the_file() {
        let input = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_sequence(input.path(), 2, 64, 48);
        fs::write(input.path().join("img_0003.png"), b"garbage").unwrap();

        let sequence = ImageSequence::scan(input.path(), &["png"]).unwrap();
        let options = RenderOptions::new();
        let geometry = options.geometry().unwrap();
        let pipeline = FramePipeline::new(&sequence, &geometry, &options, work.path()).unwrap();

        let error = pipeline.run(&options).unwrap_err();
        match error {
            RenderError::ImageDecode { path, .. } => {
                assert_eq!(path.file_name().unwrap(), "img_0003.png");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn overlay_before_transform_is_resized_with_the_frame() {
        let input = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_sequence(input.path(), 1, 400, 300);

        let sequence = ImageSequence::scan(input.path(), &["png"]).unwrap();
        let options = RenderOptions::new()
            .with_max_width(200)
            .with_overlay(OverlayKind::Frame)
            .with_overlay_placement(OverlayPlacement::BeforeTransform);
        let geometry = options.geometry().unwrap();
        let pipeline = FramePipeline::new(&sequence, &geometry, &options, work.path()).unwrap();

        assert_eq!((pipeline.plan().width, pipeline.plan().height), (200, 150));
        let output = pipeline.render_frame(0, &sequence.entries()[0]).unwrap();
        assert_eq!(image::image_dimensions(output).unwrap(), (200, 150));
    }
}
