//! The render facade.
//!
//! [`Renderer`] ties one run together: it scans the input directory, renders
//! every frame into a private temporary directory, hands that directory to
//! an [`Encoder`] and cleans up afterwards. Options are validated when the
//! renderer is built, so a contradictory configuration never touches the
//! filesystem.
//!
//! # Example
//!
//! ```no_run
//! use sisr::{CropPreset, OverlayKind, RenderOptions, Renderer};
//!
//! let options = RenderOptions::new()
//!     .with_crop(CropPreset::Hd)
//!     .with_overlay(OverlayKind::Date);
//! let renderer = Renderer::new(options)?;
//! let report = renderer.render_to_dir("shots/sunset", "renders")?;
//! println!("wrote {} frames to {}", report.frame_count, report.output.display());
//! if let Some(warning) = &report.warning {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::{Builder as TempBuilder, TempDir};

use crate::configuration::RenderOptions;
use crate::encoder::{EncodeContext, EncodeRequest, Encoder, FfmpegEncoder, remove_partial};
use crate::error::RenderError;
use crate::geometry::Geometry;
use crate::pipeline::FramePipeline;
use crate::progress::{JobResult, JobStatus};
use crate::sequence::{ImageSequence, SequenceWarning};

/// Summary of a successful render.
#[derive(Debug, Clone)]
pub struct RenderReport {
    /// The written file.
    pub output: PathBuf,
    /// Number of frames encoded.
    pub frame_count: usize,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub frame_rate: u32,
    /// The sequence warning, if the input was not contiguous.
    pub warning: Option<SequenceWarning>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Diagnostics the encoder printed on success.
    pub encoder_diagnostics: String,
}

/// Renders image sequences with one set of options.
///
/// A renderer can be reused for any number of directories; each call to
/// [`render`](Renderer::render) owns its own temporary directory, so
/// concurrent runs never share intermediate files.
pub struct Renderer {
    options: RenderOptions,
    geometry: Geometry,
    encoder: Option<Box<dyn Encoder>>,
}

impl Debug for Renderer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Renderer")
            .field("options", &self.options)
            .field("geometry", &self.geometry)
            .field("has_custom_encoder", &self.encoder.is_some())
            .finish()
    }
}

impl Renderer {
    /// Validate `options` and build a renderer.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Configuration`] if the options contradict
    /// each other.
    pub fn new(options: RenderOptions) -> Result<Self, RenderError> {
        let geometry = options.geometry()?;
        Ok(Self {
            options,
            geometry,
            encoder: None,
        })
    }

    /// Use `encoder` instead of locating `ffmpeg` at render time.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Box<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// The validated options.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// The validated output geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Scan `input` with the configured extensions without rendering.
    pub fn scan<P: AsRef<Path>>(&self, input: P) -> Result<ImageSequence, RenderError> {
        ImageSequence::scan(input, &self.options.extensions)
    }

    /// Render `input` into the default output name inside `output_dir`.
    ///
    /// See [`RenderOptions::output_path`].
    pub fn render_to_dir<I: AsRef<Path>, O: AsRef<Path>>(
        &self,
        input: I,
        output_dir: O,
    ) -> Result<RenderReport, RenderError> {
        let output = self.options.output_path(input.as_ref(), output_dir);
        self.render(input, output)
    }

    /// Render the image sequence in `input` to the file `output`.
    ///
    /// The progress callback's [`on_complete`](crate::ProgressCallback::on_complete)
    /// is invoked exactly once, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Any input, frame, encoder or cancellation error. On failure no
    /// partial output file is left behind and the temporary frames are
    /// removed unless the encoder failed and
    /// [`with_keep_frames_on_failure`](RenderOptions::with_keep_frames_on_failure)
    /// is set.
    pub fn render<I: AsRef<Path>, O: AsRef<Path>>(
        &self,
        input: I,
        output: O,
    ) -> Result<RenderReport, RenderError> {
        let output = output.as_ref();
        let result = self.run(input.as_ref(), output);

        let status = match &result {
            Ok(_) => JobStatus::Succeeded,
            Err(error) => JobStatus::Failed {
                message: error.to_string(),
                preserved_frames: error.preserved_frames().cloned(),
            },
        };
        self.options.progress.on_complete(&JobResult {
            output: output.to_path_buf(),
            status,
        });

        result
    }

    fn run(&self, input: &Path, output: &Path) -> Result<RenderReport, RenderError> {
        let started = Instant::now();
        let sequence = self.scan(input)?;

        let located;
        let encoder: &dyn Encoder = match &self.encoder {
            Some(encoder) => encoder.as_ref(),
            None => {
                located = FfmpegEncoder::locate()?;
                &located
            }
        };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let work_dir = self.create_work_dir()?;
        log::debug!("Rendering {} frames into {:?}", sequence.len(), work_dir.path());

        let mut encoder_started = false;
        match self.render_and_encode(
            &sequence,
            encoder,
            work_dir.path(),
            output,
            &mut encoder_started,
        ) {
            Ok(mut report) => {
                if let Err(error) = work_dir.close() {
                    log::warn!("Failed to remove temporary frames: {error}");
                }
                report.warning = sequence.warning().cloned();
                report.elapsed = started.elapsed();
                log::info!(
                    "Rendered {} frames to {:?} in {:.1?}",
                    report.frame_count,
                    report.output,
                    report.elapsed
                );
                Ok(report)
            }
            Err(error) => {
                // Only the encoder writes to `output`; an earlier failure leaves
                // any existing file untouched.
                if encoder_started {
                    remove_partial(output);
                }
                Err(self.cleanup_after_failure(work_dir, error))
            }
        }
    }

    fn render_and_encode(
        &self,
        sequence: &ImageSequence,
        encoder: &dyn Encoder,
        work_dir: &Path,
        output: &Path,
        encoder_started: &mut bool,
    ) -> Result<RenderReport, RenderError> {
        let pipeline = FramePipeline::new(sequence, &self.geometry, &self.options, work_dir)?;
        let frame_count = pipeline.run(&self.options)?;
        let plan = *pipeline.plan();

        if self.options.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let frame_rate = self.options.effective_frame_rate();
        let request = EncodeRequest {
            frames_dir: work_dir.to_path_buf(),
            frame_count,
            width: plan.width,
            height: plan.height,
            input_frame_rate: frame_rate,
            output_frame_rate: frame_rate,
            quality: self.options.quality,
            log_level: self.options.encoder_log_level,
            output: output.to_path_buf(),
        };
        let context = EncodeContext::new(
            Arc::clone(&self.options.progress),
            self.options.cancellation.clone(),
            frame_count,
        );
        *encoder_started = true;
        let encoded = encoder.encode(&request, &context)?;

        Ok(RenderReport {
            output: encoded.path,
            frame_count,
            width: plan.width,
            height: plan.height,
            frame_rate,
            warning: None,
            elapsed: Duration::ZERO,
            encoder_diagnostics: encoded.diagnostics,
        })
    }

    fn create_work_dir(&self) -> Result<TempDir, RenderError> {
        let mut builder = TempBuilder::new();
        builder.prefix("sisr-");
        let work_dir = match &self.options.temp_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(work_dir)
    }

    fn cleanup_after_failure(&self, work_dir: TempDir, error: RenderError) -> RenderError {
        match error {
            RenderError::Encoder { status, stderr, .. } if self.options.keep_frames_on_failure => {
                let kept = work_dir.keep();
                log::warn!("Keeping intermediate frames in {:?}", kept);
                RenderError::Encoder {
                    status,
                    stderr,
                    preserved_frames: Some(kept),
                }
            }
            error => {
                if let Err(close_error) = work_dir.close() {
                    log::warn!("Failed to remove temporary frames: {close_error}");
                }
                error
            }
        }
    }
}
