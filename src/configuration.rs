//! Render configuration.
//!
//! [`RenderOptions`] is a builder that carries every setting of a run:
//! frame rates, output geometry, overlay, codec profile, intermediate-file
//! handling and the progress/cancellation plumbing. Options are checked once
//! by [`Renderer::new`](crate::Renderer::new) and never change during a run.
//!
//! # Example
//!
//! ```no_run
//! use sisr::{CancellationToken, CropAlignment, CropPreset, OverlayKind, QualityProfile, RenderOptions};
//!
//! let token = CancellationToken::new();
//! let options = RenderOptions::new()
//!     .with_frame_rate(24)
//!     .with_crop(CropPreset::Hd)
//!     .with_crop_alignment(CropAlignment::KeepTop)
//!     .with_overlay(OverlayKind::Date)
//!     .with_quality(QualityProfile::ProRes)
//!     .with_cancellation(token.clone());
//! options.validate()?;
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::encoder::{EncoderLogLevel, QualityProfile};
use crate::error::RenderError;
use crate::geometry::{CropAlignment, CropPreset, Geometry};
use crate::overlay::{OverlayAnchor, OverlayKind, OverlayPlacement};
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::sequence::DEFAULT_EXTENSIONS;

/// Default frame rate for video profiles.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Default frame rate for GIF output.
pub const DEFAULT_GIF_FRAME_RATE: u32 = 15;

/// Settings for one render.
///
/// All fields have defaults: 30 fps video (15 fps for GIF), source
/// geometry, no overlay, the H.264 profile and the standard image
/// extensions.
#[derive(Clone)]
pub struct RenderOptions {
    pub(crate) frame_rate: u32,
    pub(crate) gif_frame_rate: u32,
    pub(crate) crop: Option<CropPreset>,
    pub(crate) crop_alignment: Option<CropAlignment>,
    pub(crate) max_width: Option<u32>,
    pub(crate) max_height: Option<u32>,
    pub(crate) overlay: OverlayKind,
    pub(crate) overlay_placement: OverlayPlacement,
    pub(crate) overlay_anchor: OverlayAnchor,
    pub(crate) quality: QualityProfile,
    pub(crate) extensions: Vec<String>,
    pub(crate) keep_frames_on_failure: bool,
    pub(crate) temp_root: Option<PathBuf>,
    pub(crate) encoder_log_level: EncoderLogLevel,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for RenderOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RenderOptions")
            .field("frame_rate", &self.frame_rate)
            .field("gif_frame_rate", &self.gif_frame_rate)
            .field("crop", &self.crop)
            .field("crop_alignment", &self.crop_alignment)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("overlay", &self.overlay)
            .field("overlay_placement", &self.overlay_placement)
            .field("quality", &self.quality)
            .field("keep_frames_on_failure", &self.keep_frames_on_failure)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            gif_frame_rate: DEFAULT_GIF_FRAME_RATE,
            crop: None,
            crop_alignment: None,
            max_width: None,
            max_height: None,
            overlay: OverlayKind::None,
            overlay_placement: OverlayPlacement::AfterTransform,
            overlay_anchor: OverlayAnchor::BottomRight,
            quality: QualityProfile::Default,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            keep_frames_on_failure: false,
            temp_root: None,
            encoder_log_level: EncoderLogLevel::Error,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Frames per second of video output.
    #[must_use]
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Frames per second of GIF output.
    #[must_use]
    pub fn with_gif_frame_rate(mut self, fps: u32) -> Self {
        self.gif_frame_rate = fps;
        self
    }

    /// Crop every frame to a preset resolution.
    ///
    /// Cannot be combined with [`with_max_width`](Self::with_max_width) or
    /// [`with_max_height`](Self::with_max_height).
    #[must_use]
    pub fn with_crop(mut self, preset: CropPreset) -> Self {
        self.crop = Some(preset);
        self
    }

    /// Which part of the frame a crop keeps. Requires a crop preset;
    /// defaults to [`CropAlignment::Center`].
    #[must_use]
    pub fn with_crop_alignment(mut self, alignment: CropAlignment) -> Self {
        self.crop_alignment = Some(alignment);
        self
    }

    /// Scale frames to fit within this width.
    #[must_use]
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Scale frames to fit within this height.
    #[must_use]
    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Draw the capture date or frame number on every frame.
    #[must_use]
    pub fn with_overlay(mut self, overlay: OverlayKind) -> Self {
        self.overlay = overlay;
        self
    }

    /// Draw the overlay before or after the crop/scale.
    #[must_use]
    pub fn with_overlay_placement(mut self, placement: OverlayPlacement) -> Self {
        self.overlay_placement = placement;
        self
    }

    /// Corner the overlay is drawn in.
    #[must_use]
    pub fn with_overlay_anchor(mut self, anchor: OverlayAnchor) -> Self {
        self.overlay_anchor = anchor;
        self
    }

    /// Output codec profile. Also decides the output extension.
    #[must_use]
    pub fn with_quality(mut self, quality: QualityProfile) -> Self {
        self.quality = quality;
        self
    }

    /// Image extensions to pick up, compared case-insensitively.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Keep the intermediate frames when the encoder fails.
    #[must_use]
    pub fn with_keep_frames_on_failure(mut self, keep: bool) -> Self {
        self.keep_frames_on_failure = keep;
        self
    }

    /// Create the temporary frame directory under `root` instead of the
    /// system temp directory.
    #[must_use]
    pub fn with_temp_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Verbosity of the encoder's diagnostics.
    #[must_use]
    pub fn with_encoder_log_level(mut self, level: EncoderLogLevel) -> Self {
        self.encoder_log_level = level;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the render stops before the next frame,
    /// or kills the encoder, and returns
    /// [`RenderError::Cancelled`](crate::RenderError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Frame rate used for the configured profile.
    pub fn effective_frame_rate(&self) -> u32 {
        if self.quality.is_gif() {
            self.gif_frame_rate
        } else {
            self.frame_rate
        }
    }

    /// The configured overlay.
    pub fn overlay(&self) -> OverlayKind {
        self.overlay
    }

    /// The configured codec profile.
    pub fn quality(&self) -> QualityProfile {
        self.quality
    }

    /// Check the options for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Configuration`] for a zero frame rate, an
    /// empty extension list, a crop preset combined with max bounds, a crop
    /// alignment without a preset or a zero bound.
    pub fn validate(&self) -> Result<(), RenderError> {
        self.geometry().map(|_| ())
    }

    /// The output geometry these options describe.
    pub fn geometry(&self) -> Result<Geometry, RenderError> {
        if self.frame_rate == 0 || self.gif_frame_rate == 0 {
            return Err(RenderError::Configuration(
                "frame rate must be greater than zero".to_string(),
            ));
        }
        if self.extensions.iter().all(|extension| extension.trim_start_matches('.').is_empty()) {
            return Err(RenderError::Configuration(
                "at least one image extension is required".to_string(),
            ));
        }
        Geometry::from_options(self.crop, self.crop_alignment, self.max_width, self.max_height)
    }

    /// Output file for `input_dir` inside `output_dir`:
    /// `{dir}[_{quality}][_{crop}][_{overlay}].{ext}`.
    ///
    /// ```
    /// use sisr::{CropPreset, OverlayKind, QualityProfile, RenderOptions};
    ///
    /// let options = RenderOptions::new()
    ///     .with_crop(CropPreset::Hd)
    ///     .with_overlay(OverlayKind::Date)
    ///     .with_quality(QualityProfile::ProRes);
    /// let path = options.output_path("shots/sunset/", "renders");
    /// assert_eq!(path, std::path::Path::new("renders/sunset_prores_hd_center_date.mov"));
    /// ```
    pub fn output_path<I: AsRef<Path>, O: AsRef<Path>>(&self, input_dir: I, output_dir: O) -> PathBuf {
        let input_dir = input_dir.as_ref();
        let mut stem = input_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sequence".to_string());

        if let Some(quality) = self.quality.name() {
            stem.push('_');
            stem.push_str(quality);
        }
        if let Some(crop) = self.geometry().ok().and_then(|geometry| geometry.name()) {
            stem.push('_');
            stem.push_str(&crop);
        }
        if let Some(overlay) = self.overlay.name() {
            stem.push('_');
            stem.push_str(overlay);
        }

        output_dir
            .as_ref()
            .join(format!("{stem}.{}", self.quality.extension()))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let options = RenderOptions::new();
        assert!(options.validate().is_ok());
        assert_eq!(options.effective_frame_rate(), 30);
        assert_eq!(options.geometry().unwrap(), Geometry::Source);
    }

    #[test]
    fn gif_uses_its_own_frame_rate() {
        let options = RenderOptions::new()
            .with_quality(QualityProfile::Gif)
            .with_gif_frame_rate(12);
        assert_eq!(options.effective_frame_rate(), 12);
    }

    #[test]
    fn contradictory_options_are_configuration_errors() {
        let cases = [
            RenderOptions::new().with_crop(CropPreset::Hd).with_max_width(1280),
            RenderOptions::new().with_crop(CropPreset::Uhd).with_max_height(720),
            RenderOptions::new().with_crop_alignment(CropAlignment::KeepTop),
            RenderOptions::new().with_max_width(0),
            RenderOptions::new().with_frame_rate(0),
            RenderOptions::new().with_extensions(Vec::<String>::new()),
        ];
        for options in cases {
            let error = options.validate().unwrap_err();
            assert!(error.is_configuration(), "{options:?}: {error}");
        }
    }

    #[test]
    fn output_names_follow_options() {
        let plain = RenderOptions::new().output_path("/data/beach", "/renders");
        assert_eq!(plain, PathBuf::from("/renders/beach.mp4"));

        let vertical = RenderOptions::new()
            .with_crop(CropPreset::VerticalTall)
            .with_crop_alignment(CropAlignment::KeepBottom)
            .with_overlay(OverlayKind::Frame)
            .with_quality(QualityProfile::Gif)
            .output_path("/data/beach", "/renders");
        assert_eq!(
            vertical,
            PathBuf::from("/renders/beach_gif_vertical_keep_bottom_frame.gif")
        );

        let fit = RenderOptions::new()
            .with_max_width(640)
            .with_quality(QualityProfile::ProResHq)
            .output_path("/data/beach", "/renders");
        assert_eq!(fit, PathBuf::from("/renders/beach_proreshq.mov"));
    }
}
