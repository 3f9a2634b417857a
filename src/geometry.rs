//! Output geometry: crop presets, fit-to-bounds scaling and even rounding.
//!
//! A [`FramePlan`] is resolved once per run from the first frame's
//! dimensions and then applied to every frame, so the encoder always sees a
//! constant, even-sized resolution.
//!
//! # Example
//!
//! ```
//! use sisr::{CropAlignment, CropPreset, Geometry};
//!
//! let geometry = Geometry::Crop {
//!     preset: CropPreset::Hd,
//!     alignment: CropAlignment::Center,
//! };
//! let plan = geometry.resolve(4000, 3000)?;
//! assert_eq!((plan.width, plan.height), (1920, 1080));
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use image::{DynamicImage, imageops::FilterType};

use crate::error::RenderError;

/// A named target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CropPreset {
    /// Portrait 1080×1920, the vertical story format.
    VerticalTall,
    /// Landscape 1920×1080.
    Hd,
    /// Landscape 3840×2160.
    Uhd,
}

impl CropPreset {
    /// Target `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            CropPreset::VerticalTall => (1080, 1920),
            CropPreset::Hd => (1920, 1080),
            CropPreset::Uhd => (3840, 2160),
        }
    }

    /// Short name used in output file names.
    pub fn name(self) -> &'static str {
        match self {
            CropPreset::VerticalTall => "vertical",
            CropPreset::Hd => "hd",
            CropPreset::Uhd => "uhd",
        }
    }
}

impl Display for CropPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Which part of the frame survives when vertical overflow is cropped.
///
/// Horizontal overflow is always removed equally from both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CropAlignment {
    /// Remove equally from top and bottom.
    #[default]
    Center,
    /// Keep the top edge; remove everything from the bottom.
    KeepTop,
    /// Keep the bottom edge; remove everything from the top.
    KeepBottom,
}

impl CropAlignment {
    /// Short name used in output file names.
    pub fn name(self) -> &'static str {
        match self {
            CropAlignment::Center => "center",
            CropAlignment::KeepTop => "keep_top",
            CropAlignment::KeepBottom => "keep_bottom",
        }
    }

    fn offset(self, overflow: u32) -> u32 {
        match self {
            CropAlignment::Center => overflow / 2,
            CropAlignment::KeepTop => 0,
            CropAlignment::KeepBottom => overflow,
        }
    }
}

/// Requested output geometry for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Geometry {
    /// Keep the source size (rounded down to even).
    #[default]
    Source,
    /// Scale to cover the preset, then crop the overflow.
    Crop {
        /// Target resolution.
        preset: CropPreset,
        /// Vertical alignment of the crop window.
        alignment: CropAlignment,
    },
    /// Scale proportionally to fit within the bound(s).
    Fit {
        /// Maximum output width.
        max_width: Option<u32>,
        /// Maximum output height.
        max_height: Option<u32>,
    },
}

/// A resolved per-run transform: resize to `scaled_*`, then take the
/// `width`×`height` window at (`x`, `y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    /// Source width the plan was resolved from.
    pub source_width: u32,
    /// Source height the plan was resolved from.
    pub source_height: u32,
    /// Intermediate width after proportional scaling.
    pub scaled_width: u32,
    /// Intermediate height after proportional scaling.
    pub scaled_height: u32,
    /// Left edge of the crop window in the scaled image.
    pub x: u32,
    /// Top edge of the crop window in the scaled image.
    pub y: u32,
    /// Final output width (always even).
    pub width: u32,
    /// Final output height (always even).
    pub height: u32,
}

impl Geometry {
    /// Build the geometry from the loose option fields, rejecting
    /// contradictory combinations.
    pub(crate) fn from_options(
        crop: Option<CropPreset>,
        alignment: Option<CropAlignment>,
        max_width: Option<u32>,
        max_height: Option<u32>,
    ) -> Result<Self, RenderError> {
        if max_width == Some(0) || max_height == Some(0) {
            return Err(RenderError::Configuration(
                "max width and max height must be greater than zero".to_string(),
            ));
        }

        match (crop, max_width.is_some() || max_height.is_some()) {
            (Some(preset), true) => Err(RenderError::Configuration(format!(
                "crop preset `{preset}` cannot be combined with max width/height scaling"
            ))),
            (Some(preset), false) => Ok(Geometry::Crop {
                preset,
                alignment: alignment.unwrap_or_default(),
            }),
            (None, _) if alignment.is_some() => Err(RenderError::Configuration(
                "crop alignment requires a crop preset".to_string(),
            )),
            (None, true) => Ok(Geometry::Fit {
                max_width,
                max_height,
            }),
            (None, false) => Ok(Geometry::Source),
        }
    }

    /// Short name used in output file names, e.g. `hd_keep_top`. Only crop
    /// geometries are named.
    pub fn name(&self) -> Option<String> {
        match self {
            Geometry::Crop { preset, alignment } => {
                Some(format!("{}_{}", preset.name(), alignment.name()))
            }
            Geometry::Source | Geometry::Fit { .. } => None,
        }
    }

    /// Resolve the plan for a source of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidDimensions`] if the source (or the
    /// scaled result) is smaller than 2×2 pixels.
    pub fn resolve(&self, source_width: u32, source_height: u32) -> Result<FramePlan, RenderError> {
        if source_width == 0 || source_height == 0 {
            return Err(RenderError::InvalidDimensions {
                width: source_width,
                height: source_height,
            });
        }

        let (scaled_width, scaled_height, x, y, width, height) = match *self {
            Geometry::Source => {
                let width = even_floor(source_width);
                let height = even_floor(source_height);
                (source_width, source_height, 0, 0, width, height)
            }
            Geometry::Crop { preset, alignment } => {
                let (target_width, target_height) = preset.dimensions();
                let (scaled_width, scaled_height) =
                    cover(source_width, source_height, target_width, target_height);
                let x = (scaled_width - target_width) / 2;
                let y = alignment.offset(scaled_height - target_height);
                (scaled_width, scaled_height, x, y, target_width, target_height)
            }
            Geometry::Fit {
                max_width,
                max_height,
            } => {
                let (scaled_width, scaled_height) =
                    fit(source_width, source_height, max_width, max_height);
                let width = even_floor(scaled_width);
                let height = even_floor(scaled_height);
                (scaled_width, scaled_height, 0, 0, width, height)
            }
        };

        if width < 2 || height < 2 {
            return Err(RenderError::InvalidDimensions {
                width: source_width,
                height: source_height,
            });
        }

        Ok(FramePlan {
            source_width,
            source_height,
            scaled_width,
            scaled_height,
            x,
            y,
            width,
            height,
        })
    }
}

impl FramePlan {
    /// Returns `true` when applying the plan leaves the image untouched.
    pub fn is_identity(&self) -> bool {
        self.scaled_width == self.width
            && self.scaled_height == self.height
            && self.source_width == self.width
            && self.source_height == self.height
    }

    /// Apply the plan to one frame, producing a new image of exactly
    /// `width`×`height`.
    ///
    /// Frames whose size differs from the one the plan was resolved from are
    /// stretched to the planned intermediate size so that every frame of a
    /// run ends up with identical dimensions.
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        if image.width() != self.source_width || image.height() != self.source_height {
            log::warn!(
                "Frame is {}×{} but the run was planned for {}×{}; scaling to match",
                image.width(),
                image.height(),
                self.source_width,
                self.source_height,
            );
        } else if self.is_identity() {
            return image.clone();
        }

        let scaled = if image.width() == self.scaled_width && image.height() == self.scaled_height
        {
            image.clone()
        } else {
            image.resize_exact(self.scaled_width, self.scaled_height, FilterType::Lanczos3)
        };

        scaled.crop_imm(self.x, self.y, self.width, self.height)
    }
}

/// Round down to the nearest even integer.
pub(crate) fn even_floor(value: u32) -> u32 {
    value & !1
}

/// Smallest proportional size that covers the target: one dimension matches
/// exactly, the other is at least as large as the target.
fn cover(source_width: u32, source_height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let (sw, sh) = (u64::from(source_width), u64::from(source_height));
    let (tw, th) = (u64::from(target_width), u64::from(target_height));

    if sw * th > sh * tw {
        // Wider than the target: match height, overflow horizontally.
        let width = (sw * th).div_ceil(sh).max(tw);
        (width as u32, target_height)
    } else {
        let height = (sh * tw).div_ceil(sw).max(th);
        (target_width, height as u32)
    }
}

/// Largest proportional size that fits within the given bound(s).
fn fit(
    source_width: u32,
    source_height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    let (sw, sh) = (u64::from(source_width), u64::from(source_height));
    let scale_to_width = |width: u64| (width, rounded_div(sh * width, sw));
    let scale_to_height = |height: u64| (rounded_div(sw * height, sh), height);

    let (width, height) = match (max_width, max_height) {
        (Some(max_width), Some(max_height)) => {
            let (mw, mh) = (u64::from(max_width), u64::from(max_height));
            if sw * mh <= sh * mw {
                scale_to_height(mh)
            } else {
                scale_to_width(mw)
            }
        }
        (Some(max_width), None) => scale_to_width(u64::from(max_width)),
        (None, Some(max_height)) => scale_to_height(u64::from(max_height)),
        (None, None) => (sw, sh),
    };

    (width.max(1) as u32, height.max(1) as u32)
}

fn rounded_div(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}
