//! # sisr
//!
//! Simple Image Sequence Renderer: turn a directory of numbered images into
//! a video or animated GIF.
//!
//! `sisr` validates the sequence, optionally stamps each frame with its
//! capture date or frame number, crops or scales every frame to a constant
//! even-sized resolution and hands the result to `ffmpeg`.
//!
//! ## Quick Start
//!
//! ### Render a Directory
//!
//! ```no_run
//! use sisr::{RenderOptions, Renderer};
//!
//! let renderer = Renderer::new(RenderOptions::new()).unwrap();
//! let report = renderer.render("shots/sunset", "sunset.mp4").unwrap();
//! println!("{} frames at {}x{}", report.frame_count, report.width, report.height);
//! ```
//!
//! ### Vertical Video with a Date Stamp
//!
//! ```no_run
//! use sisr::{CropAlignment, CropPreset, OverlayKind, RenderOptions, Renderer};
//!
//! let options = RenderOptions::new()
//!     .with_crop(CropPreset::VerticalTall)
//!     .with_crop_alignment(CropAlignment::KeepBottom)
//!     .with_overlay(OverlayKind::Date);
//! let renderer = Renderer::new(options).unwrap();
//! renderer.render_to_dir("shots/sunset", "renders").unwrap();
//! ```
//!
//! ### Check a Sequence Without Rendering
//!
//! ```no_run
//! use sisr::{DEFAULT_EXTENSIONS, ImageSequence};
//!
//! let sequence = ImageSequence::scan("shots/sunset", &DEFAULT_EXTENSIONS).unwrap();
//! print!("{}", sequence.report());
//! ```
//!
//! ## Features
//!
//! - **Sequence validation**: numbering gaps, duplicates and unnumbered
//!   files are reported as one warning; the render proceeds in index order
//! - **Crop presets**: vertical 1080×1920, HD and UHD with top, center or
//!   bottom alignment
//! - **Fit scaling**: max width and/or height with the aspect ratio kept
//! - **Overlays**: EXIF capture date (modification time fallback) or
//!   zero-padded frame number, drawn before or after the transform
//! - **Profiles**: H.264, ProRes 422, ProRes 422 HQ and palette GIF
//! - **Progress & cancellation**: per-frame callbacks, encoder progress and
//!   a `CancellationToken` that kills the encoder
//! - **Pluggable encoder**: the `Encoder` trait replaces `ffmpeg` in tests
//!   or embeds other backends
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Render frames in parallel across rayon threads |
//! | `gif` | `GifEncoder`, an in-process GIF backend |
//! | `probe` | Verify the encoded output with FFmpeg's libraries |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! An `ffmpeg` binary on `PATH`, next to the executable, or named by the
//! `SISR_FFMPEG` environment variable. The `probe` feature additionally
//! needs the FFmpeg development libraries.

pub mod configuration;
pub mod discovery;
pub mod encoder;
pub mod error;
pub mod geometry;
#[cfg(feature = "gif")]
pub mod gif;
pub mod overlay;
pub mod pipeline;
pub mod preferences;
#[cfg(feature = "probe")]
pub mod probe;
pub mod progress;
#[cfg(feature = "rayon")]
mod rayon;
pub mod render;
pub mod sequence;

pub use configuration::{DEFAULT_FRAME_RATE, DEFAULT_GIF_FRAME_RATE, RenderOptions};
pub use discovery::find_image_directories;
pub use encoder::{
    EncodeContext, EncodeOutput, EncodeRequest, Encoder, EncoderLogLevel, FRAME_PATTERN,
    FfmpegEncoder, QualityProfile, frame_file_name,
};
pub use error::RenderError;
pub use geometry::{CropAlignment, CropPreset, FramePlan, Geometry};
#[cfg(feature = "gif")]
pub use gif::GifEncoder;
pub use overlay::{
    CaptureDate, DateSource, OverlayAnchor, OverlayKind, OverlayPlacement, TextOverlay,
    capture_date, format_capture_date, frame_label, parse_capture_date,
};
pub use pipeline::Frame;
pub use preferences::Preferences;
#[cfg(feature = "probe")]
pub use probe::{OutputProbe, probe_output};
pub use progress::{
    CancellationToken, JobResult, JobStatus, ProgressCallback, ProgressInfo, RenderStage,
};
pub use render::{RenderReport, Renderer};
pub use sequence::{
    DEFAULT_EXTENSIONS, ImageSequence, SequenceEntry, SequenceReport, SequenceWarning,
    parse_index,
};
