//! Error types for the `sisr` crate.
//!
//! This module defines [`RenderError`], the unified error type returned by all
//! fallible operations in the crate. Each message starts with the component
//! that failed and carries the offending path or the encoder's own
//! diagnostics.

use std::{io::Error as IoError, path::PathBuf, process::ExitStatus};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `sisr` operations.
///
/// Every public method that can fail returns `Result<T, RenderError>`.
/// Non-fatal sequence anomalies are not errors; they are reported through
/// [`SequenceWarning`](crate::SequenceWarning).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    /// The render options are inconsistent (e.g. a crop preset combined with
    /// max-width/max-height scaling). Raised before any frame is processed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The input directory is missing or cannot be listed.
    #[error("Input error: cannot read directory {path}: {reason}")]
    InputDirectory {
        /// Directory that was scanned.
        path: PathBuf,
        /// Underlying reason the scan failed.
        reason: String,
    },

    /// The input directory contains no qualifying, numbered images.
    #[error("Input error: no sequence images found in {path}")]
    NoImages {
        /// Directory that was scanned.
        path: PathBuf,
    },

    /// A source image could not be opened or decoded.
    #[error("Frame pipeline error: failed to decode {path}: {reason}")]
    ImageDecode {
        /// The offending source file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// The source image is too small to produce an even-sized frame.
    #[error("Frame pipeline error: invalid source dimensions {width}×{height}")]
    InvalidDimensions {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
    },

    /// The encoder binary could not be located.
    #[error("Encoder error: could not find `{0}` (set SISR_FFMPEG or install ffmpeg)")]
    EncoderNotFound(String),

    /// The encoder exited with a non-zero status.
    ///
    /// `stderr` is the encoder's own diagnostic output, verbatim.
    #[error("Encoder error: encoder exited with {status}:\n{stderr}")]
    Encoder {
        /// Exit status reported by the subprocess.
        status: ExitStatus,
        /// Everything the encoder wrote to its error stream.
        stderr: String,
        /// Location of the intermediate frames when they were kept for
        /// diagnosis.
        preserved_frames: Option<PathBuf>,
    },

    /// The encoder reported success but the output file is missing or
    /// unusable.
    #[error("Encoder error: invalid output {path}: {reason}")]
    EncoderOutput {
        /// Expected output path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// GIF encoding failed.
    #[cfg(feature = "gif")]
    #[error("GIF encoding error: {0}")]
    GifEncode(String),

    /// Probing the encoded output failed.
    #[cfg(feature = "probe")]
    #[error("Probe error: {0}")]
    Probe(String),

    /// The preferences file could not be read or written.
    #[error("Preferences error: {path}: {reason}")]
    Preferences {
        /// Preferences file path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while encoding an intermediate frame.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl RenderError {
    /// Directory holding the intermediate frames, if the failed run kept it.
    pub fn preserved_frames(&self) -> Option<&PathBuf> {
        match self {
            RenderError::Encoder {
                preserved_frames, ..
            } => preserved_frames.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` for errors raised while validating options.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RenderError::Configuration(_))
    }
}

#[cfg(feature = "probe")]
impl From<ffmpeg_next::Error> for RenderError {
    fn from(error: ffmpeg_next::Error) -> Self {
        RenderError::Probe(error.to_string())
    }
}
