//! In-process GIF encoding.
//!
//! [`GifEncoder`] implements [`Encoder`](crate::Encoder) with the `gif`
//! crate instead of an external binary. Each frame is quantised to its own
//! 256-colour palette; the result is larger and noisier than the palette
//! filter used by the `ffmpeg` GIF profile but needs no external tools.
//!
//! # Example
//!
//! ```no_run
//! use sisr::{GifEncoder, QualityProfile, RenderOptions, Renderer};
//!
//! let options = RenderOptions::new()
//!     .with_quality(QualityProfile::Gif)
//!     .with_gif_frame_rate(10);
//! let renderer = Renderer::new(options)?.with_encoder(Box::new(GifEncoder::new()));
//! renderer.render("frames/", "out/frames.gif")?;
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::fs::File;
use std::io::BufWriter;

use gif::{Encoder as GifWriter, Frame, Repeat};

use crate::encoder::{EncodeContext, EncodeOutput, EncodeRequest, Encoder, remove_partial};
use crate::error::RenderError;

/// Encodes the intermediate frames as an animated GIF in-process.
#[derive(Debug, Clone)]
pub struct GifEncoder {
    /// Quantiser speed, 1 (best) to 30 (fastest).
    pub speed: i32,
    /// How many times the animation repeats. `None` loops forever.
    pub repeat: Option<u16>,
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self {
            speed: 10,
            repeat: None,
        }
    }
}

impl GifEncoder {
    /// Create an encoder that loops forever at quantiser speed 10.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quantiser speed (clamped to 1..=30).
    #[must_use]
    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = speed.clamp(1, 30);
        self
    }

    /// Set the repeat count. `None` loops forever.
    #[must_use]
    pub fn with_repeat(mut self, repeat: Option<u16>) -> Self {
        self.repeat = repeat;
        self
    }

    fn write(&self, request: &EncodeRequest, context: &EncodeContext) -> Result<(), RenderError> {
        let width = u16::try_from(request.width)
            .map_err(|_| RenderError::GifEncode(format!("width {} exceeds GIF limits", request.width)))?;
        let height = u16::try_from(request.height).map_err(|_| {
            RenderError::GifEncode(format!("height {} exceeds GIF limits", request.height))
        })?;
        let delay = frame_delay(request.output_frame_rate);

        let file = File::create(&request.output)
            .map_err(|e| RenderError::GifEncode(format!("Failed to create GIF file: {e}")))?;
        let mut writer = GifWriter::new(BufWriter::new(file), width, height, &[])
            .map_err(|e| RenderError::GifEncode(format!("Failed to create GIF encoder: {e}")))?;

        let repeat = match self.repeat {
            None => Repeat::Infinite,
            Some(n) => Repeat::Finite(n),
        };
        writer
            .set_repeat(repeat)
            .map_err(|e| RenderError::GifEncode(format!("Failed to set GIF repeat: {e}")))?;

        for position in 0..request.frame_count {
            if context.is_cancelled() {
                return Err(RenderError::Cancelled);
            }

            let path = request.frame_path(position);
            let image = image::open(&path).map_err(|error| RenderError::ImageDecode {
                path: path.clone(),
                reason: error.to_string(),
            })?;
            let mut pixels = image.to_rgba8().into_raw();

            let mut frame = Frame::from_rgba_speed(width, height, &mut pixels, self.speed);
            frame.delay = delay;
            writer.write_frame(&frame).map_err(|e| {
                RenderError::GifEncode(format!("Failed to write GIF frame: {e}"))
            })?;

            context.report_frames(position as u64 + 1);
        }

        Ok(())
    }
}

/// Per-frame delay in hundredths of a second, the unit GIF stores.
///
/// Rates that do not divide 100 are rounded to the nearest delay, so 15 fps
/// plays at about 14.3 fps.
fn frame_delay(frame_rate: u32) -> u16 {
    let frame_rate = frame_rate.max(1);
    ((100 + frame_rate / 2) / frame_rate).clamp(1, u32::from(u16::MAX)) as u16
}

impl Encoder for GifEncoder {
    fn encode(
        &self,
        request: &EncodeRequest,
        context: &EncodeContext,
    ) -> Result<EncodeOutput, RenderError> {
        log::debug!(
            "Encoding {} frames to GIF file {:?} ({}x{} @ {} fps)",
            request.frame_count,
            request.output,
            request.width,
            request.height,
            request.output_frame_rate,
        );

        match self.write(request, context) {
            Ok(()) => Ok(EncodeOutput {
                path: request.output.clone(),
                diagnostics: String::new(),
            }),
            Err(error) => {
                remove_partial(&request.output);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::encoder::{EncoderLogLevel, QualityProfile, frame_file_name};
    use crate::progress::{CancellationToken, NoOpProgress};

    fn request(dir: &std::path::Path, frame_count: usize) -> EncodeRequest {
        for position in 0..frame_count {
            RgbImage::from_pixel(8, 6, Rgb([position as u8 * 40, 0, 200]))
                .save(dir.join(frame_file_name(position)))
                .unwrap();
        }
        EncodeRequest {
            frames_dir: dir.to_path_buf(),
            frame_count,
            width: 8,
            height: 6,
            input_frame_rate: 10,
            output_frame_rate: 10,
            quality: QualityProfile::Gif,
            log_level: EncoderLogLevel::Error,
            output: dir.join("out.gif"),
        }
    }

    #[test]
    fn frame_delay_rounds_to_the_nearest_hundredth() {
        assert_eq!(frame_delay(10), 10);
        assert_eq!(frame_delay(15), 7);
        assert_eq!(frame_delay(8), 13);
        assert_eq!(frame_delay(30), 3);
        assert_eq!(frame_delay(240), 1);
        assert_eq!(frame_delay(0), 100);
    }

    #[test]
    fn writes_an_animated_gif() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path(), 3);
        let context = EncodeContext::new(Arc::new(NoOpProgress), None, 3);

        let output = GifEncoder::new().encode(&request, &context).unwrap();

        let bytes = std::fs::read(&output.path).unwrap();
        assert!(bytes.starts_with(b"GIF89a"));
    }

    #[test]
    fn cancelled_encode_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path(), 2);
        let token = CancellationToken::new();
        token.cancel();
        let context = EncodeContext::new(Arc::new(NoOpProgress), Some(token), 2);

        let error = GifEncoder::new().encode(&request, &context).unwrap_err();

        assert!(matches!(error, RenderError::Cancelled));
        assert!(!request.output.exists());
    }
}
