//! Encoded output verification.
//!
//! With the `probe` feature, [`probe_output`] opens the file the encoder
//! wrote with FFmpeg's demuxer and reports its video stream, and the
//! encoder invoker rejects outputs whose resolution differs from the
//! requested one.
//!
//! # Example
//!
//! ```no_run
//! let probe = sisr::probe_output("out/frames.mp4")?;
//! println!("{} {}x{} @ {:.2} fps", probe.codec, probe.width, probe.height, probe.frames_per_second);
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{codec::context::Context as CodecContext, media::Type};

use crate::error::RenderError;

/// Video stream properties of an encoded file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputProbe {
    /// Container format name.
    pub format: String,
    /// Video codec name.
    pub codec: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate, 0 when unknown.
    pub frames_per_second: f64,
    /// Container duration.
    pub duration: Duration,
}

/// Probe the best video stream of `path`.
///
/// # Errors
///
/// Returns [`RenderError::Probe`] if the file cannot be opened or has no
/// decodable video stream.
pub fn probe_output<P: AsRef<Path>>(path: P) -> Result<OutputProbe, RenderError> {
    let path = path.as_ref();

    // Safe to call multiple times.
    ffmpeg_next::init()?;

    let input = ffmpeg_next::format::input(&path)?;
    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| RenderError::Probe(format!("{} has no video stream", path.display())))?;

    let decoder = CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .video()?;

    let rate = stream.avg_frame_rate();
    let frames_per_second = if rate.denominator() != 0 {
        rate.numerator() as f64 / rate.denominator() as f64
    } else {
        0.0
    };

    let duration = match input.duration() {
        microseconds if microseconds > 0 => Duration::from_micros(microseconds as u64),
        _ => Duration::ZERO,
    };

    Ok(OutputProbe {
        format: input.format().name().to_string(),
        codec: decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        width: decoder.width(),
        height: decoder.height(),
        frames_per_second,
        duration,
    })
}

/// Check that the encoded file has the requested resolution.
pub(crate) fn verify_output(path: &Path, width: u32, height: u32) -> Result<(), RenderError> {
    let probe = probe_output(path)?;
    log::debug!(
        "Probed {:?}: {} {} {}x{} @ {:.2} fps, {:?}",
        path,
        probe.format,
        probe.codec,
        probe.width,
        probe.height,
        probe.frames_per_second,
        probe.duration,
    );

    if (probe.width, probe.height) != (width, height) {
        return Err(RenderError::EncoderOutput {
            path: path.to_path_buf(),
            reason: format!(
                "expected {width}x{height}, encoder wrote {}x{}",
                probe.width, probe.height
            ),
        });
    }
    Ok(())
}
