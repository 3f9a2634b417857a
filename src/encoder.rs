//! External encoder invocation.
//!
//! The [`Encoder`] trait is the seam between the frame pipeline and whatever
//! turns a directory of numbered PNG frames into the final file. The default
//! implementation, [`FfmpegEncoder`], builds an `ffmpeg` command line from an
//! [`EncodeRequest`] and runs it as a subprocess, forwarding its `frame=`
//! progress lines and killing it on cancellation.
//!
//! # Example
//!
//! ```no_run
//! use sisr::{FfmpegEncoder, RenderOptions, Renderer};
//!
//! let encoder = FfmpegEncoder::locate()?;
//! println!("using {}", encoder.program().display());
//!
//! let renderer = Renderer::new(RenderOptions::new())?.with_encoder(Box::new(encoder));
//! renderer.render("frames/", "out/frames.mp4")?;
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::RenderError;
use crate::progress::{CancellationToken, ProgressCallback, ProgressTracker, RenderStage};

/// File name pattern of intermediate frames, as understood by `ffmpeg`.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// Environment variable overriding the encoder binary.
pub const FFMPEG_ENV: &str = "SISR_FFMPEG";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// File name of the intermediate frame at 0-based `position`.
pub fn frame_file_name(position: usize) -> String {
    format!("frame_{position:06}.png")
}

/// Output codec profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityProfile {
    /// H.264 (`libx264`, high profile, CRF 18) in an MP4 container.
    #[default]
    Default,
    /// Apple ProRes 422 (`prores_ks` profile 2) in a QuickTime container.
    ProRes,
    /// Apple ProRes 422 HQ (`prores_ks` profile 3).
    ProResHq,
    /// Animated GIF with a generated 256-colour palette.
    Gif,
}

impl QualityProfile {
    /// Short name used in output file names, `None` for the default profile.
    pub fn name(self) -> Option<&'static str> {
        match self {
            QualityProfile::Default => None,
            QualityProfile::ProRes => Some("prores"),
            QualityProfile::ProResHq => Some("proreshq"),
            QualityProfile::Gif => Some("gif"),
        }
    }

    /// Output file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            QualityProfile::Default => "mp4",
            QualityProfile::ProRes | QualityProfile::ProResHq => "mov",
            QualityProfile::Gif => "gif",
        }
    }

    /// Returns `true` for the GIF profile.
    pub fn is_gif(self) -> bool {
        matches!(self, QualityProfile::Gif)
    }

    /// Codec arguments placed between the input and the output size.
    pub fn codec_arguments(self) -> &'static [&'static str] {
        match self {
            QualityProfile::Default => &[
                "-c:v", "libx264", "-profile:v", "high", "-crf", "18", "-pix_fmt", "yuv420p",
            ],
            QualityProfile::ProRes => &[
                "-c:v",
                "prores_ks",
                "-profile:v",
                "2",
                "-vendor",
                "apl0",
                "-pix_fmt",
                "yuv422p10le",
                "-qscale:v",
                "9",
                "-movflags",
                "+faststart",
            ],
            QualityProfile::ProResHq => &[
                "-c:v",
                "prores_ks",
                "-profile:v",
                "3",
                "-vendor",
                "apl0",
                "-pix_fmt",
                "yuv422p10le",
                "-qscale:v",
                "5",
                "-movflags",
                "+faststart",
            ],
            QualityProfile::Gif => &[
                "-filter_complex",
                "split[s0][s1];[s0]palettegen=max_colors=256:stats_mode=full[p];[s1][p]paletteuse=dither=sierra2_4a:diff_mode=rectangle",
                "-loop",
                "0",
                "-f",
                "gif",
            ],
        }
    }
}

/// Verbosity of the encoder's own diagnostic output (`-loglevel`).
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncoderLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors. This is the default, so a failed run's stderr is
    /// the diagnostic itself.
    #[default]
    Error,
    /// Warnings.
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl EncoderLogLevel {
    /// The value passed to `-loglevel`.
    pub fn as_str(self) -> &'static str {
        match self {
            EncoderLogLevel::Quiet => "quiet",
            EncoderLogLevel::Panic => "panic",
            EncoderLogLevel::Fatal => "fatal",
            EncoderLogLevel::Error => "error",
            EncoderLogLevel::Warning => "warning",
            EncoderLogLevel::Info => "info",
            EncoderLogLevel::Verbose => "verbose",
            EncoderLogLevel::Debug => "debug",
            EncoderLogLevel::Trace => "trace",
        }
    }
}

/// Everything an encoder needs to produce the output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    /// Directory holding `frame_000000.png`, `frame_000001.png`, ...
    pub frames_dir: PathBuf,
    /// Number of frames written.
    pub frame_count: usize,
    /// Frame width in pixels (even).
    pub width: u32,
    /// Frame height in pixels (even).
    pub height: u32,
    /// Rate at which input frames are read.
    pub input_frame_rate: u32,
    /// Rate of the encoded output.
    pub output_frame_rate: u32,
    /// Codec profile.
    pub quality: QualityProfile,
    /// Encoder diagnostic verbosity.
    pub log_level: EncoderLogLevel,
    /// File to create. Overwritten if it exists.
    pub output: PathBuf,
}

impl EncodeRequest {
    /// Path of the frame at 0-based `position`.
    pub fn frame_path(&self, position: usize) -> PathBuf {
        self.frames_dir.join(frame_file_name(position))
    }
}

/// Progress and cancellation plumbing handed to an [`Encoder`].
pub struct EncodeContext {
    tracker: Mutex<ProgressTracker>,
    cancellation: Option<CancellationToken>,
}

impl EncodeContext {
    pub(crate) fn new(
        progress: Arc<dyn ProgressCallback>,
        cancellation: Option<CancellationToken>,
        frame_count: usize,
    ) -> Self {
        Self {
            tracker: Mutex::new(ProgressTracker::new(
                progress,
                RenderStage::Encoding,
                Some(frame_count as u64),
            )),
            cancellation,
        }
    }

    /// Returns `true` once the caller asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Report that `frames` frames have been encoded so far.
    pub fn report_frames(&self, frames: u64) {
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.set_position(frames);
        }
    }
}

/// What an encoder produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutput {
    /// The written file.
    pub path: PathBuf,
    /// Diagnostics the encoder emitted on success (may be empty).
    pub diagnostics: String,
}

/// Turns a directory of numbered frames into an output file.
///
/// Implementations must leave no output file behind when they fail.
pub trait Encoder: Send + Sync {
    /// Encode the frames described by `request`.
    fn encode(
        &self,
        request: &EncodeRequest,
        context: &EncodeContext,
    ) -> Result<EncodeOutput, RenderError>;
}

/// Runs the external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    /// Find the encoder binary.
    ///
    /// Looks at the `SISR_FFMPEG` environment variable, then for a binary
    /// shipped next to the current executable, then on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::EncoderNotFound`] if none of these exist.
    pub fn locate() -> Result<Self, RenderError> {
        if let Some(configured) = env::var_os(FFMPEG_ENV).filter(|value| !value.is_empty()) {
            let candidate = PathBuf::from(&configured);
            if candidate.is_file() {
                log::debug!("Using encoder from {FFMPEG_ENV}: {:?}", candidate);
                return Ok(Self::with_program(candidate));
            }
            return which::which(&configured)
                .map(Self::with_program)
                .map_err(|_| RenderError::EncoderNotFound(candidate.display().to_string()));
        }

        let binary = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };

        let bundled = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(binary)))
            .filter(|path| path.is_file());
        if let Some(bundled) = bundled {
            log::debug!("Using bundled encoder {:?}", bundled);
            return Ok(Self::with_program(bundled));
        }

        which::which(binary)
            .map(|path| {
                log::debug!("Using encoder from PATH: {:?}", path);
                Self::with_program(path)
            })
            .map_err(|_| RenderError::EncoderNotFound(binary.to_string()))
    }

    /// Use an explicit binary without checking that it exists.
    pub fn with_program<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The binary this encoder runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The full argument list for `request`, without the program name.
    pub fn arguments(&self, request: &EncodeRequest) -> Vec<OsString> {
        let mut arguments: Vec<OsString> = [
            "-hide_banner",
            "-y",
            "-loglevel",
            request.log_level.as_str(),
            "-framerate",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        arguments.push(request.input_frame_rate.to_string().into());
        arguments.push("-start_number".into());
        arguments.push("0".into());
        arguments.push("-i".into());
        arguments.push(request.frames_dir.join(FRAME_PATTERN).into_os_string());
        arguments.extend(request.quality.codec_arguments().iter().map(OsString::from));
        arguments.push("-s".into());
        arguments.push(format!("{}x{}", request.width, request.height).into());
        arguments.push("-r".into());
        arguments.push(request.output_frame_rate.to_string().into());
        arguments.push(request.output.clone().into_os_string());
        arguments
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(
        &self,
        request: &EncodeRequest,
        context: &EncodeContext,
    ) -> Result<EncodeOutput, RenderError> {
        let arguments = self.arguments(request);
        log::debug!("Running {:?} {:?}", self.program, arguments);

        let mut child = Command::new(&self.program)
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| match error.kind() {
                ErrorKind::NotFound => {
                    RenderError::EncoderNotFound(self.program.display().to_string())
                }
                _ => RenderError::Io(error),
            })?;

        let stderr = child.stderr.take();

        let (status, stderr) = thread::scope(|scope| {
            let reader = scope.spawn(|| stderr.map(|pipe| drain_stderr(pipe, context)));

            let status = loop {
                if context.is_cancelled() {
                    log::debug!("Cancellation requested, killing encoder");
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                match child.try_wait() {
                    Ok(Some(status)) => break Some(Ok(status)),
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(error) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        break Some(Err(error));
                    }
                }
            };

            let stderr = reader.join().ok().flatten().unwrap_or_default();
            (status, stderr)
        });

        let status = match status {
            None => {
                remove_partial(&request.output);
                return Err(RenderError::Cancelled);
            }
            Some(Err(error)) => {
                remove_partial(&request.output);
                return Err(RenderError::Io(error));
            }
            Some(Ok(status)) => status,
        };

        if !status.success() {
            remove_partial(&request.output);
            return Err(RenderError::Encoder {
                status,
                stderr,
                preserved_frames: None,
            });
        }

        validate_output(&request.output)?;

        #[cfg(feature = "probe")]
        if let Err(error) = crate::probe::verify_output(&request.output, request.width, request.height) {
            remove_partial(&request.output);
            return Err(error);
        }

        context.report_frames(request.frame_count as u64);
        Ok(EncodeOutput {
            path: request.output.clone(),
            diagnostics: stderr,
        })
    }
}

/// Read the encoder's stderr to the end, forwarding `frame=` progress.
///
/// Progress lines are terminated by `\r`, diagnostics by `\n`.
fn drain_stderr(mut pipe: ChildStderr, context: &EncodeContext) -> String {
    let mut collected = Vec::new();
    let mut line = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let read = match pipe.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => {
                log::debug!("Stopped reading encoder stderr: {error}");
                break;
            }
        };

        for &byte in &buffer[..read] {
            if byte == b'\r' || byte == b'\n' {
                if let Some(frames) = parse_progress_frame(&String::from_utf8_lossy(&line)) {
                    context.report_frames(frames);
                }
                line.clear();
            } else {
                line.push(byte);
            }
        }
        collected.extend_from_slice(&buffer[..read]);
    }

    String::from_utf8_lossy(&collected).into_owned()
}

/// Parse the frame counter from an `ffmpeg` statistics line such as
/// `frame=  120 fps= 30 q=-1.0 size=...`.
pub(crate) fn parse_progress_frame(line: &str) -> Option<u64> {
    let (_, rest) = line.split_once("frame=")?;
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn validate_output(path: &Path) -> Result<(), RenderError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => Ok(()),
        Ok(_) => {
            remove_partial(path);
            Err(RenderError::EncoderOutput {
                path: path.to_path_buf(),
                reason: "output file is empty".to_string(),
            })
        }
        Err(error) => Err(RenderError::EncoderOutput {
            path: path.to_path_buf(),
            reason: error.to_string(),
        }),
    }
}

pub(crate) fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(error) = fs::remove_file(path) {
            log::warn!("Failed to remove partial output {:?}: {error}", path);
        }
    }
}
