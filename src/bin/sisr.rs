use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{ArgGroup, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use sisr::{
    CropAlignment, CropPreset, EncoderLogLevel, JobResult, OverlayAnchor, OverlayKind,
    OverlayPlacement, Preferences, ProgressCallback, ProgressInfo, QualityProfile, RenderOptions,
    RenderStage, Renderer,
};

const CLI_AFTER_HELP: &str = "Examples:\n  sisr shots/sunset --hd-crop=keep-top --overlay-date\n  sisr shots/sunset --vertical-crop --quality gif --gif-fps 12\n  sisr shots --recursive --max-width 1280 -o renders --json\n  sisr shots/sunset --check\n  sisr completions zsh > _sisr";

#[derive(Debug, Parser)]
#[command(
    name = "sisr",
    version,
    about = "Render numbered image sequences into videos and GIFs",
    after_help = CLI_AFTER_HELP,
    args_conflicts_with_subcommands = true,
    group(ArgGroup::new("crop").args(["vertical_crop", "hd_crop", "uhd_crop"])),
    group(ArgGroup::new("overlay").args(["overlay_date", "overlay_frame"])),
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directories holding image sequences. Defaults to the last-used input directory.
    inputs: Vec<PathBuf>,

    /// Directory the outputs are written to. Defaults to the last-used output directory,
    /// then the current directory.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Render every directory below each input that contains images.
    #[arg(short, long)]
    recursive: bool,

    /// Frames per second for video output.
    #[arg(long, default_value_t = sisr::DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Frames per second for GIF output.
    #[arg(long, default_value_t = sisr::DEFAULT_GIF_FRAME_RATE)]
    gif_fps: u32,

    /// Crop to vertical 1080x1920. The kept region is chosen with `=center`, `=keep-top`
    /// or `=keep-bottom`.
    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "center"
    )]
    vertical_crop: Option<AlignmentArg>,

    /// Crop to HD 1920x1080.
    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "center"
    )]
    hd_crop: Option<AlignmentArg>,

    /// Crop to UHD 3840x2160.
    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "center"
    )]
    uhd_crop: Option<AlignmentArg>,

    /// Scale to fit within this width.
    #[arg(long, conflicts_with_all = ["crop", "resolution"])]
    max_width: Option<u32>,

    /// Scale to fit within this height.
    #[arg(long, conflicts_with_all = ["crop", "resolution"])]
    max_height: Option<u32>,

    /// Scale to fit within WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_resolution, conflicts_with = "crop")]
    resolution: Option<(u32, u32)>,

    /// Stamp each frame with its capture date.
    #[arg(long)]
    overlay_date: bool,

    /// Stamp each frame with its frame number.
    #[arg(long)]
    overlay_frame: bool,

    /// Draw the overlay on the source image, before cropping or scaling.
    #[arg(long, requires = "overlay")]
    overlay_before_crop: bool,

    /// Corner the overlay is drawn in.
    #[arg(long, value_enum, default_value_t = CornerArg::BottomRight)]
    overlay_corner: CornerArg,

    /// Output codec profile.
    #[arg(long, value_enum, default_value_t = QualityArg::Default)]
    quality: QualityArg,

    /// Keep the intermediate frames when the encoder fails.
    #[arg(long)]
    keep_frames: bool,

    /// Create intermediate frames under this directory.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Encoder log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    encoder_log_level: Option<String>,

    /// Only validate the sequences and print a report.
    #[arg(long)]
    check: bool,

    /// Print a JSON summary instead of status lines.
    #[arg(long)]
    json: bool,

    /// Hide the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Do not remember the input and output directories.
    #[arg(long)]
    no_save: bool,

    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlignmentArg {
    Center,
    KeepTop,
    KeepBottom,
}

impl From<AlignmentArg> for CropAlignment {
    fn from(value: AlignmentArg) -> Self {
        match value {
            AlignmentArg::Center => CropAlignment::Center,
            AlignmentArg::KeepTop => CropAlignment::KeepTop,
            AlignmentArg::KeepBottom => CropAlignment::KeepBottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CornerArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl From<CornerArg> for OverlayAnchor {
    fn from(value: CornerArg) -> Self {
        match value {
            CornerArg::TopLeft => OverlayAnchor::TopLeft,
            CornerArg::TopRight => OverlayAnchor::TopRight,
            CornerArg::BottomLeft => OverlayAnchor::BottomLeft,
            CornerArg::BottomRight => OverlayAnchor::BottomRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QualityArg {
    Default,
    Prores,
    Proreshq,
    Gif,
}

impl From<QualityArg> for QualityProfile {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Default => QualityProfile::Default,
            QualityArg::Prores => QualityProfile::ProRes,
            QualityArg::Proreshq => QualityProfile::ProResHq,
            QualityArg::Gif => QualityProfile::Gif,
        }
    }
}

fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in `{value}`"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in `{value}`"))?;
    Ok((width, height))
}

fn parse_log_level(value: &str) -> Option<EncoderLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(EncoderLogLevel::Quiet),
        "panic" => Some(EncoderLogLevel::Panic),
        "fatal" => Some(EncoderLogLevel::Fatal),
        "error" => Some(EncoderLogLevel::Error),
        "warning" | "warn" => Some(EncoderLogLevel::Warning),
        "info" => Some(EncoderLogLevel::Info),
        "verbose" => Some(EncoderLogLevel::Verbose),
        "debug" => Some(EncoderLogLevel::Debug),
        "trace" => Some(EncoderLogLevel::Trace),
        _ => None,
    }
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn build_options(cli: &Cli) -> Result<RenderOptions, Box<dyn std::error::Error>> {
    let mut options = RenderOptions::new()
        .with_frame_rate(cli.fps)
        .with_gif_frame_rate(cli.gif_fps)
        .with_quality(cli.quality.into())
        .with_overlay_anchor(cli.overlay_corner.into())
        .with_keep_frames_on_failure(cli.keep_frames);

    let crop = [
        (CropPreset::VerticalTall, cli.vertical_crop),
        (CropPreset::Hd, cli.hd_crop),
        (CropPreset::Uhd, cli.uhd_crop),
    ]
    .into_iter()
    .find_map(|(preset, alignment)| alignment.map(|alignment| (preset, alignment)));
    if let Some((preset, alignment)) = crop {
        options = options
            .with_crop(preset)
            .with_crop_alignment(alignment.into());
    }

    let (max_width, max_height) = match cli.resolution {
        Some((width, height)) => (Some(width), Some(height)),
        None => (cli.max_width, cli.max_height),
    };
    if let Some(width) = max_width {
        options = options.with_max_width(width);
    }
    if let Some(height) = max_height {
        options = options.with_max_height(height);
    }

    if cli.overlay_date {
        options = options.with_overlay(OverlayKind::Date);
    } else if cli.overlay_frame {
        options = options.with_overlay(OverlayKind::Frame);
    }
    if cli.overlay_before_crop {
        options = options.with_overlay_placement(OverlayPlacement::BeforeTransform);
    }

    if let Some(level) = &cli.encoder_log_level {
        let parsed = parse_log_level(level)
            .ok_or(format!("unsupported --encoder-log-level: {level}"))?;
        options = options.with_encoder_log_level(parsed);
    }
    if let Some(temp_dir) = &cli.temp_dir {
        options = options.with_temp_root(temp_dir);
    }

    options.validate()?;
    Ok(options)
}

fn collect_directories(
    inputs: &[PathBuf],
    recursive: bool,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    if !recursive {
        return Ok(inputs.to_vec());
    }
    let mut directories = Vec::new();
    for input in inputs {
        let found = sisr::find_image_directories(input, extensions)?;
        if found.is_empty() {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("no image directories under {}", input.display()).yellow()
            );
        }
        directories.extend(found);
    }
    Ok(directories)
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(label: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {prefix} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        bar.set_prefix(label.to_string());
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        let message = match info.stage {
            RenderStage::FrameRendering => "rendering",
            RenderStage::Encoding => "encoding",
            _ => "",
        };
        self.bar.set_message(message);
        self.bar.set_position(info.current);
    }

    fn on_complete(&self, _result: &JobResult) {
        self.bar.finish_and_clear();
    }
}

fn directory_label(directory: &Path) -> String {
    directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| directory.display().to_string())
}

fn check_directories(
    directories: &[PathBuf],
    options: &RenderOptions,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let renderer = Renderer::new(options.clone())?;
    let mut payload = Vec::new();
    for directory in directories {
        let sequence = renderer.scan(directory)?;
        if json_output {
            payload.push(json!({
                "input": directory,
                "images": sequence.len(),
                "first_index": sequence.entries().first().map(|e| e.index),
                "last_index": sequence.entries().last().map(|e| e.index),
                "warning": sequence.warning().map(|w| w.to_string()),
            }));
        } else {
            print!("{}", sequence.report());
        }
    }
    if json_output {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "sisr", &mut std::io::stdout());
        return Ok(());
    }

    init_logger(cli.verbose);

    let preferences_path = Preferences::default_path();
    let mut preferences = preferences_path
        .as_ref()
        .map(Preferences::load_or_default)
        .unwrap_or_default();

    let inputs = if cli.inputs.is_empty() {
        let remembered = preferences
            .existing_input_dir()
            .ok_or("no input directory given and none remembered")?;
        vec![remembered.to_path_buf()]
    } else {
        cli.inputs.clone()
    };
    let output_dir = cli
        .output_dir
        .clone()
        .or_else(|| preferences.existing_output_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let options = build_options(&cli)?;
    let directories = collect_directories(&inputs, cli.recursive, &sisr::DEFAULT_EXTENSIONS)?;

    if cli.check {
        return check_directories(&directories, &options, cli.json);
    }

    let mut results: Vec<Value> = Vec::new();
    let mut failures = 0_usize;

    for directory in &directories {
        let mut run_options = options.clone();
        if !cli.no_progress && !cli.json {
            run_options =
                run_options.with_progress(Arc::new(TerminalProgress::new(&directory_label(directory))?));
        }
        let renderer = Renderer::new(run_options)?;

        match renderer.render_to_dir(directory, &output_dir) {
            Ok(report) => {
                if let Some(warning) = &report.warning {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!("{}: {warning}", directory.display()).yellow()
                    );
                }
                if cli.json {
                    results.push(json!({
                        "input": directory,
                        "output": report.output,
                        "status": "succeeded",
                        "frames": report.frame_count,
                        "width": report.width,
                        "height": report.height,
                        "fps": report.frame_rate,
                        "elapsed_seconds": report.elapsed.as_secs_f64(),
                        "warning": report.warning.as_ref().map(|w| w.to_string()),
                    }));
                } else {
                    println!(
                        "{} {} ({} frames, {}x{} @ {} fps)",
                        "rendered".green().bold(),
                        report.output.display(),
                        report.frame_count,
                        report.width,
                        report.height,
                        report.frame_rate,
                    );
                }
            }
            Err(error) => {
                failures += 1;
                if cli.json {
                    results.push(json!({
                        "input": directory,
                        "status": "failed",
                        "error": error.to_string(),
                        "preserved_frames": error.preserved_frames(),
                    }));
                } else {
                    eprintln!("{} {}: {error}", "failed".red().bold(), directory.display());
                    if let Some(kept) = error.preserved_frames() {
                        eprintln!("  intermediate frames kept in {}", kept.display());
                    }
                }
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    if !cli.no_save {
        if let Some(path) = &preferences_path {
            preferences.input_dir = inputs.last().map(|input| absolute(input));
            preferences.output_dir = Some(absolute(&output_dir));
            if let Err(error) = preferences.save(path) {
                log::warn!("{error}");
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {} renders failed", directories.len()).into());
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
