//! Image sequence scanning and validation.
//!
//! [`ImageSequence::scan`] lists a directory, keeps the supported image files,
//! orders them by the first number in each file name and reports anomalies
//! (gaps, duplicate numbers, files without a number) as a single
//! [`SequenceWarning`]. Anomalies never stop a render; a missing directory or
//! an empty sequence does.
//!
//! # Example
//!
//! ```no_run
//! use sisr::ImageSequence;
//!
//! let sequence = ImageSequence::scan("frames/", &["jpg", "png"])?;
//! if let Some(warning) = sequence.warning() {
//!     eprintln!("warning: {warning}");
//! }
//! println!("{}", sequence.report());
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RenderError;

/// Extensions recognised when none are configured.
pub const DEFAULT_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// One source image and the number parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    /// Path of the source image.
    pub path: PathBuf,
    /// First run of digits in the file stem.
    pub index: u64,
}

/// Non-fatal discontinuities found while scanning.
///
/// At most one warning is produced per scan; it lists every anomaly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceWarning {
    /// Missing index ranges, inclusive.
    pub gaps: Vec<(u64, u64)>,
    /// Indices shared by more than one file.
    pub duplicates: Vec<u64>,
    /// Supported images without any digits in their name. They are not
    /// part of the sequence.
    pub unnumbered: Vec<PathBuf>,
}

impl SequenceWarning {
    fn is_empty(&self) -> bool {
        self.gaps.is_empty() && self.duplicates.is_empty() && self.unnumbered.is_empty()
    }
}

impl Display for SequenceWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut parts = Vec::new();

        if !self.gaps.is_empty() {
            let ranges: Vec<String> = self
                .gaps
                .iter()
                .map(|&(start, end)| {
                    if start == end {
                        start.to_string()
                    } else {
                        format!("{start}-{end}")
                    }
                })
                .collect();
            parts.push(format!("missing index {}", ranges.join(", ")));
        }

        if !self.duplicates.is_empty() {
            let indices: Vec<String> = self.duplicates.iter().map(u64::to_string).collect();
            parts.push(format!("duplicate index {}", indices.join(", ")));
        }

        if !self.unnumbered.is_empty() {
            let names: Vec<String> = self
                .unnumbered
                .iter()
                .map(|path| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string())
                })
                .collect();
            parts.push(format!("skipped unnumbered {}", names.join(", ")));
        }

        write!(f, "image sequence is not contiguous: {}", parts.join("; "))
    }
}

/// An ordered, validated list of source images.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    directory: PathBuf,
    entries: Vec<SequenceEntry>,
    extensions_seen: BTreeSet<String>,
    warning: Option<SequenceWarning>,
}

impl ImageSequence {
    /// Scan `directory` for images whose extension (case-insensitive) is in
    /// `extensions`.
    ///
    /// Hidden files and subdirectories are ignored. Entries are sorted by
    /// `(index, file name)`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InputDirectory`] if the directory is missing or
    ///   unreadable.
    /// - [`RenderError::NoImages`] if no numbered image qualifies.
    pub fn scan<P, S>(directory: P, extensions: &[S]) -> Result<Self, RenderError>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let directory = directory.as_ref();
        let wanted: Vec<String> = extensions
            .iter()
            .map(|extension| normalize_extension(extension.as_ref()))
            .collect();

        let listing = fs::read_dir(directory).map_err(|error| RenderError::InputDirectory {
            path: directory.to_path_buf(),
            reason: error.to_string(),
        })?;

        let mut entries = Vec::new();
        let mut unnumbered = Vec::new();
        let mut extensions_seen = BTreeSet::new();

        for item in listing {
            let item = item.map_err(|error| RenderError::InputDirectory {
                path: directory.to_path_buf(),
                reason: error.to_string(),
            })?;
            let path = item.path();

            if is_hidden(&path) || !path.is_file() {
                continue;
            }
            let Some(extension) = path.extension().and_then(OsStr::to_str) else {
                continue;
            };
            let extension = normalize_extension(extension);
            if !wanted.contains(&extension) {
                continue;
            }

            match path.file_stem().and_then(OsStr::to_str).and_then(parse_index) {
                Some(index) => {
                    extensions_seen.insert(extension);
                    entries.push(SequenceEntry { path, index });
                }
                None => unnumbered.push(path),
            }
        }

        if entries.is_empty() {
            return Err(RenderError::NoImages {
                path: directory.to_path_buf(),
            });
        }

        entries.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
        });
        unnumbered.sort();

        let warning = find_discontinuities(&entries, unnumbered);
        if let Some(warning) = &warning {
            log::debug!("{}: {warning}", directory.display());
        }
        log::debug!(
            "Scanned {:?}: {} images, indices {}..={}",
            directory,
            entries.len(),
            entries[0].index,
            entries[entries.len() - 1].index,
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            entries,
            extensions_seen,
            warning,
        })
    }

    /// Directory the sequence was scanned from.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Entries in render order.
    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    /// Number of images in the sequence.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false` for a successfully scanned sequence.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The discontinuity warning, if any.
    pub fn warning(&self) -> Option<&SequenceWarning> {
        self.warning.as_ref()
    }

    /// Summarise the scan for display.
    pub fn report(&self) -> SequenceReport {
        let mut info = vec![format!(
            "{} images in {}",
            self.entries.len(),
            self.directory.display()
        )];
        if let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) {
            info.push(format!("Index range: {}..={}", first.index, last.index));
        }
        if !self.extensions_seen.is_empty() {
            let extensions: Vec<&str> = self.extensions_seen.iter().map(String::as_str).collect();
            info.push(format!("Extensions: {}", extensions.join(", ")));
        }

        SequenceReport {
            info,
            warning: self.warning.clone(),
        }
    }
}

/// Human-readable summary of a scan.
#[derive(Debug, Clone, Default)]
pub struct SequenceReport {
    /// Informational notices.
    pub info: Vec<String>,
    /// The scan's warning, if any.
    pub warning: Option<SequenceWarning>,
}

impl SequenceReport {
    /// Returns `true` if the sequence is contiguous.
    pub fn is_contiguous(&self) -> bool {
        self.warning.is_none()
    }
}

impl Display for SequenceReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        if let Some(warning) = &self.warning {
            writeln!(f, "[WARN] {warning}")?;
        }
        Ok(())
    }
}

/// Parse the first run of ASCII digits in `stem`.
///
/// ```
/// assert_eq!(sisr::parse_index("IMG_0042"), Some(42));
/// assert_eq!(sisr::parse_index("shot12-v3"), Some(12));
/// assert_eq!(sisr::parse_index("cover"), None);
/// ```
pub fn parse_index(stem: &str) -> Option<u64> {
    let start = stem.find(|c: char| c.is_ascii_digit())?;
    let digits = &stem[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.starts_with('.'))
}

fn find_discontinuities(
    entries: &[SequenceEntry],
    unnumbered: Vec<PathBuf>,
) -> Option<SequenceWarning> {
    let mut warning = SequenceWarning {
        unnumbered,
        ..SequenceWarning::default()
    };

    for pair in entries.windows(2) {
        let (previous, next) = (pair[0].index, pair[1].index);
        if next == previous {
            if warning.duplicates.last() != Some(&next) {
                warning.duplicates.push(next);
            }
        } else if next > previous + 1 {
            warning.gaps.push((previous + 1, next - 1));
        }
    }

    (!warning.is_empty()).then_some(warning)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    /// Records every log line emitted by this test binary.
    struct CapturingLogger(Mutex<Vec<(log::Level, String)>>);

    impl log::Log for CapturingLogger {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    fn captured_logs() -> &'static CapturingLogger {
        static LOGGER: OnceLock<&'static CapturingLogger> = OnceLock::new();
        LOGGER.get_or_init(|| {
            let logger: &'static CapturingLogger =
                Box::leak(Box::new(CapturingLogger(Mutex::new(Vec::new()))));
            log::set_logger(logger).expect("no other logger installed");
            log::set_max_level(log::LevelFilter::Trace);
            logger
        })
    }

    #[test]
    fn parse_index_takes_first_digit_run() {
        assert_eq!(parse_index("0001"), Some(1));
        assert_eq!(parse_index("img_0010_final2"), Some(10));
        assert_eq!(parse_index("DSC"), None);
        assert_eq!(parse_index(""), None);
    }

    #[test]
    fn sequence_warning_is_returned_not_logged_as_a_warning() {
        let logs = captured_logs();
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "img_0001.jpg");
        touch(dir.path(), "img_0005.jpg");

        let sequence = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap();
        assert!(sequence.warning().is_some());

        let directory = dir.path().display().to_string();
        let lines = logs.0.lock().unwrap();
        assert!(
            lines
                .iter()
                .any(|(level, line)| *level == log::Level::Debug && line.contains(&directory))
        );
        assert!(
            !lines
                .iter()
                .any(|(level, line)| *level <= log::Level::Warn && line.contains(&directory))
        );
    }

    #[test]
    fn contiguous_sequence_has_no_warning() {
        let dir = tempfile::tempdir().unwrap();
        for i in (1..=12).rev() {
            touch(dir.path(), &format!("img_{i:04}.jpg"));
        }

        let sequence = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap();
        let indices: Vec<u64> = sequence.entries().iter().map(|e| e.index).collect();
        assert_eq!(indices, (1..=12).collect::<Vec<_>>());
        assert!(sequence.warning().is_none());
        assert!(sequence.report().is_contiguous());
    }

    #[test]
    fn padding_does_not_affect_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["9.png", "10.png", "0011.png", "008.png"] {
            touch(dir.path(), name);
        }

        let sequence = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap();
        let indices: Vec<u64> = sequence.entries().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![8, 9, 10, 11]);
        assert!(sequence.warning().is_none());
    }

    #[test]
    fn gaps_duplicates_and_unnumbered_share_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a_1.jpg", "b_1.jpg", "a_2.jpg", "a_5.jpg", "a_7.jpg", "cover.jpg"] {
            touch(dir.path(), name);
        }

        let sequence = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap();
        assert_eq!(sequence.len(), 5);
        let warning = sequence.warning().unwrap();
        assert_eq!(warning.gaps, vec![(3, 4), (6, 6)]);
        assert_eq!(warning.duplicates, vec![1]);
        assert_eq!(warning.unnumbered.len(), 1);

        let text = warning.to_string();
        assert!(text.contains("3-4, 6"), "{text}");
        assert!(text.contains("duplicate index 1"), "{text}");
        assert!(text.contains("cover.jpg"), "{text}");

        // Duplicates keep a stable order by file name.
        let names: Vec<_> = sequence.entries()[..2]
            .iter()
            .map(|e| e.path.file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["a_1.jpg", "b_1.jpg"]);
    }

    #[test]
    fn filters_hidden_files_and_foreign_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["f1.JPG", "f2.Png", ".f3.jpg", "f4.txt", "f5"] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join("f6.jpg")).unwrap();

        let sequence = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap();
        let indices: Vec<u64> = sequence.entries().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(sequence.warning().is_none());

        let report = sequence.report().to_string();
        assert!(report.contains("Extensions: jpg, png"), "{report}");
    }

    #[test]
    fn extension_list_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "f1.jpg");
        touch(dir.path(), "f2.webp");

        let sequence = ImageSequence::scan(dir.path(), &[".WEBP"]).unwrap();
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.entries()[0].index, 2);
    }

    #[test]
    fn empty_or_unnumbered_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap_err();
        assert!(matches!(error, RenderError::NoImages { .. }));

        touch(dir.path(), "cover.jpg");
        let error = ImageSequence::scan(dir.path(), &DEFAULT_EXTENSIONS).unwrap_err();
        assert!(matches!(error, RenderError::NoImages { .. }));
    }

    #[test]
    fn missing_directory_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = ImageSequence::scan(dir.path().join("nope"), &DEFAULT_EXTENSIONS).unwrap_err();
        assert!(matches!(error, RenderError::InputDirectory { .. }));
        assert!(error.to_string().starts_with("Input error"));
    }
}
