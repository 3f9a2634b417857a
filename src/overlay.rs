//! Per-frame text overlays.
//!
//! Two overlays are supported: the capture date of each source image (read
//! from EXIF, falling back to the file's modification time) and the frame
//! number, zero-padded to the width of the sequence length. Text is drawn
//! with a built-in 8×8 bitmap font on a semi-opaque box so it stays legible
//! on any background, and always onto a copy of the frame.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use exif::{In, Reader as ExifReader, Tag, Value};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{DynamicImage, ImageBuffer, Pixel, Primitive};

/// Which text, if any, is drawn on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverlayKind {
    /// No overlay.
    #[default]
    None,
    /// Capture date of the source image.
    Date,
    /// Zero-padded frame number.
    Frame,
}

impl OverlayKind {
    /// Short name used in output file names, `None` for no overlay.
    pub fn name(self) -> Option<&'static str> {
        match self {
            OverlayKind::None => None,
            OverlayKind::Date => Some("date"),
            OverlayKind::Frame => Some("frame"),
        }
    }
}

/// Whether the overlay is drawn on the source image or on the transformed
/// output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayPlacement {
    /// Draw on the original framing, then crop/scale (text may be cropped
    /// away or resized with the image).
    BeforeTransform,
    /// Crop/scale first, then draw on the final frame.
    #[default]
    AfterTransform,
}

/// Corner the overlay box is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayAnchor {
    /// Top-left corner.
    TopLeft,
    /// Top-right corner.
    TopRight,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom-right corner.
    #[default]
    BottomRight,
}

/// Where a date overlay's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// EXIF `DateTimeOriginal` or `DateTime`.
    Exif,
    /// The file's last-modified time.
    Modified,
    /// Neither was available; the current time was used.
    Now,
}

/// A capture timestamp plus its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDate {
    /// Local wall-clock time.
    pub value: NaiveDateTime,
    /// Where the value was read from.
    pub source: DateSource,
}

impl Display for CaptureDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format_capture_date(&self.value))
    }
}

/// Read the capture date of an image.
///
/// Tries EXIF `DateTimeOriginal`, then `DateTime`, then the file's
/// modification time. Never fails: if even the file metadata is unreadable
/// the current time is returned.
pub fn capture_date(path: &Path) -> CaptureDate {
    if let Some(value) = exif_capture_date(path) {
        return CaptureDate {
            value,
            source: DateSource::Exif,
        };
    }

    match fs::metadata(path).and_then(|metadata| metadata.modified()) {
        Ok(modified) => {
            log::debug!("No EXIF date in {:?}, using modification time", path);
            CaptureDate {
                value: DateTime::<Local>::from(modified).naive_local(),
                source: DateSource::Modified,
            }
        }
        Err(error) => {
            log::warn!("No date available for {:?} ({error}), using current time", path);
            CaptureDate {
                value: Local::now().naive_local(),
                source: DateSource::Now,
            }
        }
    }
}

fn exif_capture_date(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = ExifReader::new().read_from_container(&mut reader).ok()?;

    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .find_map(|field| match &field.value {
            Value::Ascii(values) => values
                .first()
                .and_then(|raw| parse_capture_date(&String::from_utf8_lossy(raw))),
            _ => None,
        })
}

/// Parse the date formats found in camera metadata.
///
/// Accepts `YYYY:MM:DD HH:MM:SS` (the EXIF form), dashed and `T`-separated
/// variants, trailing timezone offsets and date-only values.
pub fn parse_capture_date(text: &str) -> Option<NaiveDateTime> {
    const DATE_TIME_FORMATS: [&str; 3] = ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    const ZONED_FORMATS: [&str; 2] = ["%Y:%m:%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"];
    const DATE_FORMATS: [&str; 2] = ["%Y:%m:%d", "%Y-%m-%d"];

    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if text.is_empty() {
        return None;
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            ZONED_FORMATS.iter().find_map(|format| {
                DateTime::parse_from_str(text, format)
                    .ok()
                    .map(|zoned| zoned.naive_local())
            })
        })
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
        .or_else(|| {
            // Unrecognised suffix (e.g. "+02" without minutes): retry on the
            // leading date-time.
            let head = text.get(..19)?;
            (head.len() < text.len()).then_some(())?;
            DATE_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(head, format).ok())
        })
}

/// Format a timestamp for display, e.g. `Monday, January 01, 2024 12:00PM`.
pub fn format_capture_date(value: &NaiveDateTime) -> String {
    value.format("%A, %B %d, %Y %I:%M%p").to_string()
}

/// Zero-padded 1-based frame number, as wide as the sequence length.
///
/// ```
/// assert_eq!(sisr::frame_label(1, 250), "001");
/// assert_eq!(sisr::frame_label(250, 250), "250");
/// assert_eq!(sisr::frame_label(7, 9), "7");
/// ```
pub fn frame_label(position: usize, total: usize) -> String {
    let width = total.max(1).to_string().len();
    format!("{position:0width$}")
}

const GLYPH_SIZE: u32 = 8;
const BOX_ALPHA: u16 = 128;

/// Draws text onto frames with a fixed glyph scale.
///
/// The scale is fixed for a run (see [`TextOverlay::for_frame_height`]) so
/// every frame carries identically sized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextOverlay {
    /// Integer magnification of the 8×8 glyphs.
    pub scale: u32,
    /// Corner the text box is anchored to.
    pub anchor: OverlayAnchor,
}

impl TextOverlay {
    /// Glyph scale for frames of the given height: roughly 3% of the
    /// height, never below 1.
    pub fn for_frame_height(height: u32, anchor: OverlayAnchor) -> Self {
        Self {
            scale: (height / 270).max(1),
            anchor,
        }
    }

    fn padding(&self) -> u32 {
        2 * self.scale
    }

    fn margin(&self) -> u32 {
        4 * self.scale
    }

    /// Size of the background box for `text`.
    pub fn box_size(&self, text: &str) -> (u32, u32) {
        let glyph = GLYPH_SIZE * self.scale;
        let columns = text.chars().count() as u32;
        (
            columns * glyph + 2 * self.padding(),
            glyph + 2 * self.padding(),
        )
    }

    /// Top-left corner of the box inside a `width`×`height` frame.
    fn box_origin(&self, width: u32, height: u32, text: &str) -> (u32, u32) {
        let (box_width, box_height) = self.box_size(text);
        let margin = self.margin();
        let right = width.saturating_sub(box_width + margin);
        let bottom = height.saturating_sub(box_height + margin);
        match self.anchor {
            OverlayAnchor::TopLeft => (margin.min(right), margin.min(bottom)),
            OverlayAnchor::TopRight => (right, margin.min(bottom)),
            OverlayAnchor::BottomLeft => (margin.min(right), bottom),
            OverlayAnchor::BottomRight => (right, bottom),
        }
    }

    /// Draw `text` onto a copy of `image`.
    ///
    /// The copy keeps the source's color type, so alpha and 16-bit samples
    /// survive the overlay.
    pub fn render(&self, image: &DynamicImage, text: &str) -> DynamicImage {
        let mut canvas = image.clone();
        let stamp = self.stamp(canvas.width(), canvas.height(), text);

        match &mut canvas {
            DynamicImage::ImageLuma8(buffer) => {
                stamp.paint(buffer, 1, false, dim_u8, cover_u8, u8::MAX)
            }
            DynamicImage::ImageLumaA8(buffer) => {
                stamp.paint(buffer, 2, true, dim_u8, cover_u8, u8::MAX)
            }
            DynamicImage::ImageRgb8(buffer) => {
                stamp.paint(buffer, 3, false, dim_u8, cover_u8, u8::MAX)
            }
            DynamicImage::ImageRgba8(buffer) => {
                stamp.paint(buffer, 4, true, dim_u8, cover_u8, u8::MAX)
            }
            DynamicImage::ImageLuma16(buffer) => {
                stamp.paint(buffer, 1, false, dim_u16, cover_u16, u16::MAX)
            }
            DynamicImage::ImageLumaA16(buffer) => {
                stamp.paint(buffer, 2, true, dim_u16, cover_u16, u16::MAX)
            }
            DynamicImage::ImageRgb16(buffer) => {
                stamp.paint(buffer, 3, false, dim_u16, cover_u16, u16::MAX)
            }
            DynamicImage::ImageRgba16(buffer) => {
                stamp.paint(buffer, 4, true, dim_u16, cover_u16, u16::MAX)
            }
            DynamicImage::ImageRgb32F(buffer) => {
                stamp.paint(buffer, 3, false, dim_f32, cover_f32, 1.0)
            }
            DynamicImage::ImageRgba32F(buffer) => {
                stamp.paint(buffer, 4, true, dim_f32, cover_f32, 1.0)
            }
            _ => {
                let mut buffer = image.to_rgba8();
                stamp.paint(&mut buffer, 4, true, dim_u8, cover_u8, u8::MAX);
                return DynamicImage::ImageRgba8(buffer);
            }
        }

        canvas
    }

    /// Lay out the box and glyph pixels for `text` in a `width`×`height`
    /// frame.
    fn stamp(&self, width: u32, height: u32, text: &str) -> Stamp {
        let (x, y) = self.box_origin(width, height, text);
        let (box_width, box_height) = self.box_size(text);
        let mut stamp = Stamp {
            x,
            y,
            width: box_width,
            height: box_height,
            ink: vec![false; (box_width * box_height) as usize],
        };

        let glyph = GLYPH_SIZE * self.scale;
        for (column, character) in text.chars().enumerate() {
            let bitmap = BASIC_FONTS
                .get(character)
                .or_else(|| BASIC_FONTS.get('?'))
                .unwrap_or([0; 8]);
            let origin_x = self.padding() + column as u32 * glyph;
            for (row, bits) in bitmap.iter().enumerate() {
                for bit in 0..GLYPH_SIZE {
                    // Bit 0 is the leftmost pixel.
                    if bits & (1 << bit) == 0 {
                        continue;
                    }
                    let x0 = origin_x + bit * self.scale;
                    let y0 = self.padding() + row as u32 * self.scale;
                    for dy in 0..self.scale {
                        for dx in 0..self.scale {
                            stamp.ink[((y0 + dy) * box_width + x0 + dx) as usize] = true;
                        }
                    }
                }
            }
        }

        stamp
    }
}

/// The text box of one overlay, positioned in frame coordinates.
struct Stamp {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    /// Row-major glyph coverage inside the box.
    ink: Vec<bool>,
}

impl Stamp {
    /// Darken the box and draw the glyphs in full intensity, clipped to the
    /// frame. `channels` counts the alpha channel, which is always last.
    fn paint<P, T>(
        &self,
        buffer: &mut ImageBuffer<P, Vec<T>>,
        channels: usize,
        has_alpha: bool,
        dim: fn(T) -> T,
        cover: fn(T) -> T,
        full: T,
    ) where
        P: Pixel<Subpixel = T>,
        T: Primitive,
    {
        let (frame_width, frame_height) = buffer.dimensions();
        let color_channels = if has_alpha { channels - 1 } else { channels };
        let samples: &mut [T] = buffer;

        for py in self.y..(self.y + self.height).min(frame_height) {
            for px in self.x..(self.x + self.width).min(frame_width) {
                let inked = self.ink[((py - self.y) * self.width + px - self.x) as usize];
                let start = (py as usize * frame_width as usize + px as usize) * channels;
                let pixel = &mut samples[start..start + channels];
                for sample in &mut pixel[..color_channels] {
                    *sample = if inked { full } else { dim(*sample) };
                }
                if has_alpha {
                    let alpha = &mut pixel[color_channels];
                    *alpha = if inked { full } else { cover(*alpha) };
                }
            }
        }
    }
}

// Compositing black at BOX_ALPHA: color samples are scaled down, alpha is
// pulled towards opaque.

fn dim_u8(sample: u8) -> u8 {
    ((u16::from(sample) * (255 - BOX_ALPHA)) / 255) as u8
}

fn cover_u8(alpha: u8) -> u8 {
    let alpha = u16::from(alpha);
    (alpha + ((255 - alpha) * BOX_ALPHA) / 255) as u8
}

fn dim_u16(sample: u16) -> u16 {
    ((u32::from(sample) * u32::from(255 - BOX_ALPHA)) / 255) as u16
}

fn cover_u16(alpha: u16) -> u16 {
    let alpha = u32::from(alpha);
    (alpha + ((u32::from(u16::MAX) - alpha) * u32::from(BOX_ALPHA)) / 255) as u16
}

fn dim_f32(sample: f32) -> f32 {
    sample * f32::from(255 - BOX_ALPHA) / 255.0
}

fn cover_f32(alpha: f32) -> f32 {
    alpha + (1.0 - alpha) * f32::from(BOX_ALPHA) / 255.0
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Cursor, Write};

    use image::{ImageFormat, Rgb, RgbImage, Rgba};

    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    /// Little-endian TIFF block with IFD0 `DateTime` and an Exif IFD holding
    /// `DateTimeOriginal`, each only when given.
    fn exif_block(date_time: Option<&str>, original: Option<&str>) -> Vec<u8> {
        fn entry(tag: u16, kind: u16, count: u32, value: u32) -> Vec<u8> {
            let mut bytes = Vec::with_capacity(12);
            bytes.extend_from_slice(&tag.to_le_bytes());
            bytes.extend_from_slice(&kind.to_le_bytes());
            bytes.extend_from_slice(&count.to_le_bytes());
            bytes.extend_from_slice(&value.to_le_bytes());
            bytes
        }
        const ASCII: u16 = 2;
        const LONG: u16 = 4;

        let ifd0_entries = usize::from(date_time.is_some()) + usize::from(original.is_some());
        let exif_ifd_at = 8 + 2 + 12 * ifd0_entries + 4;
        let mut data_at = exif_ifd_at + if original.is_some() { 2 + 12 + 4 } else { 0 };

        let mut ifd0 = (ifd0_entries as u16).to_le_bytes().to_vec();
        let mut exif_ifd = Vec::new();
        let mut data = Vec::new();

        if let Some(value) = date_time {
            ifd0.extend(entry(0x0132, ASCII, value.len() as u32 + 1, data_at as u32));
            data.extend_from_slice(value.as_bytes());
            data.push(0);
            data_at += value.len() + 1;
        }
        if let Some(value) = original {
            ifd0.extend(entry(0x8769, LONG, 1, exif_ifd_at as u32));
            exif_ifd.extend_from_slice(&1u16.to_le_bytes());
            exif_ifd.extend(entry(0x9003, ASCII, value.len() as u32 + 1, data_at as u32));
            exif_ifd.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        ifd0.extend_from_slice(&0u32.to_le_bytes());

        let mut tiff = b"II*\0".to_vec();
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend(ifd0);
        tiff.extend(exif_ifd);
        tiff.extend(data);
        tiff
    }

    /// Write a JPEG with an APP1 Exif segment spliced in after SOI.
    fn write_jpeg_with_exif(path: &Path, tiff: &[u8]) {
        let mut jpeg = Cursor::new(Vec::new());
        RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]))
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .unwrap();
        let jpeg = jpeg.into_inner();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let mut bytes = jpeg[..2].to_vec();
        bytes.extend_from_slice(&[0xFF, 0xE1]);
        bytes.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        bytes.extend_from_slice(b"Exif\0\0");
        bytes.extend_from_slice(tiff);
        bytes.extend_from_slice(&jpeg[2..]);
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn frame_labels_pad_to_sequence_length() {
        assert_eq!(frame_label(1, 250), "001");
        assert_eq!(frame_label(250, 250), "250");
        assert_eq!(frame_label(42, 9999), "0042");
        assert_eq!(frame_label(1, 10_000), "00001");
        assert_eq!(frame_label(1, 0), "1");
    }

    #[test]
    fn parses_exif_and_variant_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(parse_capture_date("2024:03:09 14:05:00"), Some(expected));
        assert_eq!(parse_capture_date("2024-03-09 14:05:00"), Some(expected));
        assert_eq!(parse_capture_date("2024:03:09 14:05:00\0"), Some(expected));
        assert_eq!(parse_capture_date("2024:03:09 14:05:00+0200"), Some(expected));
        assert_eq!(parse_capture_date("2024:03:09 14:05:00+02"), Some(expected));
        assert_eq!(
            parse_capture_date("2024:03:09"),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_capture_date("    "), None);
        assert_eq!(parse_capture_date("not a date"), None);
    }

    #[test]
    fn formats_dates_like_a_caption() {
        let value = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(format_capture_date(&value), "Monday, January 01, 2024 12:00PM");
    }

    #[test]
    fn missing_exif_falls_back_to_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(&path).unwrap();

        let date = capture_date(&path);
        assert_eq!(date.source, DateSource::Modified);

        let junk = dir.path().join("junk.jpg");
        File::create(&junk).unwrap().write_all(b"not an image").unwrap();
        assert_eq!(capture_date(&junk).source, DateSource::Modified);
    }

    #[test]
    fn exif_date_time_is_read_from_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        write_jpeg_with_exif(&path, &exif_block(Some("2021:06:05 07:08:09"), None));

        let date = capture_date(&path);
        assert_eq!(date.source, DateSource::Exif);
        assert_eq!(date.to_string(), "Saturday, June 05, 2021 07:08AM");
    }

    #[test]
    fn exif_date_time_original_wins_over_date_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        write_jpeg_with_exif(
            &path,
            &exif_block(Some("2021:06:05 07:08:09"), Some("2019:12:31 23:59:00")),
        );

        let date = capture_date(&path);
        assert_eq!(date.source, DateSource::Exif);
        assert_eq!(
            date.value,
            NaiveDate::from_ymd_opt(2019, 12, 31)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap()
        );
    }

    #[test]
    fn render_keeps_alpha_and_sixteen_bit_samples() {
        let source = DynamicImage::ImageRgba16(ImageBuffer::from_pixel(
            320,
            240,
            Rgba([40_000u16, 40_000, 40_000, 0]),
        ));
        let overlay = TextOverlay::for_frame_height(240, OverlayAnchor::BottomRight);
        let out = overlay.render(&source, "7");

        let out = out.as_rgba16().expect("16-bit RGBA output");
        let (box_width, box_height) = overlay.box_size("7");
        let box_x = 320 - box_width - overlay.margin();
        let box_y = 240 - box_height - overlay.margin();
        assert_eq!(out.get_pixel(0, 0), &Rgba([40_000, 40_000, 40_000, 0]));
        assert_eq!(out.get_pixel(box_x, box_y), &Rgba([19_921, 19_921, 19_921, 32_896]));
        let opaque_white = (box_x..box_x + box_width)
            .flat_map(|x| (box_y..box_y + box_height).map(move |y| (x, y)))
            .filter(|&(x, y)| out.get_pixel(x, y) == &Rgba([u16::MAX; 4]))
            .count();
        assert!(opaque_white > 0);
    }

    #[test]
    fn render_draws_on_a_copy() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([200, 200, 200])));
        let overlay = TextOverlay::for_frame_height(240, OverlayAnchor::BottomRight);
        let out = overlay.render(&source, "001");

        assert_eq!(source.to_rgb8().get_pixel(319, 239), &Rgb([200, 200, 200]));
        assert_eq!((out.width(), out.height()), (320, 240));

        let out = out.to_rgb8();
        let (box_width, box_height) = overlay.box_size("001");
        let box_x = 320 - box_width - overlay.margin();
        let box_y = 240 - box_height - overlay.margin();
        // Box padding is darkened, the rest of the frame is untouched.
        assert_eq!(out.get_pixel(box_x, box_y), &Rgb([99, 99, 99]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([200, 200, 200]));
        // Some glyph pixels are white.
        let white = (box_x..box_x + box_width)
            .flat_map(|x| (box_y..box_y + box_height).map(move |y| (x, y)))
            .filter(|&(x, y)| out.get_pixel(x, y) == &WHITE)
            .count();
        assert!(white > 0);
    }

    #[test]
    fn render_clips_text_wider_than_the_frame() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([0, 0, 0])));
        let overlay = TextOverlay::for_frame_height(20, OverlayAnchor::TopLeft);
        let out = overlay.render(&source, "Monday, January 01, 2024 12:00PM");
        assert_eq!((out.width(), out.height()), (40, 20));
    }

    #[test]
    fn anchors_place_box_in_the_requested_corner() {
        let text = "12";
        let bottom_right = TextOverlay::for_frame_height(1080, OverlayAnchor::BottomRight);
        let top_left = TextOverlay {
            anchor: OverlayAnchor::TopLeft,
            ..bottom_right
        };
        let (box_width, box_height) = bottom_right.box_size(text);
        assert_eq!(bottom_right.scale, 4);
        assert_eq!(
            bottom_right.box_origin(1920, 1080, text),
            (1920 - box_width - 16, 1080 - box_height - 16)
        );
        assert_eq!(top_left.box_origin(1920, 1080, text), (16, 16));
    }
}
