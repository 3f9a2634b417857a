//! Benchmarks for the frame transform, overlay and full render path.
//!
//! Run with: cargo bench
//! Run with parallel rendering: cargo bench --features rayon
//!
//! The full render benchmark uses a no-op encoder, so no `ffmpeg` binary is
//! needed.

use std::path::Path;

use criterion::{BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use sisr::{
    CropAlignment, CropPreset, EncodeContext, EncodeOutput, EncodeRequest, Encoder, Geometry,
    OverlayAnchor, OverlayKind, RenderError, RenderOptions, Renderer, TextOverlay,
};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

struct DiscardEncoder;

impl Encoder for DiscardEncoder {
    fn encode(
        &self,
        request: &EncodeRequest,
        _context: &EncodeContext,
    ) -> Result<EncodeOutput, RenderError> {
        std::fs::write(&request.output, b"discarded")?;
        Ok(EncodeOutput {
            path: request.output.clone(),
            diagnostics: String::new(),
        })
    }
}

fn write_sequence(dir: &Path, count: u32, width: u32, height: u32) {
    let image = gradient(width, height);
    for index in 1..=count {
        image
            .save(dir.join(format!("img_{index:04}.png")))
            .unwrap();
    }
}

fn benchmark_geometry(criterion: &mut Criterion) {
    let source = gradient(2400, 1800);
    let mut group = criterion.benchmark_group("geometry");

    for (name, geometry) in [
        (
            "hd_center",
            Geometry::Crop {
                preset: CropPreset::Hd,
                alignment: CropAlignment::Center,
            },
        ),
        (
            "vertical_keep_top",
            Geometry::Crop {
                preset: CropPreset::VerticalTall,
                alignment: CropAlignment::KeepTop,
            },
        ),
        (
            "fit_1280",
            Geometry::Fit {
                max_width: Some(1280),
                max_height: None,
            },
        ),
    ] {
        let plan = geometry.resolve(source.width(), source.height()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &plan, |bencher, plan| {
            bencher.iter(|| plan.apply(&source));
        });
    }

    group.finish();
}

fn benchmark_overlay(criterion: &mut Criterion) {
    let frame = gradient(1920, 1080);
    let overlay = TextOverlay::for_frame_height(1080, OverlayAnchor::BottomRight);

    criterion.bench_function("overlay date text (1080p)", |bencher| {
        bencher.iter(|| overlay.render(&frame, "Monday, January 01, 2024 12:00PM"));
    });
}

fn benchmark_render(criterion: &mut Criterion) {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_sequence(input.path(), 12, 1280, 960);

    let options = RenderOptions::new()
        .with_crop(CropPreset::Hd)
        .with_overlay(OverlayKind::Frame);
    let renderer = Renderer::new(options)
        .unwrap()
        .with_encoder(Box::new(DiscardEncoder));

    let mut group = criterion.benchmark_group("render");
    group.sample_size(10);
    group.bench_function("12 frames to hd with frame overlay", |bencher| {
        bencher.iter(|| {
            renderer
                .render(input.path(), output.path().join("bench.mp4"))
                .unwrap()
        });
    });
    group.finish();
}

criterion::criterion_group!(benches, benchmark_geometry, benchmark_overlay, benchmark_render);
criterion::criterion_main!(benches);
