//! Criterion microbenches for response parsing and box rendering.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - Parsing a clean JSON response (parse_response)
//! - Parsing a fenced response surrounded by prose
//! - The line-oriented fallback for prose-only answers
//! - Rendering a batch of boxes onto a 1080p frame (BoxRenderer::render)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use boxsight::color::ColorPalette;
use boxsight::parse::parse_response;
use boxsight::render::BoxRenderer;
use image::{DynamicImage, Rgb, RgbImage};

fn json_response(count: usize) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| {
            let x = (i * 37) % 1800;
            let y = (i * 53) % 1000;
            format!(
                r#"{{"label":"object-{i}","confidence":0.{:02},"box":[{x},{y},{},{}]}}"#,
                i % 100,
                x + 80,
                y + 60
            )
        })
        .collect();
    format!("[{}]", items.join(","))
}

fn prose_response(count: usize) -> String {
    (0..count)
        .map(|i| format!("{}. widget {}% [{}, {}, {}, {}]\n", i + 1, i % 100, i, i, i + 40, i + 30))
        .collect()
}

/// Benchmark parsing of clean and wrapped JSON.
fn bench_parse_json(c: &mut Criterion) {
    let clean = json_response(50);
    let fenced = format!("Here are the detections:\n```json\n{clean}\n```\nLet me know!");

    let mut group = c.benchmark_group("parse_response");
    group.throughput(Throughput::Bytes(clean.len() as u64));

    group.bench_function("clean_json", |b| {
        b.iter(|| {
            let mut palette = ColorPalette::seeded(0);
            black_box(parse_response(black_box(&clean), 1920, 1080, &mut palette))
        })
    });

    group.bench_function("fenced_json", |b| {
        b.iter(|| {
            let mut palette = ColorPalette::seeded(0);
            black_box(parse_response(black_box(&fenced), 1920, 1080, &mut palette))
        })
    });

    group.finish();
}

/// Benchmark the textual fallback.
fn bench_parse_prose(c: &mut Criterion) {
    let prose = prose_response(50);
    let mut group = c.benchmark_group("parse_response");
    group.throughput(Throughput::Bytes(prose.len() as u64));

    group.bench_function("textual_fallback", |b| {
        b.iter(|| {
            let mut palette = ColorPalette::seeded(0);
            black_box(parse_response(black_box(&prose), 1920, 1080, &mut palette))
        })
    });

    group.finish();
}

/// Benchmark drawing 50 boxes (no font, so only outlines and caption tabs).
fn bench_render(c: &mut Criterion) {
    let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(1920, 1080, Rgb([40, 40, 40])));
    let mut palette = ColorPalette::seeded(0);
    let detections = parse_response(&json_response(50), 1920, 1080, &mut palette)
        .detections()
        .to_vec();
    let renderer = BoxRenderer::without_font();

    c.bench_function("render_50_boxes_1080p", |b| {
        b.iter(|| {
            let rendered = renderer.render(black_box(&frame), &detections).unwrap();
            black_box(rendered)
        })
    });
}

criterion_group!(benches, bench_parse_json, bench_parse_prose, bench_render);
criterion_main!(benches);
