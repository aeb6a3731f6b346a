// Preprocessing benchmark - grayscale conversion, face normalization and cascade scan
//
// Run with: cargo bench --bench preprocessing_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use mood_tracker_common::image_io::rgb_to_gray;
use mood_tracker_emotion_detection::normalize;
use mood_tracker_face_detection::{BoundingBox, CascadeConfig, HaarCascade, HaarFaceDetector, IntegralImage};

const EDGE_CASCADE: &str = include_str!("../crates/face-detection/tests/fixtures/edge_cascade.xml");

fn test_image(size: u32) -> RgbImage {
    ImageBuffer::from_fn(size, size, |x, y| {
        Rgb([
            ((x + y) % 256) as u8,
            ((x * 2) % 256) as u8,
            ((y * 2) % 256) as u8,
        ])
    })
}

/// Grayscale conversion at camera-like resolutions
fn bench_grayscale(c: &mut Criterion) {
    let mut group = c.benchmark_group("grayscale");

    for (resolution, name) in [(320, "320x320"), (640, "640x640"), (1280, "1280x1280")] {
        let image = test_image(resolution);
        group.bench_with_input(BenchmarkId::new("bt601", name), &image, |b, img| {
            b.iter(|| black_box(rgb_to_gray(black_box(img))));
        });
    }

    group.finish();
}

/// Crop + resize to 48x48 + scale, for several face sizes
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let gray = rgb_to_gray(&test_image(640));

    for face in [48, 120, 300] {
        let bbox = BoundingBox::new(100, 100, face, face);
        group.bench_with_input(BenchmarkId::new("face", face), &bbox, |b, bbox| {
            b.iter(|| black_box(normalize(black_box(&gray), bbox)));
        });
    }

    group.finish();
}

/// Integral image construction and full multi-scale scan
fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade");
    let cascade = HaarCascade::from_xml_str(EDGE_CASCADE).expect("cascade parses");
    let detector =
        HaarFaceDetector::from_cascade(cascade, CascadeConfig::default()).expect("valid config");

    for (resolution, name) in [(320, "320x240"), (640, "640x480")] {
        let height = resolution * 3 / 4;
        let gray = GrayImage::from_fn(resolution, height, |x, _| {
            Luma([if x < resolution / 2 { 255 } else { 0 }])
        });

        group.bench_with_input(BenchmarkId::new("integral", name), &gray, |b, img| {
            b.iter(|| black_box(IntegralImage::new(black_box(img))));
        });
        group.bench_with_input(BenchmarkId::new("detect_multi_scale", name), &gray, |b, img| {
            b.iter(|| black_box(detector.detect_multi_scale(black_box(img))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grayscale, bench_normalize, bench_cascade);
criterion_main!(benches);
