use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use tamper_detect::{SignatureKey, copy_move, detect_differences, noise_residual};

fn textured(width: u32, height: u32) -> RgbImage {
    let mut seed = 7u32;
    RgbImage::from_fn(width, height, |_, _| {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let v = (seed >> 24) as u8;
        Rgb([v, v.wrapping_add(40), v / 2])
    })
}

fn bench_difference(c: &mut Criterion) {
    let original = textured(512, 512);
    let mut suspect = original.clone();
    for y in 200..260 {
        for x in 300..380 {
            suspect.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    let key = SignatureKey::new("bench");

    c.bench_function("difference 512x512", |b| {
        b.iter(|| detect_differences(black_box(&original), black_box(&suspect), &key, 50))
    });
}

fn bench_noise(c: &mut Criterion) {
    let image = textured(512, 512);
    c.bench_function("noise residual 512x512", |b| {
        b.iter(|| noise_residual(black_box(&image)))
    });
}

fn bench_copy_move(c: &mut Criterion) {
    let image = textured(256, 256);
    c.bench_function("copy-move 256x256", |b| b.iter(|| copy_move(black_box(&image))));
}

criterion_group!(benches, bench_difference, bench_noise, bench_copy_move);
criterion_main!(benches);
