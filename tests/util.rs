#![allow(dead_code)]
use image::{GrayImage, Luma};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

pub fn generate_fixed_normal_sequence(seed: u64, length: usize, sigma: f32) -> Vec<f32> {
    let mut generator = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, sigma).expect("sigma is positive");
    let mut data = Vec::with_capacity(length);
    data.resize_with(length, || generator.sample(normal));
    data
}

/// Smooth gradient with a slow ripple and a little noise, kept within 40..=215.
pub fn container_channel(seed: u64, side: u32) -> GrayImage {
    let noise = generate_fixed_normal_sequence(seed, (side * side) as usize, 1.5);
    let phase = (seed % 7) as f32;
    GrayImage::from_fn(side, side, |x, y| {
        let (fx, fy) = (x as f32 / side as f32, y as f32 / side as f32);
        let base = 70.0 + 60.0 * fx + 40.0 * fy + 15.0 * (6.0 * fx + 4.0 * fy + phase).sin();
        let v = base + noise[(y * side + x) as usize];
        Luma([v.round().clamp(40.0, 215.0) as u8])
    })
}

/// Container with a few flat patches and hard edges, so the quadtree splits unevenly.
pub fn patchy_channel(seed: u64, side: u32) -> GrayImage {
    let mut generator = ChaCha8Rng::seed_from_u64(seed);
    let patch = side / 4;
    let levels = (0..16)
        .map(|_| generator.gen_range(50u8..200))
        .collect::<Vec<_>>();
    let noise = generate_fixed_normal_sequence(seed + 1, (side * side) as usize, 1.0);
    GrayImage::from_fn(side, side, |x, y| {
        let level = levels[((y / patch) * 4 + x / patch) as usize] as f32;
        let v = level + noise[(y * side + x) as usize];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Secret image content covering the full 8 bit range.
pub fn secret_channel(seed: u64, side: u32) -> GrayImage {
    let noise = generate_fixed_normal_sequence(seed, (side * side) as usize, 8.0);
    GrayImage::from_fn(side, side, |x, y| {
        let v = 255.0 * (x + y) as f32 / (2 * side - 2).max(1) as f32 + noise[(y * side + x) as usize];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

pub fn mean_abs_error(a: &GrayImage, b: &GrayImage) -> f32 {
    assert_eq!(a.dimensions(), b.dimensions());
    let total: f32 = a
        .pixels()
        .zip(b.pixels())
        .map(|(p, q)| (p[0] as f32 - q[0] as f32).abs())
        .sum();
    total / (a.width() * a.height()) as f32
}

pub fn rgb_container(seed: u64, side: u32) -> Vec<GrayImage> {
    (0..3).map(|c| container_channel(seed + c, side)).collect()
}

pub fn rgb_secret(seed: u64, side: u32) -> Vec<GrayImage> {
    (0..3).map(|c| secret_channel(seed + c, side)).collect()
}
