use qtar::prelude::*;
use qtar::{raster, Homogeneity};

mod util;

/// Embed a secret sized to the container's capacity, then extract it through the serialized key.
fn run(config: EmbedConfig, seed: u64) -> (f32, u32, EmbedResult) {
    let container = util::rgb_container(seed, 128);
    let tile = config.payload_dct_block_size;

    let prepared = Embedder::new(config).unwrap().prepare(&container).unwrap();
    let side = raster::fitting_secret_side(prepared.capacity(), tile);
    assert!(side >= 16, "capacity {}", prepared.capacity());
    let secret = util::rgb_secret(seed + 10, side);

    let result = prepared.embed(&secret).unwrap();
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.stego.len(), 3);
    for (stego, original) in result.stego.iter().zip(container.iter()) {
        assert_eq!(stego.dimensions(), original.dimensions());
    }

    // Extraction works from the serialized key alone.
    let key = Key::from_bytes(&result.key.to_bytes().unwrap()).unwrap();
    let recovered = extract(&result.stego, &key).unwrap();
    assert_eq!(recovered.len(), 3);

    let error = recovered
        .iter()
        .zip(secret.iter())
        .map(|(r, s)| util::mean_abs_error(r, s))
        .sum::<f32>()
        / 3.0;
    (error, side, result)
}

#[test]
fn test_plain_rectangular() {
    let config = EmbedConfig {
        quant_power: 2.0,
        ..Default::default()
    };
    let (error, side, result) = run(config, 1);
    assert!(error < 25.0, "mean error {error}");
    let expected_bpp = 8.0 * (3 * side * side) as f32 / (128 * 128) as f32;
    assert!((result.bpp - expected_bpp).abs() < 1e-4);
    assert_eq!(result.key.modes, qtar::key::Modes::default());
}

#[test]
fn test_permutation() {
    let config = EmbedConfig {
        quant_power: 2.0,
        permutation: true,
        ..Default::default()
    };
    let (error, _, result) = run(config, 3);
    assert!(error < 25.0, "mean error {error}");
    assert!(result.key.channels.iter().all(|c| c.diff_fix.is_some()));
}

#[test]
fn test_curve_fit() {
    for grid in [8, 1] {
        let config = EmbedConfig {
            quant_power: 2.0,
            channel_scale: 16.0,
            curve_fit_grid: grid,
            ..Default::default()
        };
        let (error, _, result) = run(config, 2);
        assert!(error < 20.0, "grid {grid}: mean error {error}");
        assert!(result.key.modes.curve_fit);
        assert_eq!(result.key.curve_fit_grid as usize, grid);
    }
}

#[test]
fn test_permutation_with_curves_and_offset() {
    let config = EmbedConfig {
        quant_power: 2.0,
        channel_scale: 16.0,
        permutation: true,
        curve_fit_grid: 4,
        min_block_size: 4,
        max_block_size: 64,
        offset: (37, -5),
        homogeneity: Homogeneity::Banded(vec![0.2, 0.3, 0.4]),
        ..Default::default()
    };
    let (error, _, result) = run(config, 4);
    assert!(error < 20.0, "mean error {error}");
    assert_eq!(result.key.offset, (37, -5));
}

#[test]
fn test_payload_dct() {
    let config = EmbedConfig {
        quant_power: 2.0,
        payload_dct_block_size: 8,
        payload_dct_scale: 0.5,
        ..Default::default()
    };
    let (error, side, result) = run(config, 5);
    assert_eq!(side % 8, 0);
    assert!(error < 20.0, "mean error {error}");
    assert!(result.key.modes.payload_dct);
    assert_eq!(result.key.payload_block_size, 8);
    assert!((result.key.scale - 0.5).abs() < 1e-6);
}

#[test]
fn test_every_mode_combination() {
    for flags in 0..8u32 {
        let config = EmbedConfig {
            quant_power: 2.0,
            channel_scale: 16.0,
            permutation: flags & 1 != 0,
            curve_fit_grid: if flags & 2 != 0 { 8 } else { 0 },
            payload_dct_block_size: if flags & 4 != 0 { 8 } else { 0 },
            payload_dct_scale: 0.5,
            ..Default::default()
        };
        let (error, _, _) = run(config, 100 + flags as u64);
        assert!(error < 20.0, "flags {flags:03b}: mean error {error}");
    }
}

#[test]
fn test_grayscale_container() {
    let container = vec![util::container_channel(7, 64)];
    let config = EmbedConfig {
        quant_power: 2.0,
        channel_scale: 16.0,
        ..Default::default()
    };
    let prepared = Embedder::new(config).unwrap().prepare(&container).unwrap();
    let side = raster::fitting_secret_side(prepared.capacity(), 0);
    let secret = vec![util::secret_channel(8, side)];

    let result = prepared.embed(&secret).unwrap();
    let recovered = extract(&result.stego, &result.key).unwrap();
    assert_eq!(recovered[0].dimensions(), (side, side));
    let error = util::mean_abs_error(&recovered[0], &secret[0]);
    assert!(error < 20.0, "mean error {error}");
}

#[test]
fn test_stego_stays_close_to_container() {
    let container = util::rgb_container(11, 128);
    let config = EmbedConfig {
        quant_power: 2.0,
        ..Default::default()
    };
    let prepared = Embedder::new(config).unwrap().prepare(&container).unwrap();
    let side = raster::fitting_secret_side(prepared.capacity(), 0);
    let secret = util::rgb_secret(12, side);

    let result = prepared.embed(&secret).unwrap();
    let db = qtar::util::psnr(&container, &result.stego).unwrap();
    assert!(db > 30.0, "psnr {db} dB");
    assert!(db.is_finite());
}
