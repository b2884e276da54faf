use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qtar::grid::Grid;
use qtar::prelude::*;
use qtar::{raster, util, Homogeneity};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Embed {
    /// The container image.
    #[clap(action)]
    container: PathBuf,

    /// The secret image to hide.
    #[clap(action)]
    secret: PathBuf,

    /// Where to write the stego image.
    #[clap(default_value = "stego.png", value_parser, long, short)]
    output: PathBuf,

    /// Where to write the key.
    #[clap(default_value = "stego.key", value_parser, long, short)]
    key: PathBuf,

    /// JSON file with the embedding parameters, flags take precedence.
    #[clap(value_parser, long)]
    config: Option<PathBuf>,

    /// Homogeneity threshold, or a comma separated list of per-band thresholds.
    #[clap(value_parser, long)]
    homogeneity: Option<String>,

    #[clap(value_parser, long)]
    min_block_size: Option<usize>,

    #[clap(value_parser, long)]
    max_block_size: Option<usize>,

    #[clap(value_parser, long)]
    quant_power: Option<f32>,

    #[clap(value_parser, long)]
    channel_scale: Option<f32>,

    #[clap(value_parser, long, allow_hyphen_values = true)]
    offset_x: Option<i32>,

    #[clap(value_parser, long, allow_hyphen_values = true)]
    offset_y: Option<i32>,

    /// Use curve-fit regions on this grid size.
    #[clap(value_parser, long)]
    curve_fit_grid: Option<usize>,

    /// Permute the container before partitioning.
    #[clap(action, long)]
    permutation: bool,

    /// Transform the secret in tiles of this size before embedding.
    #[clap(value_parser, long)]
    payload_dct_block_size: Option<usize>,

    #[clap(value_parser, long)]
    payload_dct_scale: Option<f32>,

    /// Resize the secret to the largest square the container can carry.
    #[clap(action, long)]
    fit: bool,

    /// Directory to write the intermediate stages to.
    #[clap(value_parser, long)]
    stages: Option<PathBuf>,
}

#[derive(Args)]
struct Extract {
    /// The stego image.
    #[clap(action)]
    stego: PathBuf,

    /// The key written when embedding.
    #[clap(action)]
    key: PathBuf,

    /// Where to write the recovered secret image.
    #[clap(default_value = "secret.png", value_parser, long, short)]
    output: PathBuf,
}

#[derive(Args)]
struct KeyInfo {
    /// The key to describe.
    #[clap(action)]
    key: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Hide a secret image in a container image.
    Embed(Embed),
    /// Recover a secret image from a stego image and its key.
    Extract(Extract),
    /// Print the parameters and section sizes of a key.
    KeyInfo(KeyInfo),
}

/// Errors that can be emitted while handling the CLI
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("could not read the configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Qtar(#[from] QtarError),

    #[error("invalid homogeneity `{0}`, expected a number or a comma separated list")]
    Homogeneity(String),
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        AppError::Qtar(err.into())
    }
}

fn parse_homogeneity(text: &str) -> Result<Homogeneity, AppError> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AppError::Homogeneity(text.to_owned()))?;
    match values.as_slice() {
        [single] => Ok(Homogeneity::Uniform(*single)),
        _ => Ok(Homogeneity::Banded(values)),
    }
}

fn embed_config(args: &Embed) -> Result<EmbedConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => EmbedConfig::default(),
    };
    if let Some(h) = &args.homogeneity {
        config.homogeneity = parse_homogeneity(h)?;
    }
    if let Some(v) = args.min_block_size {
        config.min_block_size = v;
    }
    if let Some(v) = args.max_block_size {
        config.max_block_size = v;
    }
    if let Some(v) = args.quant_power {
        config.quant_power = v;
    }
    if let Some(v) = args.channel_scale {
        config.channel_scale = v;
    }
    if let Some(v) = args.offset_x {
        config.offset.0 = v;
    }
    if let Some(v) = args.offset_y {
        config.offset.1 = v;
    }
    if let Some(v) = args.curve_fit_grid {
        config.curve_fit_grid = v;
    }
    if args.permutation {
        config.permutation = true;
    }
    if let Some(v) = args.payload_dct_block_size {
        config.payload_dct_block_size = v;
    }
    if let Some(v) = args.payload_dct_scale {
        config.payload_dct_scale = v;
    }
    Ok(config)
}

fn write_stages(dir: &Path, container: &Container, channels: &[image::GrayImage]) -> Result<(), AppError> {
    fs::create_dir_all(dir)?;
    let side = container.side();
    for (index, (analysis, channel)) in container.channels().iter().zip(channels).enumerate() {
        let partition: image::GrayImage = match analysis.permutation() {
            Some(p) => p.apply(&Grid::from(channel)).into(),
            None => channel.clone(),
        };
        util::draw_borders(&partition, analysis.tree().leaves(), 255)
            .save(dir.join(format!("{index}-1-quadtree.png")))?;
        util::coefficient_image(analysis.coefficients())
            .save(dir.join(format!("{index}-2-dct.png")))?;
        util::region_mask(analysis.regions(), side, side)
            .save(dir.join(format!("{index}-3-adaptive-regions.png")))?;
    }
    Ok(())
}

fn handle_embed(args: Embed) -> Result<(), AppError> {
    let config = embed_config(&args)?;
    let tile = config.payload_dct_block_size;
    let embedder = Embedder::new(config)?;

    let container_image = raster::fit_container(&image::open(&args.container)?);
    let channels = raster::split_channels(&container_image);
    let offset = embedder.config().offset;
    let container = embedder.prepare(&channels)?;
    info!(
        side = container.side(),
        capacity = container.capacity(),
        "container prepared"
    );

    if let Some(dir) = &args.stages {
        let rolled = channels
            .iter()
            .map(|c| {
                Grid::from(c)
                    .rolled(offset.0 as i64, offset.1 as i64)
                    .into()
            })
            .collect::<Vec<image::GrayImage>>();
        write_stages(dir, &container, &rolled)?;
    }

    let mut secret_image = image::open(&args.secret)?;
    if args.fit {
        let side = raster::fitting_secret_side(container.capacity(), tile);
        secret_image = secret_image.resize_exact(side, side, image::imageops::FilterType::Triangle);
    }
    let secret = raster::split_channels_as(&secret_image, channels.len());

    let result = container.embed(&secret)?;
    for warning in result.warnings.iter() {
        eprintln!("Warning: {warning}");
    }
    raster::merge_channels(&result.stego)?.save(&args.output)?;
    fs::write(&args.key, result.key.to_bytes()?)?;
    println!("bpp: {:.4}", result.bpp);
    println!("psnr: {:.2} dB", util::psnr(&channels, &result.stego)?);
    Ok(())
}

fn handle_extract(args: Extract) -> Result<(), AppError> {
    let key = Key::from_bytes(&fs::read(&args.key)?)?;
    let stego = raster::split_channels_as(&image::open(&args.stego)?, key.channels.len());
    let secret = extract(&stego, &key)?;
    raster::merge_channels(&secret)?.save(&args.output)?;
    Ok(())
}

fn handle_key_info(args: KeyInfo) -> Result<(), AppError> {
    let key = Key::from_bytes(&fs::read(&args.key)?)?;
    let size = key.size_info();
    println!("modes: {:?}", key.modes);
    println!("scale: {}", key.scale);
    println!("curve fit grid: {}", key.curve_fit_grid);
    println!("offset: {:?}", key.offset);
    println!("secret: {}x{}", key.secret_shape.0, key.secret_shape.1);
    println!("payload block size: {}", key.payload_block_size);
    println!("container: {}x{}", key.container_shape.0, key.container_shape.1);
    println!("channels: {}", key.channels.len());
    println!("size: {} bytes", size.total);
    println!("  header: {}", size.header);
    println!("  quadtree keys: {}", size.quadtree);
    println!("  region keys: {}", size.regions);
    println!("  diff-fix keys: {}", size.diff_fix);
    Ok(())
}

fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Embed(v) => handle_embed(v),
        Commands::Extract(v) => handle_extract(v),
        Commands::KeyInfo(v) => handle_key_info(v),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
