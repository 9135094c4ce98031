use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nv12_mjpeg::config::{BackendKind, CodecConfig};
use nv12_mjpeg::utils::{get_file_size, get_time_ns};
use nv12_mjpeg::video::{
    alloc_nv12_buffer, decode_mjpeg_to_nv12_with, encode_nv12_to_mjpeg, mjpeg_file, pattern,
    read_nv12_from_file, write_nv12_to_file, Decoder, Encoder, Quality, Resolution, StatsCollector,
    StatsSummary,
};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Test pattern for `generate`
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum PatternKind {
    #[default]
    Gradient,
    Grey,
}

/// NV12 <-> MJPEG codec tool
#[derive(Parser, Debug)]
#[command(name = "nv12-mjpeg")]
#[command(version, about = "NV12 <-> MJPEG encoder/decoder and benchmark", long_about = None)]
struct CliArgs {
    /// Codec backend (rkmpp, turbo); overrides config and environment
    #[arg(short = 'b', long, global = true, value_name = "BACKEND")]
    backend: Option<BackendKind>,

    /// JSON codec configuration file
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct FrameArgs {
    /// Frame width in pixels
    #[arg(short = 'W', long, default_value_t = Resolution::UXGA.width)]
    width: u32,

    /// Frame height in pixels
    #[arg(short = 'H', long, default_value_t = Resolution::UXGA.height)]
    height: u32,
}

impl FrameArgs {
    fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode one raw NV12 frame into an MJPEG file
    Encode {
        /// Raw NV12 input (.yuv)
        input: PathBuf,
        /// MJPEG output
        output: PathBuf,
        #[command(flatten)]
        frame: FrameArgs,
        /// Quality 1-31, lower is better
        #[arg(short, long, default_value_t = Quality::HIGH.qp())]
        quality: i32,
    },
    /// Decode the first frame of an MJPEG file into raw NV12
    Decode {
        /// MJPEG input
        input: PathBuf,
        /// Raw NV12 output (.yuv)
        output: PathBuf,
        /// Decode every frame of a raw MJPEG stream, appending them to the output
        #[arg(short, long)]
        all: bool,
    },
    /// Time persistent-context encode and decode
    Bench {
        /// Raw NV12 input frame; a generated gradient when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        frame: FrameArgs,
        #[arg(short, long, default_value_t = Quality::HIGH.qp())]
        quality: i32,
        /// Timed iterations
        #[arg(short = 'n', long, default_value_t = 100)]
        iterations: u32,
        /// Untimed iterations run first
        #[arg(long, default_value_t = 5)]
        warmup: u32,
    },
    /// Encode a moving test pattern into one raw MJPEG stream
    Stream {
        output: PathBuf,
        #[command(flatten)]
        frame: FrameArgs,
        #[arg(short, long, default_value_t = Quality::HIGH.qp())]
        quality: i32,
        /// Number of frames
        #[arg(short = 'n', long, default_value_t = 100)]
        frames: u32,
    },
    /// Write a test pattern as a raw NV12 frame
    Generate {
        output: PathBuf,
        #[command(flatten)]
        frame: FrameArgs,
        #[arg(short, long, value_enum, default_value_t = PatternKind::Gradient)]
        pattern: PatternKind,
        /// Frame number (moves the gradient)
        #[arg(long, default_value_t = 0)]
        index: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    let config = load_config(&args)?;
    tracing::debug!("Codec config: {:?}", config);

    match args.command {
        Command::Encode {
            input,
            output,
            frame,
            quality,
        } => run_encode(&config, input, output, frame.resolution(), quality),
        Command::Decode { input, output, all } => {
            if all {
                run_decode_all(&config, input, output)
            } else {
                run_decode(&config, input, output)
            }
        }
        Command::Bench {
            input,
            frame,
            quality,
            iterations,
            warmup,
        } => run_bench(&config, input, frame.resolution(), quality, iterations, warmup),
        Command::Stream {
            output,
            frame,
            quality,
            frames,
        } => run_stream(&config, output, frame.resolution(), quality, frames),
        Command::Generate {
            output,
            frame,
            pattern: kind,
            index,
        } => run_generate(output, frame.resolution(), kind, index),
    }
}

fn load_config(args: &CliArgs) -> anyhow::Result<CodecConfig> {
    let mut config = match &args.config {
        Some(path) => CodecConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CodecConfig::from_env(),
    };
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    if !config.backend.is_compiled() {
        tracing::warn!(
            "Backend {} is not built into this binary (enable the `{}` feature)",
            config.backend,
            config.backend
        );
    }
    Ok(config)
}

fn run_encode(
    config: &CodecConfig,
    input: PathBuf,
    output: PathBuf,
    resolution: Resolution,
    quality: i32,
) -> anyhow::Result<()> {
    let mut nv12 = alloc_nv12_buffer(resolution)?;
    read_nv12_from_file(&input, &mut nv12, resolution)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let start = get_time_ns();
    let size = encode_nv12_to_mjpeg(&nv12, resolution, &output, quality, config)?;
    let elapsed_ms = (get_time_ns() - start) as f64 / 1_000_000.0;

    tracing::info!(
        "Encoded {} -> {} ({} bytes, {:.2}:1) in {:.3} ms",
        resolution,
        output.display(),
        size,
        nv12.len() as f64 / size.max(1) as f64,
        elapsed_ms
    );
    Ok(())
}

fn run_decode(config: &CodecConfig, input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let mut nv12 = Vec::new();
    let buffer = &mut nv12;

    let start = get_time_ns();
    let resolution = decode_mjpeg_to_nv12_with(&input, config, move |resolution| {
        let buffer: &mut Vec<u8> = buffer;
        buffer.resize(resolution.nv12_size(), 0);
        Ok(buffer.as_mut_slice())
    })
    .with_context(|| format!("Failed to decode {}", input.display()))?;
    let elapsed_ms = (get_time_ns() - start) as f64 / 1_000_000.0;

    write_nv12_to_file(&output, &nv12, resolution)?;
    tracing::info!(
        "Decoded {} ({} bytes) -> {} in {:.3} ms",
        resolution,
        get_file_size(&input)?,
        output.display(),
        elapsed_ms
    );
    Ok(())
}

fn run_decode_all(config: &CodecConfig, input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let data = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let mut decoder = Decoder::new(config)?;
    let mut writer = BufWriter::new(
        File::create(&output).with_context(|| format!("Failed to create {}", output.display()))?,
    );

    let start = get_time_ns();
    let mut count = 0u32;
    for jpeg in mjpeg_file::frames(&data) {
        let frame = decoder
            .decode(jpeg)
            .with_context(|| format!("Failed to decode frame {}", count))?;
        writer.write_all(&frame.data)?;
        count += 1;
    }
    writer.flush()?;
    let elapsed_ms = (get_time_ns() - start) as f64 / 1_000_000.0;

    if count == 0 {
        anyhow::bail!("No complete JPEG frame in {}", input.display());
    }
    tracing::info!(
        "Decoded {} frames ({}) -> {} in {:.3} ms",
        count,
        decoder
            .last_resolution()
            .map(|r| r.to_string())
            .unwrap_or_default(),
        output.display(),
        elapsed_ms
    );
    Ok(())
}

fn run_bench(
    config: &CodecConfig,
    input: Option<PathBuf>,
    resolution: Resolution,
    quality: i32,
    iterations: u32,
    warmup: u32,
) -> anyhow::Result<()> {
    let nv12 = match &input {
        Some(path) => {
            let mut nv12 = alloc_nv12_buffer(resolution)?;
            read_nv12_from_file(path, &mut nv12, resolution)?;
            nv12
        }
        None => pattern::gradient(resolution, 0),
    };

    let stats = Arc::new(StatsCollector::new());
    let mut encoder = Encoder::new(resolution, quality, config)?;
    let mut decoder = Decoder::new(config)?;

    let mut jpeg = vec![0u8; encoder.max_output_size()];
    let mut decoded = alloc_nv12_buffer(resolution)?;

    tracing::info!(
        "Benchmark {} q{} on {}/{}: {} iterations ({} warmup)",
        resolution,
        quality,
        encoder.backend_name(),
        decoder.backend_name(),
        iterations,
        warmup
    );

    encoder.set_observer(stats.clone());
    decoder.set_observer(stats.clone());
    let mut jpeg_size = 0;
    for i in 0..warmup + iterations {
        if i == warmup {
            stats.reset();
        }
        jpeg_size = encoder.encode_to_buffer(&nv12, &mut jpeg)?;
        decoder.decode_to_buffer(&jpeg[..jpeg_size], &mut decoded)?;
    }

    let encode = stats.encode_summary();
    print_summary("Encode", &encode);
    print_summary("Decode", &stats.decode_summary());
    println!(
        "Compression: {:.2}:1 ({} -> {} bytes)",
        encode.compression_ratio(),
        nv12.len(),
        jpeg_size
    );
    println!(
        "Round-trip mean abs error: {:.3}",
        pattern::mean_abs_diff(&nv12, &decoded)
    );
    Ok(())
}

fn print_summary(label: &str, summary: &StatsSummary) {
    println!(
        "{}: {} frames, mean {:.3} ms, min {:.3} ms, max {:.3} ms, {:.1} FPS",
        label,
        summary.frames,
        summary.mean().as_secs_f64() * 1000.0,
        summary.min.as_secs_f64() * 1000.0,
        summary.max.as_secs_f64() * 1000.0,
        summary.fps()
    );
}

fn run_stream(
    config: &CodecConfig,
    output: PathBuf,
    resolution: Resolution,
    quality: i32,
    frames: u32,
) -> anyhow::Result<()> {
    let mut encoder = Encoder::new(resolution, quality, config)?;
    let mut nv12 = alloc_nv12_buffer(resolution)?;
    let file = File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    tracing::info!(
        "Encoding {} frames of {} with {} -> {}",
        frames,
        resolution,
        encoder.backend_name(),
        output.display()
    );

    let start = Instant::now();
    let mut total = 0usize;
    for n in 0..frames {
        pattern::fill_gradient(&mut nv12, resolution, n)?;
        let frame = encoder.encode(&nv12)?;
        writer.write_all(&frame.data)?;
        total += frame.len();
        if (n + 1) % 10 == 0 {
            tracing::debug!("Encoded frame {}/{}", n + 1, frames);
        }
    }
    writer.flush()?;

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!(
        "Wrote {} frames ({} bytes) in {:.3} s, {:.1} FPS",
        encoder.frame_count(),
        total,
        elapsed,
        frames as f64 / elapsed.max(f64::EPSILON)
    );
    Ok(())
}

fn run_generate(output: PathBuf, resolution: Resolution, kind: PatternKind, index: u32) -> anyhow::Result<()> {
    resolution.ensure_even()?;
    let nv12 = match kind {
        PatternKind::Gradient => pattern::gradient(resolution, index),
        PatternKind::Grey => pattern::solid(resolution, 128, 128, 128),
    };
    write_nv12_to_file(&output, &nv12, resolution)?;
    tracing::info!("Wrote {} {:?} frame to {}", resolution, kind, output.display());
    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "nv12_mjpeg=error",
        LogLevel::Warn => "nv12_mjpeg=warn",
        LogLevel::Info => "nv12_mjpeg=info",
        LogLevel::Verbose => "nv12_mjpeg=debug",
        LogLevel::Debug => "nv12_mjpeg=debug",
        LogLevel::Trace => "nv12_mjpeg=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
