use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, info_span, Subscriber};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

use xdrop_extender::alphabet::encode;
use xdrop_extender::device::{
    copy_to_host, create_default_device_allocator, device_copy_n, get_value_from_device, ComputeStream, DeviceAllocator,
    DeviceBuffer,
};
use xdrop_extender::io::{load_first_sequence, load_seed_pairs, write_segments, SeedColumnOrder};
use xdrop_extender::scoring::ScoreTable;
use xdrop_extender::{Extender, ExtenderConfig, ScoredSegmentPair, SeedPair, UngappedExtender};

mod cli;

/// Build our base tracing subscriber with stderr logging.
fn build_base_subscriber(verbose: u8) -> impl Subscriber + for<'span> LookupSpan<'span> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_filter(filter_layer);

    Registry::default().with(stderr_log)
}

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();
    build_base_subscriber(args.verbose).init();

    match &args.command {
        Some(cli::CliSubcommand::Extend(v)) => extend_subcommand(v)?,
        None => anyhow::bail!("No subcommand given."),
    };

    Ok(())
}

fn build_config(args: &cli::ExtendArgs) -> Result<ExtenderConfig> {
    let mut config = match &args.config {
        Some(path) => ExtenderConfig::from_json_file(path)
            .with_context(|| format!("Could not load extender configuration from {}", path.display()))?,
        None => ExtenderConfig::default(),
    };

    if let Some(path) = &args.score_matrix {
        let reader = File::open(path)
            .with_context(|| format!("Could not open score matrix {}", path.display()))?;
        config.score_table = ScoreTable::from_json_reader(reader)
            .with_context(|| format!("Could not parse score matrix {}", path.display()))?;
    }

    if let Some(xdrop) = args.xdrop {
        config.xdrop_threshold = xdrop;
    }

    if args.no_entropy {
        config.no_entropy_adjustment = true;
    }

    config.validate()?;
    debug!(xdrop = config.xdrop_threshold, no_entropy = config.no_entropy_adjustment, "Score table:\n{}", config.score_table);

    Ok(config)
}

fn extend_subcommand(args: &cli::ExtendArgs) -> Result<()> {
    let span = info_span!("extend_subcommand");
    let _enter = span.enter();

    let config = build_config(args)?;

    let query = load_first_sequence(&args.query)
        .with_context(|| format!("Could not read query sequence from {}", args.query.display()))?;
    let target = load_first_sequence(&args.target)
        .with_context(|| format!("Could not read target sequence from {}", args.target.display()))?;
    info!("Query {} ({} bp), target {} ({} bp)", query.name, query.sequence.len(), target.name, target.sequence.len());

    let order = if args.target_first { SeedColumnOrder::TargetFirst } else { SeedColumnOrder::QueryFirst };
    let seed_pairs = load_seed_pairs(&args.seeds, order)
        .with_context(|| format!("Could not read seed pairs from {}", args.seeds.display()))?;
    info!("Number of seed pairs: {}", seed_pairs.len());

    let encoded_query = encode(&query.sequence);
    let encoded_target = encode(&target.sequence);

    let stream = match args.num_threads {
        Some(n) => ComputeStream::with_threads(n)?,
        None => ComputeStream::new()?,
    };
    let allocator = create_default_device_allocator(args.device_memory);
    let mut extender = UngappedExtender::with_config(&config, &stream, 0, &allocator)?;

    let segments = if args.device_api {
        extend_device_buffers(&mut extender, &stream, &allocator, &encoded_query, &encoded_target, args.score_threshold, &seed_pairs)?
    } else {
        extender.extend_async(&encoded_query, &encoded_target, args.score_threshold, &seed_pairs)?;
        extender.sync()?;
        extender.get_scored_segment_pairs()
    };

    info!("Number of scored segment pairs found: {}", segments.len());

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).map(BufWriter::new)
            .with_context(|| format!("Could not create output file {}", path.display()))?),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    write_segments(writer, &segments)?;

    Ok(())
}

/// Run the extension through the device buffer interface, staging all inputs ourselves.
fn extend_device_buffers(
    extender: &mut UngappedExtender,
    stream: &ComputeStream,
    allocator: &DeviceAllocator,
    query: &[u8],
    target: &[u8],
    score_threshold: i32,
    seed_pairs: &[SeedPair],
) -> Result<Vec<ScoredSegmentPair>> {
    let d_query = DeviceBuffer::new(query.len(), allocator)?;
    let d_target = DeviceBuffer::new(target.len(), allocator)?;
    let d_seed_pairs = DeviceBuffer::new(seed_pairs.len(), allocator)?;
    // All seed pairs could survive in the worst case
    let d_segments = DeviceBuffer::new(seed_pairs.len(), allocator)?;
    let d_num_segments = DeviceBuffer::new(1, allocator)?;

    device_copy_n(query, &d_query, stream)?;
    device_copy_n(target, &d_target, stream)?;
    device_copy_n(seed_pairs, &d_seed_pairs, stream)?;

    extender.extend_async_device(
        &d_query,
        &d_target,
        score_threshold,
        &d_seed_pairs,
        seed_pairs.len(),
        &d_segments,
        &d_num_segments,
    )?;
    extender.sync()?;

    let num_segments = get_value_from_device(&d_num_segments, stream)?.max(0) as usize;
    let mut segments = copy_to_host(&d_segments, stream)?;
    segments.truncate(num_segments);

    Ok(segments)
}
