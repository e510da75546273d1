use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use coronalapse::{
    BatchScheduler, CancelToken, FfmpegEncoder, FrameKey, FrameStatus, FrameStore,
    HttpImageSource, PartitionSink, PipelineConfig, RunStatus, dates_inclusive, measure,
};

#[derive(Parser, Debug)]
#[command(name = "coronalapse", version)]
struct Cli {
    /// Pipeline config JSON; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the frame store root.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Debug-level logging (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce every missing frame of a date range (resumable).
    Run(RunArgs),
    /// Regenerate a single frame regardless of its manifest status.
    Frame(FrameArgs),
    /// Encode completed date partitions to MP4 (requires `ffmpeg` on PATH).
    Encode(RangeArgs),
    /// Compare the manifest with the frame files on disk.
    Verify,
    /// Drop failed manifest entries so they show up as never attempted.
    CleanManifest,
    /// Measure disk diameters on sample rasters to calibrate the composite radius.
    Measure(MeasureArgs),
    /// Print the effective configuration as JSON.
    PrintConfig,
}

#[derive(Parser, Debug)]
struct RangeArgs {
    /// First date (YYYY-MM-DD).
    #[arg(long)]
    start: NaiveDate,

    /// Last date, inclusive; defaults to `start`.
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Encode each partition as soon as it completes.
    #[arg(long)]
    encode: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Frame key, e.g. `2024-03-01/0042`.
    key: FrameKey,
}

#[derive(Parser, Debug)]
struct MeasureArgs {
    /// Sample coronagraph raster (occulting disk centred).
    #[arg(long)]
    corona: Option<PathBuf>,

    /// Sample solar disk raster at the configured disk layer geometry.
    #[arg(long)]
    disk: Option<PathBuf>,
}

impl RangeArgs {
    fn bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end.unwrap_or(self.start))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    coronalapse::init_logging(cli.verbose);

    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = &cli.store {
        cfg.store.root = root.clone();
    }
    cfg.validate()?;

    match cli.cmd {
        Command::Run(args) => cmd_run(&cfg, args),
        Command::Frame(args) => cmd_frame(&cfg, args),
        Command::Encode(args) => cmd_encode(&cfg, args),
        Command::Verify => cmd_verify(&cfg),
        Command::CleanManifest => cmd_clean_manifest(&cfg),
        Command::Measure(args) => cmd_measure(&cfg, args),
        Command::PrintConfig => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

fn scheduler(cfg: &PipelineConfig) -> anyhow::Result<BatchScheduler<HttpImageSource>> {
    Ok(BatchScheduler::new(cfg, HttpImageSource::new(&cfg.source))?)
}

fn cmd_run(cfg: &PipelineConfig, args: RunArgs) -> anyhow::Result<()> {
    let (start, end) = args.range.bounds();

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("interrupt: finishing the in-flight batch, then stopping");
        handler_token.cancel();
    })
    .context("install Ctrl-C handler")?;

    let mut sched = scheduler(cfg)?.with_cancel_token(token);
    if args.encode {
        sched = sched.with_sink(FfmpegEncoder::new(cfg.encode.clone()));
    }
    let rec = sched.run(start, end)?;

    eprintln!(
        "{}: {} / {} frames, {} failed, {} duplicates, fallback rate {:.1}%",
        match rec.status {
            RunStatus::Completed => "completed",
            RunStatus::Running => "interrupted (rerun to resume)",
            RunStatus::Pending => "pending",
            RunStatus::Error => "error",
        },
        rec.completed_frames,
        rec.total_frames,
        rec.failed_frames,
        rec.duplicate_frames,
        rec.fallback_rate() * 100.0
    );
    Ok(())
}

fn cmd_frame(cfg: &PipelineConfig, args: FrameArgs) -> anyhow::Result<()> {
    let mut sched = scheduler(cfg)?;
    let entry = sched.regenerate(args.key)?;
    match entry.status {
        FrameStatus::Success => {
            eprintln!("wrote {}", sched.store().frame_path(&args.key).display());
            Ok(())
        }
        _ => anyhow::bail!(
            "frame {} failed: {}",
            args.key,
            entry.error.unwrap_or_default()
        ),
    }
}

fn cmd_encode(cfg: &PipelineConfig, args: RangeArgs) -> anyhow::Result<()> {
    let (start, end) = args.bounds();
    let store = FrameStore::open(&cfg.store.root)?;
    let mut encoder = FfmpegEncoder::new(cfg.encode.clone());
    for date in dates_inclusive(start, end)? {
        let frames = store.partition_frames(date);
        if frames.is_empty() {
            eprintln!("{date}: no successful frames, skipped");
            continue;
        }
        encoder.partition_complete(date, &store.partition_dir(date), &frames)?;
        eprintln!("wrote {}", encoder.out_path(date).display());
    }
    Ok(())
}

fn cmd_verify(cfg: &PipelineConfig) -> anyhow::Result<()> {
    let store = FrameStore::open(&cfg.store.root)?;
    let summary = store.manifest().summary();
    let report = store.audit()?;
    println!(
        "entries: {} (success {}, failed {}, pending {}, fallback {}, duplicates {})",
        summary.total(),
        summary.success,
        summary.failed,
        summary.pending,
        summary.fallback,
        summary.duplicates
    );
    for path in &report.orphan_files {
        println!("orphan file (no success entry): {}", path.display());
    }
    for key in &report.missing_files {
        println!("missing file for success entry: {key}");
    }
    if !report.is_clean() {
        anyhow::bail!(
            "{} orphan files, {} missing files",
            report.orphan_files.len(),
            report.missing_files.len()
        );
    }
    println!("manifest and frame files agree");
    Ok(())
}

fn cmd_clean_manifest(cfg: &PipelineConfig) -> anyhow::Result<()> {
    let mut store = FrameStore::open(&cfg.store.root)?;
    let before = store.manifest().len();
    let removed = store.remove_failed()?;
    println!(
        "removed {removed} failed entries ({before} -> {})",
        store.manifest().len()
    );
    Ok(())
}

fn cmd_measure(cfg: &PipelineConfig, args: MeasureArgs) -> anyhow::Result<()> {
    if args.corona.is_none() && args.disk.is_none() {
        anyhow::bail!("pass --corona and/or --disk");
    }
    if let Some(path) = &args.corona {
        let img = open_image(path)?;
        println!(
            "occulting disk diameter: {} px ({}x{})",
            measure::measure_occulting_disk(&img),
            img.width(),
            img.height()
        );
    }
    if let Some(path) = &args.disk {
        let img = open_image(path)?;
        let diameter = measure::measure_sun_disk(&img);
        let radius =
            measure::radius_for_disk_size(diameter, img.width(), cfg.composite.disk_size);
        println!(
            "sun disk diameter: {diameter} px ({}x{}); composite_radius for disk_size {}: {radius:.1}",
            img.width(),
            img.height(),
            cfg.composite.disk_size
        );
    }
    Ok(())
}

fn open_image(path: &Path) -> anyhow::Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("open image '{}'", path.display()))
}
