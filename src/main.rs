use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use shardpipe::config::RunConfig;
use shardpipe::executor::ExecutorSpec;
use shardpipe::supervisor::ShardSupervisor;
use shardpipe::transform::TransformConfig;
use shardpipe::{coordinator, executor, partition};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "shardpipe",
    version,
    about = "Convert compressed line-oriented record files under timeout supervision"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full conversion pipeline.
    Run(RunArgs),
    /// Split an input file into round-robin shard files.
    Split(SplitArgs),
    /// Concatenate shard output files, in the order given.
    Merge(MergeArgs),
    /// Supervise one shard (spawned by `run`).
    #[command(hide = true)]
    ShardWorker(ShardWorkerArgs),
    /// Serve transform tasks over stdio (spawned per executor).
    #[command(hide = true)]
    ExecWorker(ExecWorkerArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Input file (NDJSON, optionally compressed).
    #[arg(long)]
    filename: PathBuf,
    /// Output file; defaults to output/<input file name>.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Number of shard workers. 0 runs everything in this process,
    /// with no executor processes and no deadline.
    #[arg(long, default_value_t = 1)]
    parallelism: usize,
    /// Per-task deadline in seconds.
    #[arg(long, default_value_t = 10.0)]
    timeout_secs: f64,
    /// Transform to apply, by registry name.
    #[arg(long, default_value = "identity")]
    transform: String,
    /// Attempt lift-over of records on older coordinate assemblies.
    #[arg(long)]
    liftover: bool,
    /// Working directory for shard files; cleared per run.
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Keep shard files after the merge.
    #[arg(long)]
    keep_shards: bool,
}

#[derive(Args)]
struct SplitArgs {
    input: PathBuf,
    output_dir: PathBuf,
    partitions: usize,
}

#[derive(Args)]
struct MergeArgs {
    /// Merged output file.
    #[arg(long)]
    output: PathBuf,
    /// Shard output files, in shard order.
    #[arg(required = true)]
    shards: Vec<PathBuf>,
}

#[derive(Args)]
struct ShardWorkerArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    transform: String,
    #[arg(long, default_value_t = 10.0)]
    timeout_secs: f64,
    #[arg(long)]
    liftover: bool,
}

#[derive(Args)]
struct ExecWorkerArgs {
    #[arg(long)]
    transform: String,
    #[arg(long)]
    liftover: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run(args) => cmd_run(args),
        Command::Split(args) => cmd_split(args),
        Command::Merge(args) => cmd_merge(args),
        Command::ShardWorker(args) => cmd_shard_worker(args),
        Command::ExecWorker(args) => cmd_exec_worker(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let output = args.output.unwrap_or_else(|| {
        let name = args
            .filename
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("records.ndjson.gz"));
        Path::new("output").join(name)
    });
    let mut cfg = RunConfig::new(&args.filename, output)
        .with_parallelism(args.parallelism)
        .with_task_timeout(Duration::from_secs_f64(args.timeout_secs))
        .with_transform(args.transform)
        .with_liftover(args.liftover)
        .with_keep_shards(args.keep_shards);
    if let Some(dir) = args.work_dir {
        cfg = cfg.with_work_dir(dir);
    }
    let summary = coordinator::run(&cfg)?;
    info!(
        lines = summary.lines,
        shards = summary.shards,
        output = %cfg.output.display(),
        "conversion finished"
    );
    Ok(())
}

fn cmd_split(args: SplitArgs) -> Result<()> {
    if args.output_dir.exists() {
        std::fs::remove_dir_all(&args.output_dir)?;
    }
    let parts = partition::split_lines(&args.input, &args.output_dir, args.partitions)?;
    info!(
        lines = parts.lines,
        partitions = parts.shards.len(),
        dir = %args.output_dir.display(),
        "split finished"
    );
    Ok(())
}

fn cmd_merge(args: MergeArgs) -> Result<()> {
    let lines = partition::merge_shards(&args.shards, &args.output)?;
    info!(lines, output = %args.output.display(), "merge finished");
    Ok(())
}

fn cmd_shard_worker(args: ShardWorkerArgs) -> Result<()> {
    let tcfg = TransformConfig {
        liftover: args.liftover,
    };
    let spec = ExecutorSpec::for_transform(&args.transform, &tcfg)?;
    let stats = ShardSupervisor::new(spec)
        .with_timeout(Duration::from_secs_f64(args.timeout_secs))
        .run(&args.input, &args.output)?;
    info!(
        lines = stats.lines,
        timeouts = stats.timeouts,
        crashes = stats.crashes,
        "shard worker finished"
    );
    Ok(())
}

fn cmd_exec_worker(args: ExecWorkerArgs) -> Result<()> {
    let cfg = TransformConfig {
        liftover: args.liftover,
    };
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    executor::serve(&args.transform, &cfg, stdin.lock(), stdout.lock())
}
