use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use segment_aligner::{
    extract_mapping_block, parse_source_text, AlignerConfig, MatchStrategy, ProposalBatch,
    RecordingSink, SourceIndex, SourceUnit, StreamAligner, TieBreak,
};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

mod config;
mod ingest;
mod report;

use report::{AlignReport, IndexReport};

#[derive(Parser)]
#[command(name = "segment-align")]
#[command(about = "Align streamed model output to labeled source units", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and index a source document
    Index(IndexArgs),

    /// Replay a response as a stream and align it to the source
    Align(AlignArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Labeled source text, e.g. `(a) first (b) second`
    #[arg(long)]
    source: PathBuf,

    /// Source file is a full prompt; use the mapping section of its first fenced block
    #[arg(long)]
    prompt: bool,

    /// Aligner config (TOML); defaults to $SEGMENT_ALIGN_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct IndexArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AlignArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Model response to replay
    #[arg(long)]
    response: PathBuf,

    /// Response is a server-sent-events capture; each event is one chunk
    #[arg(long)]
    sse: bool,

    /// Characters per replayed chunk (plain responses)
    #[arg(long, default_value_t = 24)]
    chunk_size: usize,

    /// Deliver queued proposals every N chunks
    #[arg(long, default_value_t = 4)]
    flush_every: usize,

    /// Cancel the stream after N chunks
    #[arg(long)]
    abort_after: Option<usize>,

    /// Candidate search strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Tie-break among passing candidates
    #[arg(long, value_enum)]
    tie_break: Option<TieBreakArg>,

    /// Initial candidate window per label
    #[arg(long)]
    window_size: Option<usize>,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Scan,
    Lookup,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Scan => Self::Scan,
            StrategyArg::Lookup => Self::Lookup,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "snake_case")]
enum TieBreakArg {
    Proximity,
    DeepestMatch,
    FirstSeen,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::Proximity => Self::Proximity,
            TieBreakArg::DeepestMatch => Self::DeepestMatch,
            TieBreakArg::FirstSeen => Self::FirstSeen,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // JSON goes to stdout; keep stderr to warnings so pipelines stay readable
    let json_output = match &cli.command {
        Commands::Index(args) => args.json,
        Commands::Align(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Index(args) => run_index(&args),
        Commands::Align(args) => run_align(args).await,
    }
}

fn run_index(args: &IndexArgs) -> Result<()> {
    let config = config::resolve(args.source.config.as_deref(), &config::Overrides::default())?;
    let index = load_index(&args.source, &config)?;
    let report = IndexReport::new(&index);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

async fn run_align(args: AlignArgs) -> Result<()> {
    let overrides = config::Overrides {
        strategy: args.strategy.map(Into::into),
        tie_break: args.tie_break.map(Into::into),
        window_size: args.window_size,
    };
    let config = config::resolve(args.source.config.as_deref(), &overrides)?;
    let index = load_index(&args.source, &config)?;
    let units = index.units().to_vec();

    let response = fs::read_to_string(&args.response)
        .with_context(|| format!("Failed to read response {}", args.response.display()))?;
    let chunks = if args.sse {
        ingest::decode_sse(&response)
    } else {
        ingest::split_chunks(&response, args.chunk_size)
    };
    log::info!("Replaying {} chunks", chunks.len());

    let mut aligner = StreamAligner::with_sink(index, config, RecordingSink::default())
        .context("Failed to start alignment session")?;
    let chunks_fed = stream(&mut aligner, chunks, &args).await;

    let mut report = AlignReport::new(&units, aligner.records(), aligner.diagnostics());
    report.cancelled = aligner.is_cancelled();
    report.chunks = chunks_fed;
    report.notifications = aligner.sink().notifications().len();
    log::info!("{}", report.diagnostics.summary());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

/// Feed the replayed stream, previewing the open label after each chunk and
/// delivering proposals every `flush_every` chunks. Returns chunks fed.
async fn stream(
    aligner: &mut StreamAligner<RecordingSink>,
    chunks: Vec<String>,
    args: &AlignArgs,
) -> usize {
    let (tx, mut rx) = mpsc::channel(8);
    let producer = tokio::spawn(ingest::replay(chunks, tx));
    let flush_every = args.flush_every.max(1);

    let mut fed = 0;
    let mut preview: Option<ProposalBatch> = None;
    loop {
        tokio::select! {
            chunk = rx.recv() => {
                let Some(chunk) = chunk else {
                    aligner.finalize();
                    break;
                };
                aligner.feed(&chunk);
                fed += 1;
                if let Some(latest) = aligner.preview() {
                    preview = Some(latest);
                }

                if args.abort_after.is_some_and(|limit| fed >= limit) {
                    log::warn!("Aborting stream after {fed} chunks");
                    aligner.cancel();
                    break;
                }
                if fed % flush_every == 0 {
                    deliver(aligner, &mut preview);
                }
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                log::warn!("Interrupted, cancelling stream");
                aligner.cancel();
                break;
            }
        }
    }

    drop(rx);
    if let Err(err) = producer.await {
        log::error!("Stream producer failed: {err}");
    }
    deliver(aligner, &mut preview);
    fed
}

/// Queued batches first, then the held-back preview, which may by now be stale
fn deliver(aligner: &mut StreamAligner<RecordingSink>, preview: &mut Option<ProposalBatch>) {
    let applied = aligner.flush();
    if let Some(batch) = preview.take() {
        let outcomes = aligner.deliver(&batch);
        log::debug!(
            "Delivered preview (seq {}): {} of {} applied",
            batch.sequence,
            outcomes.iter().filter(|o| o.is_applied()).count(),
            outcomes.len()
        );
    }
    log::debug!("Delivered {applied} proposals");
}

fn load_index(args: &SourceArgs, config: &AlignerConfig) -> Result<SourceIndex> {
    let units = load_source_units(&args.source, args.prompt, config)?;
    SourceIndex::build(units, config).context("Failed to index source")
}

fn load_source_units(path: &Path, prompt: bool, config: &AlignerConfig) -> Result<Vec<SourceUnit>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source {}", path.display()))?;
    let text = if prompt {
        match extract_mapping_block(&raw) {
            Some(block) => block,
            None => bail!("No mapping block found in prompt {}", path.display()),
        }
    } else {
        raw.as_str()
    };

    let units = parse_source_text(text, config).context("Failed to parse source")?;
    if units.is_empty() {
        bail!("Source {} contains no labeled units", path.display());
    }
    Ok(units)
}
