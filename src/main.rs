use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::EnvFilter;

use liheci::gold::{gold_sentences, load_gold};
use liheci::reader::{AsyncFileReader, ReaderConfig};
use liheci::report::{write_reports, write_run_stats, RunStats};
use liheci::{
    evaluate, CommandTagger, DictionaryTagger, Lexicon, Pipeline, PipelineConfig, RegexEngine,
    Tagger,
};

#[derive(Parser, Debug)]
#[command(name = "liheci")]
#[command(about = "Recognize and validate Chinese separable compound verbs (liheci)")]
#[command(version)]
struct Args {
    /// Lexicon CSV (Lemma, A, B, Type, RedupPattern, Transitivity, PronounInsertion, PPRequirement)
    #[arg(long)]
    lexicon: PathBuf,

    /// Gold file; its sentences are processed and scored
    #[arg(long, conflicts_with = "corpus")]
    gold: Option<PathBuf>,

    /// Unannotated corpus, one sentence (or `id<TAB>sentence`) per line
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Directory for validated.tsv, rejected.tsv, report.txt and metrics.txt
    #[arg(long, default_value = "liheci_out")]
    out_dir: PathBuf,

    /// Pipeline configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// POS dictionary (`word<TAB>TAG` per line) for the built-in tagger
    #[arg(long, conflicts_with = "tagger_cmd")]
    pos_dict: Option<PathBuf>,

    /// External tagger command speaking one line in, one `tok/TAG` line out
    #[arg(long)]
    tagger_cmd: Option<String>,

    /// Override the context window around HEAD and TAIL
    #[arg(long)]
    context_window: Option<usize>,

    /// Override the insertion confidence below which rows are dropped
    #[arg(long)]
    drop_threshold: Option<f64>,

    /// Override the confidence above which a POS rejection is overturned
    #[arg(long)]
    pos_override_threshold: Option<f64>,

    /// Override the collaborator timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Abort on the first malformed gold row or unreadable input
    #[arg(long)]
    fail_fast: bool,

    /// Suppress console progress bars
    #[arg(long)]
    no_progress: bool,

    /// Stats output file path (default: <out-dir>/run_stats.json)
    #[arg(long)]
    stats_out: Option<PathBuf>,
}

impl Args {
    fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(window) = self.context_window {
            config.context_window = window;
        }
        if let Some(threshold) = self.drop_threshold {
            config.drop_threshold = threshold;
        }
        if let Some(threshold) = self.pos_override_threshold {
            config.pos_override_threshold = threshold;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: structured JSON logging; RUST_LOG selects the level, info by default
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();
    let started = Instant::now();
    let run_start = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    info!("Starting liheci");
    info!(?args, "Parsed CLI arguments");

    // WHY: validate inputs before compiling anything so a bad invocation fails fast
    if args.gold.is_none() && args.corpus.is_none() {
        anyhow::bail!("Nothing to process: pass --gold or --corpus");
    }
    if !args.lexicon.is_file() {
        anyhow::bail!("Lexicon does not exist: {}", args.lexicon.display());
    }

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).await?,
        None => PipelineConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid pipeline configuration")?;

    let (lexicon, lexicon_report) = Lexicon::load(&args.lexicon).await?;
    info!(
        "Lexicon {}: {} entries ({} rows read, {} skipped, {} duplicates)",
        args.lexicon.display(),
        lexicon_report.entries_loaded,
        lexicon_report.rows_read,
        lexicon_report.rows_skipped,
        lexicon_report.duplicates
    );

    let tagger: Box<dyn Tagger> = match (&args.tagger_cmd, &args.pos_dict) {
        (Some(command), _) => {
            Box::new(CommandTagger::from_command_line(command, config.timeout())?)
        }
        (None, Some(path)) => Box::new(DictionaryTagger::load(path).await?),
        (None, None) => Box::new(DictionaryTagger::default()),
    };

    let (gold, gold_report) = match &args.gold {
        Some(path) => {
            let (cases, report) = load_gold(path, args.fail_fast).await?;
            (Some(cases), Some(report))
        }
        None => (None, None),
    };

    let (sentences, corpus_stats) = match (&gold, &args.corpus) {
        (Some(cases), _) => (gold_sentences(cases), None),
        (None, Some(path)) => {
            let reader_config =
                ReaderConfig { fail_fast: args.fail_fast, ..ReaderConfig::default() };
            let reader = AsyncFileReader::new(reader_config);
            let (sentences, stats) = reader.read_sentences(path).await?;
            if stats.is_unreadable() {
                anyhow::bail!(
                    "Corpus {} is unreadable: {}",
                    path.display(),
                    stats.read_error.clone().unwrap_or_default()
                );
            }
            (sentences, Some(stats))
        }
        (None, None) => (Vec::new(), None),
    };
    info!("Processing {} sentences", sentences.len());

    let mut pipeline = Pipeline::build(lexicon, &RegexEngine, tagger, &config)?;

    let progress = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new(sentences.len() as u64);
        pb.set_style(ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} sentences",
        )?);
        Some(pb)
    };

    let output = pipeline.run(&sentences, progress.as_ref());
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let evaluation =
        gold.as_deref().map(|cases| evaluate(cases, &output.records, pipeline.lexicon()));
    let paths =
        write_reports(&args.out_dir, &output.records, gold.as_deref(), evaluation.as_ref())?;

    let accepted = output.stats.validation.accepted;
    let rejected = output.stats.validation.rejected;
    let run_stats = RunStats {
        run_start,
        total_processing_time_ms: started.elapsed().as_millis() as u64,
        config,
        lexicon: lexicon_report,
        gold: gold_report,
        corpus: corpus_stats,
        pipeline: output.stats,
        evaluation,
    };
    let stats_path = args.stats_out.clone().unwrap_or_else(|| args.out_dir.join("run_stats.json"));
    write_run_stats(&stats_path, &run_stats).await?;

    println!("liheci v{} - run complete", env!("CARGO_PKG_VERSION"));
    println!("  Sentences: {}", run_stats.pipeline.sentences);
    println!(
        "  Candidates: {} raw, {} validated",
        run_stats.pipeline.raw_candidates,
        accepted + rejected
    );
    println!("  Accepted: {accepted}, rejected: {rejected}");
    if let Some(evaluation) = &run_stats.evaluation {
        let overall = &evaluation.overall;
        println!(
            "  Precision {:.4}, recall {:.4}, F1 {:.4}",
            overall.precision(),
            overall.recall(),
            overall.f1()
        );
    }
    let report_dir = paths.validated.parent().map(|p| p.display().to_string());
    println!("  Reports: {}", report_dir.unwrap_or_default());
    println!("  Stats: {}", stats_path.display());

    info!("liheci finished in {}ms", run_stats.total_processing_time_ms);
    Ok(())
}
