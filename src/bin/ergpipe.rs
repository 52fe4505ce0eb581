//! ergpipe: build (or load from cache) the corpus table and summarise it.
use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use ergpipe::{col, get_merged_data, io::write_table, merge, Cache, PipelineConfig, SafetensorsSource};

#[derive(Parser, Debug)]
#[command(name = "ergpipe", about = "Merge ERG/EEG/pupil recordings into one trial table")]
struct Args {
    /// Directory holding sub-<id>.safetensors recordings.
    #[arg(long)]
    data_dir: PathBuf,

    /// Cache directory for merged corpora.
    #[arg(long, default_value = ".cache")]
    cache_dir: PathBuf,

    /// JSON pipeline configuration (defaults apply otherwise).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subject codes, comma-separated (overrides the configuration).
    #[arg(long, value_delimiter = ',')]
    subjects: Option<Vec<u32>>,

    /// Checkpoint tag (overrides the configuration).
    #[arg(long)]
    checkpoint: Option<String>,

    /// Skip the time-frequency decomposition.
    #[arg(long)]
    no_tfr: bool,

    /// Add pupil-size bins.
    #[arg(long)]
    pupil_bins: Option<usize>,

    /// Drop trials with a blink within this many seconds of the flash.
    #[arg(long)]
    exclude_blinks: Option<f64>,

    /// Write the final table to this safetensors file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();

    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(subjects) = args.subjects {
        cfg.subjects = subjects;
    }
    if let Some(tag) = args.checkpoint {
        cfg.checkpoint = tag;
    }
    if args.no_tfr {
        cfg.tfr.enabled = false;
    }
    cfg.validate()?;

    let source = SafetensorsSource::new(&args.data_dir);
    let cache = Cache::new(&args.cache_dir)
        .with_context(|| format!("opening cache {}", args.cache_dir.display()))?;
    let mut dm = get_merged_data(&source, &cache, &cfg).context("building the corpus")?;

    if let Some(n) = args.pupil_bins {
        merge::add_pupil_bins(&mut dm, n)?;
    }
    if let Some(max_latency) = args.exclude_blinks {
        dm = merge::filter_rows(&dm, &[merge::blink_exclusion(max_latency)])?;
    }

    let subjects: BTreeSet<i64> = dm.ints(col::SUBJECT_NR).map(|s| s.iter().copied().collect()).unwrap_or_default();
    println!("Cache key  : {}", cfg.cache_key());
    println!("Trials     : {}", dm.len());
    println!("Subjects   : {subjects:?}");
    println!("Columns    : {}", dm.column_names().collect::<Vec<_>>().join(", "));

    if let Some(path) = args.output {
        write_table(&dm, &path).with_context(|| format!("writing {}", path.display()))?;
        println!("Written → {}", path.display());
    }
    Ok(())
}
