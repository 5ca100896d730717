//! yoloprep: YOLO dataset preparation.
//!
//! Tools for the dataset side of training a YOLO object detector: filtering a
//! dataset to a set of classes, remapping class IDs onto a new taxonomy,
//! merging and oversampling datasets, removing unlabeled images, and handing
//! the result to the Ultralytics `yolo` CLI.
//!
//! # Modules
//!
//! - [`label`]: label-line parsing and class-ID transforms
//! - [`manifest`]: `data.yaml` reading and writing
//! - [`policy`]: keep-set and remap policies
//! - [`layout`]: split directory conventions and image/label pairing
//! - [`rewrite`]: the split rewriter behind `filter` and `remap`
//! - [`merge`]: merging with train oversampling
//! - [`prune`]: unlabeled-image removal
//! - [`train`]: training and prediction through the `yolo` executable
//! - [`error`]: error types for yoloprep operations

pub mod error;
pub mod label;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod merge;
pub mod policy;
pub mod prune;
pub mod rewrite;
pub mod train;

use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub use error::YoloprepError;

use layout::{SplitLayout, DEFAULT_SPLITS};

/// The yoloprep CLI application.
#[derive(Parser)]
#[command(name = "yoloprep")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Log more detail to stderr (-v info, -vv debug). RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Copy a dataset keeping only the given classes.
    Filter(FilterArgs),
    /// Remap class IDs onto a new taxonomy, in place or into a copy.
    Remap(RemapArgs),
    /// Merge a new dataset into a base dataset, oversampling train.
    Merge(MergeArgs),
    /// Delete images that have no label file.
    PruneUnlabeled(PruneArgs),
    /// Run a training plan through the Ultralytics CLI.
    Train(TrainArgs),
    /// Run prediction through the Ultralytics CLI.
    Predict(PredictArgs),
}

/// How summaries are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// Directory layout of the dataset splits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LayoutArg {
    /// Detect per split.
    Auto,
    /// root/<split>/images and root/<split>/labels.
    Nested,
    /// root/images/<split> and root/labels/<split>.
    Flat,
}

impl LayoutArg {
    fn resolve(self) -> Option<SplitLayout> {
        match self {
            LayoutArg::Auto => None,
            LayoutArg::Nested => Some(SplitLayout::Nested),
            LayoutArg::Flat => Some(SplitLayout::Flat),
        }
    }
}

/// Arguments for the filter subcommand.
#[derive(clap::Args)]
struct FilterArgs {
    /// Dataset root containing data.yaml and train/, valid/, test/.
    #[arg(long, env = "YOLOPREP_DATASET_ROOT")]
    root: PathBuf,

    /// Class names to keep.
    #[arg(long, num_args = 1.., required = true)]
    keep: Vec<String>,

    /// Output root (default: <root>_filtered).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Renumber kept classes to 0..k so label IDs match the new names list.
    #[arg(long)]
    renumber: bool,

    /// Report what would happen without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

/// Arguments for the remap subcommand.
#[derive(clap::Args)]
struct RemapArgs {
    /// Dataset root containing data.yaml.
    #[arg(long, env = "YOLOPREP_DATASET_ROOT")]
    root: PathBuf,

    /// Class ID mapping entry, repeatable (e.g. --map 3:0 --map 4:1).
    #[arg(long = "map", value_name = "OLD:NEW")]
    map: Vec<String>,

    /// Target class names, comma-separated, in ID order.
    #[arg(long, value_delimiter = ',')]
    names: Vec<String>,

    /// YAML file with `mapping` and `names`; --map/--names override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Splits to process.
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_SPLITS)]
    splits: Vec<String>,

    /// Split directory layout.
    #[arg(long, value_enum, default_value_t = LayoutArg::Auto)]
    layout: LayoutArg,

    /// Write a remapped copy here instead of rewriting in place.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report what would happen without writing or deleting anything.
    #[arg(long)]
    dry_run: bool,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

/// Arguments for the merge subcommand.
#[derive(clap::Args)]
struct MergeArgs {
    /// New dataset root (has train/, valid/, test/ with images and labels).
    #[arg(long)]
    new_root: PathBuf,

    /// Base dataset root to merge into.
    #[arg(long, env = "YOLOPREP_DATASET_ROOT")]
    base_root: PathBuf,

    /// Copies made of each train pair.
    #[arg(long, default_value_t = 2)]
    oversample: usize,

    /// Filename prefix for merged files, to avoid collisions.
    #[arg(long, default_value = "f1_")]
    prefix: String,

    /// Splits to merge.
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_SPLITS)]
    splits: Vec<String>,

    /// Delete stale label caches in the base dataset afterwards.
    #[arg(long)]
    clear_cache: bool,

    /// Report what would happen without copying anything.
    #[arg(long)]
    dry_run: bool,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

/// Arguments for the prune-unlabeled subcommand.
#[derive(clap::Args)]
struct PruneArgs {
    /// Dataset root.
    #[arg(long, env = "YOLOPREP_DATASET_ROOT")]
    root: PathBuf,

    /// Splits to clean.
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_SPLITS)]
    splits: Vec<String>,

    /// Split directory layout.
    #[arg(long, value_enum, default_value_t = LayoutArg::Auto)]
    layout: LayoutArg,

    /// List unlabeled images without deleting them.
    #[arg(long)]
    dry_run: bool,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

/// Arguments for the train subcommand.
#[derive(clap::Args)]
struct TrainArgs {
    /// Training plan (YAML).
    #[arg(long)]
    config: PathBuf,

    /// Ultralytics CLI executable.
    #[arg(long, env = "YOLOPREP_YOLO_BIN", default_value = train::DEFAULT_YOLO_BIN)]
    yolo_bin: String,

    /// Print the commands instead of running them.
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the predict subcommand.
#[derive(clap::Args)]
struct PredictArgs {
    /// Model weights.
    #[arg(long)]
    model: String,

    /// Image file or directory to predict on.
    #[arg(long)]
    source: PathBuf,

    /// Confidence threshold.
    #[arg(long)]
    conf: Option<f32>,

    /// Device (e.g. mps, cpu, 0).
    #[arg(long)]
    device: Option<String>,

    /// Save predictions as YOLO label files.
    #[arg(long)]
    save_txt: bool,

    /// Include confidences in saved label files.
    #[arg(long)]
    save_conf: bool,

    /// Output project directory.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Output run name.
    #[arg(long)]
    name: Option<String>,

    /// Ultralytics CLI executable.
    #[arg(long, env = "YOLOPREP_YOLO_BIN", default_value = train::DEFAULT_YOLO_BIN)]
    yolo_bin: String,

    /// Print the command instead of running it.
    #[arg(long)]
    dry_run: bool,
}

/// Run the yoloprep CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), YoloprepError> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Some(Commands::Filter(args)) => run_filter(args),
        Some(Commands::Remap(args)) => run_remap(args),
        Some(Commands::Merge(args)) => run_merge(args),
        Some(Commands::PruneUnlabeled(args)) => run_prune(args),
        Some(Commands::Train(args)) => run_train(args),
        Some(Commands::Predict(args)) => run_predict(args),
        None => {
            println!("yoloprep {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("YOLO dataset preparation.");
            println!();
            println!("Run 'yoloprep --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the filter subcommand.
fn run_filter(args: FilterArgs) -> Result<(), YoloprepError> {
    let opts = rewrite::FilterOptions {
        root: args.root,
        keep: args.keep,
        output: args.output,
        renumber: args.renumber,
        dry_run: args.dry_run,
    };
    let report = rewrite::filter_dataset(&opts)?;
    emit(&report, args.report)?;
    check_failures(report.failed_count(), report.total_pairs())
}

/// Execute the remap subcommand.
fn run_remap(args: RemapArgs) -> Result<(), YoloprepError> {
    let mut config = match &args.config {
        Some(path) => policy::RemapConfig::read(path)?,
        None => policy::RemapConfig::default(),
    };
    if !args.map.is_empty() {
        config.mapping = policy::parse_mapping_entries(&args.map)?;
    }
    if !args.names.is_empty() {
        config.names = args.names;
    }
    let class_policy = policy::ClassPolicy::remap(config.mapping, config.names)?;

    let opts = rewrite::RemapOptions {
        root: args.root,
        policy: class_policy,
        splits: args.splits,
        layout: args.layout.resolve(),
        output: args.output,
        dry_run: args.dry_run,
    };
    let report = rewrite::remap_dataset(&opts)?;
    emit(&report, args.report)?;
    check_failures(report.failed_count(), report.total_pairs())
}

/// Execute the merge subcommand.
fn run_merge(args: MergeArgs) -> Result<(), YoloprepError> {
    let opts = merge::MergeOptions {
        new_root: args.new_root,
        base_root: args.base_root,
        oversample: args.oversample,
        prefix: args.prefix,
        splits: args.splits,
        clear_cache: args.clear_cache,
        dry_run: args.dry_run,
    };
    let report = merge::merge_datasets(&opts)?;
    emit(&report, args.report)?;
    check_failures(report.failed_count(), report.total_pairs())
}

/// Execute the prune-unlabeled subcommand.
fn run_prune(args: PruneArgs) -> Result<(), YoloprepError> {
    let opts = prune::PruneOptions {
        root: args.root,
        splits: args.splits,
        layout: args.layout.resolve(),
        dry_run: args.dry_run,
    };
    let report = prune::prune_unlabeled(&opts)?;
    emit(&report, args.report)?;
    let planned: usize = report.splits.iter().map(|s| s.plan.to_delete.len()).sum();
    check_failures(report.failures.len(), planned)
}

/// Execute the train subcommand.
fn run_train(args: TrainArgs) -> Result<(), YoloprepError> {
    let plan = train::TrainPlan::from_yaml(&args.config)?;
    let invocations = plan.invocations();

    if args.dry_run {
        for invocation in &invocations {
            println!("{}", invocation.command_line(&args.yolo_bin));
        }
        return Ok(());
    }

    train::run_all(&mut train::SystemRunner, &args.yolo_bin, &invocations)?;
    if let Some(last) = plan.phases.last() {
        println!("Training finished. Best weights: {}", plan.best_weights(last).display());
    }
    Ok(())
}

/// Execute the predict subcommand.
fn run_predict(args: PredictArgs) -> Result<(), YoloprepError> {
    let opts = train::PredictOptions {
        model: args.model,
        source: args.source,
        conf: args.conf,
        device: args.device,
        save_txt: args.save_txt,
        save_conf: args.save_conf,
        project: args.project,
        name: args.name,
    };
    let invocation = opts.invocation();

    if args.dry_run {
        println!("{}", invocation.command_line(&args.yolo_bin));
        return Ok(());
    }
    train::run_all(&mut train::SystemRunner, &args.yolo_bin, &[invocation])
}

fn emit<R>(report: &R, format: ReportFormat) -> Result<(), YoloprepError>
where
    R: Serialize + fmt::Display,
{
    match format {
        ReportFormat::Text => print!("{}", report),
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|source| YoloprepError::ReportJson { source })?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn check_failures(failed: usize, total: usize) -> Result<(), YoloprepError> {
    if failed > 0 {
        Err(YoloprepError::PairFailures { failed, total })
    } else {
        Ok(())
    }
}
