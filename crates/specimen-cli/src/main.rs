// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use log::{info, warn};
use specimen_align::{
    AlignConfig, AlignSummary, Aligner, AnnotationStore, Error, FileAnnotationStore, ImageSize,
    SegmentLabel,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[clap(long, env = "SPECIMEN_ALIGN_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum share of polygon points inside a box, overrides the
    /// configuration
    #[clap(long)]
    threshold: Option<f64>,

    /// Alignment Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Align every image of a dataset that references a segmentation file.
    /// The dataset is rewritten in place unless --output is given.
    AlignAll {
        /// Dataset JSON file
        #[clap(long)]
        dataset: PathBuf,

        /// Directory holding the segmentation text files
        #[clap(long)]
        segmentations: PathBuf,

        /// Write the aligned dataset here instead
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Align a single image against a local segmentation file.  Prints the
    /// updated image record unless --output is given.
    Align {
        /// Dataset JSON file
        #[clap(long)]
        dataset: PathBuf,

        /// Image URL as recorded in the dataset
        #[clap(long)]
        image: String,

        /// Segmentation text file
        #[clap(long)]
        segmentation: PathBuf,

        /// Write the whole aligned dataset here
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Parse a segmentation text file and print the segment summaries as
    /// JSON.  Pixel coordinates are included when both --width and --height
    /// are given.
    Parse {
        /// Segmentation text file
        path: PathBuf,

        /// Image width in pixels
        #[clap(long)]
        width: Option<f64>,

        /// Image height in pixels
        #[clap(long)]
        height: Option<f64>,
    },
    /// List the segmentation quality labels.
    Labels,
}

fn load_config(path: Option<&Path>, threshold: Option<f64>) -> Result<AlignConfig, Error> {
    let mut config = AlignConfig::load(path)?;
    if let Some(threshold) = threshold {
        config.overlap_threshold = threshold;
        config.validate()?;
    }
    Ok(config)
}

fn print_summary(summary: &AlignSummary) {
    println!(
        "Processed {} image(s), {} segment(s) matched",
        summary.processed_count, summary.matched_segments
    );
    for error in &summary.errors {
        eprintln!("⚠️  {}", error);
    }
}

fn handle_align_all(
    aligner: &Aligner,
    dataset: PathBuf,
    segmentations: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let store = FileAnnotationStore::new(dataset, segmentations.clone());

    let summary = match output {
        None => aligner.align_store(&store)?,
        Some(output) => {
            let mut dataset = store.get_dataset()?;
            let summary = aligner.align_all(&mut dataset, &store);
            FileAnnotationStore::new(output, segmentations)
                .save_dataset(&dataset)
                .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
            summary
        }
    };

    print_summary(&summary);
    Ok(())
}

fn handle_align(
    aligner: &Aligner,
    dataset: PathBuf,
    image: String,
    segmentation: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let segmentation_root = segmentation
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let store = FileAnnotationStore::new(dataset, segmentation_root);
    let text = std::fs::read_to_string(&segmentation)?;

    let mut dataset = store.get_dataset()?;
    let record = dataset.find_mut(&image)?;
    let report = aligner.align_image_in_place(record, &text);
    info!(
        "{}: {} segment(s), {} matched, {} unmatched, {} line(s) skipped",
        image, report.segments, report.matched, report.unmatched, report.skipped_lines
    );

    match output {
        Some(output) => {
            FileAnnotationStore::new(output, store.segmentation_root().to_path_buf())
                .save_dataset(&dataset)
                .map_err(|e| Error::PersistenceFailure(e.to_string()))?;
        }
        None => {
            let record = dataset.find_mut(&image)?;
            println!("{}", serde_json::to_string_pretty(record)?);
        }
    }
    Ok(())
}

fn handle_parse(
    config: &AlignConfig,
    path: PathBuf,
    width: Option<f64>,
    height: Option<f64>,
) -> Result<(), Error> {
    let size = match (width, height) {
        (Some(width), Some(height)) => Some(ImageSize::new(width, height)?),
        (None, None) => None,
        _ => {
            return Err(Error::InvalidParameters(
                "--width and --height must be given together".to_owned(),
            ));
        }
    };

    let text = std::fs::read_to_string(&path)?;
    let parsed = config.parser()?.parse_detailed(&text, size);
    if !parsed.skipped_lines.is_empty() {
        warn!(
            "{}: skipped line(s) {:?}",
            path.display(),
            parsed.skipped_lines
        );
    }

    println!("{}", serde_json::to_string_pretty(&parsed.segments)?);
    Ok(())
}

fn handle_labels() -> Result<(), Error> {
    for label in SegmentLabel::all() {
        println!("{} {}", label.code(), label);
    }
    Ok(())
}

#[cfg(feature = "profiling")]
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        warn!("Tracing disabled: {}", e);
    }
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    #[cfg(feature = "profiling")]
    init_tracing();

    let args = Args::parse();

    // Labels need no configuration
    if args.cmd == Command::Labels {
        return handle_labels();
    }

    let config = load_config(args.config.as_deref(), args.threshold)?;
    let aligner = Aligner::from_config(&config)?;

    match args.cmd {
        Command::Labels => handle_labels(),
        Command::AlignAll {
            dataset,
            segmentations,
            output,
        } => handle_align_all(&aligner, dataset, segmentations, output),
        Command::Align {
            dataset,
            image,
            segmentation,
            output,
        } => handle_align(&aligner, dataset, image, segmentation, output),
        Command::Parse {
            path,
            width,
            height,
        } => handle_parse(&config, path, width, height),
    }
}
