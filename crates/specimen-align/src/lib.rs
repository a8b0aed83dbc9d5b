// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Specimen Align
//!
//! Aligns free-form segmentation polygons with the bounding boxes of a
//! specimen annotation dataset. Each image carries a list of species boxes
//! drawn by one tool and a plain-text blob of quality-labelled polygons drawn
//! by another; this library decides which polygon belongs to which box and
//! writes the result back into the dataset.
//!
//! ## Features
//!
//! - **Segmentation Parsing**: Lenient line parser that skips malformed
//!   polygons and keeps source line positions
//! - **Box Matching**: Majority-of-points overlap rule with a configurable
//!   threshold
//! - **Dataset Records**: Serde models that round-trip unknown fields and
//!   legacy key names
//! - **Storage**: File and in-memory stores behind the [`AnnotationStore`]
//!   trait
//! - **Configuration**: Layered file and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use specimen_align::{AlignConfig, Aligner, Error, FileAnnotationStore};
//!
//! fn main() -> Result<(), Error> {
//!     let config = AlignConfig::load(None)?;
//!     let aligner = Aligner::from_config(&config)?;
//!
//!     let store = FileAnnotationStore::new("dataset.json".into(), "segmentations".into());
//!     let summary = aligner.align_store(&store)?;
//!     println!("Aligned {} images", summary.processed_count);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `profiling`: Emits `tracing` spans around the alignment passes

mod align;
mod config;
mod dataset;
mod error;
mod geometry;
mod labels;
mod matcher;
mod segmentation;
mod storage;

pub use crate::{
    align::{AlignSummary, Aligner, ImageReport},
    config::{AlignConfig, ENV_PREFIX},
    dataset::{BoxRecord, Dataset, ImageRecord, SegmentSummary},
    error::Error,
    geometry::{
        DEFAULT_IMAGE_SIZE, ImageSize, NormalizedRect, Rect, denormalize, normalize,
        point_in_rect,
    },
    labels::{SegmentLabel, UNKNOWN_LABEL, label_text},
    matcher::{BoxMatch, BoxMatcher, DEFAULT_OVERLAP_THRESHOLD, overlap_ratio},
    segmentation::{
        DEFAULT_COORDINATE_TOLERANCE, ParsedSegmentation, SegmentParser, parse_segmentation,
        parse_segmentation_line, validate_segmentation_line,
    },
    storage::{
        AnnotationStore, FileAnnotationStore, MemoryAnnotationStore, SegmentationSource,
        StorageError,
    },
};
