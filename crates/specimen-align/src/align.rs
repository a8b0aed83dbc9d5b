// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Alignment passes over single images and whole datasets.
//!
//! Every pass is authoritative: box segmentations are cleared first and
//! rebuilt from the current segmentation text, so re-running on unchanged
//! inputs yields identical records. Each box receives at most one polygon;
//! when several polygons pick the same box the earliest source line keeps it.

use crate::{
    AlignConfig, AnnotationStore, BoxMatcher, Dataset, Error, ImageRecord, ImageSize,
    SegmentParser, SegmentationSource,
};
use log::{debug, info, warn};
use serde::Serialize;

/// Outcome of aligning one image.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ImageReport {
    /// Parsed polygons.
    pub segments: usize,
    /// Polygons written into a box.
    pub matched: usize,
    /// Polygons below the threshold or beaten to their box.
    pub unmatched: usize,
    /// Source lines rejected by the parser.
    pub skipped_lines: usize,
}

/// Outcome of aligning a dataset.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct AlignSummary {
    /// Images aligned successfully.
    pub processed_count: usize,
    /// Dataset positions of the aligned images.
    pub processed_indices: Vec<usize>,
    /// One human readable message per failed image.
    pub errors: Vec<String>,
    /// Polygons matched across all processed images.
    pub matched_segments: usize,
}

/// Stateless alignment engine.
///
/// # Example
///
/// ```rust
/// use specimen_align::{Aligner, BoxRecord, ImageRecord, ImageSize, Rect};
///
/// let size = ImageSize::new(100.0, 100.0)?;
/// let image = ImageRecord::new("a.jpg", Some(100.0), Some(100.0)).with_boxes(vec![
///     BoxRecord::new(0, "Navicula", Some(Rect::new(0.0, 0.0, 10.0, 10.0)?), size),
/// ]);
///
/// let line = "1 0.02 0.02 0.08 0.02 0.08 0.08 0.02 0.08";
/// let image = Aligner::default().align_image(image, line);
///
/// assert_eq!(image.boxes()[0].segmentation(), line);
/// assert_eq!(image.segments()[0].matched_box_index(), Some(0));
/// # Ok::<(), specimen_align::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aligner {
    matcher: BoxMatcher,
    parser: SegmentParser,
    fallback_size: ImageSize,
}

impl Aligner {
    pub fn new(matcher: BoxMatcher, parser: SegmentParser, fallback_size: ImageSize) -> Self {
        Self {
            matcher,
            parser,
            fallback_size,
        }
    }

    pub fn from_config(config: &AlignConfig) -> Result<Self, Error> {
        Ok(Self::new(
            config.matcher()?,
            config.parser()?,
            config.default_image_size()?,
        ))
    }

    pub fn matcher(&self) -> &BoxMatcher {
        &self.matcher
    }

    pub fn parser(&self) -> &SegmentParser {
        &self.parser
    }

    pub fn fallback_size(&self) -> ImageSize {
        self.fallback_size
    }

    /// Align one image and return the updated record.
    pub fn align_image(&self, mut image: ImageRecord, raw_text: &str) -> ImageRecord {
        self.align_image_in_place(&mut image, raw_text);
        image
    }

    /// Align one image in place.
    ///
    /// Box segmentations are reset, `raw_text` is parsed with the image's own
    /// dimensions, and each polygon in source order is written into the box
    /// it best overlaps. The parsed summaries replace `image.segments`.
    #[cfg_attr(
        feature = "profiling",
        tracing::instrument(skip_all, fields(image_url = %image.image_url()))
    )]
    pub fn align_image_in_place(&self, image: &mut ImageRecord, raw_text: &str) -> ImageReport {
        for bbox in image.boxes_mut() {
            bbox.clear_segmentation();
        }

        let size = image.resolve_size(self.fallback_size);
        let parsed = self.parser.parse_detailed(raw_text, Some(size));
        let mut segments = parsed.segments;
        let mut claimed = vec![false; image.boxes().len()];

        let mut report = ImageReport {
            segments: segments.len(),
            skipped_lines: parsed.skipped_lines.len(),
            ..Default::default()
        };

        for segment in &mut segments {
            let best = segment
                .points_denormalized()
                .and_then(|points| self.matcher.best_match(points, image.boxes()));

            match best {
                Some(found) if !claimed[found.position] => {
                    claimed[found.position] = true;
                    image.boxes_mut()[found.position].set_segmentation(segment.source_line());
                    segment.set_matched_box_index(Some(found.box_index));
                    report.matched += 1;
                    debug!(
                        "{}: segment {} matched box {} (overlap {:.2})",
                        image.image_url(),
                        segment.index(),
                        found.box_index,
                        found.overlap_ratio
                    );
                }
                Some(found) => {
                    segment.set_matched_box_index(None);
                    report.unmatched += 1;
                    debug!(
                        "{}: segment {} lost box {} to an earlier segment",
                        image.image_url(),
                        segment.index(),
                        found.box_index
                    );
                }
                None => {
                    segment.set_matched_box_index(None);
                    report.unmatched += 1;
                }
            }
        }

        image.set_segments(segments);
        report
    }

    /// Align every image in `dataset` that has a segmentation source.
    ///
    /// Images without a source are skipped. A source that cannot be loaded is
    /// recorded in [`AlignSummary::errors`] and the pass moves on.
    #[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
    pub fn align_all<S>(&self, dataset: &mut Dataset, source: &S) -> AlignSummary
    where
        S: SegmentationSource + ?Sized,
    {
        let mut summary = AlignSummary::default();

        for (position, image) in dataset.images_mut().iter_mut().enumerate() {
            let Some(source_url) = image.segmentation_source_url().map(str::to_owned) else {
                debug!("{}: no segmentation source, skipping", image.image_url());
                continue;
            };

            let failure = match source.load_segmentation_text(&source_url) {
                Ok(Some(text)) => {
                    let report = self.align_image_in_place(image, &text);
                    summary.processed_count += 1;
                    summary.processed_indices.push(position);
                    summary.matched_segments += report.matched;
                    continue;
                }
                Ok(None) => Error::SourceNotFound(source_url),
                Err(e) => Error::Storage(e),
            };

            let message = format!("image {} ({}): {}", position, image.image_url(), failure);
            warn!("{}", message);
            summary.errors.push(message);
        }

        info!(
            "Aligned {} image(s), {} segment(s) matched, {} error(s)",
            summary.processed_count,
            summary.matched_segments,
            summary.errors.len()
        );
        summary
    }

    /// Load the dataset from `store`, align it and save it back.
    ///
    /// Per-image failures are reported in the summary; a failed save fails
    /// the whole operation with [`Error::PersistenceFailure`].
    #[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
    pub fn align_store<S>(&self, store: &S) -> Result<AlignSummary, Error>
    where
        S: AnnotationStore + ?Sized,
    {
        let mut dataset = store.get_dataset()?;
        let summary = self.align_all(&mut dataset, store);

        store
            .save_dataset(&dataset)
            .map_err(|e| Error::PersistenceFailure(e.to_string()))?;

        Ok(summary)
    }
}
