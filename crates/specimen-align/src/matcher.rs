// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Polygon to bounding-box matching.
//!
//! A polygon belongs to a box when at least `threshold` of its vertices fall
//! inside the box. The majority rule absorbs boundary jitter between the two
//! independently drawn annotation layers while rejecting polygons that
//! straddle several boxes or belong to none.

use crate::{BoxRecord, Error, Rect};

/// Default minimum share of polygon points that must fall inside a box.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Fraction of `points` inside `rect`, `0.0` for an empty polygon.
pub fn overlap_ratio(points: &[(f64, f64)], rect: &Rect) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let inside = points.iter().filter(|(x, y)| rect.contains(*x, *y)).count();
    inside as f64 / points.len() as f64
}

/// The box selected for a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxMatch {
    /// Position of the box in the candidate slice.
    pub position: usize,
    /// The box's own `index` field.
    pub box_index: i64,
    pub overlap_ratio: f64,
}

/// Selects the best bounding box for a polygon under a threshold policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxMatcher {
    threshold: f64,
}

impl Default for BoxMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

impl BoxMatcher {
    pub fn new(threshold: f64) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidParameters(format!(
                "overlap threshold must be within [0, 1]: {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Find the box holding the largest share of `points`.
    ///
    /// Ties go to the earliest box in `boxes`. Boxes without a rectangle, or
    /// holding none of the points, are never candidates. Returns `None` when
    /// no box reaches the threshold.
    ///
    /// # Example
    /// ```
    /// use specimen_align::{BoxMatcher, BoxRecord, ImageSize, Rect};
    ///
    /// let size = ImageSize::default();
    /// let boxes = vec![
    ///     BoxRecord::new(7, "Navicula", Some(Rect::new(0.0, 0.0, 10.0, 10.0)?), size),
    ///     BoxRecord::new(8, "Lyrella", Some(Rect::new(20.0, 20.0, 30.0, 30.0)?), size),
    /// ];
    /// let points = [(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (25.0, 25.0)];
    ///
    /// let best = BoxMatcher::default().best_match(&points, &boxes).unwrap();
    /// assert_eq!(best.box_index, 7);
    /// assert_eq!(best.overlap_ratio, 0.75);
    /// # Ok::<(), specimen_align::Error>(())
    /// ```
    pub fn best_match(&self, points: &[(f64, f64)], boxes: &[BoxRecord]) -> Option<BoxMatch> {
        if points.is_empty() || boxes.is_empty() {
            return None;
        }

        let mut best: Option<BoxMatch> = None;
        for (position, bbox) in boxes.iter().enumerate() {
            let Some(rect) = bbox.rect() else {
                continue;
            };

            let ratio = overlap_ratio(points, rect);
            if ratio > 0.0 && best.is_none_or(|b| ratio > b.overlap_ratio) {
                best = Some(BoxMatch {
                    position,
                    box_index: bbox.index(),
                    overlap_ratio: ratio,
                });
            }
        }

        best.filter(|b| b.overlap_ratio >= self.threshold)
    }
}
