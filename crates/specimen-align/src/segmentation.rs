// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Parser for raw segmentation text.
//!
//! Each non-empty line encodes one polygon:
//!
//! ```text
//! <label> <nx1> <ny1> <nx2> <ny2> ... <nxk> <nyk>
//! ```
//!
//! with an integer quality label followed by normalized `x y` pairs. Lines
//! that cannot be parsed are skipped with a warning and never abort the rest
//! of the blob. Segment indices are source line positions, so they keep
//! pointing at the original text even after lines are skipped.

use crate::{Error, ImageSize, SegmentSummary};
use itertools::Itertools;
use log::warn;

/// How far outside `[0, 1]` a normalized coordinate may fall before the line
/// is considered malformed rather than edge jitter.
pub const DEFAULT_COORDINATE_TOLERANCE: f64 = 0.1;

/// Minimum tokens per line: a label and one coordinate pair.
const MIN_TOKENS: usize = 3;

/// Segments parsed from one blob along with the source lines that were
/// rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSegmentation {
    pub segments: Vec<SegmentSummary>,
    pub skipped_lines: Vec<usize>,
}

/// Segmentation text parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentParser {
    tolerance: f64,
}

impl Default for SegmentParser {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_COORDINATE_TOLERANCE,
        }
    }
}

impl SegmentParser {
    pub fn new(tolerance: f64) -> Result<Self, Error> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "coordinate tolerance must be a non-negative number: {}",
                tolerance
            )));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Parse a whole blob, skipping malformed lines.
    ///
    /// When `size` is given every segment also gets its pixel-space points.
    pub fn parse(&self, text: &str, size: Option<ImageSize>) -> Vec<SegmentSummary> {
        self.parse_detailed(text, size).segments
    }

    /// Like [`SegmentParser::parse`] but also reports which lines were skipped.
    pub fn parse_detailed(&self, text: &str, size: Option<ImageSize>) -> ParsedSegmentation {
        let mut parsed = ParsedSegmentation::default();

        for (index, line) in text.lines().enumerate() {
            match self.parse_line(index, line, size) {
                Ok(Some(segment)) => parsed.segments.push(segment),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping segmentation line: {}", e);
                    parsed.skipped_lines.push(index);
                }
            }
        }

        parsed
    }

    /// Parse the line found at source position `index`.
    ///
    /// Returns `Ok(None)` for blank lines and [`Error::MalformedLine`] for
    /// lines that do not describe a usable polygon.
    pub fn parse_line(
        &self,
        index: usize,
        line: &str,
        size: Option<ImageSize>,
    ) -> Result<Option<SegmentSummary>, Error> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(None);
        }

        let malformed = |reason: String| Error::MalformedLine {
            line: index,
            reason,
        };

        if tokens.len() < MIN_TOKENS {
            return Err(malformed(format!(
                "expected a label and at least one point, found {} token(s)",
                tokens.len()
            )));
        }

        let label = tokens[0]
            .parse::<i32>()
            .map_err(|e| malformed(format!("invalid label {:?}: {}", tokens[0], e)))?;

        let coords = &tokens[1..];
        if coords.len() % 2 != 0 {
            return Err(malformed(format!(
                "odd number of coordinates ({})",
                coords.len()
            )));
        }

        let values = coords
            .iter()
            .map(|token| match token.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                Ok(_) => Err(malformed(format!("non-finite coordinate {:?}", token))),
                Err(e) => Err(malformed(format!("invalid coordinate {:?}: {}", token, e))),
            })
            .collect::<Result<Vec<f64>, Error>>()?;

        let (low, high) = (-self.tolerance, 1.0 + self.tolerance);
        if let Some(outlier) = values.iter().find(|v| **v < low || **v > high) {
            return Err(malformed(format!(
                "coordinate {} is outside the normalized range",
                outlier
            )));
        }

        let points: Vec<(f64, f64)> = values.into_iter().tuples().collect();
        let mut segment = SegmentSummary::new(index, label, points, line.trim());
        if let Some(size) = size {
            segment.denormalize(size);
        }

        Ok(Some(segment))
    }
}

/// Parse a blob with the default tolerance.
///
/// # Example
/// ```
/// use specimen_align::{ImageSize, parse_segmentation};
///
/// let text = "1 0.1 0.1 0.2 0.1 0.2 0.2\n\n0 0.5 0.5 0.6\n";
/// let segments = parse_segmentation(text, ImageSize::new(100.0, 100.0).ok());
///
/// // The blank line is ignored and the odd-length line is skipped.
/// assert_eq!(segments.len(), 1);
/// assert_eq!(segments[0].points_count(), 3);
/// assert_eq!(segments[0].label_text(), "Complete");
/// ```
pub fn parse_segmentation(text: &str, size: Option<ImageSize>) -> Vec<SegmentSummary> {
    SegmentParser::default().parse(text, size)
}

/// Parse one line with the default tolerance.
///
/// See [`SegmentParser::parse_line`].
pub fn parse_segmentation_line(
    index: usize,
    line: &str,
    size: Option<ImageSize>,
) -> Result<Option<SegmentSummary>, Error> {
    SegmentParser::default().parse_line(index, line, size)
}

/// Check a single segmentation line before it is stored.
///
/// Stricter than the parser: an editor must submit at least two points so
/// the polygon has some extent.
pub fn validate_segmentation_line(line: &str) -> Result<(), Error> {
    let segment = parse_segmentation_line(0, line, None)?.ok_or_else(|| Error::MalformedLine {
        line: 0,
        reason: "empty line".to_owned(),
    })?;

    if segment.points_count() < 2 {
        return Err(Error::MalformedLine {
            line: 0,
            reason: format!("need at least 2 points, found {}", segment.points_count()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size() -> Option<ImageSize> {
        ImageSize::new(100.0, 200.0).ok()
    }

    #[test]
    fn test_parse_single_polygon() {
        let segments = parse_segmentation("1 0.1 0.2 0.3 0.4 0.5 0.6", size());
        assert_eq!(segments.len(), 1);

        let seg = &segments[0];
        assert_eq!(seg.index(), 0);
        assert_eq!(seg.label(), 1);
        assert_eq!(seg.points_count(), 3);
        assert_eq!(seg.points_normalized(), &[(0.1, 0.2), (0.3, 0.4), (0.5, 0.6)]);

        let pixels = seg.points_denormalized().unwrap();
        assert!((pixels[2].0 - 50.0).abs() < 1e-9);
        assert!((pixels[2].1 - 120.0).abs() < 1e-9);
        assert_eq!(seg.source_line(), "1 0.1 0.2 0.3 0.4 0.5 0.6");
        assert!(seg.matched_box_index().is_none());
    }

    #[test]
    fn test_denormalization_deferred_without_size() {
        let segments = parse_segmentation("0 0.5 0.5 0.6 0.6", None);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].points_denormalized().is_none());
    }

    #[test]
    fn test_indices_are_source_positions() {
        let text = "1 0.1 0.1 0.2 0.2\nbroken line here\n\n2 0.3 0.3 0.4 0.4\n";
        let parsed = SegmentParser::default().parse_detailed(text, None);

        let indices: Vec<usize> = parsed.segments.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(parsed.skipped_lines, vec![1]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = [
            "1 0.1 0.1 0.2 0.2",    // ok
            "1 0.1",                // too few tokens
            "1 0.1 0.1 0.2",        // odd coordinate count
            "x 0.1 0.1 0.2 0.2",    // bad label
            "1 0.1 abc 0.2 0.2",    // bad coordinate
            "1 0.1 NaN 0.2 0.2",    // non-finite
            "1 0.1 0.1 250.0 0.2",  // far outlier
            "3 1.05 -0.02 0.5 0.5", // edge jitter is tolerated
        ]
        .join("\n");

        let parsed = SegmentParser::default().parse_detailed(&text, size());
        let indices: Vec<usize> = parsed.segments.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 7]);
        assert_eq!(parsed.skipped_lines, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(parse_segmentation_line(0, "   ", None).unwrap().is_none());
        assert!(matches!(
            parse_segmentation_line(4, "1 0.5 0.5 0.5", None),
            Err(Error::MalformedLine { line: 4, .. })
        ));

        let segment = parse_segmentation_line(2, "0 0.5 0.5", None).unwrap().unwrap();
        assert_eq!(segment.index(), 2);
        assert_eq!(segment.points_count(), 1);
    }

    #[test]
    fn test_tolerance_is_configurable() {
        let strict = SegmentParser::new(0.0).unwrap();
        assert!(strict.parse_line(0, "1 1.01 0.5", None).is_err());
        assert!(strict.parse_line(0, "1 1.0 0.5", None).unwrap().is_some());

        assert!(SegmentParser::new(-0.5).is_err());
        assert!(SegmentParser::new(f64::NAN).is_err());
    }

    #[test]
    fn test_tabs_and_trailing_whitespace() {
        let segments = parse_segmentation("2\t0.1 0.1   0.2 0.2  \r\n", None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].points_count(), 2);
        assert_eq!(segments[0].source_line(), "2\t0.1 0.1   0.2 0.2");
    }

    #[test]
    fn test_validate_segmentation_line() {
        assert!(validate_segmentation_line("1 0.1 0.1 0.2 0.2").is_ok());
        assert!(validate_segmentation_line("1 0.1 0.1").is_err());
        assert!(validate_segmentation_line("").is_err());
        assert!(validate_segmentation_line("1 0.1 0.1 0.2").is_err());
    }
}
