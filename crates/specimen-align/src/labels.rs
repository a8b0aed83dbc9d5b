// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

/// Display text for codes outside the known label table.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Completeness/quality label attached to a segmentation polygon.
///
/// The numeric code is the first token of every segmentation line.
///
/// # Examples
///
/// ```rust
/// use specimen_align::{SegmentLabel, label_text};
///
/// let label = SegmentLabel::try_from(1).unwrap();
/// assert_eq!(label, SegmentLabel::Complete);
/// assert_eq!(label.to_string(), "Complete");
/// assert_eq!(label_text(7), "Unknown");
/// ```
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum SegmentLabel {
    /// Specimen is only partially visible.
    Incomplete,
    /// Whole specimen outlined.
    Complete,
    /// Specimen is broken into pieces.
    Fragmented,
    /// Outline drawn on an out-of-focus specimen.
    Blurred,
    /// Specimen photographed from the side (girdle view).
    SideView,
}

impl SegmentLabel {
    /// Numeric code written in segmentation lines.
    pub fn code(&self) -> i32 {
        match self {
            SegmentLabel::Incomplete => 0,
            SegmentLabel::Complete => 1,
            SegmentLabel::Fragmented => 2,
            SegmentLabel::Blurred => 3,
            SegmentLabel::SideView => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentLabel::Incomplete => "Incomplete",
            SegmentLabel::Complete => "Complete",
            SegmentLabel::Fragmented => "Fragmented",
            SegmentLabel::Blurred => "Blurred",
            SegmentLabel::SideView => "SideView",
        }
    }

    /// All labels in code order.
    pub fn all() -> [SegmentLabel; 5] {
        [
            SegmentLabel::Incomplete,
            SegmentLabel::Complete,
            SegmentLabel::Fragmented,
            SegmentLabel::Blurred,
            SegmentLabel::SideView,
        ]
    }
}

impl TryFrom<i32> for SegmentLabel {
    type Error = crate::Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        SegmentLabel::all()
            .into_iter()
            .find(|label| label.code() == code)
            .ok_or_else(|| crate::Error::InvalidParameters(format!("unknown label code {}", code)))
    }
}

impl std::str::FromStr for SegmentLabel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SegmentLabel::all()
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::InvalidParameters(format!("unknown label {:?}", s)))
    }
}

impl std::fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a numeric label code to its display text, `"Unknown"` if unmapped.
pub fn label_text(code: i32) -> &'static str {
    SegmentLabel::try_from(code)
        .map(|label| label.as_str())
        .unwrap_or(UNKNOWN_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_text_table() {
        assert_eq!(label_text(0), "Incomplete");
        assert_eq!(label_text(1), "Complete");
        assert_eq!(label_text(2), "Fragmented");
        assert_eq!(label_text(3), "Blurred");
        assert_eq!(label_text(4), "SideView");
        assert_eq!(label_text(5), UNKNOWN_LABEL);
        assert_eq!(label_text(-1), UNKNOWN_LABEL);
    }

    #[test]
    fn test_label_codes_roundtrip() {
        for label in SegmentLabel::all() {
            assert_eq!(SegmentLabel::try_from(label.code()).unwrap(), label);
            assert_eq!(label.as_str().parse::<SegmentLabel>().unwrap(), label);
        }
        assert_eq!("sideview".parse::<SegmentLabel>().unwrap(), SegmentLabel::SideView);
        assert!("Diatom".parse::<SegmentLabel>().is_err());
    }
}
