// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Coordinate and rectangle arithmetic shared by the parser and matcher.
//!
//! ## Coordinate Systems
//!
//! - **Pixel**: image-space coordinates, top-left origin. Bounding boxes are
//!   stored as corners `x1,y1,x2,y2` in this space.
//! - **Normalized**: fractions of image width/height in `[0, 1]`. Polygon
//!   points arrive in this space, and [`NormalizedRect`] uses the YOLO
//!   center/size layout.

use crate::Error;
use serde::{Deserialize, Serialize};

/// Image size substituted when a record carries no usable dimensions.
///
/// Upstream capture of the true image size is not guaranteed, so the engine
/// degrades to this size instead of failing the alignment.
pub const DEFAULT_IMAGE_SIZE: ImageSize = ImageSize {
    width: 1024.0,
    height: 768.0,
};

/// Validated image dimensions in pixels.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ImageSize {
    width: f64,
    height: f64,
}

impl ImageSize {
    /// Create an image size, rejecting non-positive or non-finite values.
    pub fn new(width: f64, height: f64) -> Result<Self, Error> {
        check_dimensions(width, height)?;
        Ok(Self { width, height })
    }

    /// Use the given dimensions when both are valid, otherwise `fallback`.
    pub fn or_fallback(width: Option<f64>, height: Option<f64>, fallback: ImageSize) -> Self {
        match (width, height) {
            (Some(w), Some(h)) => ImageSize::new(w, h).unwrap_or(fallback),
            _ => fallback,
        }
    }

    /// Same as [`ImageSize::or_fallback`] with [`DEFAULT_IMAGE_SIZE`].
    pub fn or_default(width: Option<f64>, height: Option<f64>) -> Self {
        Self::or_fallback(width, height, DEFAULT_IMAGE_SIZE)
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        DEFAULT_IMAGE_SIZE
    }
}

fn check_dimensions(width: f64, height: f64) -> Result<(), Error> {
    if !(width.is_finite() && width > 0.0) || !(height.is_finite() && height > 0.0) {
        return Err(Error::InvalidDimension(format!(
            "width and height must be positive: {}x{}",
            width, height
        )));
    }
    Ok(())
}

/// Convert a pixel coordinate to the normalized `[0, 1]` range.
///
/// # Example
/// ```
/// use specimen_align::normalize;
///
/// let (nx, ny) = normalize(512.0, 192.0, 1024.0, 768.0).unwrap();
/// assert_eq!((nx, ny), (0.5, 0.25));
/// assert!(normalize(1.0, 1.0, 0.0, 768.0).is_err());
/// ```
pub fn normalize(x: f64, y: f64, width: f64, height: f64) -> Result<(f64, f64), Error> {
    check_dimensions(width, height)?;
    Ok((x / width, y / height))
}

/// Convert a normalized coordinate back to pixel space.
///
/// No clamping is applied: points slightly outside `[0, 1]` are legitimate at
/// polygon edges. Far outliers are rejected by the parser instead.
pub fn denormalize(nx: f64, ny: f64, width: f64, height: f64) -> (f64, f64) {
    (nx * width, ny * height)
}

/// Inclusive point-in-rectangle test (`x1 <= x <= x2 && y1 <= y <= y2`).
pub fn point_in_rect(x: f64, y: f64, rect: &Rect) -> bool {
    rect.x1 <= x && x <= rect.x2 && rect.y1 <= y && y <= rect.y2
}

/// Axis-aligned rectangle in pixel space, stored as its two corners.
///
/// Serialized as the `"x1,y1,x2,y2"` string the annotation tool stores;
/// a four element array is also accepted when deserializing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, Error> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidRect(format!(
                "non-finite corner in [{}, {}, {}, {}]",
                x1, y1, x2, y2
            )));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(Error::InvalidRect(format!(
                "corners out of order: [{}, {}, {}, {}]",
                x1, y1, x2, y2
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Parse the comma separated `"x1,y1,x2,y2"` form.
    ///
    /// # Example
    /// ```
    /// use specimen_align::Rect;
    ///
    /// let rect = Rect::parse("36.5,26,247.5,437").unwrap();
    /// assert_eq!(rect.x1(), 36.5);
    /// assert_eq!(rect.to_string(), "36.5,26,247.5,437");
    /// ```
    pub fn parse(s: &str) -> Result<Self, Error> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRect(format!("{:?}: {}", s, e)))?;

        match values.as_slice() {
            [x1, y1, x2, y2] => Rect::new(*x1, *y1, *x2, *y2),
            _ => Err(Error::InvalidRect(format!(
                "expected 4 values, found {} in {:?}",
                values.len(),
                s
            ))),
        }
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        point_in_rect(x, y, self)
    }

    /// Center/size representation relative to the image size.
    pub fn to_normalized(&self, size: ImageSize) -> NormalizedRect {
        NormalizedRect::new(
            (self.x1 + self.width() / 2.0) / size.width,
            (self.y1 + self.height() / 2.0) / size.height,
            self.width() / size.width,
            self.height() / size.height,
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

impl std::str::FromStr for Rect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rect::parse(s)
    }
}

impl serde::Serialize for Rect {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Rect {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RectRaw {
            Text(String),
            Corners([f64; 4]),
        }

        let rect = match RectRaw::deserialize(deserializer)? {
            RectRaw::Text(s) => Rect::parse(&s),
            RectRaw::Corners([x1, y1, x2, y2]) => Rect::new(x1, y1, x2, y2),
        };
        rect.map_err(serde::de::Error::custom)
    }
}

/// Normalized center/size rectangle (YOLO layout).
///
/// `class` is the leading class id of a YOLO label line, kept so the line can
/// be written back unchanged.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct NormalizedRect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<u32>,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl NormalizedRect {
    pub fn new(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            class: None,
            cx,
            cy,
            w,
            h,
        }
    }

    pub fn with_class(mut self, class: Option<u32>) -> Self {
        self.class = class;
        self
    }

    /// Parse a YOLO label line, `"<class> cx cy w h"` or just `"cx cy w h"`.
    ///
    /// # Example
    /// ```
    /// use specimen_align::NormalizedRect;
    ///
    /// let line = "1 0.042099 0.049785 0.062556 0.088387";
    /// let norm = NormalizedRect::parse_yolo(line).unwrap();
    /// assert_eq!(norm.class, Some(1));
    /// assert_eq!(norm.to_yolo(), line);
    /// ```
    pub fn parse_yolo(s: &str) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidRect(format!("{:?}: {}", s, reason));
        let tokens: Vec<&str> = s.split_whitespace().collect();

        let (class, coords) = match tokens.as_slice() {
            [class, coords @ ..] if coords.len() == 4 => {
                let class = class
                    .parse::<u32>()
                    .map_err(|e| invalid(format!("invalid class id: {}", e)))?;
                (Some(class), coords)
            }
            coords if coords.len() == 4 => (None, coords),
            _ => return Err(invalid("expected YOLO box with 4 or 5 values".to_owned())),
        };

        let values = coords
            .iter()
            .map(|v| v.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;

        match values.as_slice() {
            [cx, cy, w, h] => Ok(Self::new(*cx, *cy, *w, *h).with_class(class)),
            _ => Err(invalid("expected 4 coordinates".to_owned())),
        }
    }

    /// YOLO label line with six decimals, prefixed by the class id if known.
    pub fn to_yolo(&self) -> String {
        let coords = format!("{:.6} {:.6} {:.6} {:.6}", self.cx, self.cy, self.w, self.h);
        match self.class {
            Some(class) => format!("{} {}", class, coords),
            None => coords,
        }
    }

    /// Pixel-space corners for the given image size.
    pub fn to_rect(&self, size: ImageSize) -> Result<Rect, Error> {
        let (cx, cy) = denormalize(self.cx, self.cy, size.width, size.height);
        let (w, h) = denormalize(self.w, self.h, size.width, size.height);
        Rect::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }
}
