// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Annotation records: images, their bounding boxes and parsed segments.
//!
//! The records read and write the JSON of the annotation tool, which stores
//! dimensions as strings (`"1024"`, or `""` when unknown), boxes under `info`
//! with `bbox`/`yolo_bbox`/`species` keys and segment summaries under
//! `segmentation_indices_array`. Those stored names and forms are written
//! back unchanged; the Rust field names are accepted as aliases on input.
//! Unknown keys are kept in an `extra` map so a load/save cycle never drops
//! data the engine does not own.

use crate::{Error, ImageSize, NormalizedRect, Rect, geometry::denormalize, labels::label_text};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One detected specimen on an image, tagged with a species label.
///
/// The alignment engine only ever touches the `segmentation` field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BoxRecord {
    index: i64,
    #[serde(rename = "species", alias = "species_label", default)]
    species_label: String,
    #[serde(
        rename = "bbox",
        alias = "rect",
        default,
        deserialize_with = "deserialize_optional_rect",
        serialize_with = "serialize_optional_rect"
    )]
    rect: Option<Rect>,
    #[serde(
        rename = "yolo_bbox",
        alias = "normalized_rect",
        default,
        deserialize_with = "deserialize_normalized_rect",
        serialize_with = "serialize_normalized_rect"
    )]
    normalized_rect: Option<NormalizedRect>,
    #[serde(default, deserialize_with = "deserialize_segmentation")]
    segmentation: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl BoxRecord {
    /// Create a box record, deriving `normalized_rect` from `rect` and `size`.
    pub fn new(index: i64, species_label: &str, rect: Option<Rect>, size: ImageSize) -> Self {
        Self {
            index,
            species_label: species_label.to_owned(),
            rect,
            normalized_rect: rect.map(|r| r.to_normalized(size)),
            segmentation: String::new(),
            extra: Map::new(),
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn species_label(&self) -> &str {
        &self.species_label
    }

    pub fn rect(&self) -> Option<&Rect> {
        self.rect.as_ref()
    }

    pub fn normalized_rect(&self) -> Option<&NormalizedRect> {
        self.normalized_rect.as_ref()
    }

    /// Raw segmentation line matched to this box, empty when unmatched.
    pub fn segmentation(&self) -> &str {
        &self.segmentation
    }

    pub fn has_segmentation(&self) -> bool {
        !self.segmentation.is_empty()
    }

    /// Fields carried through from storage that this crate does not model.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Replace the rectangle and re-derive `normalized_rect`.
    pub fn set_rect(&mut self, rect: Option<Rect>, size: ImageSize) {
        self.rect = rect;
        self.sync_normalized_rect(size);
    }

    pub fn set_segmentation(&mut self, line: &str) {
        self.segmentation = line.to_owned();
    }

    pub fn clear_segmentation(&mut self) {
        self.segmentation.clear();
    }

    fn sync_normalized_rect(&mut self, size: ImageSize) {
        let class = self.normalized_rect.and_then(|n| n.class);
        self.normalized_rect = self.rect.map(|r| r.to_normalized(size).with_class(class));
    }
}

/// One parsed polygon line of a segmentation text blob.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SegmentSummary {
    index: usize,
    label: i32,
    label_text: String,
    points_count: usize,
    points_normalized: Vec<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    points_denormalized: Option<Vec<(f64, f64)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_box_index: Option<i64>,
    #[serde(skip)]
    source_line: String,
}

impl SegmentSummary {
    /// Create a summary for the polygon found on source line `index`.
    ///
    /// `source_line` is the raw text of that line; it is what gets written
    /// into a matched box's `segmentation` field.
    pub fn new(index: usize, label: i32, points: Vec<(f64, f64)>, source_line: &str) -> Self {
        Self {
            index,
            label,
            label_text: label_text(label).to_owned(),
            points_count: points.len(),
            points_normalized: points,
            points_denormalized: None,
            matched_box_index: None,
            source_line: source_line.to_owned(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> i32 {
        self.label
    }

    pub fn label_text(&self) -> &str {
        &self.label_text
    }

    pub fn points_count(&self) -> usize {
        self.points_count
    }

    pub fn points_normalized(&self) -> &[(f64, f64)] {
        &self.points_normalized
    }

    /// Pixel-space points, `None` until [`SegmentSummary::denormalize`] runs.
    pub fn points_denormalized(&self) -> Option<&[(f64, f64)]> {
        self.points_denormalized.as_deref()
    }

    pub fn matched_box_index(&self) -> Option<i64> {
        self.matched_box_index
    }

    pub fn source_line(&self) -> &str {
        &self.source_line
    }

    /// Scale the normalized points into pixel space for `size`.
    pub fn denormalize(&mut self, size: ImageSize) {
        self.points_denormalized = Some(
            self.points_normalized
                .iter()
                .map(|&(nx, ny)| denormalize(nx, ny, size.width(), size.height()))
                .collect(),
        );
    }

    /// Pixel points rounded to integers as `"x1 y1 x2 y2 ..."`.
    pub fn denormalized_points_string(&self) -> Option<String> {
        let points = self.points_denormalized.as_ref()?;
        Some(
            points
                .iter()
                .map(|(x, y)| format!("{} {}", x.round(), y.round()))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    pub(crate) fn set_matched_box_index(&mut self, index: Option<i64>) {
        self.matched_box_index = index;
    }
}

/// All annotation layers for one source image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageRecord {
    image_url: String,
    // Dimensions keep their stored form (number, numeric string or "").
    #[serde(
        default,
        deserialize_with = "deserialize_dimension",
        skip_serializing_if = "Value::is_null"
    )]
    image_width: Value,
    #[serde(
        default,
        deserialize_with = "deserialize_dimension",
        skip_serializing_if = "Value::is_null"
    )]
    image_height: Value,
    #[serde(rename = "info", alias = "boxes", default)]
    boxes: Vec<BoxRecord>,
    #[serde(
        rename = "segmentation_url",
        alias = "segmentation_source_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    segmentation_source_url: Option<String>,
    #[serde(
        rename = "segmentation_indices_array",
        alias = "segments",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    segments: Option<Vec<SegmentSummary>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ImageRecord {
    pub fn new(image_url: &str, image_width: Option<f64>, image_height: Option<f64>) -> Self {
        Self {
            image_url: image_url.to_owned(),
            image_width: image_width.map(Value::from).unwrap_or_default(),
            image_height: image_height.map(Value::from).unwrap_or_default(),
            boxes: Vec::new(),
            segmentation_source_url: None,
            segments: None,
            extra: Map::new(),
        }
    }

    pub fn with_boxes(mut self, boxes: Vec<BoxRecord>) -> Self {
        self.boxes = boxes;
        self
    }

    pub fn with_segmentation_source_url(mut self, url: &str) -> Self {
        self.segmentation_source_url = Some(url.to_owned());
        self
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn image_width(&self) -> Option<f64> {
        dimension_value(&self.image_width)
    }

    pub fn image_height(&self) -> Option<f64> {
        dimension_value(&self.image_height)
    }

    pub fn boxes(&self) -> &[BoxRecord] {
        &self.boxes
    }

    pub fn boxes_mut(&mut self) -> &mut [BoxRecord] {
        &mut self.boxes
    }

    pub fn segmentation_source_url(&self) -> Option<&str> {
        self.segmentation_source_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }

    pub fn segments(&self) -> &[SegmentSummary] {
        self.segments.as_deref().unwrap_or_default()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn set_segments(&mut self, segments: Vec<SegmentSummary>) {
        self.segments = Some(segments);
    }

    /// Image size for coordinate conversion, `fallback` when the record has
    /// no usable dimensions.
    pub fn resolve_size(&self, fallback: ImageSize) -> ImageSize {
        match (self.image_width(), self.image_height()) {
            (Some(w), Some(h)) => match ImageSize::new(w, h) {
                Ok(size) => size,
                Err(e) => {
                    warn!("{}: {}, using {:?}", self.image_url, e, fallback);
                    fallback
                }
            },
            _ => {
                warn!(
                    "{}: image dimensions unknown, using {}x{}",
                    self.image_url,
                    fallback.width(),
                    fallback.height()
                );
                fallback
            }
        }
    }

    /// Re-derive every box's `normalized_rect` from its `rect`.
    pub fn sync_normalized_rects(&mut self, fallback: ImageSize) {
        let size = self.resolve_size(fallback);
        for bbox in &mut self.boxes {
            bbox.sync_normalized_rect(size);
        }
    }
}

/// The annotation dataset: every image record known to the application.
///
/// Deserializes from either a bare JSON array of images or an object with
/// an `images` array. Always serializes to the object form.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    images: Vec<ImageRecord>,
}

impl Dataset {
    pub fn new(images: Vec<ImageRecord>) -> Self {
        Self { images }
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [ImageRecord] {
        &mut self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Images that carry a segmentation source, as `(image_url, source_url)`.
    pub fn segmentation_sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.images.iter().filter_map(|image| {
            image
                .segmentation_source_url()
                .map(|url| (image.image_url(), url))
        })
    }

    /// Position and record of the image with the given URL.
    pub fn find(&self, image_url: &str) -> Option<(usize, &ImageRecord)> {
        self.images
            .iter()
            .enumerate()
            .find(|(_, image)| image.image_url == image_url)
    }

    pub fn find_mut(&mut self, image_url: &str) -> Result<&mut ImageRecord, Error> {
        self.images
            .iter_mut()
            .find(|image| image.image_url == image_url)
            .ok_or_else(|| Error::MissingImage(image_url.to_owned()))
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DatasetRaw {
            List(Vec<ImageRecord>),
            Wrapped { images: Vec<ImageRecord> },
        }

        Ok(match DatasetRaw::deserialize(deserializer)? {
            DatasetRaw::List(images) | DatasetRaw::Wrapped { images } => Dataset { images },
        })
    }
}

/// Accepts numbers, numeric strings and `""`/`null` (absent). The value is
/// kept as stored.
fn deserialize_dimension<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null | Value::Number(_) => Ok(value),
        Value::String(s) if s.trim().is_empty() || s.trim().parse::<f64>().is_ok() => Ok(value),
        other => Err(serde::de::Error::custom(format!(
            "invalid dimension: {}",
            other
        ))),
    }
}

fn dimension_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// `""` means the box has not been drawn yet.
fn deserialize_optional_rect<'de, D>(deserializer: D) -> Result<Option<Rect>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        value => Rect::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Undrawn boxes are written back as `""`.
fn serialize_optional_rect<S>(rect: &Option<Rect>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match rect {
        Some(rect) => serializer.collect_str(rect),
        None => serializer.serialize_str(""),
    }
}

/// Written back as the YOLO label line, `""` when absent.
fn serialize_normalized_rect<S>(
    rect: &Option<NormalizedRect>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match rect {
        Some(rect) => serializer.serialize_str(&rect.to_yolo()),
        None => serializer.serialize_str(""),
    }
}

/// Accepts the struct form or a YOLO string. The field is derived, so an
/// unreadable value is dropped rather than failing the whole record.
fn deserialize_normalized_rect<'de, D>(deserializer: D) -> Result<Option<NormalizedRect>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => NormalizedRect::parse_yolo(s).map_err(|e| e.to_string()),
        _ => serde_json::from_value::<NormalizedRect>(value.clone()).map_err(|e| e.to_string()),
    };

    match parsed {
        Ok(rect) => Ok(Some(rect)),
        Err(e) => {
            warn!("dropping unreadable normalized rect {}: {}", value, e);
            Ok(None)
        }
    }
}

/// Older revisions stored a list of polygons per box; those are reset to
/// empty and rebuilt on the next alignment pass.
fn deserialize_segmentation<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => {
            debug!("discarding legacy segmentation value {}", other);
            Ok(String::new())
        }
    }
}
