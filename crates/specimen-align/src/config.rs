// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Engine configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. a configuration file (TOML, JSON or YAML, chosen by extension); when no
//!    path is given the platform config directory is tried, e.g.
//!    `~/.config/specimen-align/config.toml` on Linux
//! 3. `SPECIMEN_ALIGN_*` environment variables
//!
//! ```bash
//! export SPECIMEN_ALIGN_OVERLAP_THRESHOLD=0.6
//! export SPECIMEN_ALIGN_DEFAULT_IMAGE_WIDTH=2048
//! ```

use crate::{
    BoxMatcher, DEFAULT_COORDINATE_TOLERANCE, DEFAULT_IMAGE_SIZE, DEFAULT_OVERLAP_THRESHOLD,
    Error, ImageSize, SegmentParser,
};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "SPECIMEN_ALIGN";

/// Tunable parameters of the alignment engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AlignConfig {
    /// Minimum share of polygon points inside a box for a match.
    pub overlap_threshold: f64,
    /// Width used for images without recorded dimensions.
    pub default_image_width: f64,
    /// Height used for images without recorded dimensions.
    pub default_image_height: f64,
    /// Allowed overshoot of normalized coordinates outside `[0, 1]`.
    pub coordinate_tolerance: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            default_image_width: DEFAULT_IMAGE_SIZE.width(),
            default_image_height: DEFAULT_IMAGE_SIZE.height(),
            coordinate_tolerance: DEFAULT_COORDINATE_TOLERANCE,
        }
    }
}

impl AlignConfig {
    /// Platform specific default configuration file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "Specimen", "specimen-align")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the layered configuration.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                debug!("Loading configuration from {:?}", path);
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    debug!("Loading optional configuration from {:?}", path);
                    builder = builder.add_source(File::from(path.as_path()).required(false));
                }
            }
        }

        let config: AlignConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every value is usable by the engine.
    pub fn validate(&self) -> Result<(), Error> {
        self.matcher()?;
        self.parser()?;
        self.default_image_size()?;
        Ok(())
    }

    pub fn matcher(&self) -> Result<BoxMatcher, Error> {
        BoxMatcher::new(self.overlap_threshold)
    }

    pub fn parser(&self) -> Result<SegmentParser, Error> {
        SegmentParser::new(self.coordinate_tolerance)
    }

    pub fn default_image_size(&self) -> Result<ImageSize, Error> {
        ImageSize::new(self.default_image_width, self.default_image_height)
    }
}
