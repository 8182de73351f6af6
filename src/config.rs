use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Error, Result};

/// Highway classes kept by default; anything else (footways, tracks, ...) is dropped.
pub const DEFAULT_WAY_TYPES: [&str; 9] = [
    "motorway", "trunk", "primary", "secondary", "tertiary",
    "unclassified", "residential", "service", "living_street",
];

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_way_types() -> Vec<String> {
    DEFAULT_WAY_TYPES.iter().map(|s| s.to_string()).collect()
}

fn default_epsilon() -> f64 {
    0.0001
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.min_lon <= lon && lon <= self.max_lon && self.min_lat <= lat && lat <= self.max_lat
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserConfig {
    /// `.osm` file, or `.osm.xz`.
    pub data_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_way_types")]
    pub way_types: Vec<String>,
    /// Resampling spacing, in degrees.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub max_points: Option<usize>,
    /// Nodes outside are not read at all.
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl UserConfig {
    pub fn new(data_path: &str) -> Self {
        UserConfig {
            data_path: data_path.to_string(),
            output_dir: default_output_dir(),
            way_types: default_way_types(),
            epsilon: default_epsilon(),
            max_points: None,
            bounds: None,
            log_level: default_log_level(),
        }
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let config: UserConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(format!("config: epsilon must be a positive finite number, got {}", self.epsilon).into());
        }
        if self.way_types.is_empty() {
            return Err("config: way_types must not be empty".into());
        }
        if let Some(bounds) = &self.bounds {
            if bounds.min_lon > bounds.max_lon || bounds.min_lat > bounds.max_lat {
                return Err(format!("config: bounds are inverted: {bounds:?}").into());
            }
        }
        Ok(())
    }

    /// Directory holding every stage output for this input file.
    pub fn stage_dir(&self) -> Result<PathBuf> {
        let input_fname = Path::new(&self.data_path)
            .file_name()
            .ok_or_else(|| Error::from(format!("config: no file name in data_path {:?}", self.data_path)))?;
        Ok(Path::new(&self.output_dir).join(input_fname))
    }
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path)
        .map_err(|err| Error::from(format!("could not open config file {}: {err}", path.display())))?;
    UserConfig::from_reader(file)
}
