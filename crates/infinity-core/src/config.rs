//! Experiment configuration
//!
//! A single immutable [`ExperimentConfig`] is built at startup and handed to
//! every component constructor. Nothing reads configuration from globals.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Valid diffusion chain codes
    #[serde(default = "default_chain_codes")]
    pub chain_codes: Vec<String>,

    /// Highest generation number a run may use
    #[serde(default = "default_max_generation")]
    pub max_generation: u32,

    /// Number of stimuli in each dynamic and stable set
    #[serde(default = "default_set_size")]
    pub set_size: usize,

    /// Time each training item stays on screen, in milliseconds
    #[serde(default = "default_time_per_training_item")]
    pub time_per_training_item_ms: u64,

    /// Delay before the training word is shown, in milliseconds
    #[serde(default = "default_word_delay")]
    pub word_delay_ms: u64,

    /// Countdown on the break page, in seconds
    #[serde(default = "default_break_countdown")]
    pub break_countdown_secs: u64,

    /// Triangle canvas
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// Minimum distance between points A and B
    #[serde(default = "default_min_distance_b")]
    pub min_distance_b: f64,

    /// Minimum vertical offset of point C from the line through A and B
    #[serde(default = "default_min_distance_c")]
    pub min_distance_c: f64,

    /// Root of the per-condition, per-chain set files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Append-only training score log
    #[serde(default = "default_scores_file")]
    pub scores_file: PathBuf,

    /// Status file naming the run in progress
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    /// Directory holding one vocalization per stimulus word
    #[serde(default = "default_vocalization_dir")]
    pub vocalization_dir: PathBuf,

    /// File extension of vocalization assets
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,

    /// Serialize answer appends per file inside this process
    #[serde(default = "default_true")]
    pub serialize_appends: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            chain_codes: default_chain_codes(),
            max_generation: default_max_generation(),
            set_size: default_set_size(),
            time_per_training_item_ms: default_time_per_training_item(),
            word_delay_ms: default_word_delay(),
            break_countdown_secs: default_break_countdown(),
            canvas: CanvasConfig::default(),
            min_distance_b: default_min_distance_b(),
            min_distance_c: default_min_distance_c(),
            data_dir: default_data_dir(),
            scores_file: default_scores_file(),
            status_file: default_status_file(),
            vocalization_dir: default_vocalization_dir(),
            audio_extension: default_audio_extension(),
            serialize_appends: true,
        }
    }
}

impl ExperimentConfig {
    /// Configuration rooted at `root`: data, scores, status and vocalizations all live below it.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            scores_file: root.join("data").join("scores"),
            status_file: root.join("data").join("detect"),
            vocalization_dir: root.join("vocalizations"),
            ..Default::default()
        }
    }

    /// Whether `code` is one of the configured chain codes
    pub fn is_valid_chain(&self, code: &str) -> bool {
        self.chain_codes.iter().any(|c| c == code)
    }
}

/// Canvas geometry for triangle stimuli, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: i32,
    pub height: i32,
    /// Unusable border around the canvas
    pub border: i32,
    pub line_thickness: u32,
    pub orienting_spot_radius: u32,
}

impl CanvasConfig {
    /// Check that the area inside the border can hold a vertex on both axes
    pub fn validate(&self) -> Result<(), String> {
        if self.border < 0 {
            return Err(format!("canvas border {} is negative", self.border));
        }
        for (axis, size) in [("width", self.width), ("height", self.height)] {
            if size - self.border < self.border + 1 {
                return Err(format!(
                    "canvas {} {} leaves no room inside a border of {}",
                    axis, size, self.border
                ));
            }
        }
        Ok(())
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
            border: 10,
            line_thickness: 2,
            orienting_spot_radius: 8,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_chain_codes() -> Vec<String> {
    ["A", "B", "C", "D"].iter().map(|c| c.to_string()).collect()
}

fn default_max_generation() -> u32 {
    10
}

fn default_set_size() -> usize {
    50
}

fn default_time_per_training_item() -> u64 {
    5000
}

fn default_word_delay() -> u64 {
    1000
}

fn default_break_countdown() -> u64 {
    60
}

fn default_min_distance_b() -> f64 {
    10.0
}

fn default_min_distance_c() -> f64 {
    50.0
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_scores_file() -> PathBuf {
    PathBuf::from("data/scores")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("data/detect")
}

fn default_vocalization_dir() -> PathBuf {
    PathBuf::from("vocalizations")
}

fn default_audio_extension() -> String {
    "m4a".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExperimentConfig::default();
        assert_eq!(config.chain_codes, vec!["A", "B", "C", "D"]);
        assert_eq!(config.max_generation, 10);
        assert_eq!(config.set_size, 50);
        assert_eq!(config.canvas.width, 500);
        assert!(config.serialize_appends);
    }

    #[test]
    fn test_chain_membership() {
        let config = ExperimentConfig::default();
        assert!(config.is_valid_chain("C"));
        assert!(!config.is_valid_chain("E"));
        assert!(!config.is_valid_chain("a"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"set_size": 3, "chain_codes": ["X"]}"#).unwrap();
        assert_eq!(config.set_size, 3);
        assert_eq!(config.chain_codes, vec!["X"]);
        assert_eq!(config.max_generation, 10);
        assert_eq!(config.audio_extension, "m4a");
    }

    #[test]
    fn test_canvas_needs_room_inside_border() {
        assert!(CanvasConfig::default().validate().is_ok());

        let tight = CanvasConfig {
            width: 21,
            height: 21,
            border: 10,
            ..CanvasConfig::default()
        };
        assert!(tight.validate().is_ok());

        let narrow = CanvasConfig {
            width: 20,
            ..tight
        };
        assert!(narrow.validate().unwrap_err().contains("width 20"));

        let flat = CanvasConfig {
            height: 8,
            ..tight
        };
        assert!(flat.validate().unwrap_err().contains("height 8"));

        let negative = CanvasConfig {
            border: -1,
            ..CanvasConfig::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_rooted_paths() {
        let config = ExperimentConfig::rooted_at("/srv/infinity");
        assert_eq!(config.data_dir, PathBuf::from("/srv/infinity/data"));
        assert_eq!(config.status_file, PathBuf::from("/srv/infinity/data/detect"));
        assert_eq!(
            config.vocalization_dir,
            PathBuf::from("/srv/infinity/vocalizations")
        );
    }
}
