//! Settings module.

use serde::{Deserialize, Serialize};
use std::fs;

use crate::core::{Demography, PLAUSIBILITY_THRESHOLD};

/// Attempt budget of forced coalescence unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100_000;

fn default_max_attempts() -> Option<usize> {
    Some(DEFAULT_MAX_ATTEMPTS)
}

fn default_plausibility_threshold() -> f64 {
    PLAUSIBILITY_THRESHOLD
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub demography: Demography,

    /// Redraw treelets until all lineages of a host merge before its infection.
    #[serde(default)]
    pub force_coalescence: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<usize>,

    /// Master seed; drawn at random when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_plausibility_threshold")]
    pub plausibility_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            demography: Demography::default(),
            force_coalescence: false,
            max_attempts: default_max_attempts(),
            seed: None,
            plausibility_threshold: default_plausibility_threshold(),
        }
    }
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
}

impl std::error::Error for SettingsError {}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(formatter, "IO error: {}", error),
            SettingsError::YamlError(error) => write!(formatter, "YAML error: {}", error),
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let yaml = serde_yaml::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(formatter, "{}", yaml)
    }
}

impl Settings {
    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<(), SettingsError> {
        serde_yaml::to_writer(writer, self).map_err(SettingsError::YamlError)
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Settings, SettingsError> {
        serde_yaml::from_reader(reader).map_err(SettingsError::YamlError)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<(), SettingsError> {
        let file = fs::File::create(filename).map_err(SettingsError::IoError)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Settings, SettingsError> {
        let file = fs::File::open(filename).map_err(SettingsError::IoError)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}
