use crate::core::models::ids::AtomIndex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Invalid { path: String, source: ConfigError },
}

/// How many atoms have the bounds fully re-smoothed after each distance
/// choice while sampling a distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partiality {
    None,
    #[default]
    FourAtom,
    All,
}

impl Partiality {
    pub fn resmoothed_atoms(self, num_atoms: usize) -> usize {
        match self {
            Self::None => 0,
            Self::FourAtom => num_atoms.min(4),
            Self::All => num_atoms,
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown partiality: '{0}' (expected none, four-atom or all)")]
pub struct ParsePartialityError(pub String);

impl FromStr for Partiality {
    type Err = ParsePartialityError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "none" => Ok(Self::None),
            "four-atom" | "fouratom" | "four" => Ok(Self::FourAtom),
            "all" => Ok(Self::All),
            _ => Err(ParsePartialityError(s.to_string())),
        }
    }
}

impl fmt::Display for Partiality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::FourAtom => "four-atom",
            Self::All => "all",
        })
    }
}

/// Empirical constants of the spatial model and the acceptance tolerances of
/// refined structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModelConstants {
    pub bond_relative_variance: f64,
    /// Radians.
    pub angle_absolute_variance: f64,
    /// Angle variance multipliers for centers whose smallest ring has three,
    /// four or five atoms.
    pub ring_angle_multipliers: [f64; 3],
    /// Haptic ligand cone height as a fraction of the mean bond length.
    pub ligand_distance_factor: f64,
    /// Ångström.
    pub distance_tolerance: f64,
    pub chirality_tolerance: f64,
    /// Radians.
    pub dihedral_tolerance: f64,
}

impl Default for ModelConstants {
    fn default() -> Self {
        Self {
            bond_relative_variance: 0.01,
            angle_absolute_variance: PI / 36.0,
            ring_angle_multipliers: [6.25, 4.25, 3.25],
            ligand_distance_factor: 0.9,
            distance_tolerance: 0.5,
            chirality_tolerance: 0.5,
            dihedral_tolerance: 5f64.to_radians(),
        }
    }
}

impl ModelConstants {
    /// Angle variance multiplier for an atom whose smallest ring has
    /// `cycle_size` atoms.
    pub fn cycle_multiplier(&self, cycle_size: Option<usize>) -> f64 {
        match cycle_size {
            Some(size @ 3..=5) => self.ring_angle_multipliers[size - 3],
            _ => 1.0,
        }
    }
}

/// An atom pinned to a position given in bohr.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPosition {
    pub atom: AtomIndex,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    pub partiality: Partiality,
    pub refinement_step_limit: usize,
    pub refinement_gradient_target: f64,
    /// Tolerated ratio of failed to requested conformers.
    pub failure_ratio: f64,
    pub spatial_model_loosening: f64,
    pub fixed_positions: Vec<FixedPosition>,
    /// Seed of the master random engine. Drawn from entropy if absent.
    pub seed: Option<u64>,
    pub constants: ModelConstants,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            partiality: Partiality::default(),
            refinement_step_limit: 10_000,
            refinement_gradient_target: 1e-5,
            failure_ratio: 2.0,
            spatial_model_loosening: 1.0,
            fixed_positions: Vec::new(),
            seed: None,
            constants: ModelConstants::default(),
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, reason: &str| {
            Err(ConfigError::InvalidParameter {
                name,
                reason: reason.to_string(),
            })
        };
        if self.refinement_step_limit == 0 {
            return invalid("refinement_step_limit", "must be at least one");
        }
        if !(self.refinement_gradient_target > 0.0) {
            return invalid("refinement_gradient_target", "must be positive");
        }
        if !(self.failure_ratio >= 0.0) {
            return invalid("failure_ratio", "must not be negative");
        }
        if !(self.spatial_model_loosening > 0.0) {
            return invalid("spatial_model_loosening", "must be positive");
        }
        let constants = &self.constants;
        if !(constants.bond_relative_variance > 0.0 && constants.bond_relative_variance < 0.5) {
            return invalid("bond_relative_variance", "must lie in (0, 0.5)");
        }
        if !(constants.angle_absolute_variance > 0.0 && constants.angle_absolute_variance < PI / 4.0) {
            return invalid("angle_absolute_variance", "must lie in (0, π/4)");
        }
        if constants.ring_angle_multipliers.iter().any(|&m| !(m >= 1.0)) {
            return invalid("ring_angle_multipliers", "must all be at least one");
        }
        if !(constants.ligand_distance_factor > 0.0) {
            return invalid("ligand_distance_factor", "must be positive");
        }
        if self
            .fixed_positions
            .iter()
            .any(|f| f.position.iter().any(|c| !c.is_finite()))
        {
            return invalid("fixed_positions", "coordinates must be finite");
        }
        Ok(())
    }

    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let path_string = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path_string.clone(),
            source: e,
        })?;
        let configuration = Self::from_toml_str(&content).map_err(|e| LoadError::Toml {
            path: path_string.clone(),
            source: e,
        })?;
        configuration.validate().map_err(|e| LoadError::Invalid {
            path: path_string,
            source: e,
        })?;
        Ok(configuration)
    }
}

#[derive(Default)]
pub struct ConfigurationBuilder {
    partiality: Option<Partiality>,
    refinement_step_limit: Option<usize>,
    refinement_gradient_target: Option<f64>,
    failure_ratio: Option<f64>,
    spatial_model_loosening: Option<f64>,
    fixed_positions: Vec<FixedPosition>,
    seed: Option<u64>,
    constants: Option<ModelConstants>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partiality(mut self, partiality: Partiality) -> Self {
        self.partiality = Some(partiality);
        self
    }
    pub fn refinement_step_limit(mut self, limit: usize) -> Self {
        self.refinement_step_limit = Some(limit);
        self
    }
    pub fn refinement_gradient_target(mut self, target: f64) -> Self {
        self.refinement_gradient_target = Some(target);
        self
    }
    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = Some(ratio);
        self
    }
    pub fn spatial_model_loosening(mut self, loosening: f64) -> Self {
        self.spatial_model_loosening = Some(loosening);
        self
    }
    /// Pins `atom` to `position`, given in bohr.
    pub fn fixed_position(mut self, atom: AtomIndex, position: [f64; 3]) -> Self {
        self.fixed_positions.push(FixedPosition { atom, position });
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn constants(mut self, constants: ModelConstants) -> Self {
        self.constants = Some(constants);
        self
    }

    pub fn build(self) -> Result<Configuration, ConfigError> {
        let defaults = Configuration::default();
        let configuration = Configuration {
            partiality: self.partiality.unwrap_or(defaults.partiality),
            refinement_step_limit: self
                .refinement_step_limit
                .unwrap_or(defaults.refinement_step_limit),
            refinement_gradient_target: self
                .refinement_gradient_target
                .unwrap_or(defaults.refinement_gradient_target),
            failure_ratio: self.failure_ratio.unwrap_or(defaults.failure_ratio),
            spatial_model_loosening: self
                .spatial_model_loosening
                .unwrap_or(defaults.spatial_model_loosening),
            fixed_positions: self.fixed_positions,
            seed: self.seed,
            constants: self.constants.unwrap_or(defaults.constants),
        };
        configuration.validate()?;
        Ok(configuration)
    }
}
