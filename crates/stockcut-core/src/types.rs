use crate::demand::Demand;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard stock sheet width in millimeters
pub const DEFAULT_CAPACITY: u32 = 1200;

/// Utilization (percent) at which the search stops looking for better orderings
pub const DEFAULT_TARGET: f64 = 99.0;

/// Packing heuristic selected by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Best-fit evaluated over several piece orderings
    #[default]
    BestFit,
    /// Single first-fit pass over pieces sorted by width descending
    Ffd,
}

impl Algorithm {
    /// Tag used in canonical signatures and serialized requests.
    pub fn tag(&self) -> &'static str {
        match self {
            Algorithm::BestFit => "best_fit",
            Algorithm::Ffd => "ffd",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Algorithm {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_fit" | "best-fit" | "bestfit" => Ok(Algorithm::BestFit),
            "ffd" | "first_fit_decreasing" | "first-fit-decreasing" => Ok(Algorithm::Ffd),
            other => Err(OptimizerError::InvalidInput(format!(
                "unknown algorithm '{}', expected best_fit or ffd",
                other
            ))),
        }
    }
}

/// A stock sheet and the pieces cut from it, in placement order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub used_width: u64,
    /// Capacity left over after all cuts
    #[serde(default)]
    pub leftover: u64,
    pub cuts: Vec<u32>,
}

impl Sheet {
    /// Percentage of this sheet covered by cuts.
    pub fn utilization(&self, capacity: u32) -> f64 {
        if capacity == 0 {
            return 0.0;
        }
        self.used_width as f64 / capacity as f64 * 100.0
    }
}

/// Output of a packing heuristic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackingResult {
    pub sheet_count: usize,
    pub utilization_percent: f64,
    pub sheets: Vec<Sheet>,
}

impl PackingResult {
    /// The result for an empty demand.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sheet_count == 0
    }

    /// Number of pieces cut across all sheets.
    pub fn total_pieces(&self) -> usize {
        self.sheets.iter().map(|s| s.cuts.len()).sum()
    }

    /// Whether the overall utilization reaches `target`.
    pub fn meets(&self, target: f64) -> bool {
        self.utilization_percent >= target
    }
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_target() -> f64 {
    DEFAULT_TARGET
}

/// Input: what the caller provides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Piece widths mapped to the quantity required
    #[serde(default)]
    pub demand: Demand,
    /// Sheet width in millimeters
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Utilization percentage considered excellent; ends the search early
    #[serde(default = "default_target")]
    pub target: f64,
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Fixed seed for the shuffled orderings; entropy is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Evaluate candidate orderings on the rayon pool
    #[serde(default)]
    pub parallel: bool,
}

impl Default for OptimizationRequest {
    fn default() -> Self {
        Self {
            demand: Demand::new(),
            capacity: DEFAULT_CAPACITY,
            target: DEFAULT_TARGET,
            algorithm: Algorithm::default(),
            seed: None,
            parallel: false,
        }
    }
}

/// Output: what the optimizer returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    /// Cache key of the demand and algorithm
    pub signature: String,
    pub algorithm: Algorithm,
    pub capacity: u32,
    pub target: f64,
    pub result: PackingResult,
    /// Whether the result reaches the requested target
    pub target_met: bool,
    /// The result was taken from the history store without recomputation
    pub from_history: bool,
}

/// Error type for optimization
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error("Invalid demand: {0}")]
    InvalidDemand(String),

    #[error("Invalid sheet capacity: {0} (must be a positive width in mm)")]
    InvalidCapacity(u32),

    #[error("Piece of {width}mm does not fit on a {capacity}mm sheet")]
    PieceTooWide { width: u32, capacity: u32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to write history file {path}: {source}")]
    History {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
