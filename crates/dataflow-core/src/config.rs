//! Tuning knobs of the fixpoint engine

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by forward and backward analyses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of updates of a loop head's input before merges there switch
    /// from the join to `Store::widened_upper_bound`
    pub widening_threshold: usize,
    /// Block visits allowed before the analysis is declared non-terminating
    pub max_iterations: usize,
    /// Check that every join is an upper bound of its inputs
    pub check_lattice_contracts: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            widening_threshold: 3,
            max_iterations: 100_000,
            check_lattice_contracts: cfg!(debug_assertions),
        }
    }
}

impl AnalysisConfig {
    pub fn with_widening_threshold(mut self, threshold: usize) -> Self {
        self.widening_threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_lattice_checks(mut self, enabled: bool) -> Self {
        self.check_lattice_contracts = enabled;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid analysis configuration")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read analysis configuration {}", path.display()))?;
        Self::from_json_str(&content)
    }
}
