//! Modeling core configuration structures
//!
//! Tunables for rebuilds and the reference solver. All structs serialize so
//! a consumer can load them from a configuration file.

use serde::{Deserialize, Serialize};

/// Rebuild engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RebuildConfig {
    /// Linear deflection passed to the kernel when meshing results
    pub mesh_deflection: f64,
    /// Polygon segments used to approximate a full circle in a profile
    pub circle_segments: u32,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            mesh_deflection: 0.1,
            circle_segments: 32,
        }
    }
}

impl RebuildConfig {
    /// Coarse settings for tests and previews
    pub fn coarse() -> Self {
        Self {
            mesh_deflection: 0.5,
            circle_segments: 12,
        }
    }

    /// Segments for an arc spanning `sweep` radians (at least one)
    pub fn arc_segments(&self, sweep: f64) -> usize {
        let full = self.circle_segments.max(3) as f64;
        ((full * sweep.abs() / std::f64::consts::TAU).ceil() as usize).max(1)
    }
}

/// Reference constraint solver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Residual norm below which a system counts as solved
    pub tolerance: f64,
    /// Maximum Gauss-Newton iterations
    pub max_iterations: usize,
    /// Step damping factor (0-1]
    pub damping: f64,
    /// Systems with more unknowns than this are refused
    pub max_unknowns: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 100,
            damping: 1.0,
            max_unknowns: 2000,
        }
    }
}

/// Undo/redo history configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of undo snapshots kept
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

/// Combined configuration, as loaded by tools
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormaConfig {
    pub rebuild: RebuildConfig,
    pub solver: SolverConfig,
    pub history: HistoryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arc_segments() {
        let config = RebuildConfig::default();
        assert_eq!(config.arc_segments(std::f64::consts::TAU), 32);
        assert_eq!(config.arc_segments(std::f64::consts::PI), 16);
        assert_eq!(config.arc_segments(1e-6), 1);
    }
}
