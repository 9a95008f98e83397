//! Region configuration serialization.
//!
//! This module provides the parameter types that describe a region and the
//! per-step scalars that drive it:
//!
//! 1. **RegionConfig** - lattice dimensions, counts, radii and the random
//!    initialization ranges. Fixed for the lifetime of a region.
//! 2. **StepParams** - inhibition and sharpness scalars for `get_output`.
//! 3. **LearnParams** - scalar learning rates and guards for `learn_traces`.
//!
//! Per-output learning rates and trace decays are passed as slices at the
//! call site because their length depends on the region.
//!
//! # Example
//!
//! ```
//! use chtm::RegionConfig;
//!
//! let config = RegionConfig::new(8, 8, 4, 4)
//!     .with_cells_per_column(2)
//!     .with_radii(2, 1)
//!     .with_num_outputs(3);
//! config.validate().unwrap();
//!
//! let json = config.to_json().unwrap();
//! let restored = RegionConfig::from_json(&json).unwrap();
//! assert_eq!(config, restored);
//! ```

use crate::{ChtmError, Result};
use serde::{Deserialize, Serialize};

/// Closed-open interval a parameter family is drawn from at construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParamRange {
    /// Inclusive lower bound
    pub min: f32,
    /// Exclusive upper bound; equal to `min` for a constant
    pub max: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Range that always yields `value`.
    pub const fn constant(value: f32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ChtmError::InvalidConfiguration(format!(
                "{} range must be finite, got [{}, {})",
                name, self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(ChtmError::InvalidConfiguration(format!(
                "{} range is inverted: [{}, {})",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Initialization ranges, one per parameter family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InitRanges {
    /// Receptive-field center weights
    pub center: ParamRange,
    /// Receptive-field widths (stored, not used by activation)
    pub width: ParamRange,
    /// Reconstruction weights and biases
    pub recon_weight: ParamRange,
    /// Cell bias and lateral/feedback weights
    pub cell_weight: ParamRange,
    /// Output node bias and weights
    pub output_weight: ParamRange,
}

impl Default for InitRanges {
    fn default() -> Self {
        Self {
            center: ParamRange::new(0.0, 1.0),
            width: ParamRange::new(0.9, 1.1),
            recon_weight: ParamRange::new(-0.05, 0.05),
            cell_weight: ParamRange::new(-0.1, 0.1),
            output_weight: ParamRange::new(-0.1, 0.1),
        }
    }
}

/// Shape and initialization of a region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionConfig {
    /// Input extent along x
    pub input_width: usize,
    /// Input extent along y
    pub input_height: usize,
    /// Column lattice extent along x
    pub columns_width: usize,
    /// Column lattice extent along y
    pub columns_height: usize,
    /// Temporal-context cells in every column
    pub cells_per_column: usize,
    /// Half-size of a column's input window
    pub receptive_radius: usize,
    /// Half-size of a cell's lateral window over the lattice
    pub cell_radius: usize,
    /// Linear read-out nodes
    pub num_outputs: usize,
    /// Allocate one feedback connection per lateral window position for a
    /// next region's column predictions.
    #[serde(default)]
    pub feedback: bool,
    /// Initialization ranges per parameter family
    #[serde(default)]
    pub ranges: InitRanges,
}

impl RegionConfig {
    /// Create a configuration with one cell per column, radius 1 windows,
    /// one output and default initialization ranges.
    pub fn new(
        input_width: usize,
        input_height: usize,
        columns_width: usize,
        columns_height: usize,
    ) -> Self {
        Self {
            input_width,
            input_height,
            columns_width,
            columns_height,
            cells_per_column: 1,
            receptive_radius: 1,
            cell_radius: 1,
            num_outputs: 1,
            feedback: false,
            ranges: InitRanges::default(),
        }
    }

    pub fn with_cells_per_column(mut self, cells_per_column: usize) -> Self {
        self.cells_per_column = cells_per_column;
        self
    }

    pub fn with_radii(mut self, receptive_radius: usize, cell_radius: usize) -> Self {
        self.receptive_radius = receptive_radius;
        self.cell_radius = cell_radius;
        self
    }

    pub fn with_num_outputs(mut self, num_outputs: usize) -> Self {
        self.num_outputs = num_outputs;
        self
    }

    pub fn with_feedback(mut self, feedback: bool) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_ranges(mut self, ranges: InitRanges) -> Self {
        self.ranges = ranges;
        self
    }

    /// Check dimensions, counts and ranges.
    ///
    /// Radii of zero are valid; a radius that leaves a column without any
    /// in-bounds input simply yields an empty receptive field.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("input_width", self.input_width),
            ("input_height", self.input_height),
            ("columns_width", self.columns_width),
            ("columns_height", self.columns_height),
            ("cells_per_column", self.cells_per_column),
            ("num_outputs", self.num_outputs),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ChtmError::InvalidConfiguration(format!(
                    "{} must be > 0",
                    name
                )));
            }
        }

        self.ranges.center.validate("center")?;
        self.ranges.width.validate("width")?;
        self.ranges.recon_weight.validate("recon_weight")?;
        self.ranges.cell_weight.validate("cell_weight")?;
        self.ranges.output_weight.validate("output_weight")?;

        Ok(())
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.input_width * self.input_height
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns_width * self.columns_height
    }

    /// Side length of a receptive window.
    #[inline]
    pub fn receptive_diameter(&self) -> usize {
        2 * self.receptive_radius + 1
    }

    /// Side length of a lateral window.
    #[inline]
    pub fn cell_diameter(&self) -> usize {
        2 * self.cell_radius + 1
    }

    /// Center connections allocated per column: `(2r+1)²`.
    #[inline]
    pub fn center_connections_per_column(&self) -> usize {
        self.receptive_diameter() * self.receptive_diameter()
    }

    /// Connections per lateral window position: one per cell, plus one
    /// feedback slot when enabled.
    #[inline]
    pub fn cell_stride(&self) -> usize {
        self.cells_per_column + usize::from(self.feedback)
    }

    /// Connections allocated per cell: `(2r+1)² · stride`.
    #[inline]
    pub fn connections_per_cell(&self) -> usize {
        self.cell_diameter() * self.cell_diameter() * self.cell_stride()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to binary (bincode).
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary (bincode) and validate.
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        let config: Self = bincode::deserialize(data)?;
        config.validate()?;
        Ok(config)
    }
}

/// Scalars for the perception pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StepParams {
    /// Neighborhood radius (in columns) for local inhibition
    pub inhibition_radius: usize,
    /// Excess activation a column tolerates before being suppressed
    pub local_activity: f32,
    /// Sharpness of the column inhibition sigmoid
    pub column_intensity: f32,
    /// Sharpness of cell selection within a column
    pub cell_intensity: f32,
    /// Sharpness of the cell prediction sigmoid
    pub prediction_intensity: f32,
}

impl Default for StepParams {
    fn default() -> Self {
        Self {
            inhibition_radius: 2,
            local_activity: 0.5,
            column_intensity: 4.0,
            cell_intensity: 4.0,
            prediction_intensity: 1.0,
        }
    }
}

/// Scalar learning rates and guards.
///
/// `width_alpha`, `width_scalar` and `min_distance` belong to a width
/// adaptation rule that is not applied; they are accepted so callers can
/// keep one parameter set when that rule is enabled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LearnParams {
    /// Reconstruction delta-rule rate
    pub recon_alpha: f32,
    /// Rate at which receptive centers move toward the input
    pub center_alpha: f32,
    /// Receptive width rate (accepted, not applied)
    pub width_alpha: f32,
    /// Receptive width scale (accepted, not applied)
    pub width_scalar: f32,
    /// Distance floor of the width rule (accepted, not applied)
    pub min_distance: f32,
    /// Column state below which receptive centers do not move
    pub min_learning_threshold: f32,
    /// Cell bias, lateral and feedback rate
    pub cell_alpha: f32,
}

impl Default for LearnParams {
    fn default() -> Self {
        Self {
            recon_alpha: 0.05,
            center_alpha: 0.05,
            width_alpha: 0.0,
            width_scalar: 1.0,
            min_distance: 0.001,
            min_learning_threshold: 0.3,
            cell_alpha: 0.05,
        }
    }
}
