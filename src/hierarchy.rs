//! RegionStack - ordered execution of a hierarchy of regions.
//!
//! Level 0 reads the external input. Every level above reads the column
//! outputs of the level below, so its input extent must equal the lower
//! level's column lattice. A level built with feedback receives the column
//! predictions of the level above it; since levels run bottom-up, those are
//! the predictions formed on the previous step.
//!
//! # Example
//!
//! ```
//! use chtm::{RegionConfig, RegionStack, StepParams};
//! use rand::SeedableRng;
//!
//! # fn main() -> chtm::Result<()> {
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let mut stack = RegionStack::new(
//!     vec![
//!         RegionConfig::new(8, 8, 4, 4).with_feedback(true),
//!         RegionConfig::new(4, 4, 4, 4),
//!     ],
//!     &mut rng,
//! )?;
//!
//! stack.step_begin();
//! let top = stack.get_output(&[0.0; 64], &StepParams::default())?;
//! assert_eq!(top.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::config::{LearnParams, RegionConfig, StepParams};
use crate::error::check_len;
use crate::{ChtmError, Region, Result};
use rand::Rng;

/// Error signal and per-output rates for one level's output layer.
#[derive(Debug, Clone, Copy)]
pub struct TraceSignal<'a> {
    pub error: &'a [f32],
    pub alphas: &'a [f32],
    pub lambdas: &'a [f32],
}

/// A bottom-up stack of regions with top-down feedback.
#[derive(Debug, Clone)]
pub struct RegionStack {
    levels: Vec<Region>,

    /// Input each level saw on the last `get_output`
    inputs: Vec<Vec<f32>>,

    /// Read-out of each level on the last `get_output`
    outputs: Vec<Vec<f32>>,
}

impl RegionStack {
    /// Build one region per config, bottom level first.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` if the list is empty or a config is invalid
    /// - `HierarchyMismatch` if a level's input extent differs from the
    ///   column lattice below it, or a level with feedback sits below a
    ///   level with a different column lattice
    pub fn new<R: Rng>(configs: Vec<RegionConfig>, rng: &mut R) -> Result<Self> {
        if configs.is_empty() {
            return Err(ChtmError::InvalidConfiguration(
                "a region stack needs at least one level".into(),
            ));
        }

        for (k, pair) in configs.windows(2).enumerate() {
            let (lower, upper) = (&pair[0], &pair[1]);

            if (upper.input_width, upper.input_height)
                != (lower.columns_width, lower.columns_height)
            {
                return Err(ChtmError::HierarchyMismatch(format!(
                    "level {} reads {}x{} inputs but level {} has {}x{} columns",
                    k + 1,
                    upper.input_width,
                    upper.input_height,
                    k,
                    lower.columns_width,
                    lower.columns_height
                )));
            }

            if lower.feedback
                && (upper.columns_width, upper.columns_height)
                    != (lower.columns_width, lower.columns_height)
            {
                return Err(ChtmError::HierarchyMismatch(format!(
                    "level {} expects feedback from a {}x{} lattice, level {} is {}x{}",
                    k,
                    lower.columns_width,
                    lower.columns_height,
                    k + 1,
                    upper.columns_width,
                    upper.columns_height
                )));
            }
        }

        if configs.last().is_some_and(|top| top.feedback) {
            log::warn!("top level has feedback connections but nothing above it");
        }

        let levels = configs
            .into_iter()
            .map(|config| Region::new(config, rng))
            .collect::<Result<Vec<_>>>()?;

        log::debug!("region stack: {} levels", levels.len());

        let num_levels = levels.len();
        Ok(Self {
            levels,
            inputs: vec![Vec::new(); num_levels],
            outputs: vec![Vec::new(); num_levels],
        })
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&Region> {
        self.levels.get(index)
    }

    pub fn level_mut(&mut self, index: usize) -> Option<&mut Region> {
        self.levels.get_mut(index)
    }

    /// Read-out of a level from the last `get_output`.
    pub fn output(&self, index: usize) -> Option<&[f32]> {
        self.outputs.get(index).map(Vec::as_slice)
    }

    /// Read-out of the top level from the last `get_output`.
    pub fn top_output(&self) -> &[f32] {
        self.outputs.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Snapshot every level, bottom first.
    pub fn step_begin(&mut self) {
        self.levels.iter_mut().for_each(Region::step_begin);
    }

    /// Run every level bottom-up and return the top level's read-out.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `input` does not match level 0.
    pub fn get_output(&mut self, input: &[f32], params: &StepParams) -> Result<&[f32]> {
        check_len("input", self.levels[0].num_inputs(), input.len())?;

        self.inputs[0].clear();
        self.inputs[0].extend_from_slice(input);

        for k in 0..self.levels.len() {
            let (lower, upper) = self.levels.split_at_mut(k + 1);
            let region = &mut lower[k];
            let next = upper.first().filter(|_| region.config().feedback);

            region.get_output(&self.inputs[k], next, params, &mut self.outputs[k])?;

            if k + 1 < self.inputs.len() {
                self.inputs[k + 1] = region.column_outputs();
            }
        }

        Ok(self.top_output())
    }

    /// Learn every level bottom-up from the last `get_output`.
    ///
    /// `signals` holds one output-layer signal per level.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `signals` does not have one entry per level or a
    /// signal is mis-sized for its level. All levels are checked before any
    /// level learns.
    pub fn learn_traces(&mut self, signals: &[TraceSignal<'_>], params: &LearnParams) -> Result<()> {
        check_len("signals", self.levels.len(), signals.len())?;

        for ((region, signal), input) in self.levels.iter().zip(signals).zip(&self.inputs) {
            let num_outputs = region.num_outputs();
            check_len("input", region.num_inputs(), input.len())?;
            check_len("error", num_outputs, signal.error.len())?;
            check_len("output_alphas", num_outputs, signal.alphas.len())?;
            check_len("output_lambdas", num_outputs, signal.lambdas.len())?;
        }

        for (k, signal) in signals.iter().enumerate() {
            let (lower, upper) = self.levels.split_at_mut(k + 1);
            let region = &mut lower[k];
            let next = upper.first().filter(|_| region.config().feedback);

            region.learn_traces(
                &self.inputs[k],
                &self.outputs[k],
                next,
                signal.error,
                signal.alphas,
                signal.lambdas,
                params,
            )?;
        }

        Ok(())
    }

    /// Clear every level's state and traces.
    pub fn clear(&mut self) {
        self.levels.iter_mut().for_each(Region::clear);
        self.inputs.iter_mut().for_each(Vec::clear);
        self.outputs.iter_mut().for_each(Vec::clear);
    }
}
