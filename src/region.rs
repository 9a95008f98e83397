//! Region - a lattice of predictive columns trained by local rules.
//!
//! A `Region` turns a 2D input into sparse column activity, lets the cells of
//! each column predict the next step's activity, reads all cells out
//! linearly into a small output vector, and reconstructs the input from the
//! columns. Nothing is trained by back-propagation: every update uses only
//! quantities available at the connection (prediction error, eligibility
//! trace, reconstruction error).
//!
//! # Step protocol
//!
//! ```text
//! step_begin()        snapshot prediction/state into *_prev
//! get_output(..)      activation -> inhibition -> cell selection -> prediction -> read-out
//! get_prediction(..)  optional: column predictions mapped back to input space
//! learn_traces(..)    output traces, centers, cells, reconstruction
//! ```
//!
//! Each phase of `get_output` reads only values completed by the previous
//! phase, so the per-column work inside a phase runs in parallel.
//!
//! # Example
//!
//! ```
//! use chtm::{LearnParams, Region, RegionConfig, StepParams};
//!
//! # fn main() -> chtm::Result<()> {
//! let config = RegionConfig::new(4, 4, 2, 2).with_num_outputs(1);
//! let mut region = Region::from_seed(config, 42)?;
//!
//! let input = vec![0.5; 16];
//! let mut output = Vec::new();
//!
//! region.step_begin();
//! region.get_output(&input, None, &StepParams::default(), &mut output)?;
//! assert_eq!(output.len(), 1);
//!
//! let error = vec![1.0 - output[0]];
//! region.learn_traces(
//!     &input,
//!     &output,
//!     None,
//!     &error,
//!     &[0.1],
//!     &[0.5],
//!     &LearnParams::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

use crate::column::{Column, Connection, OutputNode, ReconConnection, ReconNode};
use crate::config::{LearnParams, RegionConfig, StepParams};
use crate::error::check_len;
use crate::lattice::{InputLink, Lattice};
use crate::utils::{flat_index, sigmoid};
use crate::{ChtmError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A lattice of columns with prediction, read-out and reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    config: RegionConfig,
    lattice: Lattice,
    columns: Vec<Column>,
    output_nodes: Vec<OutputNode>,
    recon_nodes: Vec<ReconNode>,
}

impl Region {
    /// Build a region, drawing every weight from its configured range.
    ///
    /// Draw order: per column its center weights/widths and cells, then the
    /// output nodes, the recon biases, and the recon weights in lattice
    /// traversal order.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `config.validate()` fails.
    pub fn new<R: Rng>(config: RegionConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let lattice = Lattice::new(&config);
        let ranges = config.ranges;

        let columns: Vec<Column> = (0..config.num_columns())
            .map(|_| {
                Column::random(
                    config.center_connections_per_column(),
                    config.cells_per_column,
                    config.connections_per_cell(),
                    ranges.center,
                    ranges.width,
                    ranges.cell_weight,
                    rng,
                )
            })
            .collect();

        let connections_per_output = config.num_columns() * config.cells_per_column;
        let output_nodes: Vec<OutputNode> = (0..config.num_outputs)
            .map(|_| OutputNode::random(connections_per_output, ranges.output_weight, rng))
            .collect();

        let mut recon_nodes: Vec<ReconNode> = (0..config.num_inputs())
            .map(|_| ReconNode {
                bias: Connection::random(ranges.recon_weight, rng),
                connections: Vec::new(),
            })
            .collect();

        for column in lattice.traversal_order() {
            for link in lattice.receptive(column) {
                recon_nodes[link.input].connections.push(ReconConnection {
                    weight: Connection::random(ranges.recon_weight, rng).weight,
                    column,
                });
            }
        }

        let uncovered = recon_nodes
            .iter()
            .filter(|n| n.connections.is_empty())
            .count();
        if uncovered > 0 {
            log::warn!(
                "{} of {} inputs are outside every receptive window",
                uncovered,
                recon_nodes.len()
            );
        }

        log::debug!(
            "region: input {}x{}, columns {}x{}, {} cells/column, {} connections/cell, {} outputs",
            config.input_width,
            config.input_height,
            config.columns_width,
            config.columns_height,
            config.cells_per_column,
            config.connections_per_cell(),
            config.num_outputs
        );

        Ok(Self {
            config,
            lattice,
            columns,
            output_nodes,
            recon_nodes,
        })
    }

    /// Build a region from a seeded `StdRng`.
    pub fn from_seed(config: RegionConfig, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(config, &mut rng)
    }

    /// Snapshot predictions and cell states into their `_prev` fields.
    ///
    /// Call exactly once per external time step, before `get_output`. In a
    /// hierarchy, call on a region before calling it on its next region.
    pub fn step_begin(&mut self) {
        self.columns.par_iter_mut().for_each(Column::step_begin);
    }

    /// Run perception, inhibition, cell selection and prediction, then
    /// write the linear read-out into `output` (resized to `num_outputs`).
    ///
    /// `next` supplies feedback from a region above whose column lattice
    /// has the same shape as this one.
    ///
    /// The pass is deterministic and takes no random source; randomness is
    /// only drawn at construction.
    ///
    /// # Errors
    ///
    /// - `ShapeMismatch` if `input.len() != num_inputs()`
    /// - `HierarchyMismatch` if `next` cannot feed this region
    ///
    /// Nothing is modified when an error is returned.
    pub fn get_output(
        &mut self,
        input: &[f32],
        next: Option<&Region>,
        params: &StepParams,
        output: &mut Vec<f32>,
    ) -> Result<()> {
        check_len("input", self.num_inputs(), input.len())?;
        self.check_next(next)?;

        self.compute_activations(input);
        self.inhibit(params);
        self.select_cells(params.cell_intensity);

        let cell_states = self.cell_states();
        let next_predictions = next.map(Region::column_predictions);
        self.form_predictions(
            &cell_states,
            next_predictions.as_deref(),
            params.prediction_intensity,
        );

        output.resize(self.output_nodes.len(), 0.0);
        output
            .par_iter_mut()
            .zip(self.output_nodes.par_iter())
            .for_each(|(out, node)| *out = node.activate(&cell_states));

        if log::log_enabled!(log::Level::Trace) {
            let n = self.columns.len() as f32;
            let mean_state = self.columns.iter().map(|c| c.state).sum::<f32>() / n;
            let mean_prediction = self.columns.iter().map(|c| c.prediction).sum::<f32>() / n;
            log::trace!(
                "get_output: mean state {:.4}, mean prediction {:.4}",
                mean_state,
                mean_prediction
            );
        }

        Ok(())
    }

    /// Map current column predictions back to input space.
    ///
    /// `prediction` is resized to `num_inputs()`. Inputs outside every
    /// receptive window reconstruct to 0.
    pub fn get_prediction(&self, prediction: &mut Vec<f32>) {
        let column_predictions = self.column_predictions();

        prediction.resize(self.recon_nodes.len(), 0.0);
        prediction
            .par_iter_mut()
            .zip(self.recon_nodes.par_iter())
            .for_each(|(p, node)| *p = node.reconstruct(&column_predictions));
    }

    /// Learn from one step.
    ///
    /// - Output nodes: traced reinforcement with per-output `output_alphas`,
    ///   `error` and `output_lambdas`.
    /// - Centers: move toward the input when the column state exceeds
    ///   `min_learning_threshold`.
    /// - Cells: bias and connections follow the column's prediction error
    ///   times the previous activity of the source: neighbor cells'
    ///   `state_prev` and, for feedback, `next`'s column `prediction_prev`.
    /// - Reconstruction: delta rule against the input.
    ///
    /// # Errors
    ///
    /// - `ShapeMismatch` if `input`, `output`, `error`, `output_alphas` or
    ///   `output_lambdas` has the wrong length
    /// - `HierarchyMismatch` if `next` cannot feed this region
    ///
    /// All checks run before any weight changes.
    #[allow(clippy::too_many_arguments)]
    pub fn learn_traces(
        &mut self,
        input: &[f32],
        output: &[f32],
        next: Option<&Region>,
        error: &[f32],
        output_alphas: &[f32],
        output_lambdas: &[f32],
        params: &LearnParams,
    ) -> Result<()> {
        let num_outputs = self.num_outputs();
        check_len("input", self.num_inputs(), input.len())?;
        check_len("output", num_outputs, output.len())?;
        check_len("error", num_outputs, error.len())?;
        check_len("output_alphas", num_outputs, output_alphas.len())?;
        check_len("output_lambdas", num_outputs, output_lambdas.len())?;
        self.check_next(next)?;

        let cell_states = self.cell_states();
        self.output_nodes
            .par_iter_mut()
            .zip(error.par_iter())
            .zip(output_alphas.par_iter())
            .zip(output_lambdas.par_iter())
            .for_each(|(((node, &e), &alpha), &lambda)| {
                node.learn_traces(&cell_states, alpha, e, lambda)
            });

        self.learn_columns(input, next, params);
        self.learn_reconstruction(input, params.recon_alpha);

        Ok(())
    }

    /// Supervised variant of `learn_traces`.
    ///
    /// The output error is `target - output` and output weights follow the
    /// plain delta rule on current cell states with rate `output_alpha`;
    /// eligibility traces are left untouched. Center, cell and
    /// reconstruction learning are the same as in `learn_traces`.
    pub fn learn(
        &mut self,
        input: &[f32],
        output: &[f32],
        next: Option<&Region>,
        target: &[f32],
        output_alpha: f32,
        params: &LearnParams,
    ) -> Result<()> {
        let num_outputs = self.num_outputs();
        check_len("input", self.num_inputs(), input.len())?;
        check_len("output", num_outputs, output.len())?;
        check_len("target", num_outputs, target.len())?;
        self.check_next(next)?;

        let cell_states = self.cell_states();
        self.output_nodes
            .par_iter_mut()
            .zip(output.par_iter().zip(target.par_iter()))
            .for_each(|(node, (&o, &t))| node.learn_delta(&cell_states, output_alpha, t - o));

        self.learn_columns(input, next, params);
        self.learn_reconstruction(input, params.recon_alpha);

        Ok(())
    }

    /// Zero every state, prediction and eligibility trace. Weights are kept.
    pub fn clear(&mut self) {
        self.columns.iter_mut().for_each(Column::clear);
        self.output_nodes
            .iter_mut()
            .for_each(OutputNode::clear_traces);
    }

    // Perception phases

    /// activation = -Σ (input - center)² over populated receptive slots.
    fn compute_activations(&mut self, input: &[f32]) {
        self.columns
            .par_iter_mut()
            .zip(self.lattice.receptive_links().par_iter())
            .for_each(|(column, links)| {
                column.activation = -links.iter().fold(0.0, |dist2, link| {
                    let delta = input[link.input] - column.center[link.slot].weight;
                    dist2 + delta * delta
                });
            });
    }

    /// Soft local k-winners: every neighbor at least as active contributes
    /// its excess activation; state = sigmoid((budget - excess) · intensity).
    fn inhibit(&mut self, params: &StepParams) {
        let activations: Vec<f32> = self.columns.iter().map(|c| c.activation).collect();
        let lattice = &self.lattice;

        self.columns
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, column)| {
                let own = activations[i];
                let excess: f32 = lattice
                    .neighborhood(i, params.inhibition_radius)
                    .map(|j| activations[j])
                    .filter(|&a| a >= own)
                    .map(|a| a - own)
                    .sum();

                column.state = sigmoid((params.local_activity - excess) * params.column_intensity);
            });
    }

    /// Cells whose previous prediction best matched the column state win
    /// the column's activity: state = exp((min_error - error) · intensity) · column_state.
    fn select_cells(&mut self, cell_intensity: f32) {
        self.columns.par_iter_mut().for_each(|column| {
            let column_state = column.state;

            let min_error = column
                .cells
                .iter()
                .map(|cell| (column_state - cell.prediction_prev).abs())
                .fold(1.0f32, f32::min);

            for cell in &mut column.cells {
                let error = (column_state - cell.prediction_prev).abs();
                cell.state = ((min_error - error) * cell_intensity).exp() * column_state;
            }
        });
    }

    fn form_predictions(
        &mut self,
        cell_states: &[f32],
        next_predictions: Option<&[f32]>,
        prediction_intensity: f32,
    ) {
        let cells_per_column = self.config.cells_per_column;
        let stride = self.config.cell_stride();

        self.columns
            .par_iter_mut()
            .zip(self.lattice.lateral_links().par_iter())
            .for_each(|(column, links)| {
                let mut max_prediction = 0.0f32;

                for cell in &mut column.cells {
                    let sum = links.iter().fold(cell.bias.weight, |mut sum, link| {
                        let base = link.position * stride;
                        let source = link.column * cells_per_column;

                        for (c, &s) in cell.connections[base..base + cells_per_column]
                            .iter()
                            .zip(&cell_states[source..source + cells_per_column])
                        {
                            sum += c.weight * s;
                        }

                        if let Some(predictions) = next_predictions {
                            sum += cell.connections[base + cells_per_column].weight
                                * predictions[link.column];
                        }

                        sum
                    });

                    cell.prediction = sigmoid(sum * prediction_intensity);
                    max_prediction = max_prediction.max(cell.prediction);
                }

                column.prediction = max_prediction;
                column.output = column.state.max(column.prediction);
            });
    }

    // Learning phases

    fn learn_columns(&mut self, input: &[f32], next: Option<&Region>, params: &LearnParams) {
        let cells_per_column = self.config.cells_per_column;
        let stride = self.config.cell_stride();
        let prev_states = self.cell_states_prev();
        let next_predictions = next.map(Region::column_predictions_prev);
        let next_predictions = next_predictions.as_deref();

        self.columns
            .par_iter_mut()
            .zip(self.lattice.receptive_links().par_iter())
            .zip(self.lattice.lateral_links().par_iter())
            .for_each(|((column, receptive), lateral)| {
                learn_centers(column, receptive, input, params);

                let error = column.state - column.prediction_prev;
                let delta = params.cell_alpha * error;

                for cell in &mut column.cells {
                    cell.bias.weight += delta;

                    for link in lateral {
                        let base = link.position * stride;
                        let source = link.column * cells_per_column;

                        for (c, &s) in cell.connections[base..base + cells_per_column]
                            .iter_mut()
                            .zip(&prev_states[source..source + cells_per_column])
                        {
                            c.weight += delta * s;
                        }

                        if let Some(predictions) = next_predictions {
                            cell.connections[base + cells_per_column].weight +=
                                delta * predictions[link.column];
                        }
                    }
                }
            });
    }

    /// Delta rule on the reconstruction of `input` from column states.
    fn learn_reconstruction(&mut self, input: &[f32], recon_alpha: f32) {
        let column_states = self.column_states();

        let sq_error: f32 = self
            .recon_nodes
            .par_iter_mut()
            .zip(input.par_iter())
            .map(|(node, &target)| {
                let error = target - node.reconstruct(&column_states);

                for c in &mut node.connections {
                    c.weight += recon_alpha * error * column_states[c.column];
                }

                error * error
            })
            .sum();

        log::trace!("learn: reconstruction squared error {:.6}", sq_error);
    }

    fn check_next(&self, next: Option<&Region>) -> Result<()> {
        let Some(next) = next else {
            return Ok(());
        };

        if !self.config.feedback {
            return Err(ChtmError::HierarchyMismatch(
                "region was built without feedback connections".into(),
            ));
        }

        let own = (self.config.columns_width, self.config.columns_height);
        let theirs = (next.config.columns_width, next.config.columns_height);
        if own != theirs {
            return Err(ChtmError::HierarchyMismatch(format!(
                "next region has a {}x{} column lattice, expected {}x{}",
                theirs.0, theirs.1, own.0, own.1
            )));
        }

        Ok(())
    }

    // Accessors

    #[inline]
    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    #[inline]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.recon_nodes.len()
    }

    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.output_nodes.len()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column at lattice coordinate `(x, y)`.
    pub fn column(&self, x: usize, y: usize) -> Result<&Column> {
        let index = self.column_index(x, y)?;
        Ok(&self.columns[index])
    }

    /// Mutable column at lattice coordinate `(x, y)`.
    pub fn column_mut(&mut self, x: usize, y: usize) -> Result<&mut Column> {
        let index = self.column_index(x, y)?;
        Ok(&mut self.columns[index])
    }

    fn column_index(&self, x: usize, y: usize) -> Result<usize> {
        let (width, height) = (self.config.columns_width, self.config.columns_height);
        if x >= width {
            return Err(ChtmError::IndexOutOfBounds {
                index: x,
                length: width,
            });
        }
        if y >= height {
            return Err(ChtmError::IndexOutOfBounds {
                index: y,
                length: height,
            });
        }
        Ok(flat_index(x, y, width))
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    #[inline]
    pub fn output_nodes(&self) -> &[OutputNode] {
        &self.output_nodes
    }

    #[inline]
    pub fn output_nodes_mut(&mut self) -> &mut [OutputNode] {
        &mut self.output_nodes
    }

    #[inline]
    pub fn recon_nodes(&self) -> &[ReconNode] {
        &self.recon_nodes
    }

    #[inline]
    pub fn recon_nodes_mut(&mut self) -> &mut [ReconNode] {
        &mut self.recon_nodes
    }

    pub fn column_states(&self) -> Vec<f32> {
        self.columns.iter().map(|c| c.state).collect()
    }

    pub fn column_predictions(&self) -> Vec<f32> {
        self.columns.iter().map(|c| c.prediction).collect()
    }

    /// Column predictions as of the last `step_begin`.
    pub fn column_predictions_prev(&self) -> Vec<f32> {
        self.columns.iter().map(|c| c.prediction_prev).collect()
    }

    /// `max(state, prediction)` per column; the input of a region above.
    pub fn column_outputs(&self) -> Vec<f32> {
        self.columns.iter().map(|c| c.output).collect()
    }

    /// Cell states, indexed `cell + column * cells_per_column`.
    pub fn cell_states(&self) -> Vec<f32> {
        self.columns
            .iter()
            .flat_map(|c| c.cells.iter().map(|cell| cell.state))
            .collect()
    }

    fn cell_states_prev(&self) -> Vec<f32> {
        self.columns
            .iter()
            .flat_map(|c| c.cells.iter().map(|cell| cell.state_prev))
            .collect()
    }

    /// Estimate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        let columns: usize = self.columns.iter().map(Column::memory_usage).sum();
        let outputs: usize = self
            .output_nodes
            .iter()
            .map(|n| std::mem::size_of::<OutputNode>() + std::mem::size_of_val(&n.connections[..]))
            .sum();
        let recon: usize = self
            .recon_nodes
            .iter()
            .map(|n| std::mem::size_of::<ReconNode>() + std::mem::size_of_val(&n.connections[..]))
            .sum();
        let lattice: usize = (0..self.lattice.num_columns())
            .map(|c| {
                std::mem::size_of_val(self.lattice.receptive(c))
                    + std::mem::size_of_val(self.lattice.lateral(c))
            })
            .sum();

        std::mem::size_of::<Self>() + columns + outputs + recon + lattice
    }

    // Persistence

    /// Check that the lattice, columns, cells, output and recon nodes have
    /// the shapes the config implies.
    ///
    /// Regions built by `new` always pass; this guards deserialized data.
    pub fn validate_layout(&self) -> Result<()> {
        let config = &self.config;
        config.validate()?;

        if self.lattice != Lattice::new(config) {
            return Err(ChtmError::InvalidConfiguration(
                "stored lattice does not match the config".into(),
            ));
        }

        check_layout("columns", config.num_columns(), self.columns.len())?;
        for column in &self.columns {
            check_layout(
                "center connections",
                config.center_connections_per_column(),
                column.center.len(),
            )?;
            check_layout("cells", config.cells_per_column, column.cells.len())?;
            for cell in &column.cells {
                check_layout(
                    "cell connections",
                    config.connections_per_cell(),
                    cell.connections.len(),
                )?;
            }
        }

        check_layout("output nodes", config.num_outputs, self.output_nodes.len())?;
        let cells = config.num_columns() * config.cells_per_column;
        for node in &self.output_nodes {
            check_layout("output connections", cells, node.connections.len())?;
        }

        check_layout("recon nodes", config.num_inputs(), self.recon_nodes.len())?;
        for (node, sources) in self.recon_nodes.iter().zip(self.lattice.recon_sources()) {
            check_layout("recon connections", sources.len(), node.connections.len())?;
            if let Some(c) = node
                .connections
                .iter()
                .find(|c| c.column >= config.num_columns())
            {
                return Err(layout_error("recon source column", config.num_columns(), c.column));
            }
        }

        Ok(())
    }

    /// Serialize the whole region (config, weights, traces, state) to binary.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Restore a region written by `to_binary`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the stored weights do not fit the stored
    /// config (see `validate_layout`).
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        let region: Self = bincode::deserialize(data)?;
        region.validate_layout()?;
        Ok(region)
    }

    /// Write the region to `path` with bincode.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        log::debug!("saved region to {}", path.display());
        Ok(())
    }

    /// Read a region written by `save`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let region: Self = bincode::deserialize_from(reader)?;
        region.validate_layout()?;
        log::debug!("loaded region from {}", path.display());
        Ok(region)
    }
}

fn layout_error(what: &str, expected: usize, actual: usize) -> ChtmError {
    ChtmError::InvalidConfiguration(format!(
        "stored region has {} {}, config expects {}",
        actual, what, expected
    ))
}

fn check_layout(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(layout_error(what, expected, actual))
    }
}

/// Move a column's populated centers toward the input, gated by how far
/// its state exceeds the learning threshold.
fn learn_centers(column: &mut Column, links: &[InputLink], input: &[f32], params: &LearnParams) {
    let scalar = (column.state - params.min_learning_threshold).max(0.0);
    let rate = params.center_alpha * scalar;

    for link in links {
        let center = &mut column.center[link.slot];
        center.weight += rate * (input[link.input] - center.weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_config() -> RegionConfig {
        RegionConfig::new(4, 4, 2, 2)
            .with_cells_per_column(2)
            .with_radii(1, 1)
            .with_num_outputs(2)
    }

    #[test]
    fn test_allocation_counts() {
        let region = Region::from_seed(small_config(), 0).unwrap();

        assert_eq!(region.num_columns(), 4);
        assert_eq!(region.num_outputs(), 2);
        assert_eq!(region.num_inputs(), 16);

        for column in region.columns() {
            assert_eq!(column.center.len(), 9);
            assert_eq!(column.cells.len(), 2);
            for cell in &column.cells {
                assert_eq!(cell.connections.len(), 9 * 2);
            }
        }
        for node in region.output_nodes() {
            assert_eq!(node.connections.len(), 8);
        }
    }

    #[test]
    fn test_recon_connections_match_lattice() {
        let region = Region::from_seed(small_config(), 0).unwrap();
        let sources = region.lattice().recon_sources();

        for (node, expected) in region.recon_nodes().iter().zip(&sources) {
            let columns: Vec<usize> = node.connections.iter().map(|c| c.column).collect();
            let expected: Vec<usize> = expected.iter().map(|s| s.column).collect();
            assert_eq!(columns, expected);
        }
    }

    #[test]
    fn test_inhibition_single_winner_state() {
        // A single column has no competitor: its excess is always zero.
        let config = RegionConfig::new(1, 1, 1, 1).with_radii(0, 0);
        let mut region = Region::from_seed(config, 3).unwrap();
        let params = StepParams {
            local_activity: 0.5,
            column_intensity: 2.0,
            ..StepParams::default()
        };
        let mut output = Vec::new();

        region.step_begin();
        region.get_output(&[0.3], None, &params, &mut output).unwrap();

        assert_relative_eq!(region.columns()[0].state, sigmoid(1.0), epsilon = 1e-6);
        // One cell always matches its own error: selection factor is 1.
        assert_relative_eq!(
            region.columns()[0].cells[0].state,
            region.columns()[0].state,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_cell_selection_prefers_best_prediction() {
        let config = RegionConfig::new(1, 1, 1, 1)
            .with_radii(0, 0)
            .with_cells_per_column(2);
        let mut region = Region::from_seed(config, 5).unwrap();

        region.columns_mut()[0].cells[0].prediction_prev = 0.0;
        region.columns_mut()[0].cells[1].prediction_prev = 1.0;

        let params = StepParams {
            local_activity: 10.0,
            column_intensity: 1.0,
            cell_intensity: 4.0,
            ..StepParams::default()
        };
        let mut output = Vec::new();
        region.get_output(&[0.5], None, &params, &mut output).unwrap();

        let column = &region.columns()[0];
        let s = column.state;
        // state ~ 1, so cell 1 predicted it best and keeps the full state.
        assert_relative_eq!(column.cells[1].state, s, epsilon = 1e-6);
        let expected = (((1.0 - s) - s) * 4.0).exp() * s;
        assert_relative_eq!(column.cells[0].state, expected, epsilon = 1e-5);
        assert!(column.cells[0].state < column.cells[1].state);
    }

    #[test]
    fn test_center_learning_gated_by_threshold() {
        let config = RegionConfig::new(1, 1, 1, 1).with_radii(0, 0);
        let mut region = Region::from_seed(config, 9).unwrap();
        let before = region.columns()[0].center[0].weight;

        region.columns_mut()[0].state = 0.2;
        let params = LearnParams {
            center_alpha: 0.5,
            min_learning_threshold: 0.3,
            ..LearnParams::default()
        };
        let links = region.lattice().receptive(0).to_vec();
        learn_centers(&mut region.columns_mut()[0], &links, &[1.0], &params);
        assert_eq!(region.columns()[0].center[0].weight, before);

        region.columns_mut()[0].state = 0.7;
        learn_centers(&mut region.columns_mut()[0], &links, &[1.0], &params);
        let expected = before + 0.5 * 0.4 * (1.0 - before);
        assert_relative_eq!(region.columns()[0].center[0].weight, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_clear_keeps_weights() {
        let mut region = Region::from_seed(small_config(), 1).unwrap();
        let mut output = Vec::new();
        region.step_begin();
        region
            .get_output(&[0.4; 16], None, &StepParams::default(), &mut output)
            .unwrap();
        region
            .learn_traces(
                &[0.4; 16],
                &output,
                None,
                &[0.5, -0.5],
                &[0.1, 0.1],
                &[0.9, 0.9],
                &LearnParams::default(),
            )
            .unwrap();

        let weights: Vec<f32> = region.output_nodes()[0]
            .connections
            .iter()
            .map(|c| c.weight)
            .collect();

        region.clear();

        assert!(region.columns().iter().all(|c| c.state == 0.0 && c.prediction == 0.0));
        assert!(region.output_nodes()[0]
            .connections
            .iter()
            .all(|c| c.eligibility == 0.0));
        let after: Vec<f32> = region.output_nodes()[0]
            .connections
            .iter()
            .map(|c| c.weight)
            .collect();
        assert_eq!(weights, after);
    }

    #[test]
    fn test_memory_usage_nonzero() {
        let region = Region::from_seed(small_config(), 0).unwrap();
        assert!(region.memory_usage() > std::mem::size_of::<Region>());
    }
}
