//! Columns, cells and the read-out nodes attached to a region's lattice.
//!
//! A `Column` is one spatial feature detector. It compares the input in its
//! receptive window against a set of center weights, competes with its
//! neighbors for activity, and owns several `Cell`s that stand for different
//! temporal contexts of the same spatial pattern. Each cell predicts its own
//! next activity from the cells around it (and optionally from a next
//! region's predictions).
//!
//! `OutputNode`s read every cell linearly and learn through eligibility
//! traces. `ReconNode`s map column activity back onto one input position.

use crate::config::ParamRange;
use crate::utils::rand_float;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A plain weighted connection.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub weight: f32,
}

impl Connection {
    pub fn random<R: Rng>(range: ParamRange, rng: &mut R) -> Self {
        Self {
            weight: rand_float(range.min, range.max, rng),
        }
    }
}

/// One slot of a column's receptive window.
///
/// `width` is drawn at construction and persisted but the activation uses
/// plain squared distance.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CenterConnection {
    pub weight: f32,
    pub width: f32,
}

/// A connection carrying an eligibility trace.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TraceConnection {
    pub weight: f32,
    pub eligibility: f32,
}

/// A reconstruction weight together with the column it reads.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReconConnection {
    pub weight: f32,
    pub column: usize,
}

/// One temporal context of a column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    pub bias: Connection,

    /// Lateral and feedback weights, `stride` slots per window position
    pub connections: Vec<Connection>,

    pub state: f32,
    pub state_prev: f32,
    pub prediction: f32,
    pub prediction_prev: f32,
}

impl Cell {
    pub fn random<R: Rng>(num_connections: usize, range: ParamRange, rng: &mut R) -> Self {
        let bias = Connection::random(range, rng);
        let connections = (0..num_connections)
            .map(|_| Connection::random(range, rng))
            .collect();

        Self {
            bias,
            connections,
            state: 0.0,
            state_prev: 0.0,
            prediction: 0.0,
            prediction_prev: 0.0,
        }
    }

    fn step_begin(&mut self) {
        self.state_prev = self.state;
        self.prediction_prev = self.prediction;
    }

    fn clear(&mut self) {
        self.state = 0.0;
        self.state_prev = 0.0;
        self.prediction = 0.0;
        self.prediction_prev = 0.0;
    }
}

/// One spatial unit of the lattice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    /// Receptive window weights, `(2r+1)²` slots
    pub center: Vec<CenterConnection>,

    pub cells: Vec<Cell>,

    /// Negative squared distance between input window and centers
    pub activation: f32,
    /// Post-inhibition activity in (0, 1)
    pub state: f32,
    /// Max over cell predictions
    pub prediction: f32,
    pub prediction_prev: f32,
    /// max(state, prediction)
    pub output: f32,
}

impl Column {
    /// Draw center weights/widths and then each cell, in that order.
    pub fn random<R: Rng>(
        num_center: usize,
        num_cells: usize,
        connections_per_cell: usize,
        center_range: ParamRange,
        width_range: ParamRange,
        cell_range: ParamRange,
        rng: &mut R,
    ) -> Self {
        let center = (0..num_center)
            .map(|_| CenterConnection {
                weight: rand_float(center_range.min, center_range.max, rng),
                width: rand_float(width_range.min, width_range.max, rng),
            })
            .collect();

        let cells = (0..num_cells)
            .map(|_| Cell::random(connections_per_cell, cell_range, rng))
            .collect();

        Self {
            center,
            cells,
            activation: 0.0,
            state: 0.0,
            prediction: 0.0,
            prediction_prev: 0.0,
            output: 0.0,
        }
    }

    /// Copy current predictions and cell states into the `_prev` fields.
    pub fn step_begin(&mut self) {
        self.prediction_prev = self.prediction;
        self.cells.iter_mut().for_each(Cell::step_begin);
    }

    /// Zero all state; weights are kept.
    pub fn clear(&mut self) {
        self.activation = 0.0;
        self.state = 0.0;
        self.prediction = 0.0;
        self.prediction_prev = 0.0;
        self.output = 0.0;
        self.cells.iter_mut().for_each(Cell::clear);
    }

    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.center.len() * std::mem::size_of::<CenterConnection>()
            + self
                .cells
                .iter()
                .map(|c| {
                    std::mem::size_of::<Cell>()
                        + c.connections.len() * std::mem::size_of::<Connection>()
                })
                .sum::<usize>()
    }
}

/// Linear read-out unit over every cell of the lattice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputNode {
    pub bias: TraceConnection,

    /// One connection per (column, cell), indexed `cell + column * cells_per_column`
    pub connections: Vec<TraceConnection>,
}

impl OutputNode {
    pub fn random<R: Rng>(num_connections: usize, range: ParamRange, rng: &mut R) -> Self {
        let connections = (0..num_connections)
            .map(|_| TraceConnection {
                weight: rand_float(range.min, range.max, rng),
                eligibility: 0.0,
            })
            .collect();

        let bias = TraceConnection {
            weight: rand_float(range.min, range.max, rng),
            eligibility: 0.0,
        };

        Self { bias, connections }
    }

    /// `bias + Σ weight · cell_state`.
    #[inline]
    pub fn activate(&self, cell_states: &[f32]) -> f32 {
        self.connections
            .iter()
            .zip(cell_states)
            .fold(self.bias.weight, |sum, (c, &s)| sum + c.weight * s)
    }

    /// Apply the traced reinforcement rule for one error signal.
    ///
    /// Each weight moves by `alpha · error · eligibility`, then the trace
    /// decays by `lambda` and re-accumulates the current cell state:
    /// `e ← λ·(1 − s)·(λ·e) + s`. The bias trace decays and gains 1.
    pub fn learn_traces(&mut self, cell_states: &[f32], alpha: f32, error: f32, lambda: f32) {
        let alpha_error = alpha * error;

        for (c, &s) in self.connections.iter_mut().zip(cell_states) {
            c.weight += alpha_error * c.eligibility;
            c.eligibility *= lambda;
            c.eligibility = lambda * (1.0 - s) * c.eligibility + s;
        }

        self.bias.weight += alpha_error * self.bias.eligibility;
        self.bias.eligibility *= lambda;
        self.bias.eligibility += 1.0;
    }

    /// Plain delta rule on the current cell states, traces untouched.
    pub fn learn_delta(&mut self, cell_states: &[f32], alpha: f32, error: f32) {
        let alpha_error = alpha * error;

        for (c, &s) in self.connections.iter_mut().zip(cell_states) {
            c.weight += alpha_error * s;
        }

        self.bias.weight += alpha_error;
    }

    pub fn clear_traces(&mut self) {
        self.bias.eligibility = 0.0;
        self.connections
            .iter_mut()
            .for_each(|c| c.eligibility = 0.0);
    }
}

/// Reconstructs one input position from the columns reading it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconNode {
    /// Drawn and persisted; the reconstruction sum starts from zero.
    pub bias: Connection,

    /// One connection per reading column, in lattice traversal order
    pub connections: Vec<ReconConnection>,
}

impl ReconNode {
    /// `Σ weight · values[column]` over this node's connections.
    #[inline]
    pub fn reconstruct(&self, values: &[f32]) -> f32 {
        self.connections
            .iter()
            .fold(0.0, |sum, c| sum + c.weight * values[c.column])
    }
}
