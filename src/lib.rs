//! CHTM - Continuous Hierarchical Predictive-Coding Regions
//!
//! CHTM models a patch of cortex as a 2D lattice of **columns** reading a 2D
//! input through local receptive windows. Columns compete with their
//! neighbors through soft lateral inhibition, which yields a sparse,
//! continuous activity pattern. Each column holds several **cells** that
//! represent the same spatial pattern in different temporal contexts; cells
//! predict the next step's activity from the cells around them and,
//! optionally, from a region above.
//!
//! # Key Characteristics
//!
//! - Continuous (real-valued) activity instead of binary SDRs
//! - Local learning only: prediction error, eligibility traces and a
//!   reconstruction delta rule; no back-propagation
//! - Linear read-out layer trained by traced reinforcement
//! - Generative read-out: column predictions mapped back to input space
//!
//! # Architecture
//!
//! - **Lattice**: receptive, lateral and inhibition window geometry
//! - **Column / Cell**: per-unit weights and state
//! - **Region**: step protocol (`step_begin` → `get_output` →
//!   `get_prediction` → `learn_traces`)
//! - **RegionStack**: bottom-up hierarchy with top-down feedback
//!
//! # Example
//!
//! ```
//! use chtm::{LearnParams, Region, RegionConfig, StepParams};
//!
//! # fn main() -> chtm::Result<()> {
//! let config = RegionConfig::new(8, 8, 4, 4)
//!     .with_cells_per_column(2)
//!     .with_radii(2, 1)
//!     .with_num_outputs(1);
//! let mut region = Region::from_seed(config, 7)?;
//!
//! let input: Vec<f32> = (0..64).map(|i| (i % 8) as f32 / 8.0).collect();
//! let mut output = Vec::new();
//! let mut reconstruction = Vec::new();
//!
//! for _ in 0..10 {
//!     region.step_begin();
//!     region.get_output(&input, None, &StepParams::default(), &mut output)?;
//!     region.get_prediction(&mut reconstruction);
//!
//!     let error = [0.5 - output[0]];
//!     region.learn_traces(
//!         &input,
//!         &output,
//!         None,
//!         &error,
//!         &[0.05],
//!         &[0.0],
//!         &LearnParams::default(),
//!     )?;
//! }
//!
//! assert_eq!(reconstruction.len(), 64);
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! All fallible operations return [`Result`]. Size mismatches are reported
//! before any state changes, so a failed call leaves the region untouched.

pub mod column;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod lattice;
pub mod region;
pub mod utils;

// Re-exports for convenient access
pub use column::{Cell, Column, OutputNode, ReconNode};
pub use config::{InitRanges, LearnParams, ParamRange, RegionConfig, StepParams};
pub use error::{ChtmError, Result};
pub use hierarchy::{RegionStack, TraceSignal};
pub use lattice::Lattice;
pub use region::Region;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "CHTM";

/// Get version string
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}
