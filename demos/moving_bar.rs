//! Moving Bar Example
//!
//! This example demonstrates:
//! 1. Building a two-level region stack with top-down feedback
//! 2. Driving it with a vertical bar sweeping across an 8x8 input
//! 3. Training the bottom read-out to report the bar position
//! 4. Tracking reconstruction error of the bottom level
//! 5. Saving and reloading the trained bottom region
//!
//! Run: RUST_LOG=debug cargo run --release --example moving_bar

use chtm::{LearnParams, RegionConfig, RegionStack, StepParams, TraceSignal};
use rand::SeedableRng;

const SIZE: usize = 8;
const STEPS: usize = 2000;
const REPORT_EVERY: usize = 200;

fn bar(position: usize) -> Vec<f32> {
    (0..SIZE * SIZE)
        .map(|i| if i % SIZE == position { 1.0 } else { 0.0 })
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("=== CHTM Moving Bar Example ===\n");

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut stack = RegionStack::new(
        vec![
            RegionConfig::new(SIZE, SIZE, 4, 4)
                .with_cells_per_column(4)
                .with_radii(2, 1)
                .with_num_outputs(1)
                .with_feedback(true),
            RegionConfig::new(4, 4, 4, 4)
                .with_cells_per_column(4)
                .with_radii(1, 1)
                .with_num_outputs(1),
        ],
        &mut rng,
    )?;

    let bottom = stack.level(0).map(|r| r.memory_usage()).unwrap_or(0);
    println!("Stack: {} levels, bottom region {} bytes\n", stack.num_levels(), bottom);

    let step = StepParams::default();
    let learn = LearnParams::default();
    let mut reconstruction = Vec::new();

    let mut abs_error = 0.0;
    let mut recon_error = 0.0;

    for t in 0..STEPS {
        let position = t % SIZE;
        let input = bar(position);
        let target = position as f32 / (SIZE - 1) as f32;

        stack.step_begin();
        stack.get_output(&input, &step)?;

        // The bottom prediction is for the next step's bar.
        if let Some(region) = stack.level(0) {
            region.get_prediction(&mut reconstruction);
            let next = bar((t + 1) % SIZE);
            recon_error += reconstruction
                .iter()
                .zip(&next)
                .map(|(r, x)| (r - x) * (r - x))
                .sum::<f32>()
                / next.len() as f32;
        }

        let output = stack.output(0).map(|o| o[0]).unwrap_or(0.0);
        let error = [target - output];
        abs_error += error[0].abs();

        let signals = [
            TraceSignal {
                error: &error,
                alphas: &[0.02],
                lambdas: &[0.0],
            },
            TraceSignal {
                error: &[0.0],
                alphas: &[0.0],
                lambdas: &[0.0],
            },
        ];
        stack.learn_traces(&signals, &learn)?;

        if (t + 1) % REPORT_EVERY == 0 {
            println!(
                "step {:5}: mean |position error| {:.4}, mean reconstruction error {:.4}",
                t + 1,
                abs_error / REPORT_EVERY as f32,
                recon_error / REPORT_EVERY as f32
            );
            abs_error = 0.0;
            recon_error = 0.0;
        }
    }

    // Save and reload the bottom region
    let path = std::env::temp_dir().join("chtm_moving_bar.bin");
    if let Some(region) = stack.level(0) {
        region.save(&path)?;
        let loaded = chtm::Region::load(&path)?;
        println!(
            "\nSaved bottom region to {} and reloaded it (identical: {})",
            path.display(),
            &loaded == region
        );
        std::fs::remove_file(&path)?;
    }

    Ok(())
}
