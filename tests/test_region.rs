//! Integration tests for the region step protocol.
//!
//! Tests cover:
//! - Construction and determinism
//! - Perception, inhibition and prediction formulas
//! - Shape and hierarchy errors leaving the region untouched
//! - Reconstruction read-out
//! - Persistence

use approx::assert_relative_eq;
use chtm::utils::sigmoid;
use chtm::{ChtmError, InitRanges, ParamRange, Region, RegionConfig, StepParams};

fn config() -> RegionConfig {
    RegionConfig::new(6, 6, 3, 3)
        .with_cells_per_column(2)
        .with_radii(1, 1)
        .with_num_outputs(3)
}

fn ramp(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32 / n as f32).collect()
}

fn run_step(region: &mut Region, input: &[f32], next: Option<&Region>) -> Vec<f32> {
    let mut output = Vec::new();
    region.step_begin();
    region
        .get_output(input, next, &StepParams::default(), &mut output)
        .unwrap();
    output
}

#[test]
fn test_same_seed_same_region() {
    let a = Region::from_seed(config(), 42).unwrap();
    let b = Region::from_seed(config(), 42).unwrap();
    let c = Region::from_seed(config(), 43).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_invalid_config_rejected() {
    let result = Region::from_seed(RegionConfig::new(4, 4, 0, 2), 0);
    assert!(matches!(result, Err(ChtmError::InvalidConfiguration(_))));

    let result = Region::from_seed(config().with_num_outputs(0), 0);
    assert!(matches!(result, Err(ChtmError::InvalidConfiguration(_))));
}

#[test]
fn test_feedback_allocation() {
    let region = Region::from_seed(config().with_feedback(true), 0).unwrap();

    // 3x3 lateral window, 2 cells + 1 feedback slot per position.
    for column in region.columns() {
        for cell in &column.cells {
            assert_eq!(cell.connections.len(), 9 * 3);
        }
    }
}

#[test]
fn test_output_resized() {
    let mut region = Region::from_seed(config(), 1).unwrap();
    let mut output = vec![9.0; 7];

    region.step_begin();
    region
        .get_output(&ramp(36), None, &StepParams::default(), &mut output)
        .unwrap();

    assert_eq!(output.len(), 3);
    assert!(output.iter().all(|o| o.is_finite()));
}

#[test]
fn test_output_is_linear_readout() {
    let mut region = Region::from_seed(config(), 2).unwrap();
    let output = run_step(&mut region, &ramp(36), None);
    let cell_states = region.cell_states();

    assert_eq!(cell_states.len(), 9 * 2);
    for (node, &out) in region.output_nodes().iter().zip(&output) {
        let expected = node
            .connections
            .iter()
            .zip(&cell_states)
            .fold(node.bias.weight, |sum, (c, &s)| sum + c.weight * s);
        assert_relative_eq!(out, expected, epsilon = 1e-5);
    }
}

#[test]
fn test_states_bounded() {
    let mut region = Region::from_seed(config(), 3).unwrap();
    run_step(&mut region, &ramp(36), None);

    for column in region.columns() {
        assert!(column.state > 0.0 && column.state < 1.0);
        assert!(column.prediction > 0.0 && column.prediction < 1.0);
        assert_relative_eq!(column.output, column.state.max(column.prediction));

        let max_cell = column
            .cells
            .iter()
            .map(|c| c.prediction)
            .fold(0.0f32, f32::max);
        assert_relative_eq!(column.prediction, max_cell);
    }
}

#[test]
fn test_get_output_repeatable_within_step() {
    let mut region = Region::from_seed(config(), 4).unwrap();
    let input = ramp(36);

    region.step_begin();
    let mut first = Vec::new();
    let mut second = Vec::new();
    region
        .get_output(&input, None, &StepParams::default(), &mut first)
        .unwrap();
    region
        .get_output(&input, None, &StepParams::default(), &mut second)
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_inhibition_excess() {
    // Three columns on a strip, each reading one input.
    let config = RegionConfig::new(3, 1, 3, 1).with_radii(0, 0);
    let mut region = Region::from_seed(config, 5).unwrap();
    for (column, center) in region.columns_mut().iter_mut().zip([0.5, 1.0, 0.9]) {
        column.center[0].weight = center;
    }

    let params = StepParams {
        inhibition_radius: 1,
        local_activity: 0.5,
        column_intensity: 4.0,
        ..StepParams::default()
    };
    let mut output = Vec::new();
    region
        .get_output(&[0.0, 1.0, 0.0], None, &params, &mut output)
        .unwrap();

    let states = region.column_states();
    // activations: -0.25, 0, -0.81
    assert_relative_eq!(states[0], sigmoid((0.5 - 0.25) * 4.0), epsilon = 1e-5);
    assert_relative_eq!(states[1], sigmoid(0.5 * 4.0), epsilon = 1e-5);
    assert_relative_eq!(states[2], sigmoid((0.5 - 0.81) * 4.0), epsilon = 1e-5);
}

#[test]
fn test_single_cell_prediction() {
    let config = RegionConfig::new(1, 1, 1, 1).with_radii(0, 0);
    let mut region = Region::from_seed(config, 6).unwrap();
    let params = StepParams {
        prediction_intensity: 2.0,
        ..StepParams::default()
    };
    let mut output = Vec::new();

    region.step_begin();
    region.get_output(&[0.7], None, &params, &mut output).unwrap();

    let column = &region.columns()[0];
    let cell = &column.cells[0];
    assert_eq!(cell.connections.len(), 1);

    let expected = sigmoid((cell.bias.weight + cell.connections[0].weight * cell.state) * 2.0);
    assert_relative_eq!(cell.prediction, expected, epsilon = 1e-6);
    assert_relative_eq!(column.prediction, expected, epsilon = 1e-6);
}

#[test]
fn test_input_mismatch_leaves_region_untouched() {
    let mut region = Region::from_seed(config(), 7).unwrap();
    run_step(&mut region, &ramp(36), None);
    let before = region.clone();

    let mut output = vec![1.0, 2.0, 3.0];
    let result = region.get_output(&ramp(35), None, &StepParams::default(), &mut output);

    match result {
        Err(ChtmError::ShapeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 36);
            assert_eq!(actual, 35);
        }
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }
    assert_eq!(region, before);
    assert_eq!(output, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_feedback_requires_configuration() {
    let mut region = Region::from_seed(config(), 8).unwrap();
    let next = Region::from_seed(RegionConfig::new(3, 3, 3, 3), 9).unwrap();
    let before = region.clone();

    let mut output = Vec::new();
    let result = region.get_output(&ramp(36), Some(&next), &StepParams::default(), &mut output);
    assert!(matches!(result, Err(ChtmError::HierarchyMismatch(_))));
    assert_eq!(region, before);
}

#[test]
fn test_feedback_lattice_mismatch() {
    let mut region = Region::from_seed(config().with_feedback(true), 8).unwrap();
    let next = Region::from_seed(RegionConfig::new(3, 3, 2, 2), 9).unwrap();

    let mut output = Vec::new();
    let result = region.get_output(&ramp(36), Some(&next), &StepParams::default(), &mut output);
    assert!(matches!(result, Err(ChtmError::HierarchyMismatch(_))));
}

#[test]
fn test_feedback_changes_predictions() {
    let mut with_quiet = Region::from_seed(config().with_feedback(true), 10).unwrap();
    let mut without = with_quiet.clone();
    let mut with_active = with_quiet.clone();

    // A fresh next region has zero predictions and contributes nothing.
    let quiet = Region::from_seed(RegionConfig::new(3, 3, 3, 3), 11).unwrap();
    let mut active = quiet.clone();
    for column in active.columns_mut() {
        column.prediction = 1.0;
    }

    let input = ramp(36);
    run_step(&mut without, &input, None);
    run_step(&mut with_quiet, &input, Some(&quiet));
    run_step(&mut with_active, &input, Some(&active));

    assert_eq!(without.column_predictions(), with_quiet.column_predictions());
    assert_ne!(without.column_predictions(), with_active.column_predictions());
}

#[test]
fn test_get_prediction_sums_column_predictions() {
    let ranges = InitRanges {
        recon_weight: ParamRange::constant(0.5),
        ..InitRanges::default()
    };
    // Every column's window spans the whole 2x2 input.
    let config = RegionConfig::new(2, 2, 2, 2)
        .with_radii(1, 0)
        .with_ranges(ranges);
    let mut region = Region::from_seed(config, 12).unwrap();

    for (column, p) in region.columns_mut().iter_mut().zip([0.1, 0.2, 0.3, 0.4]) {
        column.prediction = p;
    }

    let mut reconstruction = Vec::new();
    region.get_prediction(&mut reconstruction);

    assert_eq!(reconstruction.len(), 4);
    for r in reconstruction {
        assert_relative_eq!(r, 0.5, epsilon = 1e-6);
    }
}

#[test]
fn test_get_prediction_single_column() {
    let ranges = InitRanges {
        recon_weight: ParamRange::constant(0.5),
        ..InitRanges::default()
    };
    let config = RegionConfig::new(2, 2, 1, 1)
        .with_radii(1, 0)
        .with_ranges(ranges);
    let mut region = Region::from_seed(config, 12).unwrap();
    region.columns_mut()[0].prediction = 0.6;

    let mut reconstruction = Vec::new();
    region.get_prediction(&mut reconstruction);

    assert_eq!(reconstruction.len(), 4);
    for r in reconstruction {
        assert_relative_eq!(r, 0.3, epsilon = 1e-6);
    }
}

#[test]
fn test_get_prediction_uncovered_inputs_zero() {
    let config = RegionConfig::new(8, 8, 2, 2).with_radii(0, 0);
    let mut region = Region::from_seed(config, 13).unwrap();
    run_step(&mut region, &ramp(64), None);

    let mut reconstruction = Vec::new();
    region.get_prediction(&mut reconstruction);

    assert_eq!(reconstruction.len(), 64);
    for (i, r) in reconstruction.iter().enumerate() {
        if ![0, 4, 32, 36].contains(&i) {
            assert_eq!(*r, 0.0);
        }
    }
}

#[test]
fn test_column_accessors() {
    let region = Region::from_seed(config(), 14).unwrap();

    assert_eq!(region.column(1, 2).unwrap(), &region.columns()[7]);
    assert!(matches!(
        region.column(3, 0),
        Err(ChtmError::IndexOutOfBounds {
            index: 3,
            length: 3
        })
    ));
    assert!(matches!(
        region.column(0, 5),
        Err(ChtmError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn test_binary_round_trip() {
    let mut region = Region::from_seed(config(), 15).unwrap();
    run_step(&mut region, &ramp(36), None);

    let data = region.to_binary().unwrap();
    let restored = Region::from_binary(&data).unwrap();
    assert_eq!(region, restored);

    assert!(matches!(
        Region::from_binary(&[1, 2, 3]),
        Err(ChtmError::Serialization(_))
    ));
}

#[test]
fn test_save_load() {
    let mut region = Region::from_seed(config().with_feedback(true), 16).unwrap();
    run_step(&mut region, &ramp(36), None);

    let path = std::env::temp_dir().join(format!("chtm_region_{}.bin", std::process::id()));
    region.save(&path).unwrap();
    let loaded = Region::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(region, loaded);

    // Continuing from the loaded copy matches continuing the original.
    let input = ramp(36);
    let mut original = region;
    let mut copy = loaded;
    assert_eq!(
        run_step(&mut original, &input, None),
        run_step(&mut copy, &input, None)
    );
}

fn assert_rejected(region: &Region) {
    let data = region.to_binary().unwrap();
    assert!(matches!(
        Region::from_binary(&data),
        Err(ChtmError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_from_binary_rejects_missing_column() {
    let region = Region::from_seed(RegionConfig::new(4, 4, 2, 2), 17).unwrap();
    region.validate_layout().unwrap();

    // Same field order as the region, one column short.
    let truncated = (
        region.config().clone(),
        region.lattice().clone(),
        region.columns()[..3].to_vec(),
        region.output_nodes().to_vec(),
        region.recon_nodes().to_vec(),
    );
    let data = bincode::serialize(&truncated).unwrap();
    assert!(matches!(
        Region::from_binary(&data),
        Err(ChtmError::InvalidConfiguration(_))
    ));

    let path = std::env::temp_dir().join(format!("chtm_truncated_{}.bin", std::process::id()));
    std::fs::write(&path, &data).unwrap();
    let loaded = Region::load(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(loaded, Err(ChtmError::InvalidConfiguration(_))));
}

#[test]
fn test_from_binary_rejects_mismatched_shapes() {
    let region = Region::from_seed(config().with_feedback(true), 18).unwrap();

    let mut bad = region.clone();
    bad.columns_mut()[4].cells.pop();
    assert_rejected(&bad);

    let mut bad = region.clone();
    bad.columns_mut()[0].center.pop();
    assert_rejected(&bad);

    let mut bad = region.clone();
    bad.columns_mut()[2].cells[1].connections.truncate(9);
    assert_rejected(&bad);

    let mut bad = region.clone();
    bad.output_nodes_mut()[1].connections.pop();
    assert_rejected(&bad);

    let mut bad = region.clone();
    bad.recon_nodes_mut()[0].connections[0].column = 9;
    assert_rejected(&bad);

    let mut bad = region.clone();
    bad.recon_nodes_mut()[7].connections.clear();
    assert_rejected(&bad);
}

#[test]
fn test_from_binary_rejects_foreign_lattice() {
    let region = Region::from_seed(RegionConfig::new(4, 4, 2, 2), 19).unwrap();
    let other = Region::from_seed(RegionConfig::new(4, 4, 2, 2).with_radii(0, 1), 19).unwrap();

    let mixed = (
        region.config().clone(),
        other.lattice().clone(),
        region.columns().to_vec(),
        region.output_nodes().to_vec(),
        region.recon_nodes().to_vec(),
    );
    let data = bincode::serialize(&mixed).unwrap();
    assert!(matches!(
        Region::from_binary(&data),
        Err(ChtmError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_load_missing_file() {
    let path = std::env::temp_dir().join("chtm_region_does_not_exist.bin");
    assert!(matches!(Region::load(&path), Err(ChtmError::Io(_))));
}
