use approx::assert_abs_diff_eq;
use ndarray::Array2;
use streamcell::LayerError;
use streamcell::prelude::*;

fn valid_json() -> String {
    r#"{
        "kind": "lstm_parallel",
        "input_dim": 3,
        "cell_dim": 2,
        "momentum": 0.9,
        "mask_padded_frames": true,
        "seed": 42
    }"#
    .to_string()
}

fn small_weights() -> InitialWeights {
    InitialWeights {
        input_weights: vec![vec![0.1, 0.2]; 8],
        recurrent_weights: vec![vec![0.3, -0.1]; 8],
        bias: vec![0.05; 8],
        peephole_input: vec![0.01, 0.02],
        peephole_forget: vec![0.03, 0.04],
        peephole_output: vec![-0.01, -0.02],
    }
}

#[test]
fn test_config_parses_from_json() {
    let config = CellConfig::from_json(&valid_json()).unwrap();
    assert_eq!(config.kind, CellKind::LstmParallel);
    assert_eq!(config.input_dim, 3);
    assert_eq!(config.cell_dim, 2);
    assert_abs_diff_eq!(config.momentum, 0.9);
    assert!(config.mask_padded_frames);
    assert_eq!(config.seed, Some(42));
    assert!(config.weights.is_none());
}

#[test]
fn test_config_parses_from_reader() {
    let text = valid_json();
    let config = CellConfig::from_reader(text.as_bytes()).unwrap();
    assert_eq!(config.input_dim, 3);
}

#[test]
fn test_config_defaults() {
    let config =
        CellConfig::from_json(r#"{ "kind": "lstm_parallel", "input_dim": 4, "cell_dim": 5 }"#)
            .unwrap();
    assert_abs_diff_eq!(config.momentum, 0.0);
    assert!(!config.mask_padded_frames);
    assert!(config.seed.is_none());
}

#[test]
fn test_config_rejects_malformed_json() {
    let err = CellConfig::from_json("{ not json").unwrap_err();
    assert!(matches!(err, LayerError::InvalidConfig(_)));
}

#[test]
fn test_config_rejects_bad_dimensions() {
    let err = CellConfig::from_json(r#"{ "kind": "lstm_parallel", "input_dim": 0, "cell_dim": 2 }"#)
        .unwrap_err();
    assert!(matches!(err, LayerError::InvalidConfig(_)));

    let err = CellConfig::from_json(r#"{ "kind": "lstm_parallel", "input_dim": 2, "cell_dim": 0 }"#)
        .unwrap_err();
    assert!(matches!(err, LayerError::InvalidConfig(_)));
}

#[test]
fn test_config_rejects_bad_momentum() {
    for momentum in ["1.0", "1.5", "-0.1"] {
        let text = format!(
            r#"{{ "kind": "lstm_parallel", "input_dim": 2, "cell_dim": 2, "momentum": {} }}"#,
            momentum
        );
        let err = CellConfig::from_json(&text).unwrap_err();
        assert!(matches!(err, LayerError::InvalidConfig(_)), "momentum {}", momentum);
    }
}

#[test]
fn test_config_rejects_inconsistent_weight_shapes() {
    let mut config = CellConfig::new(CellKind::LstmParallel, 2, 2);

    // too few weight rows
    let mut weights = small_weights();
    weights.input_weights.pop();
    config.weights = Some(weights);
    assert!(matches!(
        config.validate().unwrap_err(),
        LayerError::InvalidConfig(_)
    ));

    // ragged row
    let mut weights = small_weights();
    weights.recurrent_weights[3] = vec![1.0];
    config.weights = Some(weights);
    assert!(matches!(
        config.validate().unwrap_err(),
        LayerError::InvalidConfig(_)
    ));

    // peephole vector of the wrong length
    let mut weights = small_weights();
    weights.peephole_output = vec![0.0; 3];
    config.weights = Some(weights);
    assert!(matches!(
        config.validate().unwrap_err(),
        LayerError::InvalidConfig(_)
    ));

    config.weights = Some(small_weights());
    assert!(config.validate().is_ok());
}

#[test]
fn test_recurrent_cell_dispatches_by_kind() {
    let config = CellConfig::from_json(&valid_json()).unwrap();
    let mut cell = RecurrentCell::from_config(&config).unwrap();
    assert_eq!(cell.kind(), CellKind::LstmParallel);
    assert_eq!(cell.kind().name(), "LstmParallel");
    assert_eq!(cell.input_dim(), 3);
    assert_eq!(cell.output_dim(), 2);

    cell.set_stream_lengths(vec![2, 2]);
    let input = Array2::ones((4, 3));
    let (output, pass) = cell.propagate(&input).unwrap();
    assert_eq!(output.dim(), (4, 2));
    let grad = Array2::ones(output.dim());
    let input_grad = cell.backpropagate(pass, &input, &output, &grad).unwrap();
    assert_eq!(input_grad.dim(), (4, 3));
}

#[test]
fn test_num_parameters_counts_every_store() {
    let (input_dim, cell_dim) = (3, 4);
    let cell = LstmParallel::new(input_dim, cell_dim, 0.0, Some(1)).unwrap();
    let expected =
        4 * cell_dim * input_dim + 4 * cell_dim * cell_dim + 4 * cell_dim + 3 * cell_dim;
    assert_eq!(cell.num_parameters(), expected);
    assert_eq!(cell.parameters().len(), expected);
}

#[test]
fn test_parameters_flatten_in_fixed_order() {
    let mut config = CellConfig::new(CellKind::LstmParallel, 2, 2);
    config.weights = Some(small_weights());
    let cell = LstmParallel::from_config(&config).unwrap();

    let flat = cell.parameters();
    // input weights come first, row by row
    assert_abs_diff_eq!(flat[0], 0.1);
    assert_abs_diff_eq!(flat[1], 0.2);
    // recurrent weights follow after 8 x 2 input weight values
    assert_abs_diff_eq!(flat[16], 0.3);
    // bias after both weight matrices
    assert_abs_diff_eq!(flat[32], 0.05);
    // then the three peephole vectors
    assert_abs_diff_eq!(flat[40], 0.01);
    assert_abs_diff_eq!(flat[42], 0.03);
    assert_abs_diff_eq!(flat[44], -0.01);
}

#[test]
fn test_scale_and_add_scaled() {
    let mut config = CellConfig::new(CellKind::LstmParallel, 2, 2);
    config.weights = Some(small_weights());
    let mut cell = LstmParallel::from_config(&config).unwrap();
    let other = LstmParallel::from_config(&config).unwrap();

    cell.scale(2.0);
    for (scaled, base) in cell.parameters().iter().zip(other.parameters().iter()) {
        assert_abs_diff_eq!(*scaled, 2.0 * base, epsilon = 1e-7);
    }

    cell.add_scaled(-1.0, &other).unwrap();
    for (combined, base) in cell.parameters().iter().zip(other.parameters().iter()) {
        assert_abs_diff_eq!(*combined, *base, epsilon = 1e-6);
    }

    let mismatched = LstmParallel::new(3, 2, 0.0, Some(1)).unwrap();
    let err = cell.add_scaled(1.0, &mismatched).unwrap_err();
    assert!(matches!(err, LayerError::ShapeMismatch(_)));
}

#[test]
fn test_seeded_initialization_is_reproducible() {
    let a = LstmParallel::new(3, 4, 0.0, Some(9)).unwrap();
    let b = LstmParallel::new(3, 4, 0.0, Some(9)).unwrap();
    assert_eq!(a.parameters(), b.parameters());

    let c = LstmParallel::new(3, 4, 0.0, Some(10)).unwrap();
    assert_ne!(a.parameters(), c.parameters());
}

#[test]
fn test_random_initialization_stays_in_range() {
    let cell = LstmParallel::new(4, 5, 0.0, Some(2)).unwrap();
    let LayerWeight::LstmParallel(weights) = cell.weights();
    assert!(weights.input_weights.iter().all(|&w| w.abs() <= 0.05));
    assert!(weights.recurrent_weights.iter().all(|&w| w.abs() <= 0.05));
    assert!(weights.bias.iter().all(|&b| b == 0.0));
}

#[test]
fn test_constructor_validates_hyperparameters() {
    assert!(matches!(
        LstmParallel::new(0, 2, 0.0, None).unwrap_err(),
        LayerError::InvalidConfig(_)
    ));
    assert!(matches!(
        LstmParallel::new(2, 0, 0.0, None).unwrap_err(),
        LayerError::InvalidConfig(_)
    ));
    assert!(matches!(
        LstmParallel::new(2, 2, 1.0, None).unwrap_err(),
        LayerError::InvalidConfig(_)
    ));
}

#[test]
fn test_initial_weights_round_trip_through_the_layer() {
    let mut config = CellConfig::new(CellKind::LstmParallel, 2, 2);
    config.weights = Some(small_weights());
    let cell = LstmParallel::from_config(&config).unwrap();

    let LayerWeight::LstmParallel(weights) = cell.weights();
    assert_abs_diff_eq!(weights.input_weights[[0, 1]], 0.2);
    assert_abs_diff_eq!(weights.recurrent_weights[[7, 1]], -0.1);
    assert_abs_diff_eq!(weights.bias[7], 0.05);
    assert_abs_diff_eq!(weights.peephole_forget[1], 0.04);
}
