#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use layer_engine::{
    arch::{Layer, LayerParameters, SharedParams, split_at_step},
    initialization::{ParamGen, RandParamGen},
};
use ndarray::Array1;
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::{SeedableRng, rngs::StdRng};

/// The step of the central finite differences.
pub const H: f64 = 1e-5;

/// The relative tolerance between analytic and numeric gradients.
const TOLERANCE: f64 = 1e-4;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A vector of `len` values uniformly sampled in `[-1, 1)`.
pub fn random_vector(len: usize, rng: &mut StdRng) -> Array1<f64> {
    let distribution = Uniform::new(-1., 1.).unwrap();
    Array1::random_using(len, distribution, rng)
}

/// A sequence of `steps` steps, each with one vector per size in `sizes`.
pub fn random_sequence(steps: usize, sizes: &[usize], seed: u64) -> Vec<Vec<Array1<f64>>> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..steps)
        .map(|_| sizes.iter().map(|&size| random_vector(size, &mut rng)).collect())
        .collect()
}

/// Overwrites every parameter with values uniformly sampled in `[-0.5, 0.5)`.
pub fn randomize<P: LayerParameters>(params: &mut P, seed: u64) {
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(seed)));
    let mut param_gen = RandParamGen::uniform(rng, usize::MAX, -0.5, 0.5).unwrap();

    for param in params.params_mut() {
        param_gen.fill(param.values_mut()).unwrap();
    }
}

/// Forwards every step left to right after assigning its inputs.
pub fn forward<L: Layer>(steps: &mut [L], inputs: &[Vec<Array1<f64>>]) {
    for (layer, xs) in steps.iter_mut().zip(inputs) {
        for (i, x) in xs.iter().enumerate() {
            layer.assign_input(i, x).unwrap();
        }
    }

    for t in 0..steps.len() {
        let (layer, window) = split_at_step(steps, t).unwrap();
        layer.forward(&window).unwrap();
    }
}

/// The loss `Σ w · y` over every output of every step.
pub fn loss<L: Layer>(
    steps: &mut [L],
    inputs: &[Vec<Array1<f64>>],
    weights: &[Vec<Array1<f64>>],
) -> f64 {
    forward(steps, inputs);

    steps
        .iter()
        .zip(weights)
        .flat_map(|(layer, ws)| layer.outputs().iter().zip(ws))
        .map(|(y, w)| y.values().dot(w))
        .sum()
}

/// Runs backward right to left with `weights` as the output errors.
///
/// # Returns
/// The gradients summed over the steps and the input errors of every step.
pub fn backward<L: Layer>(
    steps: &mut [L],
    weights: &[Vec<Array1<f64>>],
) -> (L::Params, Vec<Vec<Array1<f64>>>) {
    for (layer, ws) in steps.iter_mut().zip(weights) {
        for (y, w) in layer.outputs_mut().iter_mut().zip(ws) {
            y.assign_errors(w).unwrap();
        }
    }

    let mut total = steps[0].errors_bundle();
    for t in (0..steps.len()).rev() {
        let (layer, window) = split_at_step(steps, t).unwrap();
        let mut errors = layer.errors_bundle();
        layer.backward(&mut errors, true, &window).unwrap();
        total.assign_sum(&errors).unwrap();
    }

    let input_errors = steps
        .iter()
        .map(|layer| layer.inputs().iter().map(|x| x.errors().clone()).collect())
        .collect();

    (total, input_errors)
}

pub fn assert_close(analytic: f64, numeric: f64, what: &str) {
    assert!(
        (analytic - numeric).abs() <= TOLERANCE * numeric.abs().max(1.),
        "{what}: analytic {analytic} vs numeric {numeric}"
    );
}

fn param_value<P: LayerParameters>(params: &SharedParams<P>, k: usize, j: usize) -> f64 {
    params.borrow().params()[k].values().iter().nth(j).copied().unwrap()
}

fn set_param_value<P: LayerParameters>(params: &SharedParams<P>, k: usize, j: usize, v: f64) {
    *params.borrow_mut().params_mut()[k].values_mut().iter_mut().nth(j).unwrap() = v;
}

/// Checks every parameter and input gradient of an unrolled layer against central differences of
/// the loss `Σ w · y`.
///
/// # Arguments
/// * `steps` - One instance per step, all tied to `params`.
/// * `params` - The shared parameters.
/// * `inputs` - The inputs of every step.
/// * `weights` - The loss weights of every output of every step.
pub fn check_gradients<L: Layer>(
    steps: &mut [L],
    params: &SharedParams<L::Params>,
    inputs: &[Vec<Array1<f64>>],
    weights: &[Vec<Array1<f64>>],
) {
    forward(steps, inputs);
    let (analytic, input_errors) = backward(steps, weights);

    let analytic_values: Vec<Vec<f64>> = analytic
        .params()
        .iter()
        .map(|p| p.values().iter().copied().collect())
        .collect();

    for (k, grads) in analytic_values.iter().enumerate() {
        let name = params.borrow().params()[k].name();

        for (j, &grad) in grads.iter().enumerate() {
            let original = param_value(params, k, j);

            set_param_value(params, k, j, original + H);
            let plus = loss(steps, inputs, weights);
            set_param_value(params, k, j, original - H);
            let minus = loss(steps, inputs, weights);
            set_param_value(params, k, j, original);

            let what = format!("{} parameter {k} ({name}) element {j}", L::KIND);
            assert_close(grad, (plus - minus) / (2. * H), &what);
        }
    }

    let mut perturbed = inputs.to_vec();
    for (t, xs) in inputs.iter().enumerate() {
        for (i, x) in xs.iter().enumerate() {
            for j in 0..x.len() {
                perturbed[t][i][j] = x[j] + H;
                let plus = loss(steps, &perturbed, weights);
                perturbed[t][i][j] = x[j] - H;
                let minus = loss(steps, &perturbed, weights);
                perturbed[t][i][j] = x[j];

                let what = format!("{} step {t} input {i} element {j}", L::KIND);
                assert_close(input_errors[t][i][j], (plus - minus) / (2. * H), &what);
            }
        }
    }
}
