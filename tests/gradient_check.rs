mod common;

use layer_engine::arch::{
    GateParams, LayerParameters, LinearParams, SharedParams,
    activations::ActFn,
    layers::{
        Affine, AffineParams, Attention, AttentionParams, BatchNorm, Biaffine, BiaffineParams,
        DeltaRnn, DeltaRnnParams, Feedforward, Gru, GruParams, IndRnn, IndRnnParams, LayerNorm,
        Lstm, LstmParams, NormParams, Ran, RanParams, SimpleRecurrent,
    },
    share,
};
use ndarray::Array1;

use common::{H, assert_close, check_gradients, loss, random_sequence, randomize};

const STEPS: usize = 3;

fn shared<P: LayerParameters>(mut params: P, seed: u64) -> SharedParams<P> {
    randomize(&mut params, seed);
    share(params)
}

/// Random inputs of `input_size` and loss weights of `output_size` for every step.
fn sequence(
    steps: usize,
    input_size: usize,
    output_size: usize,
) -> (Vec<Vec<Array1<f64>>>, Vec<Vec<Array1<f64>>>) {
    (
        random_sequence(steps, &[input_size], 7),
        random_sequence(steps, &[output_size], 11),
    )
}

#[test]
fn feedforward() {
    common::init_logger();
    let params = shared(LinearParams::new(4, 3).unwrap(), 1);
    let mut steps = vec![Feedforward::new(params.clone(), Some(ActFn::Tanh)).unwrap()];
    let (inputs, weights) = sequence(1, 4, 3);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn simple_recurrent() {
    let params = shared(GateParams::new(3, 4).unwrap(), 2);
    let mut steps: Vec<_> = (0..STEPS)
        .map(|_| SimpleRecurrent::new(params.clone(), Some(ActFn::Tanh)).unwrap())
        .collect();
    let (inputs, weights) = sequence(STEPS, 3, 4);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn gru() {
    let params = shared(GruParams::new(3, 4).unwrap(), 3);
    let mut steps: Vec<_> = (0..STEPS).map(|_| Gru::new(params.clone()).unwrap()).collect();
    let (inputs, weights) = sequence(STEPS, 3, 4);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn lstm() {
    let params = shared(LstmParams::new(4, 5).unwrap(), 4);
    let mut steps: Vec<_> = (0..STEPS).map(|_| Lstm::new(params.clone()).unwrap()).collect();
    let (inputs, weights) = sequence(STEPS, 4, 5);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn lstm_with_errors_only_on_the_last_step() {
    let params = shared(LstmParams::new(4, 5).unwrap(), 5);
    let mut steps: Vec<_> = (0..STEPS).map(|_| Lstm::new(params.clone()).unwrap()).collect();
    let inputs = random_sequence(STEPS, &[4], 13);

    let mut weights = vec![vec![Array1::zeros(5)]; STEPS];
    weights[STEPS - 1][0] = ndarray::arr1(&[0.1, 0.1, -0.5, 0.7, 0.2]);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn ran() {
    let params = shared(RanParams::new(3, 4).unwrap(), 6);
    let mut steps: Vec<_> = (0..STEPS)
        .map(|_| Ran::new(params.clone(), Some(ActFn::Tanh)).unwrap())
        .collect();
    let (inputs, weights) = sequence(STEPS, 3, 4);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn delta_rnn() {
    let params = shared(DeltaRnnParams::new(3, 4).unwrap(), 7);
    let mut steps: Vec<_> = (0..STEPS)
        .map(|_| DeltaRnn::new(params.clone(), Some(ActFn::Tanh)).unwrap())
        .collect();
    let (inputs, weights) = sequence(STEPS, 3, 4);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn ind_rnn() {
    let params = shared(IndRnnParams::new(3, 4).unwrap(), 8);
    let mut steps: Vec<_> = (0..STEPS)
        .map(|_| IndRnn::new(params.clone(), Some(ActFn::sigmoid(1.))).unwrap())
        .collect();
    let (inputs, weights) = sequence(STEPS, 3, 4);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn affine() {
    let params = shared(AffineParams::new(&[3, 2, 4], 3).unwrap(), 9);
    let mut steps = vec![Affine::new(params.clone(), Some(ActFn::Softsign)).unwrap()];
    let inputs = random_sequence(1, &[3, 2, 4], 17);
    let weights = random_sequence(1, &[3], 19);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn biaffine() {
    let params = shared(BiaffineParams::new(3, 2, 4).unwrap(), 10);
    let mut steps = vec![Biaffine::new(params.clone(), Some(ActFn::Tanh)).unwrap()];
    let inputs = random_sequence(1, &[3, 2], 23);
    let weights = random_sequence(1, &[4], 29);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

fn attention_layer(params: &SharedParams<AttentionParams>) -> Attention {
    let mut layer = Attention::new(params.clone(), 4, 5).unwrap();

    for (a, values) in layer
        .attention_arrays_mut()
        .iter_mut()
        .zip(random_sequence(5, &[3], 31))
    {
        a.assign_values(&values[0]).unwrap();
    }

    layer
}

#[test]
fn attention() {
    let params = shared(AttentionParams::new(3).unwrap(), 11);
    let mut steps = vec![attention_layer(&params)];
    let inputs = random_sequence(1, &[4; 5], 37);
    let weights = random_sequence(1, &[4], 41);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn attention_arrays() {
    let params = shared(AttentionParams::new(3).unwrap(), 11);
    let mut steps = vec![attention_layer(&params)];
    let inputs = random_sequence(1, &[4; 5], 37);
    let weights = random_sequence(1, &[4], 41);

    common::forward(&mut steps, &inputs);
    common::backward(&mut steps, &weights);

    let analytic: Vec<Array1<f64>> = steps[0]
        .attention_arrays()
        .iter()
        .map(|a| a.errors().clone())
        .collect();
    assert!(analytic.iter().any(|g| g.iter().any(|&v| v != 0.)));

    for (i, grad) in analytic.iter().enumerate() {
        for j in 0..grad.len() {
            let original = steps[0].attention_arrays()[i].values()[j];

            steps[0].attention_arrays_mut()[i].values_mut()[j] = original + H;
            let plus = loss(&mut steps, &inputs, &weights);
            steps[0].attention_arrays_mut()[i].values_mut()[j] = original - H;
            let minus = loss(&mut steps, &inputs, &weights);
            steps[0].attention_arrays_mut()[i].values_mut()[j] = original;

            let what = format!("attention array {i} element {j}");
            assert_close(grad[j], (plus - minus) / (2. * H), &what);
        }
    }
}

#[test]
fn layer_norm() {
    let params = shared(NormParams::new(5).unwrap(), 12);
    let mut steps = vec![LayerNorm::new(params.clone(), None).unwrap()];
    let (inputs, weights) = sequence(1, 5, 5);

    check_gradients(&mut steps, &params, &inputs, &weights);
}

#[test]
fn batch_norm() {
    let params = shared(NormParams::new(3).unwrap(), 13);
    let mut steps = vec![BatchNorm::new(params.clone(), 4, Some(ActFn::Tanh)).unwrap()];
    let inputs = random_sequence(1, &[3; 4], 43);
    let weights = random_sequence(1, &[3; 4], 47);

    check_gradients(&mut steps, &params, &inputs, &weights);
}
