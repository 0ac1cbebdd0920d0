use std::slice;

use ndarray::Axis;

use super::{assign_activated, pre_activation_errors};
use crate::{
    arch::{
        Layer, LayerParameters, LayerState, ParamKind, SharedParams, TemporalWindow,
        TrainableParameter, ValueErrorArray, activations::ActFn,
    },
    error::Result,
    tensor,
};

/// The parameters of a `Biaffine` layer.
///
/// `w` is a stack of `output_size` bilinear forms of shape `[first_size, second_size]`.
#[derive(Clone, Debug)]
pub struct BiaffineParams {
    pub w1: TrainableParameter,
    pub w2: TrainableParameter,
    pub w: TrainableParameter,
    pub biases: TrainableParameter,
}

impl BiaffineParams {
    pub fn new(first_size: usize, second_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            w1: TrainableParameter::matrix_of("first weights", output_size, first_size)?,
            w2: TrainableParameter::matrix_of("second weights", output_size, second_size)?,
            w: TrainableParameter::new(
                "bilinear weights",
                ParamKind::Weights,
                &[output_size, first_size, second_size],
            )?,
            biases: TrainableParameter::biases_of("biases", output_size)?,
        })
    }

    pub fn input_sizes(&self) -> (usize, usize) {
        (self.w1.shape()[1], self.w2.shape()[1])
    }

    pub fn output_size(&self) -> usize {
        self.biases.shape()[0]
    }
}

impl LayerParameters for BiaffineParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![&self.w1, &self.w2, &self.w, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![&mut self.w1, &mut self.w2, &mut self.w, &mut self.biases]
    }
}

/// Merges exactly two inputs, `z_i = (W1 x1)_i + (W2 x2)_i + b_i + x1ᵀ W_i x2`.
#[derive(Debug)]
pub struct Biaffine {
    inputs: [ValueErrorArray; 2],
    output: ValueErrorArray,
    state: LayerState<BiaffineParams>,
}

impl Biaffine {
    pub fn new(params: SharedParams<BiaffineParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let ((first_size, second_size), output_size) = {
            let params = params.borrow();
            (params.input_sizes(), params.output_size())
        };

        Ok(Self {
            inputs: [
                ValueErrorArray::zeros(first_size),
                ValueErrorArray::zeros(second_size),
            ],
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            state: LayerState::new(params),
        })
    }
}

impl Layer for Biaffine {
    type Params = BiaffineParams;
    const KIND: &'static str = "biaffine";

    fn inputs(&self) -> &[ValueErrorArray] {
        &self.inputs
    }

    fn inputs_mut(&mut self) -> &mut [ValueErrorArray] {
        &mut self.inputs
    }

    fn outputs(&self) -> &[ValueErrorArray] {
        slice::from_ref(&self.output)
    }

    fn outputs_mut(&mut self) -> &mut [ValueErrorArray] {
        slice::from_mut(&mut self.output)
    }

    fn state(&self) -> &LayerState<BiaffineParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<BiaffineParams> {
        &mut self.state
    }

    fn forward_values(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let [x1, x2] = &self.inputs;
        let (x1, x2) = (x1.values(), x2.values());

        let mut z = params.w1.matrix()?.dot(x1) + params.w2.matrix()?.dot(x2);
        z += &params.biases.vector()?;

        let w = params.w.tensor3()?;
        for (zi, wi) in z.iter_mut().zip(w.axis_iter(Axis(0))) {
            *zi += x1.dot(&wi.dot(x2));
        }

        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut BiaffineParams,
        propagate_to_input: bool,
        _window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let gz = pre_activation_errors(&self.output)?;

        {
            let [x1, x2] = &self.inputs;
            tensor::assign_outer(params_errors.w1.matrix_mut()?, &gz, x1)?;
            tensor::assign_outer(params_errors.w2.matrix_mut()?, &gz, x2)?;
            params_errors.biases.vector_mut()?.assign(&gz);

            let x1x2 = &x1.values().view().insert_axis(Axis(1))
                * &x2.values().view().insert_axis(Axis(0));
            let mut gw = params_errors.w.tensor3_mut()?;
            for (&gi, mut gwi) in gz.iter().zip(gw.axis_iter_mut(Axis(0))) {
                gwi.assign(&(&x1x2 * gi));
            }
        }

        if propagate_to_input {
            let w = params.w.tensor3()?;
            let [x1, x2] = &mut self.inputs;

            let mut gx1 = tensor::transposed_dot(&params.w1.matrix()?, &gz);
            let mut gx2 = tensor::transposed_dot(&params.w2.matrix()?, &gz);
            for (&gi, wi) in gz.iter().zip(w.axis_iter(Axis(0))) {
                gx1.scaled_add(gi, &wi.dot(x2.values()));
                gx2.scaled_add(gi, &tensor::transposed_dot(&wi, x1.values()));
            }

            x1.assign_errors(&gx1)?;
            x2.assign_errors(&gx2)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr3, prelude::*};

    use super::*;
    use crate::arch::{Detached, share};

    fn layer() -> Biaffine {
        let mut params = BiaffineParams::new(2, 1, 1).unwrap();
        params.w1.values_mut().fill(1.);
        params.w.values_mut().assign(&arr3(&[[[2.], [-1.]]]).into_dyn());

        Biaffine::new(share(params), None).unwrap()
    }

    #[test]
    fn adds_the_bilinear_form() {
        let mut layer = layer();
        layer.assign_input(0, &arr1(&[1., 3.])).unwrap();
        layer.assign_input(1, &arr1(&[2.])).unwrap();
        layer.forward(&Detached).unwrap();

        // 1 + 3 + (1 * 2 * 2 - 3 * 1 * 2)
        assert_eq!(layer.output().values(), &arr1(&[2.]));
    }

    #[test]
    fn bilinear_gradients() {
        let mut layer = layer();
        layer.assign_input(0, &arr1(&[1., 3.])).unwrap();
        layer.assign_input(1, &arr1(&[2.])).unwrap();
        layer.forward(&Detached).unwrap();
        layer.output_mut().assign_errors(&arr1(&[0.5])).unwrap();

        let mut errors = layer.errors_bundle();
        layer.backward(&mut errors, true, &Detached).unwrap();

        assert_eq!(errors.w.values(), &arr3(&[[[1.], [3.]]]).into_dyn());
        assert_eq!(layer.inputs()[0].errors(), &arr1(&[2.5, -0.5]));
        assert_eq!(layer.inputs()[1].errors(), &arr1(&[-0.5]));
    }
}
