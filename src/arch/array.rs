use ndarray::{Data, ShapeBuilder, prelude::*};

use super::activations::ActFn;
use crate::error::{LayerErr, Result};

/// A tensor of values paired with a tensor of errors of the same shape.
///
/// This is the unit of state that flows through forward and backward. The values may carry an
/// activation function, in which case `activate` keeps the pre-activation values around so the
/// derivative can be computed later.
#[derive(Clone, Debug)]
pub struct ValueErrorArray<D: Dimension = Ix1> {
    values: Array<f64, D>,
    errors: Array<f64, D>,
    act_fn: Option<ActFn>,
    not_activated: Option<Array<f64, D>>,
    relevance: Option<Array<f64, D>>,
    active: Option<Vec<usize>>,
}

impl<D: Dimension> ValueErrorArray<D> {
    /// Creates a new `ValueErrorArray` filled with zeros.
    ///
    /// # Arguments
    /// * `shape` - The shape of both the values and the errors.
    pub fn zeros<Sh: ShapeBuilder<Dim = D>>(shape: Sh) -> Self {
        Self::from_values(Array::zeros(shape))
    }

    /// Creates a new `ValueErrorArray` holding `values` and zeroed errors.
    pub fn from_values(values: Array<f64, D>) -> Self {
        let errors = Array::zeros(values.raw_dim());

        Self {
            values,
            errors,
            act_fn: None,
            not_activated: None,
            relevance: None,
            active: None,
        }
    }

    /// Builder flavour of `set_activation` for freshly constructed arrays.
    pub fn with_activation(mut self, act_fn: Option<ActFn>) -> Self {
        self.act_fn = act_fn;
        self
    }

    /// Sets the activation function of this array.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if an activation was already set.
    pub fn set_activation(&mut self, act_fn: ActFn) -> Result<()> {
        if self.act_fn.is_some() {
            return Err(LayerErr::invalid("the activation function can only be set once"));
        }

        self.act_fn = Some(act_fn);
        Ok(())
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    pub fn has_activation(&self) -> bool {
        self.act_fn.is_some()
    }

    pub fn values(&self) -> &Array<f64, D> {
        &self.values
    }

    /// Mutable access to the values, the array stops being sparse.
    pub fn values_mut(&mut self) -> &mut Array<f64, D> {
        self.active = None;
        &mut self.values
    }

    pub fn errors(&self) -> &Array<f64, D> {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut Array<f64, D> {
        &mut self.errors
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overwrites the values.
    ///
    /// # Arguments
    /// * `values` - The new values, must have the same shape as the current ones.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the shapes differ.
    pub fn assign_values<S>(&mut self, values: &ArrayBase<S, D>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        check_shape("values", values.shape(), self.values.shape())?;
        self.values.assign(values);
        self.not_activated = None;
        self.active = None;
        Ok(())
    }

    /// Overwrites the errors.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the shapes differ.
    pub fn assign_errors<S>(&mut self, errors: &ArrayBase<S, D>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        check_shape("errors", errors.shape(), self.values.shape())?;
        self.errors.assign(errors);
        Ok(())
    }

    /// Sums `errors` into the current errors.
    pub fn add_errors<S>(&mut self, errors: &ArrayBase<S, D>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        check_shape("errors", errors.shape(), self.values.shape())?;
        self.errors += errors;
        Ok(())
    }

    /// Overwrites the errors with the element-wise product of `a` and `b`.
    pub fn assign_errors_by_prod<S1, S2>(
        &mut self,
        a: &ArrayBase<S1, D>,
        b: &ArrayBase<S2, D>,
    ) -> Result<()>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        check_shape("errors", a.shape(), self.values.shape())?;
        check_shape("errors", b.shape(), self.values.shape())?;
        self.errors.assign(a);
        self.errors *= b;
        Ok(())
    }

    pub fn zero_errors(&mut self) {
        self.errors.fill(0.);
    }

    /// Applies the activation function to the values, keeping the pre-activation values.
    ///
    /// Does nothing if the array has no activation.
    pub fn activate(&mut self) {
        let Some(act_fn) = self.act_fn else {
            return;
        };

        let not_activated = self.values.clone();
        self.values.zip_mut_with(&not_activated, |v, &z| *v = act_fn.f(z));
        self.not_activated = Some(not_activated);
    }

    /// Computes the derivative of the activation at the pre-activation values.
    ///
    /// # Returns
    /// A tensor of ones if the array has no activation, or an `UninitializedState` error if it
    /// has one but was never activated.
    pub fn activation_deriv(&self) -> Result<Array<f64, D>> {
        let Some(act_fn) = self.act_fn else {
            return Ok(Array::ones(self.values.raw_dim()));
        };

        let z = self
            .not_activated
            .as_ref()
            .ok_or(LayerErr::UninitializedState {
                what: "the values not activated",
            })?;

        Ok(act_fn.derivative(z))
    }

    /// The values before the activation was applied.
    ///
    /// Arrays without activation return their values.
    pub fn not_activated(&self) -> Result<&Array<f64, D>> {
        if self.act_fn.is_none() {
            return Ok(&self.values);
        }

        self.not_activated
            .as_ref()
            .ok_or(LayerErr::UninitializedState {
                what: "the values not activated",
            })
    }

    pub fn assign_relevance<S>(&mut self, relevance: &ArrayBase<S, D>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        check_shape("relevance", relevance.shape(), self.values.shape())?;
        self.relevance = Some(relevance.to_owned());
        Ok(())
    }

    /// Sums `relevance` into the current relevance, starting from zero if it was never assigned.
    pub fn add_relevance<S>(&mut self, relevance: &ArrayBase<S, D>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        check_shape("relevance", relevance.shape(), self.values.shape())?;

        match self.relevance.as_mut() {
            Some(r) => *r += relevance,
            None => self.relevance = Some(relevance.to_owned()),
        }

        Ok(())
    }

    pub fn relevance(&self) -> Result<&Array<f64, D>> {
        self.relevance
            .as_ref()
            .ok_or(LayerErr::UninitializedState { what: "the relevance" })
    }

    pub fn clear_relevance(&mut self) {
        self.relevance = None;
    }

    /// Gives simultaneous access to the values and the errors.
    pub(crate) fn split_mut(&mut self) -> (&mut Array<f64, D>, &mut Array<f64, D>) {
        self.active = None;
        (&mut self.values, &mut self.errors)
    }
}

impl ValueErrorArray<Ix1> {
    /// Creates a sparse vector of length `len`.
    ///
    /// Values are stored densely, the array additionally remembers which indices are active so
    /// outer products can skip the rest.
    ///
    /// # Arguments
    /// * `len` - The length of the vector.
    /// * `entries` - The `(index, value)` pairs of the active elements.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if an index is out of bounds.
    pub fn sparse(len: usize, entries: &[(usize, f64)]) -> Result<Self> {
        let mut values = Array1::zeros(len);
        let mut active = Vec::with_capacity(entries.len());

        for &(i, value) in entries {
            if i >= len {
                return Err(LayerErr::invalid(format!(
                    "sparse index {i} out of bounds for length {len}"
                )));
            }

            values[i] = value;
            active.push(i);
        }

        active.sort_unstable();
        active.dedup();

        let mut array = Self::from_values(values);
        array.active = Some(active);
        Ok(array)
    }

    pub fn is_sparse(&self) -> bool {
        self.active.is_some()
    }

    /// The indices of the active elements if this array is sparse.
    pub fn active_indices(&self) -> Option<&[usize]> {
        self.active.as_deref()
    }

    /// Overwrites the errors with the product `m · v`.
    pub fn assign_errors_by_dot<S1, S2>(
        &mut self,
        m: &ArrayBase<S1, Ix2>,
        v: &ArrayBase<S2, Ix1>,
    ) -> Result<()>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        if m.ncols() != v.len() {
            return Err(LayerErr::size_mismatch(
                "matrix",
                "vector",
                &[v.len()],
                &[m.ncols()],
            ));
        }

        check_shape("errors", &[m.nrows()], self.values.shape())?;
        self.errors.assign(&m.dot(v));
        Ok(())
    }
}

fn check_shape(what: &'static str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got != expected {
        return Err(LayerErr::size_mismatch(what, "array", got, expected));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_start_zeroed_with_the_values_shape() {
        let array = ValueErrorArray::zeros((2, 3));

        assert_eq!(array.errors().shape(), &[2, 3]);
        assert!(array.errors().iter().all(|&e| e == 0.));
    }

    #[test]
    fn assign_rejects_other_shapes() {
        let mut array = ValueErrorArray::zeros(3);

        assert!(array.assign_values(&arr1(&[1., 2.])).is_err());
        assert!(array.assign_errors(&arr1(&[1., 2., 3., 4.])).is_err());
        assert!(array.assign_values(&arr1(&[1., 2., 3.])).is_ok());
    }

    #[test]
    fn activate_without_activation_is_a_no_op() {
        let mut array = ValueErrorArray::from_values(arr1(&[-1., 2.]));
        array.activate();

        assert_eq!(array.values(), &arr1(&[-1., 2.]));
        assert_eq!(array.activation_deriv().unwrap(), arr1(&[1., 1.]));
    }

    #[test]
    fn activate_keeps_the_pre_activation_values() {
        let mut array = ValueErrorArray::from_values(arr1(&[-1., 2.]));
        array.set_activation(ActFn::Relu).unwrap();

        assert!(matches!(
            array.activation_deriv(),
            Err(LayerErr::UninitializedState { .. })
        ));

        array.activate();

        assert_eq!(array.values(), &arr1(&[0., 2.]));
        assert_eq!(array.not_activated().unwrap(), &arr1(&[-1., 2.]));
        assert_eq!(array.activation_deriv().unwrap(), arr1(&[0., 1.]));
    }

    #[test]
    fn activation_can_only_be_set_once() {
        let mut array = ValueErrorArray::zeros(1);
        array.set_activation(ActFn::Tanh).unwrap();

        assert!(matches!(
            array.set_activation(ActFn::Relu),
            Err(LayerErr::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn errors_by_prod_and_dot() {
        let mut array = ValueErrorArray::zeros(2);

        array
            .assign_errors_by_prod(&arr1(&[1., 2.]), &arr1(&[3., -1.]))
            .unwrap();
        assert_eq!(array.errors(), &arr1(&[3., -2.]));

        let m = arr2(&[[1., 0., 2.], [0., 1., 1.]]);
        array.assign_errors_by_dot(&m, &arr1(&[1., 2., 3.])).unwrap();
        assert_eq!(array.errors(), &arr1(&[7., 5.]));
    }

    #[test]
    fn sparse_vectors_track_active_indices() {
        let array = ValueErrorArray::sparse(5, &[(3, 1.5), (1, -2.)]).unwrap();

        assert_eq!(array.values(), &arr1(&[0., -2., 0., 1.5, 0.]));
        assert_eq!(array.active_indices(), Some(&[1, 3][..]));
        assert!(ValueErrorArray::sparse(2, &[(2, 1.)]).is_err());
    }

    #[test]
    fn relevance_is_uninitialized_until_assigned() {
        let mut array = ValueErrorArray::zeros(2);
        assert!(array.relevance().is_err());

        array.add_relevance(&arr1(&[1., 2.])).unwrap();
        array.add_relevance(&arr1(&[1., 2.])).unwrap();
        assert_eq!(array.relevance().unwrap(), &arr1(&[2., 4.]));
    }
}
