use ndarray::{Data, linalg, prelude::*};

use crate::{
    arch::ValueErrorArray,
    error::{LayerErr, Result},
};

/// Writes the outer product `g ⊗ x` into `out`.
///
/// Only the active columns of a sparse `x` are visited, the rest are zeroed.
///
/// # Arguments
/// * `out` - A `g.len()` x `x.len()` matrix.
/// * `g` - The gradient of the output units.
/// * `x` - The array the gradient is distributed along.
///
/// # Returns
/// A `SizeMismatch` error if `out` has the wrong shape.
pub fn assign_outer<S>(
    out: ArrayViewMut2<f64>,
    g: &ArrayBase<S, Ix1>,
    x: &ValueErrorArray,
) -> Result<()>
where
    S: Data<Elem = f64>,
{
    match x.active_indices() {
        Some(active) => assign_sparse_outer(out, g, x.values(), active),
        None => assign_dense_outer(out, g, x.values()),
    }
}

/// Writes the outer product `g ⊗ x` into `out` using a matrix multiplication.
pub fn assign_dense_outer<S1, S2>(
    mut out: ArrayViewMut2<f64>,
    g: &ArrayBase<S1, Ix1>,
    x: &ArrayBase<S2, Ix1>,
) -> Result<()>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    check_outer(&out, g.len(), x.len())?;

    let g = g.view().insert_axis(Axis(1));
    let x = x.view().insert_axis(Axis(0));
    linalg::general_mat_mul(1.0, &g, &x, 0.0, &mut out);
    Ok(())
}

fn assign_sparse_outer<S1, S2>(
    mut out: ArrayViewMut2<f64>,
    g: &ArrayBase<S1, Ix1>,
    x: &ArrayBase<S2, Ix1>,
    active: &[usize],
) -> Result<()>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    check_outer(&out, g.len(), x.len())?;
    out.fill(0.);

    for &j in active {
        let xj = x[j];
        out.column_mut(j).zip_mut_with(g, |o, &gi| *o = gi * xj);
    }

    Ok(())
}

fn check_outer(out: &ArrayViewMut2<f64>, rows: usize, cols: usize) -> Result<()> {
    if out.dim() != (rows, cols) {
        return Err(LayerErr::size_mismatch(
            "outer product",
            "destination",
            &[rows, cols],
            out.shape(),
        ));
    }

    Ok(())
}

/// Computes `Wᵀ g`, the error a linear map sends back to its input.
pub fn transposed_dot<S1, S2>(w: &ArrayBase<S1, Ix2>, g: &ArrayBase<S2, Ix1>) -> Array1<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    w.t().dot(g)
}

/// A numerically stable softmax.
pub fn softmax<S: Data<Elem = f64>>(s: &ArrayBase<S, Ix1>) -> Array1<f64> {
    let max = s.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    let exp = s.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Adds `eps` with the sign of each element so no element is zero, a zero counts as positive.
pub fn stabilize<S: Data<Elem = f64>>(z: &ArrayBase<S, Ix1>, eps: f64) -> Array1<f64> {
    z.mapv(|v| if v >= 0. { v + eps } else { v - eps })
}
