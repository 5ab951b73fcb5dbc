use ndarray::{ArrayBase, Data, DataMut, Ix2, Zip};

/// Applies the logistic sigmoid `1 / (1 + e^-x)` to every element in place.
///
/// # Parameters
///
/// * `z` - Matrix (or matrix view) to squash in place
pub fn sigmoid_inplace<S>(z: &mut ArrayBase<S, Ix2>)
where
    S: DataMut<Elem = f32>,
{
    z.par_mapv_inplace(|x| 1.0 / (1.0 + (-x).exp()));
}

/// Applies the hyperbolic tangent to every element in place.
///
/// # Parameters
///
/// * `z` - Matrix (or matrix view) to squash in place
pub fn tanh_inplace<S>(z: &mut ArrayBase<S, Ix2>)
where
    S: DataMut<Elem = f32>,
{
    z.par_mapv_inplace(|x| x.tanh());
}

/// Multiplies an error matrix by the sigmoid derivative in place.
///
/// The derivative is expressed through the squashed output `y`, so
/// `diff[i] *= y[i] * (1 - y[i])`.
///
/// # Parameters
///
/// - `diff` - Back-propagated error to rescale in place
/// - `y` - Sigmoid outputs recorded during the forward pass, same shape as `diff`
pub fn sigmoid_diff_inplace<S, S2>(diff: &mut ArrayBase<S, Ix2>, y: &ArrayBase<S2, Ix2>)
where
    S: DataMut<Elem = f32>,
    S2: Data<Elem = f32>,
{
    Zip::from(diff).and(y).par_for_each(|d, &a| *d *= a * (1.0 - a));
}

/// Multiplies an error matrix by the tanh derivative in place.
///
/// The derivative is expressed through the squashed output `y`, so
/// `diff[i] *= 1 - y[i]^2`.
///
/// # Parameters
///
/// - `diff` - Back-propagated error to rescale in place
/// - `y` - Tanh outputs recorded during the forward pass, same shape as `diff`
pub fn tanh_diff_inplace<S, S2>(diff: &mut ArrayBase<S, Ix2>, y: &ArrayBase<S2, Ix2>)
where
    S: DataMut<Elem = f32>,
    S2: Data<Elem = f32>,
{
    Zip::from(diff).and(y).par_for_each(|d, &a| *d *= 1.0 - a * a);
}
