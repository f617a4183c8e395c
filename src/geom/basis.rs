//! B-spline basis kernels shared by evaluation and projection.

pub(crate) fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

/// Knot span index containing `u` for `n + 1` control points of degree `p`.
pub(crate) fn find_span(n: usize, p: usize, u: f64, knots: &[f64]) -> usize {
    if u >= knots[n + 1] {
        return n;
    }
    if u <= knots[p] {
        return p;
    }

    let mut low = p;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while u < knots[mid] || u >= knots[mid + 1] {
        if u < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Non-zero basis values `N[span-p..=span, p](u)`.
pub(crate) fn basis_functions(span: usize, u: f64, p: usize, knots: &[f64]) -> Vec<f64> {
    let mut values = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    values[0] = 1.0;

    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { values[r] / denom };
            values[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        values[j] = saved;
    }
    values
}

/// Basis values and their first derivatives over the same span.
pub(crate) fn basis_with_derivatives(
    span: usize,
    u: f64,
    p: usize,
    knots: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let values = basis_functions(span, u, p, knots);
    if p == 0 {
        return (values, vec![0.0]);
    }

    // degree p-1 basis on the same span covers N[span-p+1..=span, p-1]
    let lower = basis_functions(span, u, p - 1, knots);
    let degree = p as f64;
    let mut derivatives = vec![0.0; p + 1];
    for (j, slot) in derivatives.iter_mut().enumerate() {
        let i = span - p + j;
        let mut value = 0.0;
        if j >= 1 {
            let denom = knots[i + p] - knots[i];
            if denom != 0.0 {
                value += degree * lower[j - 1] / denom;
            }
        }
        if j < p {
            let denom = knots[i + p + 1] - knots[i + 1];
            if denom != 0.0 {
                value -= degree * lower[j] / denom;
            }
        }
        *slot = value;
    }
    (values, derivatives)
}

/// Clamped knot vector with uniformly spaced interior knots on `[0, 1]`.
pub(crate) fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let interior = count.saturating_sub(degree + 1);
    let segments = (interior + 1) as f64;
    let mut knots = Vec::with_capacity(count + degree + 1);
    knots.extend(std::iter::repeat_n(0.0, degree + 1));
    knots.extend((1..=interior).map(|i| i as f64 / segments));
    knots.extend(std::iter::repeat_n(1.0, degree + 1));
    knots
}
