//! Spatial smoothing of a numeric variable over spot positions.

use anyhow::{ensure, Result};
use ndarray::{Array1, Array2};

/// Replaces every value by a smoothed estimate from its spatial neighborhood.
pub trait Smoother {
    /// Smooth `values` observed at (`x`, `y`). `span` is the neighborhood
    /// size as a fraction of the spots. Returns one value per spot.
    fn smooth(&self, x: &[f64], y: &[f64], values: &[f64], span: f64) -> Result<Vec<f64>>;
}

/// Degree of the local polynomial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Degree {
    /// Plane fit.
    Linear,
    /// Second order surface.
    #[default]
    Quadratic,
}

impl Degree {
    /// Number of terms of the polynomial in two variables.
    fn terms(self) -> usize {
        match self {
            Degree::Linear => 3,
            Degree::Quadratic => 6,
        }
    }

    /// This degree followed by the lower ones to try when a fit is not determined.
    fn fallbacks(self) -> &'static [Degree] {
        match self {
            Degree::Linear => &[Degree::Linear],
            Degree::Quadratic => &[Degree::Quadratic, Degree::Linear],
        }
    }
}

/// Local regression in the plane (LOESS).
///
/// Each spot is fitted by weighted least squares over its `ceil(span * n)`
/// nearest spots with tricube weights. When the local system is singular or
/// has fewer weighted points than terms the next lower degree is tried, down
/// to a weighted mean. Spots with a NaN value still receive a fitted value but
/// never act as neighbors. Spots without a finite position keep their value.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoessSmoother {
    /// Highest degree to fit.
    pub degree: Degree,
}

/// A neighbor centered on the fitted spot: (dx, dy, value, weight).
type Point = (f64, f64, f64, f64);

fn tricube(u: f64) -> f64 {
    if u >= 1.0 {
        0.0
    } else {
        (1.0 - u.powi(3)).powi(3)
    }
}

fn basis(degree: Degree, dx: f64, dy: f64) -> Vec<f64> {
    match degree {
        Degree::Linear => vec![1.0, dx, dy],
        Degree::Quadratic => vec![1.0, dx, dy, dx * dx, dx * dy, dy * dy],
    }
}

/// Gaussian elimination with partial pivoting. `None` if `a` is singular.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    for col in 0..n {
        let pivot =
            (col..n).max_by(|&r, &s| a[[r, col]].abs().total_cmp(&a[[s, col]].abs()))?;
        if a[[pivot, col]].abs() <= 1e-10 * scale {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut solution = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * solution[k]).sum();
        solution[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(solution)
}

/// Value of the weighted least squares polynomial at the origin.
fn local_fit(points: &[Point], degree: Degree) -> Option<f64> {
    let p = degree.terms();
    if points.iter().filter(|pt| pt.3 > 0.0).count() < p {
        return None;
    }
    let mut a = Array2::<f64>::zeros((p, p));
    let mut b = Array1::<f64>::zeros(p);
    for &(dx, dy, value, w) in points {
        let terms = basis(degree, dx, dy);
        for (i, ti) in terms.iter().enumerate() {
            b[i] += w * ti * value;
            for (j, tj) in terms.iter().enumerate() {
                a[[i, j]] += w * ti * tj;
            }
        }
    }
    solve(a, b).map(|beta| beta[0])
}

fn weighted_mean(points: &[Point]) -> f64 {
    let total: f64 = points.iter().map(|pt| pt.3).sum();
    if total > 0.0 {
        points.iter().map(|pt| pt.3 * pt.2).sum::<f64>() / total
    } else {
        points.iter().map(|pt| pt.2).sum::<f64>() / points.len() as f64
    }
}

impl LoessSmoother {
    fn fit_at(
        &self,
        neighbors: &[(f64, usize)],
        (x0, y0): (f64, f64),
        (x, y, values): (&[f64], &[f64], &[f64]),
    ) -> f64 {
        let max_dist = neighbors.iter().map(|n| n.0).fold(0.0, f64::max);
        let scale = if max_dist > 0.0 { max_dist } else { 1.0 };
        let points: Vec<Point> = neighbors
            .iter()
            .map(|&(dist, j)| {
                let w = if max_dist > 0.0 {
                    tricube(dist / max_dist)
                } else {
                    1.0
                };
                ((x[j] - x0) / scale, (y[j] - y0) / scale, values[j], w)
            })
            .collect();
        self.degree
            .fallbacks()
            .iter()
            .find_map(|&degree| local_fit(&points, degree))
            .unwrap_or_else(|| weighted_mean(&points))
    }
}

impl Smoother for LoessSmoother {
    fn smooth(&self, x: &[f64], y: &[f64], values: &[f64], span: f64) -> Result<Vec<f64>> {
        ensure!(
            x.len() == values.len() && y.len() == values.len(),
            "{} values for {} x and {} y positions",
            values.len(),
            x.len(),
            y.len()
        );
        ensure!(span.is_finite() && span > 0.0, "span must be positive, got {span}");

        let placed = |i: usize| x[i].is_finite() && y[i].is_finite();
        let known: Vec<usize> = (0..values.len())
            .filter(|&i| placed(i) && values[i].is_finite())
            .collect();
        if known.is_empty() {
            return Ok(values.to_vec());
        }
        let q = ((span * known.len() as f64).ceil() as usize).clamp(1, known.len());

        let mut neighbors: Vec<(f64, usize)> = Vec::with_capacity(known.len());
        Ok((0..values.len())
            .map(|i| {
                if !placed(i) {
                    return values[i];
                }
                neighbors.clear();
                neighbors.extend(known.iter().map(|&j| ((x[j] - x[i]).hypot(y[j] - y[i]), j)));
                if q < neighbors.len() {
                    neighbors.select_nth_unstable_by(q - 1, |a, b| a.0.total_cmp(&b.0));
                    neighbors.truncate(q);
                }
                self.fit_at(&neighbors, (x[i], y[i]), (x, y, values))
            })
            .collect())
    }
}
