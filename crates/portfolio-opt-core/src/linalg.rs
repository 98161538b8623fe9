//! Dense decimal linear algebra used by the estimator and the solvers.
//!
//! Matrices are row-major `Vec<Vec<Decimal>>`; sizes are tens of assets, so
//! plain O(n³) elimination is sufficient.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::PortfolioError;
use crate::PortfolioResult;

/// Relative pivot size below which a matrix is treated as singular.
const PIVOT_TOLERANCE: Decimal = dec!(0.0000000001);

/// Dot product.
pub(crate) fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Matrix-vector multiplication.
pub(crate) fn mat_vec_multiply(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Quadratic form `w' M w`.
pub(crate) fn quad_form(w: &[Decimal], mat: &[Vec<Decimal>]) -> Decimal {
    vec_dot(w, &mat_vec_multiply(mat, w))
}

/// Infinity norm.
pub(crate) fn norm_inf(v: &[Decimal]) -> Decimal {
    v.iter()
        .map(|x| x.abs())
        .fold(Decimal::ZERO, |a, b| if b > a { b } else { a })
}

/// Square root, zero for non-positive input.
pub(crate) fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    val.sqrt().unwrap_or(Decimal::ZERO)
}

fn max_abs_entry(mat: &[Vec<Decimal>]) -> Decimal {
    mat.iter()
        .map(|row| norm_inf(row))
        .fold(Decimal::ZERO, |a, b| if b > a { b } else { a })
}

/// Matrix inverse via Gauss-Jordan with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub(crate) fn mat_inverse(mat: &[Vec<Decimal>]) -> PortfolioResult<Vec<Vec<Decimal>>> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let threshold = PIVOT_TOLERANCE * max_abs_entry(mat).max(Decimal::ONE);

    let mut aug: Vec<Vec<Decimal>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { Decimal::ONE } else { Decimal::ZERO });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < threshold {
            return Err(PortfolioError::InvalidInput {
                field: "matrix".into(),
                reason: "singular matrix cannot be inverted".into(),
            });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor.is_zero() {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Solve `M x = b` by Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_linear(mat: &[Vec<Decimal>], rhs: &[Decimal]) -> PortfolioResult<Vec<Decimal>> {
    let n = mat.len();
    if rhs.len() != n {
        return Err(PortfolioError::DimensionMismatch {
            context: "linear system right-hand side".into(),
            expected: n,
            actual: rhs.len(),
        });
    }

    let threshold = PIVOT_TOLERANCE * max_abs_entry(mat).max(Decimal::ONE);
    let mut a: Vec<Vec<Decimal>> = mat.to_vec();
    let mut b: Vec<Decimal> = rhs.to_vec();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            let val = a[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if max_val < threshold {
            return Err(PortfolioError::InvalidInput {
                field: "linear system".into(),
                reason: "matrix is singular".into(),
            });
        }
        a.swap(col, max_row);
        b.swap(col, max_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor.is_zero() {
                continue;
            }
            for k in col..n {
                let v = a[col][k];
                a[row][k] -= factor * v;
            }
            let bv = b[col];
            b[row] -= factor * bv;
        }
    }

    let mut x = vec![Decimal::ZERO; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Ok(x)
}

/// Whether a symmetric matrix is numerically positive definite
/// (Cholesky succeeds with pivots above a relative tolerance).
#[allow(clippy::needless_range_loop)]
pub(crate) fn is_positive_definite(mat: &[Vec<Decimal>]) -> bool {
    let n = mat.len();
    let max_diag = (0..n)
        .map(|i| mat[i][i])
        .fold(Decimal::ZERO, |a, b| if b > a { b } else { a });
    if max_diag <= Decimal::ZERO {
        return false;
    }
    let threshold = PIVOT_TOLERANCE * max_diag;

    let mut l = vec![vec![Decimal::ZERO; n]; n];
    for j in 0..n {
        let mut d = mat[j][j];
        for k in 0..j {
            d -= l[j][k] * l[j][k];
        }
        if d <= threshold {
            return false;
        }
        let ljj = sqrt_decimal(d);
        l[j][j] = ljj;
        for i in (j + 1)..n {
            let mut s = mat[i][j];
            for k in 0..j {
                s -= l[i][k] * l[j][k];
            }
            l[i][j] = s / ljj;
        }
    }
    true
}

/// Largest entry of a slice.
pub(crate) fn max_of(v: &[Decimal]) -> Option<Decimal> {
    v.iter().copied().reduce(|a, b| if b > a { b } else { a })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() < dec!(0.000000001)
    }

    #[test]
    fn test_inverse_two_by_two() {
        let m = vec![vec![dec!(4), dec!(7)], vec![dec!(2), dec!(6)]];
        let inv = mat_inverse(&m).unwrap();
        assert!(approx(inv[0][0], dec!(0.6)));
        assert!(approx(inv[0][1], dec!(-0.7)));
        assert!(approx(inv[1][0], dec!(-0.2)));
        assert!(approx(inv[1][1], dec!(0.4)));
    }

    #[test]
    fn test_inverse_singular() {
        let m = vec![vec![dec!(1), dec!(2)], vec![dec!(2), dec!(4)]];
        assert!(mat_inverse(&m).is_err());
    }

    #[test]
    fn test_solve_linear_needs_pivoting() {
        let m = vec![vec![dec!(0), dec!(1)], vec![dec!(1), dec!(1)]];
        let x = solve_linear(&m, &[dec!(2), dec!(5)]).unwrap();
        assert!(approx(x[0], dec!(3)));
        assert!(approx(x[1], dec!(2)));
    }

    #[test]
    fn test_positive_definite_detection() {
        let pd = vec![vec![dec!(0.04), dec!(0.01)], vec![dec!(0.01), dec!(0.02)]];
        let singular = vec![vec![dec!(0.04), dec!(0.04)], vec![dec!(0.04), dec!(0.04)]];
        assert!(is_positive_definite(&pd));
        assert!(!is_positive_definite(&singular));
    }

    #[test]
    fn test_sqrt_of_negative_is_zero() {
        assert_eq!(sqrt_decimal(dec!(-1)), Decimal::ZERO);
        assert!(approx(sqrt_decimal(dec!(0.04)), dec!(0.2)));
    }
}
