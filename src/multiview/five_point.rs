//! Minimal relative pose solver: essential matrices from 5 bearing correspondences.
//!
//! The four dimensional nullspace of the epipolar constraints is parametrized as
//! `E = x E1 + y E2 + z E3 + E4`. The rank and trace constraints give 10 cubic equations in
//! `(x, y, z)`; after Gauss-Jordan elimination of the cubic monomials, multiplication by `x`
//! acts linearly on the remaining 10 monomials and the real eigenvectors of that action
//! matrix are the solutions.

use nalgebra as na;

/// Exponents of the monomials, cubic ones first then the quotient basis
/// `[x², xy, y², xz, yz, z², x, y, z, 1]`.
const MONOMIALS: [(u8, u8, u8); 20] = [
    (3, 0, 0),
    (2, 1, 0),
    (1, 2, 0),
    (0, 3, 0),
    (2, 0, 1),
    (1, 1, 1),
    (0, 2, 1),
    (1, 0, 2),
    (0, 1, 2),
    (0, 0, 3),
    (2, 0, 0),
    (1, 1, 0),
    (0, 2, 0),
    (1, 0, 1),
    (0, 1, 1),
    (0, 0, 2),
    (1, 0, 0),
    (0, 1, 0),
    (0, 0, 1),
    (0, 0, 0),
];

fn monomial_index(e: (u8, u8, u8)) -> Option<usize> {
    MONOMIALS.iter().position(|m| *m == e)
}

/// Polynomial of total degree at most 3 in `(x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Poly([f64; 20]);

impl Poly {
    fn zero() -> Poly {
        Poly([0.0; 20])
    }
    /// `a x + b y + c z + d`
    fn linear(a: f64, b: f64, c: f64, d: f64) -> Poly {
        let mut p = Poly::zero();
        p.0[16] = a;
        p.0[17] = b;
        p.0[18] = c;
        p.0[19] = d;
        p
    }
    fn add(&self, other: &Poly) -> Poly {
        let mut out = *self;
        out.0.iter_mut().zip(other.0).for_each(|(a, b)| *a += b);
        out
    }
    fn sub(&self, other: &Poly) -> Poly {
        self.add(&other.scale(-1.0))
    }
    fn scale(&self, s: f64) -> Poly {
        let mut out = *self;
        out.0.iter_mut().for_each(|a| *a *= s);
        out
    }
    /// Product truncated to degree 3; callers never produce higher terms.
    fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::zero();
        for (i, a) in self.0.iter().enumerate() {
            if *a == 0.0 {
                continue;
            }
            for (j, b) in other.0.iter().enumerate() {
                if *b == 0.0 {
                    continue;
                }
                let (ea, eb) = (MONOMIALS[i], MONOMIALS[j]);
                let e = (ea.0 + eb.0, ea.1 + eb.1, ea.2 + eb.2);
                if let Some(k) = monomial_index(e) {
                    out.0[k] += a * b;
                } else {
                    debug_assert!(false, "degree overflow");
                }
            }
        }
        out
    }
}

/// `b2ᵀ E b1 = 0` as a row acting on row-major `E`.
fn epipolar_row(b1: &na::Vector3<f64>, b2: &na::Vector3<f64>) -> [f64; 9] {
    let mut row = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            row[3 * r + c] = b2[r] * b1[c];
        }
    }
    row
}

/// Four vectors spanning the nullspace of the epipolar system, as row-major 3x3 matrices.
fn nullspace_basis(b1: &[na::Vector3<f64>], b2: &[na::Vector3<f64>]) -> Option<[na::Matrix3<f64>; 4]> {
    let rows = b1.len().max(9);
    let mut a = na::DMatrix::<f64>::zeros(rows, 9);
    for (r, (p1, p2)) in b1.iter().zip(b2).enumerate() {
        for (c, v) in epipolar_row(p1, p2).into_iter().enumerate() {
            a[(r, c)] = v;
        }
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    // singular values may not come sorted; take the 4 smallest
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|i, j| svd.singular_values[*i].total_cmp(&svd.singular_values[*j]));
    let basis = |k: usize| {
        let row = v_t.row(order[k]);
        na::Matrix3::from_row_slice(&row.iter().copied().collect::<Vec<_>>())
    };
    // the best fitting vector carries the affine term so that an exact fit has finite x, y, z
    Some([basis(1), basis(2), basis(3), basis(0)])
}

/// The 10x20 coefficient matrix of the rank and trace constraints.
fn constraint_matrix(basis: &[na::Matrix3<f64>; 4]) -> na::SMatrix<f64, 10, 20> {
    let [e1, e2, e3, e4] = basis;
    let e: [[Poly; 3]; 3] = std::array::from_fn(|r| {
        std::array::from_fn(|c| Poly::linear(e1[(r, c)], e2[(r, c)], e3[(r, c)], e4[(r, c)]))
    });

    let mut rows = Vec::with_capacity(10);
    let det = e[0][0]
        .mul(&e[1][1].mul(&e[2][2]).sub(&e[1][2].mul(&e[2][1])))
        .sub(&e[0][1].mul(&e[1][0].mul(&e[2][2]).sub(&e[1][2].mul(&e[2][0]))))
        .add(&e[0][2].mul(&e[1][0].mul(&e[2][1]).sub(&e[1][1].mul(&e[2][0]))));
    rows.push(det);

    let eet: [[Poly; 3]; 3] = std::array::from_fn(|i| {
        std::array::from_fn(|k| {
            (0..3).fold(Poly::zero(), |acc, j| acc.add(&e[i][j].mul(&e[k][j])))
        })
    });
    let trace = eet[0][0].add(&eet[1][1]).add(&eet[2][2]);
    for i in 0..3 {
        for l in 0..3 {
            let eete = (0..3).fold(Poly::zero(), |acc, k| acc.add(&eet[i][k].mul(&e[k][l])));
            rows.push(eete.scale(2.0).sub(&trace.mul(&e[i][l])));
        }
    }

    let mut m = na::SMatrix::<f64, 10, 20>::zeros();
    for (r, p) in rows.iter().enumerate() {
        for (c, v) in p.0.iter().enumerate() {
            m[(r, c)] = *v;
        }
    }
    m
}

/// Multiplication by `x` on the quotient basis, given the reduced system `[I | B]`.
fn action_matrix(b: &na::SMatrix<f64, 10, 10>) -> na::SMatrix<f64, 10, 10> {
    let mut a = na::SMatrix::<f64, 10, 10>::zeros();
    // x·[x², xy, y², xz, yz, z²] are the cubics x³, x²y, xy², x²z, xyz, xz²
    for (row, cubic) in [0usize, 1, 2, 4, 5, 7].into_iter().enumerate() {
        a.set_row(row, &(-b.row(cubic)));
    }
    // x·[x, y, z, 1] stay inside the basis
    for (row, col) in [(6usize, 0usize), (7, 1), (8, 3), (9, 6)] {
        a[(row, col)] = 1.0;
    }
    a
}

/// Essential matrices (unit Frobenius norm) consistent with at least 5 bearing pairs.
pub fn essential_five_point(b1: &[na::Vector3<f64>], b2: &[na::Vector3<f64>]) -> Vec<na::Matrix3<f64>> {
    if b1.len() < 5 || b1.len() != b2.len() {
        return Vec::new();
    }
    let Some(basis) = nullspace_basis(b1, b2) else {
        return Vec::new();
    };
    let m = constraint_matrix(&basis);
    let m1: na::SMatrix<f64, 10, 10> = m.fixed_view::<10, 10>(0, 0).into_owned();
    let m2: na::SMatrix<f64, 10, 10> = m.fixed_view::<10, 10>(0, 10).into_owned();
    let Some(b) = m1.lu().solve(&m2) else {
        return Vec::new();
    };
    let a = action_matrix(&b);
    let Some(schur) = na::Schur::try_new(a, f64::EPSILON, 1000) else {
        return Vec::new();
    };

    let mut solutions = Vec::new();
    for lambda in schur.complex_eigenvalues().iter() {
        if lambda.im.abs() > 1e-8 * (1.0 + lambda.re.abs()) {
            continue;
        }
        let shifted = a - na::SMatrix::<f64, 10, 10>::identity() * lambda.re;
        let svd = shifted.svd(false, true);
        let Some(v_t) = svd.v_t else {
            continue;
        };
        let (min_idx, _) = svd.singular_values.argmin();
        let v = v_t.row(min_idx);
        if v[9].abs() < 1e-12 {
            continue;
        }
        let (x, y, z) = (v[6] / v[9], v[7] / v[9], v[8] / v[9]);
        let e = basis[0] * x + basis[1] * y + basis[2] * z + basis[3];
        let norm = e.norm();
        if norm > 0.0 && norm.is_finite() {
            solutions.push(e / norm);
        }
    }
    solutions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poly_product_matches_expansion() {
        // (x + 2)(y - 1) = xy - x + 2y - 2
        let p = Poly::linear(1.0, 0.0, 0.0, 2.0).mul(&Poly::linear(0.0, 1.0, 0.0, -1.0));
        let mut expected = Poly::zero();
        expected.0[11] = 1.0;
        expected.0[16] = -1.0;
        expected.0[17] = 2.0;
        expected.0[19] = -2.0;
        assert_eq!(p, expected);
    }

    #[test]
    fn cubic_lands_in_cubic_block() {
        let x = Poly::linear(1.0, 0.0, 0.0, 0.0);
        let z = Poly::linear(0.0, 0.0, 1.0, 0.0);
        let p = x.mul(&x).mul(&z);
        assert_eq!(p.0[4], 1.0);
        assert_eq!(p.0.iter().filter(|c| **c != 0.0).count(), 1);
    }
}
