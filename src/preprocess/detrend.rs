//! Polynomial detrending
//!
//! A least-squares polynomial fit over T equally spaced samples only depends
//! on T, so the fit is precomputed as an orthonormal basis of the
//! polynomials of degree 0..=order. Removing the trend is then a projection:
//!
//! x <- x - sum_j (q_j . x) q_j
//!
//! Order 0 is plain mean removal.

/// Orthonormal polynomial basis over `nvals` samples.
#[derive(Clone, Debug)]
pub struct PolyBasis {
    nvals: usize,
    order: usize,
    /// `order + 1` rows of length `nvals`
    rows: Vec<f64>,
}

impl PolyBasis {
    /// Basis for polynomials up to `order`. Needs `nvals > order`.
    pub fn new(order: usize, nvals: usize) -> Self {
        debug_assert!(nvals > order, "need more samples than polynomial terms");
        let nterms = order + 1;
        let mut rows = vec![0.0; nterms * nvals];

        // Legendre polynomials on [-1, 1] are already close to orthogonal,
        // which keeps Gram-Schmidt well conditioned for high orders.
        let scale = if nvals > 1 { 2.0 / (nvals - 1) as f64 } else { 0.0 };
        for t in 0..nvals {
            let x = t as f64 * scale - 1.0;
            let mut p_prev = 1.0;
            let mut p = x;
            rows[t] = 1.0;
            if nterms > 1 {
                rows[nvals + t] = x;
            }
            for n in 1..order {
                let nf = n as f64;
                let p_next = ((2.0 * nf + 1.0) * x * p - nf * p_prev) / (nf + 1.0);
                rows[(n + 1) * nvals + t] = p_next;
                p_prev = p;
                p = p_next;
            }
        }

        // Modified Gram-Schmidt, two passes
        for _ in 0..2 {
            for j in 0..nterms {
                let (done, rest) = rows.split_at_mut(j * nvals);
                let row = &mut rest[..nvals];
                for i in 0..j {
                    let q = &done[i * nvals..(i + 1) * nvals];
                    let c = dot(q, row);
                    for (r, &qv) in row.iter_mut().zip(q) {
                        *r -= c * qv;
                    }
                }
                let norm = dot(row, row).sqrt();
                if norm > 0.0 {
                    for r in row.iter_mut() {
                        *r /= norm;
                    }
                }
            }
        }

        Self { nvals, order, rows }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn nvals(&self) -> usize {
        self.nvals
    }

    /// Subtract the least-squares polynomial trend from `series` in place.
    pub fn remove(&self, series: &mut [f64]) {
        debug_assert_eq!(series.len(), self.nvals);
        for q in self.rows.chunks_exact(self.nvals) {
            let c = dot(q, series);
            for (s, &qv) in series.iter_mut().zip(q) {
                *s -= c * qv;
            }
        }
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
