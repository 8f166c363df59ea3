//! Reduction of a decomposed voxel to its output values

use crate::svd::SvdResult;

/// Write the top `rdim` components of `svd` for one voxel.
///
/// `components` holds `rdim` series of `nvals` values back to back; series r
/// is `sigma_r * v_r`. `singular`, when given, receives `sigma_1..sigma_rdim`.
/// Components past min(K, T) are written as zero.
pub fn write_voxel(
    svd: &SvdResult,
    rdim: usize,
    nvals: usize,
    components: &mut [f32],
    singular: Option<&mut [f32]>,
) {
    debug_assert_eq!(components.len(), rdim * nvals);
    let m = svd.rank();

    for (r, series) in components.chunks_exact_mut(nvals).enumerate() {
        if r < m {
            for (out, value) in series.iter_mut().zip(svd.scaled_component(r)) {
                *out = value as f32;
            }
        } else {
            series.fill(0.0);
        }
    }

    if let Some(singular) = singular {
        debug_assert_eq!(singular.len(), rdim);
        for (r, out) in singular.iter_mut().enumerate() {
            *out = if r < m {
                svd.singular_values[r] as f32
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svd::decompose;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_full_rank_reconstructs_rows() {
        let m = DMatrix::from_row_slice(2, 4, &[1.0, -2.0, 0.5, 0.5, 3.0, 1.0, -1.0, -3.0]);
        let svd = decompose(m.clone()).unwrap();

        let mut comps = vec![0.0f32; 2 * 4];
        write_voxel(&svd, 2, 4, &mut comps, None);

        // row_i = sum_r u_ir * (sigma_r v_r)
        for i in 0..2 {
            for t in 0..4 {
                let rebuilt: f64 = (0..2)
                    .map(|r| svd.u[(i, r)] * f64::from(comps[r * 4 + t]))
                    .sum();
                assert_abs_diff_eq!(rebuilt, m[(i, t)], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_singular_values_written() {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 1.0]);
        let svd = decompose(m).unwrap();

        let mut comps = vec![0.0f32; 2 * 3];
        let mut sing = vec![0.0f32; 2];
        write_voxel(&svd, 2, 3, &mut comps, Some(&mut sing));
        assert_abs_diff_eq!(sing[0], 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sing[1], 2.0, epsilon = 1e-6);
        // first component is the 5 on the middle sample
        assert_abs_diff_eq!(comps[1].abs(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_components_beyond_rank_are_zero() {
        // K=3, T=2: only two components exist
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 7.0]);
        let svd = decompose(m).unwrap();
        assert_eq!(svd.rank(), 2);

        let mut comps = vec![9.0f32; 3 * 2];
        let mut sing = vec![9.0f32; 3];
        write_voxel(&svd, 3, 2, &mut comps, Some(&mut sing));
        assert_eq!(&comps[4..], &[0.0, 0.0]);
        assert_eq!(sing[2], 0.0);
        assert!(sing[0] >= sing[1]);
    }
}
