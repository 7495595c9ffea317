//! 2D affine least-squares fitting for the planarity test.
//!
//! A flat print or screen moved in front of the camera maps its landmarks
//! between frames by (close to) a single affine transform. A real head
//! rotating in depth does not. The fit residual is therefore the planarity
//! signal.

use crate::types::Point;

/// Minimum paired points required to produce a finite residual.
pub const MIN_AFFINE_POINTS: usize = 8;

/// Pivot magnitude below which the normal equations are treated as singular.
const SINGULAR_EPS: f64 = 1e-9;

/// Fit `dst ≈ A · src + t` with the six parameters `[a, b, tx, c, d, ty]`:
///
/// ```text
/// | a  b  tx |
/// | c  d  ty |
/// ```
///
/// Points are paired by index up to the shorter slice. Returns `None` with
/// fewer than [`MIN_AFFINE_POINTS`] pairs or a singular system.
pub fn fit_affine(src: &[Point], dst: &[Point]) -> Option<[f64; 6]> {
    let n = src.len().min(dst.len());
    if n < MIN_AFFINE_POINTS {
        return None;
    }

    // Each pair contributes two rows of the design matrix:
    //   [sx, sy, 1, 0, 0, 0] · p = dx
    //   [0, 0, 0, sx, sy, 1] · p = dy
    let mut ata = [[0.0f64; 6]; 6];
    let mut atb = [0.0f64; 6];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()).take(n) {
        let (sx, sy, dx, dy) = (sx as f64, sy as f64, dx as f64, dy as f64);
        let r1 = [sx, sy, 1.0, 0.0, 0.0, 0.0];
        let r2 = [0.0, 0.0, 0.0, sx, sy, 1.0];

        for j in 0..6 {
            for k in 0..6 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    solve_6x6(ata, atb)
}

/// Root-mean-square residual of the best affine fit, in pixels.
///
/// Returns `f64::INFINITY` when no fit is possible, so callers comparing
/// against a threshold see "not planar".
pub fn affine_rmse(src: &[Point], dst: &[Point]) -> f64 {
    let Some(p) = fit_affine(src, dst) else {
        return f64::INFINITY;
    };

    let n = src.len().min(dst.len());
    let mut sum_sq = 0.0f64;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()).take(n) {
        let (sx, sy) = (sx as f64, sy as f64);
        let px = p[0] * sx + p[1] * sy + p[2];
        let py = p[3] * sx + p[4] * sy + p[5];
        let ex = px - dx as f64;
        let ey = py - dy as f64;
        sum_sq += ex * ex + ey * ey;
    }

    let rmse = (sum_sq / n as f64).sqrt();
    if rmse.is_finite() {
        rmse
    } else {
        f64::INFINITY
    }
}

/// Solve a 6×6 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_6x6(a: [[f64; 6]; 6], b: [f64; 6]) -> Option<[f64; 6]> {
    let mut m = [[0.0f64; 7]; 6];
    for i in 0..6 {
        m[i][..6].copy_from_slice(&a[i]);
        m[i][6] = b[i];
    }

    for col in 0..6 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..6 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        if max_val < SINGULAR_EPS {
            return None;
        }
        m.swap(col, max_row);

        for row in (col + 1)..6 {
            let factor = m[row][col] / m[col][col];
            for k in col..7 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0f64; 6];
    for i in (0..6).rev() {
        let mut sum = m[i][6];
        for j in (i + 1)..6 {
            sum -= m[i][j] * x[j];
        }
        x[i] = sum / m[i][i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
