//! One-dimensional minimization.
//!
//! Every optimizer reduces its step to a 1-D problem: minimize
//! `criterion(t)`, typically the error at `base + t · direction`. The
//! criterion is any closure that captures whatever context it needs (the
//! network, the training set, the search direction) and returns
//! `Err(Cancelled)` when the caller's cancellation predicate fires.
//!
//! - [`bracket_minimum`] scans an interval for a three-point bracket
//!   `x1 < x2 < x3` with `y2 <= y1, y3`, extending or shrinking the
//!   interval when the minimum sits at an end.
//! - [`refine_minimum`] polishes a bracket with Brent's method
//!   (golden-section steps mixed with parabolic interpolation).
//!
//! Both stop early as soon as a value below `crit_limit` is seen.

use crate::error::Cancelled;

/// Golden ratio, used to extend a bracket outward.
const GOLDEN: f64 = 1.618_034;

/// Golden-section fraction used by Brent's method.
const CGOLD: f64 = 0.381_966_0;

/// Outward extensions tried when the minimum is at the high end.
const MAX_EXTENSIONS: usize = 30;

/// Halvings tried when the minimum is at the low end.
const MAX_SHRINKS: usize = 20;

/// Absolute floor of the Brent tolerance.
const ZEPS: f64 = 1e-10;

/// Three points bracketing a minimum.
///
/// `y2` is the smallest value. When no descent was found the bracket is
/// degenerate: `x2` coincides with an end and is the best point known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub x3: f64,
    pub y3: f64,
}

impl Bracket {
    fn point(x: f64, y: f64) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x,
            y2: y,
            x3: x,
            y3: y,
        }
    }

    /// Does the bracket fail to enclose an interior minimum?
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.x2 <= self.x1 || self.x2 >= self.x3
    }
}

/// Scans `[low, high]` at `n_points` points for a bracket of the minimum.
///
/// `log_space` spaces the points geometrically (requires `low > 0`,
/// otherwise the scan is linear). `y_at_low` saves one evaluation when
/// the value at `low` is already known.
pub fn bracket_minimum<F>(
    criterion: &mut F,
    low: f64,
    high: f64,
    n_points: usize,
    log_space: bool,
    crit_limit: f64,
    y_at_low: Option<f64>,
) -> Result<Bracket, Cancelled>
where
    F: FnMut(f64) -> Result<f64, Cancelled>,
{
    let n = n_points.max(3);
    let geometric = log_space && low > 0.0 && high > low;
    let rate = if geometric {
        (high / low).powf(1.0 / (n - 1) as f64)
    } else {
        1.0
    };
    let step = (high - low) / (n - 1) as f64;

    let y_low = match y_at_low {
        Some(y) => y,
        None => criterion(low)?,
    };
    if y_low < crit_limit {
        return Ok(Bracket::point(low, y_low));
    }

    // Scan, keeping the first minimum and its neighbours
    let mut xs = [low; 3];
    let mut ys = [y_low; 3];
    let mut best = 0usize;
    let (mut prev_x, mut prev_y) = (low, y_low);
    let mut x = low;

    for i in 1..n {
        x = if geometric { x * rate } else { low + step * i as f64 };
        let y = criterion(x)?;
        if y < crit_limit {
            return Ok(Bracket::point(x, y));
        }

        if i == best + 1 {
            xs[2] = x;
            ys[2] = y;
        }
        if y < ys[1] {
            best = i;
            xs = [prev_x, x, x];
            ys = [prev_y, y, y];
        }
        prev_x = x;
        prev_y = y;
    }

    let mut bracket = if best == 0 {
        shrink_toward_low(criterion, low, y_low, xs[2], ys[2], crit_limit)?
    } else if best == n - 1 {
        extend_high(criterion, xs[0], ys[0], xs[1], ys[1], crit_limit)?
    } else {
        Bracket {
            x1: xs[0],
            y1: ys[0],
            x2: xs[1],
            y2: ys[1],
            x3: xs[2],
            y3: ys[2],
        }
    };

    if !bracket.is_degenerate() && bracket.y2 >= crit_limit {
        bracket = tighten(criterion, bracket)?;
    }
    Ok(bracket)
}

/// Minimum at `high`: step outward by the golden ratio until the values
/// turn up.
fn extend_high<F>(
    criterion: &mut F,
    mut x1: f64,
    mut y1: f64,
    mut x2: f64,
    mut y2: f64,
    crit_limit: f64,
) -> Result<Bracket, Cancelled>
where
    F: FnMut(f64) -> Result<f64, Cancelled>,
{
    for _ in 0..MAX_EXTENSIONS {
        let x3 = x2 + GOLDEN * (x2 - x1);
        let y3 = criterion(x3)?;
        if y3 < crit_limit {
            return Ok(Bracket::point(x3, y3));
        }
        if y3 >= y2 {
            return Ok(Bracket {
                x1,
                y1,
                x2,
                y2,
                x3,
                y3,
            });
        }
        (x1, y1, x2, y2) = (x2, y2, x3, y3);
    }

    Ok(Bracket {
        x1,
        y1,
        x2,
        y2,
        x3: x2,
        y3: y2,
    })
}

/// Minimum at `low`: halve the first interval until something beats
/// `low`. Gives up with a degenerate bracket at `low`.
fn shrink_toward_low<F>(
    criterion: &mut F,
    low: f64,
    y_low: f64,
    mut x3: f64,
    mut y3: f64,
    crit_limit: f64,
) -> Result<Bracket, Cancelled>
where
    F: FnMut(f64) -> Result<f64, Cancelled>,
{
    for _ in 0..MAX_SHRINKS {
        let x2 = 0.5 * (low + x3);
        let y2 = criterion(x2)?;
        if y2 < crit_limit {
            return Ok(Bracket::point(x2, y2));
        }
        if y2 < y_low {
            return Ok(Bracket {
                x1: low,
                y1: y_low,
                x2,
                y2,
                x3,
                y3,
            });
        }
        x3 = x2;
        y3 = y2;
    }

    Ok(Bracket {
        x1: low,
        y1: y_low,
        x2: low,
        y2: y_low,
        x3,
        y3,
    })
}

/// Evaluates the parabola vertex through the bracket and keeps the
/// tighter of the two resulting brackets.
fn tighten<F>(criterion: &mut F, b: Bracket) -> Result<Bracket, Cancelled>
where
    F: FnMut(f64) -> Result<f64, Cancelled>,
{
    let d21 = b.x2 - b.x1;
    let d23 = b.x2 - b.x3;
    let num = d21 * d21 * (b.y2 - b.y3) - d23 * d23 * (b.y2 - b.y1);
    let den = d21 * (b.y2 - b.y3) - d23 * (b.y2 - b.y1);
    if den.abs() < f64::MIN_POSITIVE {
        return Ok(b);
    }

    let v = b.x2 - 0.5 * num / den;
    if !(v > b.x1 && v < b.x3) || v == b.x2 {
        return Ok(b);
    }

    let yv = criterion(v)?;
    let tightened = match (yv < b.y2, v < b.x2) {
        (true, true) => Bracket {
            x1: b.x1,
            y1: b.y1,
            x2: v,
            y2: yv,
            x3: b.x2,
            y3: b.y2,
        },
        (true, false) => Bracket {
            x1: b.x2,
            y1: b.y2,
            x2: v,
            y2: yv,
            x3: b.x3,
            y3: b.y3,
        },
        (false, true) => Bracket {
            x1: v,
            y1: yv,
            ..b
        },
        (false, false) => Bracket {
            x3: v,
            y3: yv,
            ..b
        },
    };
    Ok(tightened)
}

/// Brent's method inside a bracket.
///
/// Returns the best `(x, y)` found. A degenerate bracket is returned as
/// is, without evaluating anything.
pub fn refine_minimum<F>(
    criterion: &mut F,
    bracket: &Bracket,
    max_iter: usize,
    crit_limit: f64,
    tol: f64,
) -> Result<(f64, f64), Cancelled>
where
    F: FnMut(f64) -> Result<f64, Cancelled>,
{
    if bracket.is_degenerate() || bracket.y2 < crit_limit {
        return Ok((bracket.x2, bracket.y2));
    }

    let mut a = bracket.x1.min(bracket.x3);
    let mut b = bracket.x1.max(bracket.x3);
    let (mut x, mut w, mut v) = (bracket.x2, bracket.x2, bracket.x2);
    let (mut fx, mut fw, mut fv) = (bracket.y2, bracket.y2, bracket.y2);
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for _ in 0..max_iter {
        let xm = 0.5 * (a + b);
        let tol1 = tol * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }

        let mut golden = true;
        if e.abs() > tol1 {
            // Parabolic step through x, w, v
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_prev = e;
            e = d;
            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden = false;
            }
        }
        if golden {
            e = if x >= xm { a - x } else { b - x };
            d = CGOLD * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = criterion(u)?;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            (v, fv) = (w, fw);
            (w, fw) = (x, fx);
            (x, fx) = (u, fu);
            if fx < crit_limit {
                break;
            }
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                (v, fv) = (w, fw);
                (w, fw) = (u, fu);
            } else if fu <= fv || v == x || v == w {
                (v, fv) = (u, fu);
            }
        }
    }

    Ok((x, fx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(center: f64) -> impl FnMut(f64) -> Result<f64, Cancelled> {
        move |x| Ok((x - center) * (x - center) + 1.0)
    }

    #[test]
    fn test_interior_minimum() {
        let mut f = quadratic(0.3);
        let b = bracket_minimum(&mut f, 0.0, 1.0, 5, false, f64::NEG_INFINITY, None).unwrap();
        assert!(!b.is_degenerate());
        assert!(b.x1 < 0.3 && 0.3 < b.x3);
        assert!(b.y2 <= b.y1 && b.y2 <= b.y3);

        let (x, y) = refine_minimum(&mut f, &b, 100, f64::NEG_INFINITY, 1e-8).unwrap();
        assert!((x - 0.3).abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_minimum_beyond_high() {
        let mut f = quadratic(5.0);
        let b = bracket_minimum(&mut f, 0.0, 1.0, 4, false, f64::NEG_INFINITY, None).unwrap();
        assert!(b.x1 < 5.0 && 5.0 < b.x3);

        let (x, _) = refine_minimum(&mut f, &b, 100, f64::NEG_INFINITY, 1e-8).unwrap();
        assert!((x - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_minimum_near_low() {
        let mut f = quadratic(0.01);
        let b = bracket_minimum(&mut f, 0.0, 1.0, 4, false, f64::NEG_INFINITY, None).unwrap();
        assert!(!b.is_degenerate());
        let (x, _) = refine_minimum(&mut f, &b, 100, f64::NEG_INFINITY, 1e-8).unwrap();
        assert!((x - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_no_descent_is_degenerate() {
        let mut f = quadratic(-1.0);
        let b = bracket_minimum(&mut f, 0.0, 1.0, 4, false, f64::NEG_INFINITY, Some(2.0)).unwrap();
        assert!(b.is_degenerate());
        assert_eq!(b.x2, 0.0);
        assert_eq!(b.y2, 2.0);

        let mut calls = 0;
        let mut counting = |x: f64| {
            calls += 1;
            Ok(x)
        };
        let (x, _) = refine_minimum(&mut counting, &b, 100, f64::NEG_INFINITY, 1e-8).unwrap();
        assert_eq!(x, 0.0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_log_space_scan() {
        let mut f = |x: f64| Ok((x.ln() - 2.0f64.ln()).powi(2));
        let b = bracket_minimum(&mut f, 0.01, 100.0, 9, true, f64::NEG_INFINITY, None).unwrap();
        assert!(b.x1 < 2.0 && 2.0 < b.x3);
    }

    #[test]
    fn test_crit_limit_stops_early() {
        let mut calls = 0;
        let mut f = |x: f64| {
            calls += 1;
            Ok((x - 0.5) * (x - 0.5))
        };
        let b = bracket_minimum(&mut f, 0.0, 1.0, 11, false, 0.05, None).unwrap();
        assert!(b.y2 < 0.05);
        assert!(calls < 11);
    }

    #[test]
    fn test_cancellation_propagates() {
        let mut calls = 0;
        let mut f = |x: f64| {
            calls += 1;
            if calls > 3 {
                Err(Cancelled)
            } else {
                Ok(x * x)
            }
        };
        let result = bracket_minimum(&mut f, -1.0, 1.0, 10, false, f64::NEG_INFINITY, None);
        assert_eq!(result, Err(Cancelled));
    }
}
