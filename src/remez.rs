use crate::error::FilterDesignError;
use std::f64::consts::{PI, TAU};

/// A linear-phase FIR design request: band edges in Hz over [0, Nyquist],
/// one desired gain per band, interpreted against `sample_rate`.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub taps: usize,
    pub edges: Vec<f64>,
    pub gains: Vec<f64>,
    pub sample_rate: f64,
}

/// points per cosine basis function on the dense grid
const GRID_DENSITY: usize = 16;
const MAX_ITERATIONS: usize = 25;

struct GridPoint {
    /// normalized frequency, cycles per sample in [0, 0.5]
    f: f64,
    des: f64,
    weight: f64,
}

/// Design the channel low-pass the pipeline uses: passband [0, bandwidth],
/// transition up to bandwidth + (Nyquist - bandwidth) / 4, stopband to
/// Nyquist. The transition midpoint formula is empirically tuned; downstream
/// numbers depend on it, so it is kept as-is.
pub fn lowpass(taps: usize, bandwidth: f64, sample_rate: f64) -> Result<Vec<f64>, FilterDesignError> {
    let nyquist = sample_rate / 2.0;
    let transition = bandwidth + (nyquist - bandwidth) / 4.0;
    design(&FilterSpec {
        taps,
        edges: vec![0.0, bandwidth, transition, nyquist],
        gains: vec![1.0, 0.0],
        sample_rate,
    })
}

/// Equiripple (minimax) FIR design by Remez exchange.
///
/// Returns exactly `spec.taps` coefficients, symmetric about the centre.
/// Non-convergence and malformed band structures are design errors; there is
/// no recovery short of changing the specification.
pub fn design(spec: &FilterSpec) -> Result<Vec<f64>, FilterDesignError> {
    let nyquist = spec.sample_rate / 2.0;
    let bands = validate(spec, nyquist)?;

    let odd = spec.taps % 2 == 1;
    let nfcns = if odd { (spec.taps + 1) / 2 } else { spec.taps / 2 };
    if nfcns < bands + 1 {
        return Err(FilterDesignError::TooFewTaps {
            taps: spec.taps,
            bands,
        });
    }

    let grid = build_grid(spec, nfcns, odd);
    if grid.len() < nfcns + 1 {
        return Err(FilterDesignError::TooFewTaps {
            taps: spec.taps,
            bands,
        });
    }

    // initial extremal guess: evenly spread over the grid
    let mut ext: Vec<usize> = (0..=nfcns)
        .map(|j| j * (grid.len() - 1) / nfcns)
        .collect();

    let mut solution = None;
    for _ in 0..MAX_ITERATIONS {
        let x: Vec<f64> = ext.iter().map(|&i| (TAU * grid[i].f).cos()).collect();
        let d = barycentric_weights(&x);

        // the common ripple height over this extremal set
        let mut num = 0.0;
        let mut den = 0.0;
        for (k, &i) in ext.iter().enumerate() {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            num += d[k] * grid[i].des;
            den += sign * d[k] / grid[i].weight;
        }
        let delta = num / den;

        let c: Vec<f64> = ext
            .iter()
            .enumerate()
            .map(|(k, &i)| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                grid[i].des - sign * delta / grid[i].weight
            })
            .collect();

        let err: Vec<f64> = grid
            .iter()
            .map(|g| g.weight * (g.des - interpolate(g.f, &x, &d, &c)))
            .collect();

        let next = pick_extremals(&err, nfcns + 1);
        if next.len() < nfcns + 1 {
            break;
        }

        let emax = err.iter().fold(0.0f64, |m, e| m.max(e.abs()));
        if next == ext || (emax - delta.abs()) <= 1e-6 * emax {
            solution = Some((x, d, c));
            break;
        }
        ext = next;
    }

    let (x, d, c) = solution.ok_or(FilterDesignError::NoConvergence {
        iterations: MAX_ITERATIONS,
    })?;

    Ok(taps_from_solution(spec.taps, nfcns, odd, &x, &d, &c))
}

fn validate(spec: &FilterSpec, nyquist: f64) -> Result<usize, FilterDesignError> {
    let edges = &spec.edges;
    if edges.len() < 2
        || edges.len() % 2 != 0
        || edges.windows(2).any(|w| w[0] >= w[1])
        || edges[0] < 0.0
        || *edges.last().expect("non-empty") > nyquist
    {
        return Err(FilterDesignError::InvalidBands { nyquist });
    }

    let bands = edges.len() / 2;
    if spec.gains.len() != bands {
        return Err(FilterDesignError::GainMismatch {
            bands,
            gains: spec.gains.len(),
        });
    }
    Ok(bands)
}

fn build_grid(spec: &FilterSpec, nfcns: usize, odd: bool) -> Vec<GridPoint> {
    let delf = 0.5 / (GRID_DENSITY * nfcns) as f64;
    let mut grid = Vec::new();

    for (band, &gain) in spec.edges.chunks(2).zip(&spec.gains) {
        let lo = band[0] / spec.sample_rate;
        let hi = band[1] / spec.sample_rate;
        let steps = (((hi - lo) / delf).round() as usize).max(1);
        for j in 0..=steps {
            let f = lo + (hi - lo) * j as f64 / steps as f64;
            grid.push(GridPoint {
                f,
                des: gain,
                weight: 1.0,
            });
        }
    }

    if !odd {
        // an even-length symmetric filter is forced to zero at Nyquist, so
        // the response factors as cos(pi f) * P(f); approximate P on a grid
        // that stays clear of the cos zero
        grid.retain(|g| g.f < 0.5 - delf / 2.0);
        for g in &mut grid {
            let scale = (PI * g.f).cos();
            g.des /= scale;
            g.weight *= scale;
        }
    }

    grid
}

/// 1 / prod_k 2(x_i - x_k), accumulated in strides so mid-sized extremal
/// sets neither overflow nor underflow
fn barycentric_weights(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let stride = (n.saturating_sub(2)) / 15 + 1;
    (0..n)
        .map(|i| {
            let mut d = 1.0;
            for start in 0..stride {
                let mut prod = 1.0;
                let mut k = start;
                while k < n {
                    if k != i {
                        prod *= 2.0 * (x[i] - x[k]);
                    }
                    k += stride;
                }
                d *= prod;
            }
            1.0 / d
        })
        .collect()
}

fn interpolate(f: f64, x: &[f64], d: &[f64], c: &[f64]) -> f64 {
    let xt = (TAU * f).cos();
    let mut num = 0.0;
    let mut den = 0.0;
    for k in 0..x.len() {
        let diff = xt - x[k];
        if diff.abs() < 1e-12 {
            return c[k];
        }
        let t = d[k] / diff;
        num += t * c[k];
        den += t;
    }
    num / den
}

/// local maxima of |err|, reduced to `want` points of alternating sign
fn pick_extremals(err: &[f64], want: usize) -> Vec<usize> {
    let n = err.len();
    let mut picked: Vec<usize> = Vec::new();

    for i in 0..n {
        let e = err[i].abs();
        if e == 0.0 {
            continue;
        }
        let rises = i == 0 || e >= err[i - 1].abs();
        let falls = i + 1 == n || e > err[i + 1].abs();
        if !(rises && falls) {
            continue;
        }

        match picked.last() {
            Some(&p) if (err[i] > 0.0) == (err[p] > 0.0) => {
                if e > err[p].abs() {
                    *picked.last_mut().expect("non-empty") = i;
                }
            }
            _ => picked.push(i),
        }
    }

    while picked.len() > want {
        if err[picked[0]].abs() < err[*picked.last().expect("non-empty")].abs() {
            picked.remove(0);
        } else {
            picked.pop();
        }
    }
    picked
}

/// Recover the impulse response from the converged interpolant: sample the
/// cosine polynomial, invert the DCT, then unfold the half-filter.
fn taps_from_solution(
    taps: usize,
    nfcns: usize,
    odd: bool,
    x: &[f64],
    d: &[f64],
    c: &[f64],
) -> Vec<f64> {
    let m = nfcns - 1;
    let a = if m == 0 {
        vec![interpolate(0.25, x, d, c)]
    } else {
        let samples: Vec<f64> = (0..=m)
            .map(|j| interpolate(j as f64 / (2 * m) as f64, x, d, c))
            .collect();
        (0..=m)
            .map(|k| {
                let gk = if k == 0 || k == m { 0.5 } else { 1.0 };
                let sum: f64 = samples
                    .iter()
                    .enumerate()
                    .map(|(j, &s)| {
                        let gj = if j == 0 || j == m { 0.5 } else { 1.0 };
                        gj * s * (PI * (j * k) as f64 / m as f64).cos()
                    })
                    .sum();
                2.0 / m as f64 * gk * sum
            })
            .collect()
    };

    let mut h = vec![0.0; taps];
    if odd {
        let mid = taps / 2;
        h[mid] = a[0];
        for k in 1..=m {
            h[mid - k] = a[k] / 2.0;
            h[mid + k] = a[k] / 2.0;
        }
    } else {
        let at = |k: usize| if k < a.len() { a[k] } else { 0.0 };
        h[0] = 0.25 * at(nfcns - 1);
        for j in 1..nfcns - 1 {
            h[j] = 0.25 * (at(nfcns - 1 - j) + at(nfcns - j));
        }
        h[nfcns - 1] = 0.5 * at(0) + 0.25 * at(1);
        for j in 0..nfcns {
            h[taps - 1 - j] = h[j];
        }
    }
    h
}

#[cfg(test)]
fn amplitude_at(h: &[f64], freq: f64, rate: f64) -> f64 {
    let mut re = 0.0;
    let mut im = 0.0;
    for (k, &tap) in h.iter().enumerate() {
        let phase = -TAU * freq / rate * k as f64;
        re += tap * phase.cos();
        im += tap * phase.sin();
    }
    (re * re + im * im).sqrt()
}

#[test]
fn lowpass_has_requested_length_and_symmetry() {
    for taps in [64, 65] {
        let h = lowpass(taps, 200_000.0, 1_200_000.0).unwrap();
        assert_eq!(h.len(), taps);
        for i in 0..taps / 2 {
            assert!(
                (h[i] - h[taps - 1 - i]).abs() < 1e-9,
                "asymmetric at {i}: {} vs {}",
                h[i],
                h[taps - 1 - i]
            );
        }
    }
}

#[test]
fn lowpass_passes_and_stops() {
    let rate = 1_200_000.0;
    let h = lowpass(64, 200_000.0, rate).unwrap();

    for freq in [0.0, 50_000.0, 150_000.0] {
        let mag = amplitude_at(&h, freq, rate);
        assert!((mag - 1.0).abs() < 0.01, "passband {freq}: {mag}");
    }
    for freq in [460_000.0, 520_000.0, 590_000.0] {
        let mag = amplitude_at(&h, freq, rate);
        assert!(mag < 0.01, "stopband {freq}: {mag}");
    }
}

#[test]
fn rejects_disordered_bands() {
    let spec = FilterSpec {
        taps: 32,
        edges: vec![0.0, 300_000.0, 250_000.0, 600_000.0],
        gains: vec![1.0, 0.0],
        sample_rate: 1_200_000.0,
    };
    assert!(matches!(
        design(&spec),
        Err(FilterDesignError::InvalidBands { .. })
    ));
}

#[test]
fn rejects_edges_beyond_nyquist() {
    let spec = FilterSpec {
        taps: 32,
        edges: vec![0.0, 200_000.0, 250_000.0, 700_000.0],
        gains: vec![1.0, 0.0],
        sample_rate: 1_200_000.0,
    };
    assert!(matches!(
        design(&spec),
        Err(FilterDesignError::InvalidBands { .. })
    ));
}

#[test]
fn rejects_tap_counts_below_band_structure() {
    let spec = FilterSpec {
        taps: 2,
        edges: vec![0.0, 200_000.0, 250_000.0, 600_000.0],
        gains: vec![1.0, 0.0],
        sample_rate: 1_200_000.0,
    };
    assert!(matches!(
        design(&spec),
        Err(FilterDesignError::TooFewTaps { .. })
    ));
}

#[test]
fn rejects_gain_count_mismatch() {
    let spec = FilterSpec {
        taps: 32,
        edges: vec![0.0, 200_000.0, 250_000.0, 600_000.0],
        gains: vec![1.0],
        sample_rate: 1_200_000.0,
    };
    assert!(matches!(
        design(&spec),
        Err(FilterDesignError::GainMismatch { .. })
    ));
}
