//! Conditional volatility proxies for a daily return series
//!
//! - **GARCH(1,1)**: constant-mean Gaussian maximum likelihood on returns
//!   expressed in percent, fitted with a bounded Nelder-Mead search
//! - **EWMA**: exponentially weighted mean of |return|, used when history is
//!   short or the GARCH fit does not converge to finite values

use crate::config::FeatureConfig;
use crate::error::{PipelineError, Result};

const LN_2PI: f64 = 1.837_877_066_409_345_5;
const MAX_PERSISTENCE: f64 = 0.9999;

/// Fitted GARCH(1,1) parameters (on percent returns)
#[derive(Debug, Clone, PartialEq)]
pub struct Garch11 {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    pub log_likelihood: f64,
}

impl Garch11 {
    /// Fit by maximum likelihood; `returns` must be finite
    pub fn fit(returns: &[f64]) -> Result<Self> {
        if returns.len() < 2 {
            return Err(PipelineError::Degenerate {
                ticker: String::new(),
                reason: "GARCH needs at least two returns".to_string(),
            });
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        if !(var.is_finite() && var > 0.0) {
            return Err(PipelineError::Degenerate {
                ticker: String::new(),
                reason: "zero return variance".to_string(),
            });
        }

        let x0 = Params {
            mu: mean,
            omega: var * 0.05,
            alpha: 0.10,
            beta: 0.85,
        }
        .to_unconstrained();

        let objective = |u: &[f64]| {
            let p = Params::from_unconstrained(u);
            neg_log_likelihood(returns, &p, var)
        };

        let (best, nll) = nelder_mead(objective, &x0, 0.5, 2_000, 1e-9);
        let p = Params::from_unconstrained(&best);

        if !nll.is_finite() {
            return Err(PipelineError::Degenerate {
                ticker: String::new(),
                reason: "GARCH likelihood is not finite".to_string(),
            });
        }

        Ok(Self {
            mu: p.mu,
            omega: p.omega,
            alpha: p.alpha,
            beta: p.beta,
            log_likelihood: -nll,
        })
    }

    /// Conditional standard deviation for each observation
    pub fn conditional_volatility(&self, returns: &[f64]) -> Vec<f64> {
        let p = Params {
            mu: self.mu,
            omega: self.omega,
            alpha: self.alpha,
            beta: self.beta,
        };
        let backcast = sample_variance(returns);
        variance_path(returns, &p, backcast)
            .into_iter()
            .map(f64::sqrt)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Params {
    mu: f64,
    omega: f64,
    alpha: f64,
    beta: f64,
}

impl Params {
    // [mu, ln omega, logit persistence, logit alpha share]
    fn to_unconstrained(self) -> Vec<f64> {
        let persistence = (self.alpha + self.beta).min(MAX_PERSISTENCE * 0.999);
        vec![
            self.mu,
            self.omega.ln(),
            logit(persistence / MAX_PERSISTENCE),
            logit(self.alpha / persistence),
        ]
    }

    fn from_unconstrained(u: &[f64]) -> Self {
        let persistence = sigmoid(u[2]) * MAX_PERSISTENCE;
        let alpha = persistence * sigmoid(u[3]);
        Self {
            mu: u[0],
            omega: u[1].clamp(-30.0, 30.0).exp(),
            alpha,
            beta: persistence - alpha,
        }
    }
}

fn variance_path(returns: &[f64], p: &Params, backcast: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(returns.len());
    let mut prev_var = backcast;
    let mut prev_eps2 = backcast;
    for r in returns {
        let var = p.omega + p.alpha * prev_eps2 + p.beta * prev_var;
        out.push(var);
        let eps = r - p.mu;
        prev_eps2 = eps * eps;
        prev_var = var;
    }
    out
}

fn neg_log_likelihood(returns: &[f64], p: &Params, backcast: f64) -> f64 {
    let vars = variance_path(returns, p, backcast);
    let mut nll = 0.0;
    for (r, var) in returns.iter().zip(&vars) {
        if !(var.is_finite() && *var > 0.0) {
            return f64::INFINITY;
        }
        let eps = r - p.mu;
        nll += 0.5 * (LN_2PI + var.ln() + eps * eps / var);
    }
    nll
}

fn sample_variance(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    (p / (1.0 - p)).ln()
}

/// Deterministic Nelder-Mead minimiser; returns (argmin, min)
fn nelder_mead<F>(f: F, x0: &[f64], step: f64, max_iter: usize, tol: f64) -> (Vec<f64>, f64)
where
    F: Fn(&[f64]) -> f64,
{
    let dim = x0.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(dim + 1);
    simplex.push((x0.to_vec(), f(x0)));
    for i in 0..dim {
        let mut x = x0.to_vec();
        x[i] += step;
        let fx = f(&x);
        simplex.push((x, fx));
    }

    for _ in 0..max_iter {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[dim].1;
        if (worst - best).abs() <= tol * (1.0 + best.abs()) {
            break;
        }

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|(x, _)| x[j]).sum::<f64>() / dim as f64)
            .collect();
        let toward = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[dim].0)
                .map(|(c, w)| c + coef * (w - c))
                .collect()
        };

        let reflected = toward(-1.0);
        let f_r = f(&reflected);

        if f_r < simplex[0].1 {
            let expanded = toward(-2.0);
            let f_e = f(&expanded);
            simplex[dim] = if f_e < f_r {
                (expanded, f_e)
            } else {
                (reflected, f_r)
            };
        } else if f_r < simplex[dim - 1].1 {
            simplex[dim] = (reflected, f_r);
        } else {
            let contracted = if f_r < simplex[dim].1 {
                toward(-0.5)
            } else {
                toward(0.5)
            };
            let f_c = f(&contracted);
            if f_c < simplex[dim].1.min(f_r) {
                simplex[dim] = (contracted, f_c);
            } else {
                // Shrink toward the best vertex
                let best_x = simplex[0].0.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    let x: Vec<f64> = best_x
                        .iter()
                        .zip(&vertex.0)
                        .map(|(b, v)| b + 0.5 * (v - b))
                        .collect();
                    let fx = f(&x);
                    *vertex = (x, fx);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (x, fx) = simplex.swap_remove(0);
    (x, fx)
}

/// EWMA of |r| with `adjust=False`; `None` until `min_periods` values are seen
pub fn ewma_abs(returns: &[Option<f64>], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(returns.len());
    let mut state: Option<f64> = None;
    let mut seen = 0usize;
    for r in returns {
        if let Some(x) = r.filter(|x| x.is_finite()) {
            let a = x.abs();
            state = Some(match state {
                Some(s) => (1.0 - alpha) * s + alpha * a,
                None => a,
            });
            seen += 1;
        }
        out.push(if seen >= min_periods { state } else { None });
    }
    out
}

/// GARCH(1,1) volatility when enough history exists, else the EWMA proxy.
///
/// Output is aligned to `returns`: positions without a return stay `None`
/// on the GARCH path and carry the running EWMA on the fallback path.
pub fn volatility_proxy(returns: &[Option<f64>], cfg: &FeatureConfig) -> Vec<Option<f64>> {
    let observed: Vec<(usize, f64)> = returns
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.filter(|x| x.is_finite()).map(|x| (i, x)))
        .collect();

    if cfg.use_garch && observed.len() >= cfg.garch_min_obs {
        let pct: Vec<f64> = observed.iter().map(|(_, r)| r * 100.0).collect();
        match Garch11::fit(&pct) {
            Ok(model) => {
                let vol = model.conditional_volatility(&pct);
                if vol.iter().all(|v| v.is_finite()) {
                    let mut out = vec![None; returns.len()];
                    for ((i, _), v) in observed.iter().zip(vol) {
                        out[*i] = Some(v / 100.0);
                    }
                    return out;
                }
                tracing::debug!("GARCH produced non-finite volatility; using EWMA");
            }
            Err(e) => tracing::debug!("GARCH fit failed ({}); using EWMA", e),
        }
    }

    ewma_abs(returns, cfg.ewma_alpha, cfg.ewma_min_periods)
}
