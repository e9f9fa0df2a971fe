//! ARIMA(p, d, q) with a fixed order.
//!
//! Estimation is conditional least squares via the two-step
//! Hannan-Rissanen procedure:
//!
//! 1. difference the series `d` times;
//! 2. fit a long autoregression and keep its residuals as innovation proxies;
//! 3. regress the differenced series on its `p` lags and `q` lagged proxies.
//!
//! Both regressions carry a small ridge term so the normal equations stay
//! positive definite on short annual series, where regressors can outnumber
//! rows. A constant is estimated only for `d == 0`. AR coefficients are
//! shrunk into the stationary region and MA coefficients into the invertible
//! region before forecasting.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelOrder;

/// Ridge penalty relative to the mean diagonal of X'X
const RIDGE: f64 = 1e-4;

/// Upper bound on the sum of |coefficients| for AR and MA parts
const MAX_COEFF_SUM: f64 = 0.98;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("series contains NaN or infinite values")]
    NonFiniteInput,

    #[error("normal equations are not positive definite")]
    Singular,

    #[error("estimation produced non-finite {0}")]
    NonFinite(&'static str),

    #[error("forecast period beyond the supported calendar range")]
    PeriodOutOfRange,
}

/// Fitted model parameters, for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub order: ModelOrder,
    pub ar_coeffs: Vec<f64>,
    pub ma_coeffs: Vec<f64>,
    pub constant: f64,
    pub sigma2: f64,
    pub aic: f64,
    pub bic: f64,
}

impl ModelSummary {
    pub fn report(&self) -> String {
        let mut s = format!("{} Model Summary\n", self.order);
        s.push_str(&"=".repeat(40));
        s.push('\n');

        if !self.ar_coeffs.is_empty() {
            s.push_str("AR Coefficients:\n");
            for (i, c) in self.ar_coeffs.iter().enumerate() {
                s.push_str(&format!("  phi{} = {:.6}\n", i + 1, c));
            }
        }
        if !self.ma_coeffs.is_empty() {
            s.push_str("MA Coefficients:\n");
            for (i, c) in self.ma_coeffs.iter().enumerate() {
                s.push_str(&format!("  theta{} = {:.6}\n", i + 1, c));
            }
        }

        s.push_str(&format!("Constant: {:.6}\n", self.constant));
        s.push_str(&format!("Sigma2: {:.6}\n", self.sigma2));
        s.push_str(&format!("AIC: {:.2}\n", self.aic));
        s.push_str(&format!("BIC: {:.2}\n", self.bic));
        s
    }
}

#[derive(Debug, Clone)]
pub struct ArimaModel {
    order: ModelOrder,
    ar_coeffs: Vec<f64>,
    ma_coeffs: Vec<f64>,
    constant: f64,
    sigma2: f64,
    aic: f64,
    bic: f64,
    /// Last value of the series at each differencing level 0..d
    anchors: Vec<f64>,
    differenced: Vec<f64>,
    /// Aligned with `differenced`; zero before the first usable lag
    residuals: Vec<f64>,
}

impl ArimaModel {
    pub fn fit(data: &[f64], order: ModelOrder) -> Result<Self, ForecastError> {
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::NonFiniteInput);
        }
        let required = order.min_observations();
        if data.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: data.len(),
            });
        }

        let ModelOrder { p, d, q } = order;
        let with_constant = d == 0;

        let anchors: Vec<f64> = (0..d)
            .map(|k| difference(data, k).last().copied().unwrap_or(0.0))
            .collect();
        let differenced = difference(data, d);
        let n = differenced.len();

        // Step 1: innovation proxies from a long autoregression
        let proxies = if q > 0 {
            let m = p.max(q).min(n - 1);
            let (x, y) = design(&differenced, &[], m, 0, m, with_constant);
            let beta = ridge_solve(&x, &y)?;
            let fitted = &x * &beta;
            let mut proxies = vec![0.0; n];
            for (row, t) in (m..n).enumerate() {
                proxies[t] = differenced[t] - fitted[row];
            }
            proxies
        } else {
            Vec::new()
        };

        // Step 2: joint regression on AR lags and lagged innovations
        let (x, y) = design(&differenced, &proxies, p, q, p, with_constant);
        let beta = ridge_solve(&x, &y)?;

        let offset = usize::from(with_constant);
        let constant = if with_constant { beta[0] } else { 0.0 };
        let mut ar_coeffs: Vec<f64> = beta.iter().skip(offset).take(p).copied().collect();
        let mut ma_coeffs: Vec<f64> = beta.iter().skip(offset + p).take(q).copied().collect();

        if !constant.is_finite() || ar_coeffs.iter().chain(&ma_coeffs).any(|c| !c.is_finite()) {
            return Err(ForecastError::NonFinite("coefficients"));
        }
        shrink(&mut ar_coeffs);
        shrink(&mut ma_coeffs);

        // Final residuals by recursion so MA terms use the model's own errors
        let mut residuals = vec![0.0; n];
        for t in p..n {
            let prediction = one_step(constant, &ar_coeffs, &ma_coeffs, &differenced, &residuals, t);
            residuals[t] = differenced[t] - prediction;
        }

        let used = (n - p) as f64;
        let sigma2 = residuals[p..].iter().map(|e| e * e).sum::<f64>() / used;
        let k = (p + q + offset) as f64;
        let log_likelihood =
            -0.5 * used * (1.0 + (2.0 * std::f64::consts::PI * sigma2.max(1e-12)).ln());
        let aic = -2.0 * log_likelihood + 2.0 * k;
        let bic = -2.0 * log_likelihood + k * used.ln();

        if !sigma2.is_finite() {
            return Err(ForecastError::NonFinite("residual variance"));
        }

        Ok(ArimaModel {
            order,
            ar_coeffs,
            ma_coeffs,
            constant,
            sigma2,
            aic,
            bic,
            anchors,
            differenced,
            residuals,
        })
    }

    /// Point forecasts (predictive mean) for the next `steps` periods
    pub fn predict(&self, steps: usize) -> Result<Vec<f64>, ForecastError> {
        if steps == 0 {
            return Ok(Vec::new());
        }

        let n = self.differenced.len();
        let mut extended = self.differenced.clone();
        let mut extended_residuals = self.residuals.clone();

        for t in n..n + steps {
            let forecast = one_step(
                self.constant,
                &self.ar_coeffs,
                &self.ma_coeffs,
                &extended,
                &extended_residuals,
                t,
            );
            extended.push(forecast);
            // future innovations have zero mean
            extended_residuals.push(0.0);
        }

        let mut levels = extended[n..].to_vec();
        for anchor in self.anchors.iter().rev() {
            levels = integrate(&levels, *anchor);
        }

        if levels.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite("forecast"));
        }
        Ok(levels)
    }

    pub fn order(&self) -> ModelOrder {
        self.order
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar_coeffs
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma_coeffs
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            order: self.order,
            ar_coeffs: self.ar_coeffs.clone(),
            ma_coeffs: self.ma_coeffs.clone(),
            constant: self.constant,
            sigma2: self.sigma2,
            aic: self.aic,
            bic: self.bic,
        }
    }
}

/// Difference a series `d` times
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return vec![];
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo one level of differencing, starting after `start`
fn integrate(diff: &[f64], start: f64) -> Vec<f64> {
    let mut result = Vec::with_capacity(diff.len());
    let mut cumsum = start;
    for &d in diff {
        cumsum += d;
        result.push(cumsum);
    }
    result
}

fn one_step(constant: f64, ar: &[f64], ma: &[f64], series: &[f64], residuals: &[f64], t: usize) -> f64 {
    let mut prediction = constant;
    for (i, phi) in ar.iter().enumerate() {
        if let Some(lag) = t.checked_sub(i + 1) {
            prediction += phi * series[lag];
        }
    }
    for (j, theta) in ma.iter().enumerate() {
        if let Some(lag) = t.checked_sub(j + 1) {
            prediction += theta * residuals[lag];
        }
    }
    prediction
}

/// Rows t in start..n of [1?, y(t-1)..y(t-p), e(t-1)..e(t-q)] against y(t)
fn design(
    series: &[f64],
    innovations: &[f64],
    p: usize,
    q: usize,
    start: usize,
    with_constant: bool,
) -> (DMatrix<f64>, DVector<f64>) {
    let n = series.len();
    let rows = n.saturating_sub(start);
    let cols = usize::from(with_constant) + p + q;

    let mut x_data = Vec::with_capacity(rows * cols);
    let mut y_data = Vec::with_capacity(rows);

    for t in start..n {
        y_data.push(series[t]);
        if with_constant {
            x_data.push(1.0);
        }
        for i in 1..=p {
            x_data.push(t.checked_sub(i).map(|lag| series[lag]).unwrap_or(0.0));
        }
        for j in 1..=q {
            x_data.push(
                t.checked_sub(j)
                    .and_then(|lag| innovations.get(lag).copied())
                    .unwrap_or(0.0),
            );
        }
    }

    (
        DMatrix::from_row_slice(rows, cols, &x_data),
        DVector::from_vec(y_data),
    )
}

fn ridge_solve(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>, ForecastError> {
    let k = x.ncols();
    if k == 0 {
        return Ok(DVector::zeros(0));
    }

    let mut xtx = x.transpose() * x;
    let lambda = RIDGE * (xtx.trace() / k as f64).max(f64::EPSILON);
    for i in 0..k {
        xtx[(i, i)] += lambda;
    }
    let xty = x.transpose() * y;

    let cholesky = xtx.cholesky().ok_or(ForecastError::Singular)?;
    Ok(cholesky.solve(&xty))
}

fn shrink(coeffs: &mut [f64]) {
    let total: f64 = coeffs.iter().map(|c| c.abs()).sum();
    if total >= MAX_COEFF_SUM {
        let factor = MAX_COEFF_SUM / total;
        for c in coeffs.iter_mut() {
            *c *= factor;
        }
    }
}
