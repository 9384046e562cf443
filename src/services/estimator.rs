//! Least-squares yield estimator over (humidity, temperature, wind).
//!
//! The model is trained from persisted daily yields and stored as a small JSON artifact.
//! Artifacts are validated on load: format version, feature layout, finite coefficients
//! and a smoke-test prediction on a reference query.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::weather::YieldRecord;
use crate::utils::write_atomically;

pub const FORMAT_VERSION: u32 = 1;
pub const FEATURES: [&str; 3] = ["relative_humidity_2m", "temperature_2m", "wind_speed_10m"];

/// Reference query used to validate a freshly loaded model.
pub const SMOKE_TEST_INPUT: Features = Features {
    humidity_pct: 80.0,
    temperature_c: 25.0,
    wind_speed_kmh: 10.0,
};

/// Two features fewer than this many days cannot be fit meaningfully.
const MIN_TRAINING_ROWS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model artifact {0} not found")]
    Missing(String),
    #[error("model artifact {path} unreadable: {message}")]
    Unreadable { path: String, message: String },
    #[error("model artifact {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("model artifact is incompatible: {0}")]
    Incompatible(String),
    #[error("model failed its smoke test: {0}")]
    SmokeTest(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelInferenceError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    InputOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("model produced a non-finite estimate ({0})")]
    NonFinite(f64),
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub humidity_pct: f64,
    pub temperature_c: f64,
    pub wind_speed_kmh: f64,
}

impl Features {
    fn as_array(&self) -> [f64; 3] {
        [self.humidity_pct, self.temperature_c, self.wind_speed_kmh]
    }
}

/// Training label taken from each day.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    #[default]
    Dew,
    Total,
}

impl Label {
    fn of(self, r: &YieldRecord) -> f64 {
        match self {
            Label::Dew => r.dew_yield,
            Label::Total => r.total_yield(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub rows: usize,
    pub r_squared: f64,
    pub mean_absolute_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub format_version: u32,
    pub features: Vec<String>,
    pub label: Label,
    pub intercept: f64,
    pub coefficients: [f64; 3],
    pub trained_at: DateTime<Utc>,
    pub metrics: TrainingMetrics,
}

impl LinearModel {
    fn raw(&self, x: &Features) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x.as_array())
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    /// Non-negative estimate; regression output below zero is reported as zero.
    pub fn predict(&self, x: &Features) -> Result<f64, ModelInferenceError> {
        let y = self.raw(x);
        if !y.is_finite() {
            return Err(ModelInferenceError::NonFinite(y));
        }
        Ok(y.max(0.0))
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelLoadError::Incompatible(format!(
                "format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.features.iter().map(String::as_str).ne(FEATURES) {
            return Err(ModelLoadError::Incompatible(format!(
                "features {:?} (expected {:?})",
                self.features, FEATURES
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelLoadError::Incompatible("non-finite coefficients".to_string()));
        }
        self.predict(&SMOKE_TEST_INPUT)
            .map(|_| ())
            .map_err(|e| ModelLoadError::SmokeTest(e.to_string()))
    }
}

fn features_of(r: &YieldRecord) -> Features {
    Features {
        humidity_pct: r.summary.humidity_mean,
        temperature_c: r.summary.temp_mean,
        wind_speed_kmh: r.summary.wind_max,
    }
}

/// Solve `a · x = b` in place by Gaussian elimination with partial pivoting.
fn solve<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Option<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = ((row + 1)..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Ordinary least squares with intercept via the normal equations.
pub fn train(records: &[YieldRecord], label: Label) -> Result<LinearModel, String> {
    if records.len() < MIN_TRAINING_ROWS {
        return Err(format!(
            "need at least {} days to train, got {}",
            MIN_TRAINING_ROWS,
            records.len()
        ));
    }

    let mut xtx = [[0.0_f64; 4]; 4];
    let mut xty = [0.0_f64; 4];
    for r in records {
        let [h, t, w] = features_of(r).as_array();
        let row = [1.0, h, t, w];
        let y = label.of(r);
        for i in 0..4 {
            for j in 0..4 {
                xtx[i][j] += row[i] * row[j];
            }
            xty[i] += row[i] * y;
        }
    }
    let beta = solve(xtx, xty).ok_or_else(|| "training features are degenerate (singular design matrix)".to_string())?;

    let mut model = LinearModel {
        format_version: FORMAT_VERSION,
        features: FEATURES.iter().map(|f| f.to_string()).collect(),
        label,
        intercept: beta[0],
        coefficients: [beta[1], beta[2], beta[3]],
        trained_at: Utc::now(),
        metrics: TrainingMetrics {
            rows: records.len(),
            r_squared: 0.0,
            mean_absolute_error: 0.0,
        },
    };

    let n = records.len() as f64;
    let y_mean = records.iter().map(|r| label.of(r)).sum::<f64>() / n;
    let (mut ss_res, mut ss_tot, mut abs_err) = (0.0, 0.0, 0.0);
    for r in records {
        let y = label.of(r);
        let y_hat = model.raw(&features_of(r));
        ss_res += (y - y_hat).powi(2);
        ss_tot += (y - y_mean).powi(2);
        abs_err += (y - y_hat).abs();
    }
    model.metrics.r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };
    model.metrics.mean_absolute_error = abs_err / n;

    info!(
        "Estimator: trained on {} day(s), label={:?}, r²={:.3}, mae={:.3}",
        model.metrics.rows, model.label, model.metrics.r_squared, model.metrics.mean_absolute_error
    );
    Ok(model)
}

pub fn save(model: &LinearModel, path: &Path) -> Result<(), String> {
    write_atomically(path, |file| {
        serde_json::to_writer_pretty(file, model).map_err(|e| format!("serialize model failed: {}", e))
    })?;
    info!("Estimator: saved model to {}", path.display());
    Ok(())
}

/// Read, decode and validate an artifact.
pub fn load(path: &Path) -> Result<LinearModel, ModelLoadError> {
    let display = path.display().to_string();
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ModelLoadError::Missing(display)),
        Err(e) => {
            return Err(ModelLoadError::Unreadable {
                path: display,
                message: e.to_string(),
            });
        }
    };
    let de = &mut serde_json::Deserializer::from_str(&text);
    let model: LinearModel = serde_path_to_error::deserialize(de).map_err(|e| ModelLoadError::Corrupt {
        path: display,
        message: e.to_string(),
    })?;
    model.validate()?;
    Ok(model)
}
