//! Prediction serving: bounded queries, qualitative banding and an owned model handle.
//!
//! [`ModelHandle`] loads the artifact lazily on first use and reloads it whenever the
//! file's modification time changes. A failed load leaves the handle in an unavailable
//! state that is reported per request; it never panics or exits.

use log::{info, warn};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::services::estimator::{self, Features, LinearModel, ModelInferenceError, ModelLoadError};

pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (-10.0, 50.0);
pub const WIND_RANGE: (f64, f64) = (0.0, 100.0);

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("model unavailable: {0}")]
    Unavailable(#[from] ModelLoadError),
    #[error("prediction failed: {0}")]
    Inference(#[from] ModelInferenceError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Band {
    Excellent,
    Marginal,
    Unlikely,
}

impl Band {
    pub fn describe(self) -> &'static str {
        match self {
            Band::Excellent => "good collection potential",
            Band::Marginal => "minimal yield",
            Band::Unlikely => "unlikely to collect dew",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Band::Excellent => "excellent",
            Band::Marginal => "marginal",
            Band::Unlikely => "unlikely",
        })
    }
}

/// Band thresholds (L/m²/day); both are exclusive lower bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldBands {
    pub excellent_above: f64,
    pub marginal_above: f64,
}

impl Default for YieldBands {
    fn default() -> Self {
        YieldBands {
            excellent_above: 0.3,
            marginal_above: 0.1,
        }
    }
}

impl YieldBands {
    pub fn validate(&self) -> Result<(), String> {
        if !self.excellent_above.is_finite() || !self.marginal_above.is_finite() {
            return Err("band thresholds must be finite".to_string());
        }
        if self.marginal_above > self.excellent_above {
            return Err(format!(
                "marginal band threshold {} exceeds excellent threshold {}",
                self.marginal_above, self.excellent_above
            ));
        }
        Ok(())
    }

    pub fn classify(&self, estimate: f64) -> Band {
        if estimate > self.excellent_above {
            Band::Excellent
        } else if estimate > self.marginal_above {
            Band::Marginal
        } else {
            Band::Unlikely
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub estimate: f64,
    pub band: Band,
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ModelInferenceError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ModelInferenceError::InputOutOfRange { field, value, min, max })
    }
}

pub fn validate_query(q: &Features) -> Result<(), ModelInferenceError> {
    check_range("humidity", q.humidity_pct, HUMIDITY_RANGE)?;
    check_range("temperature", q.temperature_c, TEMPERATURE_RANGE)?;
    check_range("wind", q.wind_speed_kmh, WIND_RANGE)
}

struct Loaded {
    modified: Option<SystemTime>,
    model: LinearModel,
}

/// Explicitly owned, lazily loaded model artifact.
pub struct ModelHandle {
    path: PathBuf,
    loaded: Option<Loaded>,
}

impl ModelHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ModelHandle {
            path: path.into(),
            loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Drop any cached model and load the artifact again.
    pub fn reload(&mut self) -> Result<&LinearModel, ModelLoadError> {
        self.loaded = None;
        self.model()
    }

    /// The current model, (re)loading when nothing is cached or the artifact changed on disk.
    pub fn model(&mut self) -> Result<&LinearModel, ModelLoadError> {
        let modified = self.modified();
        let stale = match &self.loaded {
            None => true,
            Some(l) => l.modified != modified,
        };
        if stale {
            self.loaded = None;
            let model = estimator::load(&self.path)?;
            info!(
                "Serving: loaded model from {} (label={:?}, trained on {} day(s))",
                self.path.display(),
                model.label,
                model.metrics.rows
            );
            self.loaded = Some(Loaded { modified, model });
        }
        match &self.loaded {
            Some(l) => Ok(&l.model),
            None => Err(ModelLoadError::Missing(self.path.display().to_string())),
        }
    }

    pub fn predict(&mut self, query: &Features, bands: &YieldBands) -> Result<Prediction, PredictError> {
        validate_query(query)?;
        let estimate = self.model()?.predict(query)?;
        Ok(Prediction {
            estimate,
            band: bands.classify(estimate),
        })
    }
}

fn parse_query(line: &str) -> Result<Features, String> {
    let values: Vec<f64> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| format!("not a number: {:?}", s)))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        [humidity_pct, temperature_c, wind_speed_kmh] => Ok(Features {
            humidity_pct: *humidity_pct,
            temperature_c: *temperature_c,
            wind_speed_kmh: *wind_speed_kmh,
        }),
        _ => Err(format!("expected 3 values (humidity temperature wind), got {}", values.len())),
    }
}

pub fn format_prediction(p: &Prediction) -> String {
    format!("Predicted yield: {:.2} L/m²/day [{}] {}", p.estimate, p.band, p.band.describe())
}

/// Line-oriented prompt: `<humidity> <temperature> <wind>`, `reload`, `status` or `quit`.
pub fn run_prompt<R: BufRead, W: Write>(
    handle: &mut ModelHandle,
    bands: &YieldBands,
    input: R,
    mut out: W,
) -> Result<(), String> {
    let io_err = |e: std::io::Error| format!("prompt i/o failed: {}", e);

    match handle.model() {
        Ok(_) => writeln!(out, "Model ready ({})", handle.path().display()).map_err(io_err)?,
        Err(e) => {
            warn!("Serving: {}", e);
            writeln!(out, "Model unavailable: {}", e).map_err(io_err)?;
        }
    }
    writeln!(
        out,
        "Enter: humidity(%) temperature(°C) wind(km/h), or reload / status / quit"
    )
    .map_err(io_err)?;

    for line in input.lines() {
        let line = line.map_err(io_err)?;
        let trimmed = line.trim();
        let reply = match trimmed {
            "" => continue,
            "quit" | "exit" => break,
            "reload" => match handle.reload() {
                Ok(_) => "Model reloaded".to_string(),
                Err(e) => format!("Model unavailable: {}", e),
            },
            "status" => match handle.model() {
                Ok(m) => format!(
                    "Model ready: label={:?}, r²={:.3}, trained {}",
                    m.label, m.metrics.r_squared, m.trained_at
                ),
                Err(e) => format!("Model unavailable: {}", e),
            },
            query => match parse_query(query) {
                Ok(q) => match handle.predict(&q, bands) {
                    Ok(p) => format_prediction(&p),
                    Err(e) => e.to_string(),
                },
                Err(e) => e,
            },
        };
        writeln!(out, "{}", reply).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::weather::{DailySummary, YieldRecord};
    use crate::services::estimator::{Label, save, train};
    use chrono::NaiveDate;

    fn trained_model() -> LinearModel {
        let records: Vec<YieldRecord> = (0..30)
            .map(|i| {
                let h = 40.0 + 2.0 * i as f64;
                let t = 10.0 + (i % 7) as f64 * 3.0;
                let w = 3.0 + (i % 5) as f64 * 4.0;
                YieldRecord {
                    summary: DailySummary {
                        date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid") + chrono::Days::new(i),
                        temp_max: t + 6.0,
                        temp_min: t - 6.0,
                        temp_mean: t,
                        humidity_mean: h,
                        wind_max: w,
                        precip_sum: 0.0,
                        dewpoint_mean: 4.0,
                        hours: 24,
                    },
                    dew_yield: (0.02 * h - 0.02 * w - 1.0).max(0.0),
                    fog_yield: 0.0,
                }
            })
            .collect();
        train(&records, Label::Dew).expect("trainable")
    }

    #[test]
    fn bands_follow_thresholds() {
        let bands = YieldBands::default();
        assert_eq!(bands.classify(0.75), Band::Excellent);
        assert_eq!(bands.classify(0.3), Band::Marginal);
        assert_eq!(bands.classify(0.2), Band::Marginal);
        assert_eq!(bands.classify(0.1), Band::Unlikely);
        assert_eq!(bands.classify(0.0), Band::Unlikely);
        assert!(
            YieldBands {
                excellent_above: 0.1,
                marginal_above: 0.3
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn query_bounds_are_enforced() {
        let ok = Features {
            humidity_pct: 100.0,
            temperature_c: -10.0,
            wind_speed_kmh: 0.0,
        };
        assert_eq!(validate_query(&ok), Ok(()));
        let hot = Features {
            temperature_c: 50.5,
            ..ok
        };
        assert!(matches!(
            validate_query(&hot),
            Err(ModelInferenceError::InputOutOfRange {
                field: "temperature",
                ..
            })
        ));
        let nan = Features {
            humidity_pct: f64::NAN,
            ..ok
        };
        assert!(validate_query(&nan).is_err());
    }

    #[test]
    fn missing_artifact_refuses_predictions_without_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut handle = ModelHandle::new(dir.path().join("model.json"));
        let q = estimator::SMOKE_TEST_INPUT;
        assert!(matches!(
            handle.predict(&q, &YieldBands::default()),
            Err(PredictError::Unavailable(ModelLoadError::Missing(_)))
        ));

        // The artifact appearing later makes the handle usable without a restart.
        save(&trained_model(), handle.path()).expect("save");
        assert!(handle.predict(&q, &YieldBands::default()).is_ok());
    }

    #[test]
    fn invalid_query_does_not_disturb_loaded_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        save(&trained_model(), &path).expect("save");
        let mut handle = ModelHandle::new(&path);
        let bad = Features {
            humidity_pct: 120.0,
            temperature_c: 20.0,
            wind_speed_kmh: 5.0,
        };
        assert!(matches!(
            handle.predict(&bad, &YieldBands::default()),
            Err(PredictError::Inference(_))
        ));
        assert!(handle.predict(&estimator::SMOKE_TEST_INPUT, &YieldBands::default()).is_ok());
    }

    #[test]
    fn explicit_reload_picks_up_replaced_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        let first = trained_model();
        save(&first, &path).expect("save");
        let mut handle = ModelHandle::new(&path);
        assert_eq!(handle.model().expect("loads").label, Label::Dew);

        let mut second = first.clone();
        second.label = Label::Total;
        save(&second, &path).expect("save");
        assert_eq!(handle.reload().expect("reloads").label, Label::Total);

        std::fs::write(&path, "garbage").expect("overwrite");
        assert!(matches!(handle.reload(), Err(ModelLoadError::Corrupt { .. })));
    }

    #[test]
    fn changed_mtime_triggers_reload_without_explicit_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        let first = trained_model();
        save(&first, &path).expect("save");
        let mut handle = ModelHandle::new(&path);
        assert_eq!(handle.model().expect("loads").label, Label::Dew);

        let mut second = first.clone();
        second.label = Label::Total;
        save(&second, &path).expect("save");
        let stamp = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(stamp))
            .expect("set mtime");

        assert_eq!(handle.model().expect("reloads on change").label, Label::Total);
    }

    #[test]
    fn unchanged_mtime_keeps_cached_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        save(&trained_model(), &path).expect("save");
        let stamp = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        let pin = |p: &Path| {
            std::fs::File::options()
                .write(true)
                .open(p)
                .and_then(|f| f.set_modified(stamp))
                .expect("set mtime")
        };
        pin(&path);
        let mut handle = ModelHandle::new(&path);
        assert_eq!(handle.model().expect("loads").label, Label::Dew);

        std::fs::write(&path, "garbage").expect("overwrite");
        pin(&path);
        assert_eq!(handle.model().expect("cached").label, Label::Dew);
    }

    #[test]
    fn prompt_reports_unavailable_model_and_keeps_going() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut handle = ModelHandle::new(dir.path().join("model.json"));
        let input = b"80 25 10\nhello\nstatus\nquit\n80 25 10\n".as_slice();
        let mut out = Vec::new();
        run_prompt(&mut handle, &YieldBands::default(), input, &mut out).expect("prompt runs");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Model unavailable:"));
        assert!(lines[2].starts_with("model unavailable:"));
        assert!(lines[3].starts_with("not a number"));
        assert!(lines[4].starts_with("Model unavailable:"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn prompt_predicts_with_loaded_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        save(&trained_model(), &path).expect("save");
        let mut handle = ModelHandle::new(&path);
        let mut out = Vec::new();
        run_prompt(&mut handle, &YieldBands::default(), b"95, 20, 3\n".as_slice(), &mut out).expect("prompt runs");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.lines().next().expect("banner").starts_with("Model ready"));
        assert!(text.contains("Predicted yield:"), "{}", text);
    }

    #[test]
    fn parse_query_accepts_spaces_or_commas() {
        assert_eq!(
            parse_query("80, 25 10"),
            Ok(Features {
                humidity_pct: 80.0,
                temperature_c: 25.0,
                wind_speed_kmh: 10.0
            })
        );
        assert!(parse_query("80 25").is_err());
    }
}
