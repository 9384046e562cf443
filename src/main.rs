pub mod models {
    pub mod open_meteo;
    pub mod weather;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod charts;
    pub mod estimator;
    pub mod fake_data;
    pub mod persist;
    pub mod pipeline;
    pub mod report;
    pub mod rules;
    pub mod serving;
}

use crate::client::{ArchiveQuery, OpenMeteoClient};
use crate::config::Config;
use crate::services::estimator::{Features, Label};
use crate::services::pipeline::SyntheticSource;
use crate::services::serving::ModelHandle;
use crate::services::{charts, estimator, fake_data, persist, pipeline, report, serving};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

/// Dew and fog water-yield estimates from historical weather.
#[derive(Debug, Parser)]
#[command(name = "dewfog", version)]
struct Cli {
    /// Environment file to load instead of `./.env`.
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the configured period, label each day and write the table, report and charts.
    Run {
        /// Use seeded synthetic weather instead of the archive API.
        #[arg(long)]
        fake_data: bool,
        #[arg(long, default_value_t = fake_data::DEFAULT_SEED)]
        seed: u64,
        #[arg(long)]
        no_charts: bool,
    },
    /// Fit the yield estimator on a labelled table.
    Train {
        /// Labelled CSV; defaults to OUTPUT_CSV.
        #[arg(long, value_name = "PATH", conflicts_with = "from_db")]
        input: Option<PathBuf>,
        /// Read the labelled days from DATABASE_URL instead of a CSV.
        #[arg(long)]
        from_db: bool,
        /// Artifact path; defaults to MODEL_PATH.
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "dew")]
        label: Label,
    },
    /// Estimate the yield for one set of conditions.
    Predict {
        /// Relative humidity (%).
        #[arg(long)]
        humidity: f64,
        /// Air temperature (°C).
        #[arg(long, allow_negative_numbers = true)]
        temperature: f64,
        /// Wind speed (km/h).
        #[arg(long)]
        wind: f64,
    },
    /// Answer estimates interactively on stdin.
    Serve,
}

fn run_pipeline(cfg: &Config, fake: bool, seed: u64, no_charts: bool) -> Result<(), String> {
    let end_date = cfg.end_date.unwrap_or_else(|| Local::now().date_naive());
    if end_date < cfg.start_date {
        return Err(format!("end date {} is before start date {}", end_date, cfg.start_date));
    }
    let query = ArchiveQuery {
        latitude: cfg.latitude,
        longitude: cfg.longitude,
        start_date: cfg.start_date,
        end_date,
        timezone: cfg.timezone.clone(),
    };

    let output = if fake {
        info!("Using synthetic weather (seed={})", seed);
        pipeline::run(&SyntheticSource { seed }, &query, cfg.partial_days, &cfg.rules)
    } else {
        let client = OpenMeteoClient::new(cfg.request_timeout, cfg.max_request_retries);
        pipeline::run(&client, &query, cfg.partial_days, &cfg.rules)
    }
    .map_err(|e| e.to_string())?;

    persist::write_csv(&cfg.output_csv, &output.records)?;

    if let Some(url) = cfg.database_url.as_deref() {
        let mut conn = persist::connect(url)?;
        persist::upsert_daily_yields(&mut conn, &cfg.site, cfg.latitude, cfg.longitude, &output.records)?;
    }

    if cfg.charts_enabled && !no_charts {
        charts::render_all(&cfg.chart_dir, &cfg.site, &output.report)?;
    } else {
        info!("Chart rendering disabled");
    }

    print!("{}", report::render_text(&output.report));
    Ok(())
}

fn train_model(
    cfg: &Config,
    input: Option<PathBuf>,
    from_db: bool,
    output: Option<PathBuf>,
    label: Label,
) -> Result<(), String> {
    let records = if from_db {
        let url = cfg
            .database_url
            .as_deref()
            .ok_or_else(|| "--from-db requires DATABASE_URL".to_string())?;
        let mut conn = persist::connect(url)?;
        persist::load_daily_yields(&mut conn, &cfg.site)?
    } else {
        persist::read_csv(input.as_deref().unwrap_or(&cfg.output_csv))?
    };
    info!("Loaded {} labelled day(s) for training", records.len());

    let model = estimator::train(&records, label)?;
    estimator::save(&model, output.as_deref().unwrap_or(&cfg.model_path))?;
    println!(
        "Trained on {} day(s): r²={:.3}, mean absolute error={:.3} L/m²/day",
        model.metrics.rows, model.metrics.r_squared, model.metrics.mean_absolute_error
    );
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (site={}, point=({}, {}), period={}..{}, timezone={}, partial_days={:?}, \
         max_request_retries={})",
        cfg.site,
        cfg.latitude,
        cfg.longitude,
        cfg.start_date,
        cfg.end_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "today".to_string()),
        cfg.timezone,
        cfg.partial_days,
        cfg.max_request_retries.get()
    );

    match cli.command {
        Command::Run {
            fake_data,
            seed,
            no_charts,
        } => run_pipeline(&cfg, fake_data, seed, no_charts),
        Command::Train {
            input,
            from_db,
            output,
            label,
        } => train_model(&cfg, input, from_db, output, label),
        Command::Predict {
            humidity,
            temperature,
            wind,
        } => {
            let mut handle = ModelHandle::new(cfg.model_path.clone());
            let query = Features {
                humidity_pct: humidity,
                temperature_c: temperature,
                wind_speed_kmh: wind,
            };
            let prediction = handle.predict(&query, &cfg.bands).map_err(|e| e.to_string())?;
            println!("{}", serving::format_prediction(&prediction));
            Ok(())
        }
        Command::Serve => {
            let mut handle = ModelHandle::new(cfg.model_path.clone());
            serving::run_prompt(&mut handle, &cfg.bands, std::io::stdin().lock(), std::io::stdout().lock())
        }
    }
}

fn load_env(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    // dotenvy leaves variables already present in the process environment untouched.
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile {
            path: path.to_path_buf(),
            explicit: true,
        }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    dotenvy::from_path(&default_path).map_err(|e| format!("failed to load {}: {}", default_path.display(), e))?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn main() {
    let cli = Cli::parse();
    let loaded_env = match load_env(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "dewfog {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
