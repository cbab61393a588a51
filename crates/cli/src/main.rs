mod batch;
mod readings;
mod render;
mod report;
mod trace_log;

use clap::{error::ErrorKind, Args, Parser, Subcommand};
use compass_analyzer::{get_segments, AnalysisConfig, ConfigError};
use readings::{read_readings, resolve_data_file, ReadingsError};
use render::{print_compass_report, print_segments, CompassReport, SegmentRow};
use serde::Serialize;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use trace_log::{analyze_traced, TraceCollector};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "compass-calib",
    version,
    about = "Validate compass calibration runs of four clockwise quarter turns"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short = 'j', global = true)]
    json: bool,

    /// tracing filter directive for operational logs on stderr
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Args, Debug, Default)]
struct TuningArgs {
    /// JSON file with camelCase analysis settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    stability_threshold: Option<f64>,
    #[arg(long, global = true)]
    turn_tolerance: Option<f64>,
    #[arg(long, global = true)]
    min_stable_len: Option<usize>,
    #[arg(long, global = true)]
    max_outliers: Option<usize>,
    #[arg(long, global = true)]
    sum_tolerance: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one compass folder or readings CSV
    Analyze {
        path: PathBuf,
        /// include the pipeline trace in the output
        #[arg(long)]
        trace: bool,
        /// exit with code 3 when the calibration is invalid
        #[arg(long)]
        strict: bool,
    },
    /// Print the merged stable segments of a compass folder or readings CSV
    Segments { path: PathBuf },
    /// Analyze every compass folder under a data directory
    Batch {
        data_dir: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        threads: Option<usize>,
        /// write compass_<name>.log trace files here [default: analysis_logs
        /// next to DATA_DIR]
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// skip per-compass trace files
        #[arg(long, conflicts_with = "log_dir")]
        no_logs: bool,
        /// move valid compass folders here
        #[arg(long)]
        success_dir: Option<PathBuf>,
        /// move invalid or unreadable compass folders here
        #[arg(long)]
        failure_dir: Option<PathBuf>,
        #[arg(long)]
        strict: bool,
    },
    /// Summarize a batch NDJSON file
    Report {
        input: PathBuf,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        find: Option<String>,
    },
    /// Print the effective analysis configuration
    Config,
}

#[derive(Clone, Copy, Debug)]
enum AppErrorKind {
    Usage,
    Dependency,
    Internal,
    Rejected,
}

#[derive(Clone, Debug)]
struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    details: Box<Value>,
    data: Option<Box<Value>>,
}

impl AppError {
    fn new(kind: AppErrorKind, code: &'static str, message: String) -> Self {
        Self {
            kind,
            code,
            message,
            details: Box::new(Value::Null),
            data: None,
        }
    }

    fn usage(message: String) -> Self {
        Self::new(AppErrorKind::Usage, "CLI_USAGE", message)
    }

    fn config_invalid(message: String) -> Self {
        Self::new(AppErrorKind::Usage, "CONFIG_INVALID", message)
    }

    fn dependency(message: String) -> Self {
        Self::new(AppErrorKind::Dependency, "DEPENDENCY_ERROR", message)
    }

    fn internal(message: String) -> Self {
        Self::new(AppErrorKind::Internal, "INTERNAL_ERROR", message)
    }

    fn calibration_invalid(message: String) -> Self {
        Self::new(AppErrorKind::Rejected, "CALIBRATION_INVALID", message)
    }

    fn strict_failure(message: String) -> Self {
        Self::new(AppErrorKind::Rejected, "BATCH_STRICT_FAILURE", message)
    }

    fn exit_code(&self) -> i32 {
        match self.kind {
            AppErrorKind::Usage => 1,
            AppErrorKind::Dependency | AppErrorKind::Internal => 2,
            AppErrorKind::Rejected => 3,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Box::new(details);
        self
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(Box::new(data));
        self
    }
}

#[derive(Serialize)]
struct JsonEnvelope {
    status: String,
    error: Option<ErrorEnvelope>,
    data: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
    details: Value,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code.to_string(),
            message: err.message.clone(),
            details: (*err.details).clone(),
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let wants_json = args.iter().any(|arg| arg == "--json" || arg == "-j");

    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            let json = cli.json || wants_json;
            match run(cli, json) {
                Ok(envelope) => {
                    if json {
                        print_json(&envelope);
                    }
                    std::process::exit(0);
                }
                Err(err) => {
                    let exit_code = err.exit_code();
                    if json {
                        let envelope = error_envelope(&err);
                        print_json(&envelope);
                    } else {
                        eprintln!("{}", err.message);
                    }
                    std::process::exit(exit_code);
                }
            }
        }
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{err}");
                std::process::exit(0);
            }
            _ => {
                if wants_json {
                    let usage = AppError::usage(err.to_string());
                    let envelope = error_envelope(&usage);
                    print_json(&envelope);
                } else {
                    let _ = err.print();
                }
                std::process::exit(1);
            }
        },
    }
}

fn run(cli: Cli, json: bool) -> Result<JsonEnvelope, AppError> {
    init_tracing(&cli.log_level)?;
    let config = resolve_config(&cli.tuning)?;

    match cli.command {
        Commands::Analyze {
            path,
            trace,
            strict,
        } => analyze(&path, &config, trace, strict, json),
        Commands::Segments { path } => segments(&path, &config, json),
        Commands::Batch {
            data_dir,
            out,
            threads,
            log_dir,
            no_logs,
            success_dir,
            failure_dir,
            strict,
        } => batch::run(batch::BatchCommand {
            data_dir,
            out,
            threads,
            log_dir,
            no_logs,
            success_dir,
            failure_dir,
            config,
            json_output: json,
            strict,
        }),
        Commands::Report {
            input,
            top,
            filters,
            find,
        } => report::run(
            report::ReportCommand {
                input,
                top,
                filters,
                find,
            },
            json,
        ),
        Commands::Config => show_config(&config, json),
    }
}

fn init_tracing(level: &str) -> Result<(), AppError> {
    let filter = EnvFilter::try_new(level)
        .map_err(|err| AppError::usage(format!("invalid --log-level {:?}: {}", level, err)))?;
    // A subscriber may already be installed when running under a test harness.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

fn resolve_config(tuning: &TuningArgs) -> Result<AnalysisConfig, AppError> {
    let mut config = match &tuning.config {
        Some(path) => load_config_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(value) = tuning.stability_threshold {
        config.stability_threshold = value;
    }
    if let Some(value) = tuning.turn_tolerance {
        config.turn_tolerance = value;
    }
    if let Some(value) = tuning.min_stable_len {
        config.min_stable_len = value;
    }
    if let Some(value) = tuning.max_outliers {
        config.max_outliers = value;
    }
    if let Some(value) = tuning.sum_tolerance {
        config.sum_tolerance = value;
    }
    config.validate().map_err(map_config_error)?;
    tracing::debug!(?config, "effective analysis configuration");
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<AnalysisConfig, AppError> {
    let text = fs::read_to_string(path).map_err(|err| {
        AppError::dependency(format!(
            "failed to read config file {}: {}",
            path.display(),
            err
        ))
    })?;
    serde_json::from_str(&text).map_err(|err| {
        AppError::config_invalid(format!(
            "config file {} is not valid JSON: {}",
            path.display(),
            err
        ))
        .with_details(json!({ "path": path.display().to_string() }))
    })
}

fn map_config_error(err: ConfigError) -> AppError {
    let field = err.field();
    AppError::config_invalid(err.to_string()).with_details(json!({ "field": field }))
}

fn map_readings_error(err: ReadingsError) -> AppError {
    let path = err.path().display().to_string();
    let mut mapped = AppError::dependency(err.to_string()).with_details(json!({ "path": path }));
    mapped.code = err.code();
    mapped
}

fn analyze(
    path: &Path,
    config: &AnalysisConfig,
    trace: bool,
    strict: bool,
    json: bool,
) -> Result<JsonEnvelope, AppError> {
    let data_file = resolve_data_file(path);
    let readings = read_readings(&data_file).map_err(map_readings_error)?;
    let angles: Vec<f64> = readings.iter().map(|reading| reading.angle).collect();

    let mut collector = if trace {
        TraceCollector::collecting()
    } else {
        TraceCollector::forwarding()
    };
    let outcome = analyze_traced(&angles, config, &mut collector);
    let trace_lines = if trace {
        Some(collector.into_lines())
    } else {
        None
    };

    let report = CompassReport::new(
        compass_name(path),
        data_file.display().to_string(),
        angles,
        outcome,
        trace_lines,
    );
    if !json {
        print_compass_report(&report);
    }

    let data = serde_json::to_value(&report)
        .map_err(|err| AppError::internal(format!("failed to serialize report: {}", err)))?;
    if strict && !report.is_valid {
        return Err(AppError::calibration_invalid(format!(
            "compass {} failed calibration",
            report.compass
        ))
        .with_data(data));
    }

    Ok(JsonEnvelope {
        status: verdict_status_str(report.is_valid).to_string(),
        error: None,
        data: Some(data),
    })
}

fn segments(path: &Path, config: &AnalysisConfig, json: bool) -> Result<JsonEnvelope, AppError> {
    let data_file = resolve_data_file(path);
    let readings = read_readings(&data_file).map_err(map_readings_error)?;
    let angles: Vec<f64> = readings.iter().map(|reading| reading.angle).collect();
    let rows: Vec<SegmentRow> = get_segments(&angles, config)
        .iter()
        .map(SegmentRow::from)
        .collect();

    if !json {
        print_segments(&rows);
    }

    Ok(JsonEnvelope {
        status: "OK".to_string(),
        error: None,
        data: Some(json!({
            "source": data_file.display().to_string(),
            "readings": angles.len(),
            "segments": rows,
        })),
    })
}

fn show_config(config: &AnalysisConfig, json: bool) -> Result<JsonEnvelope, AppError> {
    let data = serde_json::to_value(config)
        .map_err(|err| AppError::internal(format!("failed to serialize config: {}", err)))?;
    if !json {
        let pretty = serde_json::to_string_pretty(&data)
            .map_err(|err| AppError::internal(format!("failed to render config: {}", err)))?;
        println!("{pretty}");
    }
    Ok(JsonEnvelope {
        status: "OK".to_string(),
        error: None,
        data: Some(data),
    })
}

fn compass_name(path: &Path) -> String {
    let name = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn verdict_status_str(is_valid: bool) -> &'static str {
    if is_valid {
        "VALID"
    } else {
        "INVALID"
    }
}

fn error_envelope(err: &AppError) -> JsonEnvelope {
    JsonEnvelope {
        status: "ERROR".to_string(),
        error: Some(ErrorEnvelope::from(err)),
        data: err.data.as_deref().cloned(),
    }
}

fn print_json(envelope: &JsonEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to serialize json output: {}", err),
    }
}
