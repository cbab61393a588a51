use crate::readings::{read_readings, DATA_FILE_NAME};
use crate::render::CompassReport;
use crate::trace_log::{analyze_traced, TraceCollector};
use crate::{map_readings_error, AppError, ErrorEnvelope, JsonEnvelope};
use compass_analyzer::AnalysisConfig;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

const DEFAULT_BATCH_OUT_PATH: &str = "compass-calib.batch.ndjson";
const FOLDER_WORK_QUEUE: usize = 64;
const LOG_DIR_NAME: &str = "analysis_logs";
const MAX_COMPASS_NUMBER: i64 = 1_000_000;

const STATUS_VALID: &str = "VALID";
const STATUS_INVALID: &str = "INVALID";
const STATUS_ERROR: &str = "ERROR";

pub(super) struct BatchCommand {
    pub data_dir: PathBuf,
    pub out: Option<PathBuf>,
    pub threads: Option<usize>,
    pub log_dir: Option<PathBuf>,
    pub no_logs: bool,
    pub success_dir: Option<PathBuf>,
    pub failure_dir: Option<PathBuf>,
    pub config: AnalysisConfig,
    pub json_output: bool,
    pub strict: bool,
}

#[derive(Clone, Debug)]
struct BatchTask {
    row_index: usize,
    compass: String,
    folder: PathBuf,
}

#[derive(Clone, Debug)]
struct WorkerConfig {
    analysis: AnalysisConfig,
    log_dir: Option<PathBuf>,
    success_dir: Option<PathBuf>,
    failure_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct BatchRowResult {
    row_index: usize,
    compass: String,
    folder: String,
    status: String,
    error: Option<ErrorEnvelope>,
    data: Option<CompassReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    moved_to: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notes: Vec<String>,
}

#[derive(Serialize)]
struct BatchSummary {
    data_dir: String,
    out_path: String,
    folders_total: usize,
    folders_valid: usize,
    folders_invalid: usize,
    folders_err: usize,
    valid: Vec<String>,
    failed: Vec<String>,
    skipped: Vec<String>,
    duration_ms: u64,
}

#[derive(Default)]
struct WriterStats {
    rows_total: usize,
    rows_valid: usize,
    rows_invalid: usize,
    rows_err: usize,
    valid: Vec<String>,
    failed: Vec<String>,
}

pub(super) fn run(command: BatchCommand) -> Result<JsonEnvelope, AppError> {
    let BatchCommand {
        data_dir,
        out,
        threads,
        log_dir,
        no_logs,
        success_dir,
        failure_dir,
        config,
        json_output,
        strict,
    } = command;

    if matches!(threads, Some(0)) {
        return Err(AppError::usage("--threads must be >= 1".to_string()));
    }
    if !data_dir.is_dir() {
        return Err(AppError::dependency(format!(
            "data directory does not exist: {}",
            data_dir.display()
        )));
    }

    let started = Instant::now();
    let out_path = out.unwrap_or_else(|| PathBuf::from(DEFAULT_BATCH_OUT_PATH));
    let out_path_display = out_path.display().to_string();

    let (tasks, skipped) = collect_compass_folders(&data_dir)?;
    for name in &skipped {
        tracing::warn!(
            folder = %name,
            "skipping folder: expected N or N(k) with N in 1..={}",
            MAX_COMPASS_NUMBER
        );
    }
    tracing::info!(
        data_dir = %data_dir.display(),
        folders = tasks.len(),
        skipped = skipped.len(),
        "starting batch"
    );

    let log_dir = if no_logs {
        None
    } else {
        prepare_log_dir(log_dir.unwrap_or_else(|| default_log_dir(&data_dir)))
    };

    let worker_config = WorkerConfig {
        analysis: config,
        log_dir,
        success_dir,
        failure_dir,
    };

    let progress = build_progress_bar(tasks.len());
    let out_file = File::create(&out_path).map_err(|err| {
        AppError::dependency(format!(
            "failed to open output file {}: {}",
            out_path.display(),
            err
        ))
    })?;

    let pool = build_thread_pool(threads)?;
    let worker_count = pool.current_num_threads().max(1);

    let (task_tx, task_rx) = bounded::<BatchTask>(FOLDER_WORK_QUEUE);
    let (result_tx, result_rx) = unbounded::<(usize, BatchRowResult)>();

    let writer_handle = thread::spawn(move || write_rows_in_order(out_file, result_rx));

    let mut dispatch_error: Option<AppError> = None;
    pool.scope(|scope| {
        for _ in 0..worker_count {
            let worker_task_rx = task_rx.clone();
            let worker_result_tx = result_tx.clone();
            let worker_progress = progress.clone();
            let config = worker_config.clone();
            scope.spawn(move |_| {
                run_worker(worker_task_rx, worker_result_tx, worker_progress, config);
            });
        }

        for task in tasks {
            if task_tx.send(task).is_err() {
                dispatch_error = Some(AppError::internal(
                    "batch worker queue closed unexpectedly".to_string(),
                ));
                break;
            }
        }
        drop(task_tx);
    });

    drop(result_tx);

    let writer_result = writer_handle
        .join()
        .map_err(|_| AppError::internal("batch writer thread panicked".to_string()))?;
    let writer_stats = writer_result?;

    finish_progress(&progress, writer_stats.rows_total);

    if let Some(err) = dispatch_error {
        return Err(err);
    }

    let summary = BatchSummary {
        data_dir: data_dir.display().to_string(),
        out_path: out_path_display,
        folders_total: writer_stats.rows_total,
        folders_valid: writer_stats.rows_valid,
        folders_invalid: writer_stats.rows_invalid,
        folders_err: writer_stats.rows_err,
        valid: writer_stats.valid,
        failed: writer_stats.failed,
        skipped,
        duration_ms: duration_ms(started),
    };

    if !json_output {
        print_batch_summary(&summary);
    }

    let failing = summary.folders_invalid + summary.folders_err;
    if strict && failing > 0 {
        return Err(AppError::strict_failure(format!(
            "strict mode failed: {} compass folder(s) did not pass calibration",
            failing
        ))
        .with_data(json!(summary)));
    }

    Ok(JsonEnvelope {
        status: "OK".to_string(),
        error: None,
        data: Some(json!(summary)),
    })
}

fn collect_compass_folders(data_dir: &Path) -> Result<(Vec<BatchTask>, Vec<String>), AppError> {
    let entries = fs::read_dir(data_dir).map_err(|err| {
        AppError::dependency(format!(
            "failed to read data directory {}: {}",
            data_dir.display(),
            err
        ))
    })?;

    let mut folders = Vec::new();
    let mut skipped = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            AppError::dependency(format!(
                "failed to read data directory {}: {}",
                data_dir.display(),
                err
            ))
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == LOG_DIR_NAME {
            continue;
        }
        if is_compass_folder_name(&name) {
            folders.push((name, path));
        } else {
            skipped.push(name);
        }
    }

    folders.sort();
    skipped.sort();
    let tasks = folders
        .into_iter()
        .enumerate()
        .map(|(row_index, (compass, folder))| BatchTask {
            row_index,
            compass,
            folder,
        })
        .collect();
    Ok((tasks, skipped))
}

fn default_log_dir(data_dir: &Path) -> PathBuf {
    match data_dir.parent() {
        Some(parent) => parent.join(LOG_DIR_NAME),
        None => data_dir.join(LOG_DIR_NAME),
    }
}

fn prepare_log_dir(dir: PathBuf) -> Option<PathBuf> {
    match fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "trace logs disabled");
            None
        }
    }
}

// `N` or `N(k)`: N in 1..=MAX_COMPASS_NUMBER, k any integer.
fn is_compass_folder_name(name: &str) -> bool {
    let main = match (name.find('('), name.find(')')) {
        (None, None) => name,
        (Some(open), Some(close)) if open > 0 && close == name.len() - 1 && close > open => {
            if name[open + 1..close].parse::<i64>().is_err() {
                return false;
            }
            &name[..open]
        }
        _ => return false,
    };
    matches!(main.parse::<i64>(), Ok(number) if (1..=MAX_COMPASS_NUMBER).contains(&number))
}

fn build_thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, AppError> {
    let builder = rayon::ThreadPoolBuilder::new();
    let builder = if let Some(n) = threads {
        builder.num_threads(n)
    } else {
        builder
    };
    builder
        .build()
        .map_err(|err| AppError::internal(format!("failed to build batch thread pool: {}", err)))
}

fn build_progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} compasses ({percent}%)",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn run_worker(
    task_rx: Receiver<BatchTask>,
    result_tx: Sender<(usize, BatchRowResult)>,
    progress: ProgressBar,
    config: WorkerConfig,
) {
    while let Ok(task) = task_rx.recv() {
        let row_index = task.row_index;
        let row = config.process(&task);
        if result_tx.send((row_index, row)).is_err() {
            break;
        }
        progress.inc(1);
    }
}

impl WorkerConfig {
    fn process(&self, task: &BatchTask) -> BatchRowResult {
        let data_file = task.folder.join(DATA_FILE_NAME);
        let mut row = match read_readings(&data_file) {
            Ok(readings) => {
                let angles: Vec<f64> = readings.iter().map(|reading| reading.angle).collect();
                self.analyze(task, &data_file, angles)
            }
            Err(err) => {
                tracing::warn!(compass = %task.compass, error = %err, "cannot read compass data");
                BatchRowResult::failure(task, map_readings_error(err))
            }
        };
        self.relocate(task, &mut row);
        row
    }

    fn analyze(&self, task: &BatchTask, data_file: &Path, angles: Vec<f64>) -> BatchRowResult {
        let mut notes = Vec::new();
        let mut log_file = None;
        let mut collector = TraceCollector::forwarding();
        if let Some(dir) = &self.log_dir {
            match TraceCollector::forwarding().with_log_file(dir, &task.compass) {
                Ok((with_file, path)) => {
                    collector = with_file;
                    log_file = Some(path.display().to_string());
                }
                Err(err) => {
                    tracing::warn!(compass = %task.compass, error = %err, "cannot create trace log");
                    notes.push(format!("trace log unavailable: {}", err));
                }
            }
        }

        let outcome = analyze_traced(&angles, &self.analysis, &mut collector);
        if let Err(err) = collector.finish() {
            tracing::warn!(compass = %task.compass, error = %err, "trace log incomplete");
            notes.push(format!("trace log incomplete: {}", err));
        }

        let report = CompassReport::new(
            task.compass.clone(),
            data_file.display().to_string(),
            angles,
            outcome,
            None,
        );
        tracing::debug!(
            compass = %task.compass,
            valid = report.is_valid,
            turns = report.turns.len(),
            "compass analyzed"
        );

        BatchRowResult {
            row_index: task.row_index,
            compass: task.compass.clone(),
            folder: task.folder.display().to_string(),
            status: if report.is_valid {
                STATUS_VALID
            } else {
                STATUS_INVALID
            }
            .to_string(),
            error: None,
            data: Some(report),
            log_file,
            moved_to: None,
            notes,
        }
    }

    fn relocate(&self, task: &BatchTask, row: &mut BatchRowResult) {
        let destination = if row.status == STATUS_VALID {
            self.success_dir.as_deref()
        } else {
            self.failure_dir.as_deref()
        };
        let Some(destination) = destination else {
            return;
        };
        match move_folder(&task.folder, destination) {
            Ok(moved) => row.moved_to = Some(moved.display().to_string()),
            Err(message) => {
                tracing::warn!(compass = %task.compass, error = %message, "cannot move folder");
                row.notes.push(message);
            }
        }
    }
}

fn move_folder(source: &Path, destination: &Path) -> Result<PathBuf, String> {
    fs::create_dir_all(destination).map_err(|err| {
        format!(
            "failed to create destination {}: {}",
            destination.display(),
            err
        )
    })?;
    let name = source
        .file_name()
        .ok_or_else(|| format!("cannot move {}: no folder name", source.display()))?;
    let target = destination.join(name);
    if target.exists() {
        return Err(format!(
            "cannot move {}: {} already exists",
            source.display(),
            target.display()
        ));
    }
    fs::rename(source, &target).map_err(|err| {
        format!(
            "failed to move {} to {}: {}",
            source.display(),
            target.display(),
            err
        )
    })?;
    Ok(target)
}

impl BatchRowResult {
    fn failure(task: &BatchTask, err: AppError) -> Self {
        Self {
            row_index: task.row_index,
            compass: task.compass.clone(),
            folder: task.folder.display().to_string(),
            status: STATUS_ERROR.to_string(),
            error: Some(ErrorEnvelope::from(&err)),
            data: None,
            log_file: None,
            moved_to: None,
            notes: Vec::new(),
        }
    }
}

fn write_rows_in_order(
    out_file: File,
    result_rx: Receiver<(usize, BatchRowResult)>,
) -> Result<WriterStats, AppError> {
    let mut writer = BufWriter::new(out_file);
    let mut buffer: BTreeMap<usize, BatchRowResult> = BTreeMap::new();
    let mut next_expected = 0usize;
    let mut stats = WriterStats::default();

    while let Ok((row_index, row)) = result_rx.recv() {
        buffer.insert(row_index, row);
        while let Some(row) = buffer.remove(&next_expected) {
            match row.status.as_str() {
                STATUS_VALID => {
                    stats.rows_valid = stats.rows_valid.saturating_add(1);
                    stats.valid.push(row.compass.clone());
                }
                STATUS_INVALID => {
                    stats.rows_invalid = stats.rows_invalid.saturating_add(1);
                    stats.failed.push(row.compass.clone());
                }
                _ => {
                    stats.rows_err = stats.rows_err.saturating_add(1);
                    stats.failed.push(row.compass.clone());
                }
            }

            serde_json::to_writer(&mut writer, &row).map_err(|err| {
                AppError::internal(format!(
                    "failed to serialize batch row {}: {}",
                    next_expected, err
                ))
            })?;
            writer.write_all(b"\n").map_err(|err| {
                AppError::dependency(format!(
                    "failed to write batch output row {}: {}",
                    next_expected, err
                ))
            })?;

            stats.rows_total = stats.rows_total.saturating_add(1);
            next_expected = next_expected.saturating_add(1);
        }
    }

    if !buffer.is_empty() {
        return Err(AppError::internal(
            "writer stopped before all rows were flushed".to_string(),
        ));
    }

    writer
        .flush()
        .map_err(|err| AppError::dependency(format!("failed to flush batch output: {}", err)))?;

    Ok(stats)
}

fn finish_progress(progress: &ProgressBar, rows_total: usize) {
    progress.set_position(rows_total as u64);
    progress.finish_with_message(format!("analyzed {} compasses", rows_total));
}

fn duration_ms(started: Instant) -> u64 {
    let millis = started.elapsed().as_millis();
    if millis > u128::from(u64::MAX) {
        u64::MAX
    } else {
        millis as u64
    }
}

fn print_batch_summary(summary: &BatchSummary) {
    println!(
        "batch complete: total={} valid={} invalid={} err={} out={}",
        summary.folders_total,
        summary.folders_valid,
        summary.folders_invalid,
        summary.folders_err,
        summary.out_path
    );
    if summary.valid.is_empty() {
        println!("passed: none");
    } else {
        println!("passed: {}", summary.valid.join(" "));
    }
    if summary.failed.is_empty() {
        println!("failed: none");
    } else {
        println!("failed: {}", summary.failed.join(" "));
    }
    if !summary.skipped.is_empty() {
        println!("skipped: {}", summary.skipped.join(" "));
    }
}
