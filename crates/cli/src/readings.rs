use csv::{ReaderBuilder, StringRecord, Trim};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const DATA_FILE_NAME: &str = "SB_CMPS.csv";

const TIMESTAMP_COLUMN: usize = 0;
const TIME_TEXT_COLUMN: usize = 1;
const ANGLE_COLUMN: usize = 9;
const MIN_FIELDS: usize = ANGLE_COLUMN + 1;

#[derive(Clone, Debug, PartialEq)]
pub struct CompassReading {
    /// Unix seconds.
    pub timestamp: i64,
    pub time_text: String,
    pub angle: f64,
}

#[derive(Debug)]
pub enum ReadingsError {
    NotFound(PathBuf),
    Io { path: PathBuf, source: io::Error },
    Csv { path: PathBuf, source: csv::Error },
    EmptyFile(PathBuf),
    HeaderOnly(PathBuf),
    NoValidRows { path: PathBuf, rows: usize },
}

impl ReadingsError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "READINGS_NOT_FOUND",
            Self::Io { .. } => "READINGS_IO",
            Self::Csv { .. } => "READINGS_CSV",
            Self::EmptyFile(_) => "READINGS_EMPTY",
            Self::HeaderOnly(_) => "READINGS_HEADER_ONLY",
            Self::NoValidRows { .. } => "READINGS_NO_VALID_ROWS",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path)
            | Self::EmptyFile(path)
            | Self::HeaderOnly(path)
            | Self::Io { path, .. }
            | Self::Csv { path, .. }
            | Self::NoValidRows { path, .. } => path,
        }
    }
}

impl fmt::Display for ReadingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "readings file not found: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::Csv { path, source } => {
                write!(f, "malformed CSV in {}: {}", path.display(), source)
            }
            Self::EmptyFile(path) => write!(f, "{} is empty, expected a header row", path.display()),
            Self::HeaderOnly(path) => write!(f, "{} has a header but no data rows", path.display()),
            Self::NoValidRows { path, rows } => write!(
                f,
                "none of the {} data rows in {} has a valid timestamp and heading",
                rows,
                path.display()
            ),
        }
    }
}

impl std::error::Error for ReadingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub fn resolve_data_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DATA_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

pub fn read_readings(path: &Path) -> Result<Vec<CompassReading>, ReadingsError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => ReadingsError::NotFound(path.to_path_buf()),
        _ => ReadingsError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    })?;
    parse_readings(file, path)
}

// Rows that are short or whose timestamp or heading does not parse are skipped.
pub fn parse_readings<R: Read>(
    reader: R,
    source: &Path,
) -> Result<Vec<CompassReading>, ReadingsError> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut records = csv_reader.records();
    match records.next() {
        Some(Ok(_header)) => {}
        Some(Err(err)) => {
            return Err(ReadingsError::Csv {
                path: source.to_path_buf(),
                source: err,
            })
        }
        None => return Err(ReadingsError::EmptyFile(source.to_path_buf())),
    }

    let mut rows = 0usize;
    let mut readings = Vec::new();
    for record in records {
        let record = record.map_err(|err| ReadingsError::Csv {
            path: source.to_path_buf(),
            source: err,
        })?;
        rows += 1;
        match parse_record(&record) {
            Some(reading) => readings.push(reading),
            None => tracing::trace!(row = rows, "skipping unparseable readings row"),
        }
    }

    if rows == 0 {
        return Err(ReadingsError::HeaderOnly(source.to_path_buf()));
    }
    if readings.is_empty() {
        return Err(ReadingsError::NoValidRows {
            path: source.to_path_buf(),
            rows,
        });
    }

    readings.sort_by_key(|reading| reading.timestamp);
    tracing::debug!(
        path = %source.display(),
        rows,
        kept = readings.len(),
        first = %readings[0].time_text,
        last = %readings[readings.len() - 1].time_text,
        "parsed compass readings"
    );
    Ok(readings)
}

fn parse_record(record: &StringRecord) -> Option<CompassReading> {
    if record.len() < MIN_FIELDS {
        return None;
    }
    let timestamp = record.get(TIMESTAMP_COLUMN)?.parse::<i64>().ok()?;
    let angle = record.get(ANGLE_COLUMN)?.parse::<f64>().ok()?;
    if !angle.is_finite() {
        return None;
    }
    let time_text = record.get(TIME_TEXT_COLUMN).unwrap_or_default().to_string();
    Some(CompassReading {
        timestamp,
        time_text,
        angle,
    })
}
