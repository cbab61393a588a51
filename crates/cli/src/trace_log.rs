use compass_analyzer::{
    analyze, analyze_with_sink, AnalysisConfig, AnalysisOutcome, DiagnosticSink, TRACE_TARGET,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Forwards trace lines to `tracing`, optionally keeping or filing them.
#[derive(Default)]
pub(crate) struct TraceCollector {
    lines: Option<Vec<String>>,
    file: Option<BufWriter<File>>,
    write_error: Option<io::Error>,
}

impl TraceCollector {
    pub fn forwarding() -> Self {
        Self::default()
    }

    pub fn collecting() -> Self {
        Self {
            lines: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn with_log_file(mut self, dir: &Path, compass: &str) -> io::Result<(Self, PathBuf)> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(compass));
        self.file = Some(BufWriter::new(File::create(&path)?));
        Ok((self, path))
    }

    fn is_capturing(&self) -> bool {
        self.lines.is_some() || self.file.is_some()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        if let Some(err) = self.write_error.take() {
            return Err(err);
        }
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.unwrap_or_default()
    }
}

impl DiagnosticSink for TraceCollector {
    fn emit(&mut self, line: &str) {
        tracing::debug!(target: TRACE_TARGET, "{}", line);
        if let Some(lines) = self.lines.as_mut() {
            lines.push(line.to_string());
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = writeln!(file, "{}", line) {
                self.write_error.get_or_insert(err);
                self.file = None;
            }
        }
    }
}

pub(crate) fn log_file_name(compass: &str) -> String {
    format!("compass_{}.log", compass)
}

pub(crate) fn analyze_traced(
    angles: &[f64],
    config: &AnalysisConfig,
    collector: &mut TraceCollector,
) -> AnalysisOutcome {
    if collector.is_capturing() || tracing::enabled!(target: TRACE_TARGET, Level::DEBUG) {
        analyze_with_sink(angles, config, collector)
    } else {
        analyze(angles, config)
    }
}
