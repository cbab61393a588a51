use std::fmt;

/// Write-only receiver for human-readable pipeline trace lines.
///
/// Sinks observe decisions; they never influence a computed result.
pub trait DiagnosticSink {
    fn emit(&mut self, line: &str);
}

impl DiagnosticSink for Vec<String> {
    fn emit(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Forwards trace lines to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

pub const TRACE_TARGET: &str = "compass_analyzer::trace";

impl DiagnosticSink for TracingSink {
    fn emit(&mut self, line: &str) {
        tracing::debug!(target: TRACE_TARGET, "{}", line);
    }
}

/// Optional sink handle threaded through the pipeline stages.
///
/// Formatting is skipped entirely when no sink is attached.
pub struct Trace<'a> {
    sink: Option<&'a mut dyn DiagnosticSink>,
}

impl<'a> Trace<'a> {
    pub fn new(sink: &'a mut dyn DiagnosticSink) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn silent() -> Self {
        Self { sink: None }
    }

    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Some(sink) = self.sink.as_mut() {
            match args.as_str() {
                Some(text) => sink.emit(text),
                None => sink.emit(&args.to_string()),
            }
        }
    }
}
