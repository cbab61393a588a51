use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::segments::{build_segments, merge_segments, Segment};
use crate::selection::select_best_sequence;
use crate::sink::{DiagnosticSink, Trace};
use crate::turns::{detect_turns, Turn};
use crate::validation::{validate_sequence, Verdict};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub is_valid: bool,
    /// Selected turns: at most four, or every detected turn when fewer exist.
    pub turns: Vec<Turn>,
    pub diagnostics: Vec<String>,
    /// Merged stable segments.
    pub segments: Vec<Segment>,
    /// Every turn the detector accepted, before selection.
    pub candidate_turns: Vec<Turn>,
    pub verdict: Verdict,
}

/// Runs the full pipeline over an ordered heading sequence.
///
/// Invalid runs are reported through the outcome, never as an error.
/// `config` is expected to have passed [`AnalysisConfig::validate`].
pub fn analyze(readings: &[f64], config: &AnalysisConfig) -> AnalysisOutcome {
    run(readings, config, &mut Trace::silent())
}

/// Same as [`analyze`], narrating each decision to `sink`.
pub fn analyze_with_sink(
    readings: &[f64],
    config: &AnalysisConfig,
    sink: &mut dyn DiagnosticSink,
) -> AnalysisOutcome {
    run(readings, config, &mut Trace::new(sink))
}

/// Merged stable segments, exactly as [`analyze`] sees them.
pub fn get_segments(readings: &[f64], config: &AnalysisConfig) -> Vec<Segment> {
    stable_segments(readings, config, &mut Trace::silent())
}

fn stable_segments(
    readings: &[f64],
    config: &AnalysisConfig,
    trace: &mut Trace<'_>,
) -> Vec<Segment> {
    let segments = build_segments(readings, config, trace);
    merge_segments(segments, config.stability_threshold, trace)
}

fn run(readings: &[f64], config: &AnalysisConfig, trace: &mut Trace<'_>) -> AnalysisOutcome {
    trace.line(format_args!(
        "analysis: {} readings, stability {:.2}°, turn tolerance {:.2}°, min length {}, max outliers {}, sum tolerance {:.2}°",
        readings.len(),
        config.stability_threshold,
        config.turn_tolerance,
        config.min_stable_len,
        config.max_outliers,
        config.sum_tolerance
    ));

    let segments = stable_segments(readings, config, trace);
    let candidate_turns = detect_turns(&segments, config.turn_tolerance, trace);
    let turns = select_best_sequence(&candidate_turns, trace);
    let verdict = validate_sequence(&turns, config, trace);

    AnalysisOutcome {
        is_valid: verdict.is_valid,
        turns,
        diagnostics: verdict.diagnostics.clone(),
        segments,
        candidate_turns,
        verdict,
    }
}
